// ABOUTME: Arithmetic, numeric comparison, and bit-field access (core §4.8)
//
// Every operator works in `f64` throughout and narrows its result back to a
// fixnum when it's an exact integer in range, mirroring the narrowing the
// reader applies to a literal (§6). `=` inherits IEEE 754 equality from
// `f64`'s own `PartialEq`, so `NaN` compares unequal to itself without any
// special-casing here.

use super::{arg, as_f64, as_fixnum, bool_value, def, narrow};
use crate::error::Signal;
use crate::interp::Interp;
use crate::value::Value;

pub(super) fn register(interp: &mut Interp) {
    def(interp, "+", plus, 0, -1);
    def(interp, "-", minus, 1, -1);
    def(interp, "*", times, 0, -1);
    def(interp, "/", divide, 1, -1);
    def(interp, "=", numeric_eq, 1, -1);
    def(interp, "<", less, 1, -1);
    def(interp, ">", greater, 1, -1);
    def(interp, "<=", less_or_equal, 1, -1);
    def(interp, ">=", greater_or_equal, 1, -1);
    def(interp, "FLOOR", floor, 1, 2);
    def(interp, "BYTE", byte, 2, 2);
    def(interp, "DPB", dpb, 3, 3);
    def(interp, "LDB", ldb, 2, 2);
}

fn plus(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let mut sum = 0.0;
    for a in args {
        sum += as_f64(interp, *a)?;
    }
    narrow(interp, sum)
}

fn minus(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let first = as_f64(interp, args[0])?;
    if args.len() == 1 {
        return narrow(interp, -first);
    }
    let mut acc = first;
    for a in &args[1..] {
        acc -= as_f64(interp, *a)?;
    }
    narrow(interp, acc)
}

fn times(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let mut product = 1.0;
    for a in args {
        product *= as_f64(interp, *a)?;
    }
    narrow(interp, product)
}

fn divide(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let first = as_f64(interp, args[0])?;
    if args.len() == 1 {
        if first == 0.0 {
            return Err(Signal::runtime_error("/: division by zero"));
        }
        return narrow(interp, 1.0 / first);
    }
    let mut acc = first;
    for a in &args[1..] {
        let divisor = as_f64(interp, *a)?;
        if divisor == 0.0 {
            return Err(Signal::runtime_error("/: division by zero"));
        }
        acc /= divisor;
    }
    narrow(interp, acc)
}

fn numeric_eq(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let first = as_f64(interp, args[0])?;
    for a in &args[1..] {
        if as_f64(interp, *a)? != first {
            return Ok(Value::Nil);
        }
    }
    Ok(interp.t_value())
}

fn less(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    monotonic(interp, args, |a, b| a < b)
}

fn greater(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    monotonic(interp, args, |a, b| a > b)
}

fn less_or_equal(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    monotonic(interp, args, |a, b| a <= b)
}

fn greater_or_equal(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    monotonic(interp, args, |a, b| a >= b)
}

fn monotonic(interp: &mut Interp, args: &[Value], holds: impl Fn(f64, f64) -> bool) -> Result<Value, Signal> {
    let mut prev = as_f64(interp, args[0])?;
    for a in &args[1..] {
        let next = as_f64(interp, *a)?;
        if !holds(prev, next) {
            return Ok(Value::Nil);
        }
        prev = next;
    }
    Ok(interp.t_value())
}

/// `(floor n &optional divisor)`: sets the multiple-values register to
/// `(quotient remainder)` and returns the quotient (§4.6, §4.8).
fn floor(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let n = as_f64(interp, arg(args, 0))?;
    let d = if args.len() > 1 { as_f64(interp, args[1])? } else { 1.0 };
    if d == 0.0 {
        return Err(Signal::runtime_error("FLOOR: division by zero"));
    }
    let quotient = (n / d).floor();
    let remainder = n - quotient * d;
    let q = narrow(interp, quotient)?;
    let r = narrow(interp, remainder)?;
    interp.last_values = vec![q, r];
    Ok(q)
}

fn byte(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    interp.alloc_cons(arg(args, 0), arg(args, 1))
}

fn byte_spec(interp: &Interp, spec: Value) -> Result<(i64, i64), Signal> {
    let size = as_fixnum(interp.heap.car(spec))?;
    let position = as_fixnum(interp.heap.cdr(spec))?;
    Ok((size, position))
}

fn byte_mask(size: i64) -> i64 {
    if size >= 64 {
        -1
    } else {
        (1i64 << size) - 1
    }
}

/// `(dpb newbyte bytespec integer)`: deposits `newbyte` into the field
/// `bytespec` (a `(byte size position)` cons) names within `integer`.
fn dpb(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let newbyte = as_fixnum(arg(args, 0))?;
    let (size, position) = byte_spec(interp, arg(args, 1))?;
    let integer = as_fixnum(arg(args, 2))?;
    let mask = byte_mask(size);
    let result = ((newbyte & mask) << position) | (integer & !(mask << position));
    Ok(Value::Fixnum(result))
}

/// `(ldb bytespec integer)`: extracts the field `bytespec` names.
fn ldb(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let (size, position) = byte_spec(interp, arg(args, 0))?;
    let integer = as_fixnum(arg(args, 1))?;
    let mask = byte_mask(size);
    Ok(Value::Fixnum((integer >> position) & mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_one;

    fn run(interp: &mut Interp, src: &str) -> Value {
        let env = interp.global_env.clone();
        let form = read_one(interp, src).unwrap();
        crate::eval::eval(interp, form, &env).unwrap()
    }

    #[test]
    fn arithmetic_folds_left_to_right() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(+ 1 2 3)"), Value::Fixnum(6));
        assert_eq!(run(&mut interp, "(- 10 1 2)"), Value::Fixnum(7));
        assert_eq!(run(&mut interp, "(* 2 3 4)"), Value::Fixnum(24));
    }

    #[test]
    fn unary_minus_negates() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(- 5)"), Value::Fixnum(-5));
    }

    #[test]
    fn less_than_checks_strictly_increasing_sequence() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(< 1 2 3)"), interp.t_value());
        assert_eq!(run(&mut interp, "(< 1 3 2)"), Value::Nil);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let mut interp = Interp::boot(1 << 20);
        let env = interp.global_env.clone();
        let form = read_one(&mut interp, "(/ 1 0)").unwrap();
        assert!(crate::eval::eval(&mut interp, form, &env).is_err());
    }

    #[test]
    fn floor_sets_quotient_and_remainder() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(floor 7 2)");
        assert_eq!(v, Value::Fixnum(3));
        assert_eq!(interp.last_values, vec![Value::Fixnum(3), Value::Fixnum(1)]);
    }

    #[test]
    fn dpb_and_ldb_round_trip_a_field() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(ldb (byte 4 4) (dpb 15 (byte 4 4) 0))");
        assert_eq!(v, Value::Fixnum(15));
    }
}
