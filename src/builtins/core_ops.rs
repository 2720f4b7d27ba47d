// ABOUTME: Identity, function application, and the usability predicates (core §4.8)

use super::{arg, bool_value, def};
use crate::error::Signal;
use crate::heap::IrefObject;
use crate::interp::Interp;
use crate::value::Value;

pub(super) fn register(interp: &mut Interp) {
    def(interp, "EQ", eq, 2, 2);
    def(interp, "NULL", null, 1, 1);
    def(interp, "NOT", null, 1, 1);
    def(interp, "ATOM", atom, 1, 1);
    def(interp, "CONSP", consp, 1, 1);
    def(interp, "SYMBOLP", symbolp, 1, 1);
    def(interp, "NUMBERP", numberp, 1, 1);
    def(interp, "STRINGP", stringp, 1, 1);
    def(interp, "LISTP", listp, 1, 1);
    def(interp, "FUNCTIONP", functionp, 1, 1);
    def(interp, "CODE-CHAR", code_char, 1, 1);
    def(interp, "CHAR-CODE", char_code, 1, 1);
    def(interp, "VALUES", values, 0, -1);
    def(interp, "FUNCALL", funcall, 1, -1);
    def(interp, "APPLY", apply_builtin, 2, -1);
    def(interp, "EVAL", eval_builtin, 1, 1);
    def(interp, "GC", gc, 0, 0);
}

fn eq(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(bool_value(interp, arg(args, 0) == arg(args, 1)))
}

fn null(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(bool_value(interp, arg(args, 0).is_nil()))
}

fn atom(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(bool_value(interp, !matches!(arg(args, 0), Value::Cons(_))))
}

fn consp(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(bool_value(interp, matches!(arg(args, 0), Value::Cons(_))))
}

fn symbolp(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let is_symbol = match arg(args, 0) {
        Value::Nil => true,
        Value::Iref(i) => matches!(interp.heap.irefs.get(i), IrefObject::Symbol(_)),
        _ => false,
    };
    Ok(bool_value(interp, is_symbol))
}

fn numberp(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let is_number = match arg(args, 0) {
        Value::Fixnum(_) => true,
        Value::Jref(i) => matches!(interp.heap.jrefs.get(i), crate::heap::JrefObject::Double(_)),
        _ => false,
    };
    Ok(bool_value(interp, is_number))
}

fn stringp(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let is_string = matches!(arg(args, 0), Value::Jref(i) if matches!(interp.heap.jrefs.get(i), crate::heap::JrefObject::SimpleString(_)));
    Ok(bool_value(interp, is_string))
}

fn listp(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(bool_value(interp, matches!(arg(args, 0), Value::Nil | Value::Cons(_))))
}

fn functionp(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let is_function = matches!(arg(args, 0), Value::Iref(i) if matches!(interp.heap.irefs.get(i), IrefObject::Function(_)));
    Ok(bool_value(interp, is_function))
}

fn code_char(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    match arg(args, 0) {
        Value::Fixnum(n) if (0..=0x10FFFF).contains(&n) => char::from_u32(n as u32)
            .map(Value::Char)
            .ok_or_else(|| Signal::runtime_error("CODE-CHAR: not a valid character code")),
        _ => Err(Signal::runtime_error("CODE-CHAR expects a non-negative fixnum")),
    }
}

fn char_code(_interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    match arg(args, 0) {
        Value::Char(c) => Ok(Value::Fixnum(c as i64)),
        _ => Err(Signal::runtime_error("CHAR-CODE expects a character")),
    }
}

/// `(values a b c)` sets the full multiple-values register (§4.6) and
/// returns the primary value (NIL for zero values).
fn values(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    interp.last_values = args.to_vec();
    Ok(args.first().copied().unwrap_or(Value::Nil))
}

/// `(funcall fn arg...)`. The builtin calling convention carries no lexical
/// environment, so calls made from here use the global environment as the
/// caller's — correct because only a `&ENVIRONMENT` lambda-list parameter
/// would ever need the true caller environment, and that parameter never
/// applies when calling an already-closed-over function object.
fn funcall(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let env = interp.global_env.clone();
    crate::eval::apply(interp, args[0], &args[1..], &env)
}

/// `(apply fn arg... final-arg-list)`: the last argument is a list whose
/// elements are appended to the preceding actuals.
fn apply_builtin(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let operator = args[0];
    let mut actuals = Vec::new();
    if args.len() > 2 {
        actuals.extend_from_slice(&args[1..args.len() - 1]);
    }
    let spread = interp.heap.list_to_vec(args[args.len() - 1]);
    actuals.extend(spread);
    let env = interp.global_env.clone();
    crate::eval::apply(interp, operator, &actuals, &env)
}

fn eval_builtin(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let env = interp.global_env.clone();
    crate::eval::eval(interp, args[0], &env)
}

fn gc(interp: &mut Interp, _args: &[Value]) -> Result<Value, Signal> {
    crate::gc::collect(interp);
    Ok(Value::Nil)
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
    fn eq_is_identity_not_structural_equality() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(eq 'a 'a)"), interp.t_value());
        assert_eq!(run(&mut interp, "(eq (cons 1 2) (cons 1 2))"), Value::Nil);
    }

    #[test]
    fn funcall_and_apply_invoke_closures() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(funcall (function +) 1 2 3)"), Value::Fixnum(6));
        assert_eq!(run(&mut interp, "(apply (function +) 1 '(2 3))"), Value::Fixnum(6));
    }

    #[test]
    fn null_and_not_agree() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(null nil)"), interp.t_value());
        assert_eq!(run(&mut interp, "(not 5)"), Value::Nil);
    }

    #[test]
    fn code_char_and_char_code_round_trip() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(char-code (code-char 65))"), Value::Fixnum(65));
    }
}
