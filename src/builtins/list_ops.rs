// ABOUTME: Cons-cell construction, access, and mutation (core §4.8)

use super::{arg, def, def_setter};
use crate::error::Signal;
use crate::interp::Interp;
use crate::value::Value;

pub(super) fn register(interp: &mut Interp) {
    def_setter(interp, "CAR", car, 1, 1, Some(rplaca));
    def_setter(interp, "CDR", cdr, 1, 1, Some(rplacd));
    def(interp, "CAAR", caar, 1, 1);
    def(interp, "CADR", cadr, 1, 1);
    def(interp, "CDAR", cdar, 1, 1);
    def(interp, "CDDR", cddr, 1, 1);
    def(interp, "CONS", cons, 2, 2);
    def(interp, "RPLACA", rplaca, 2, 2);
    def(interp, "RPLACD", rplacd, 2, 2);
    def(interp, "LIST", list, 0, -1);
}

fn car(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(interp.heap.car(arg(args, 0)))
}

fn cdr(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(interp.heap.cdr(arg(args, 0)))
}

fn caar(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let inner = interp.heap.car(arg(args, 0));
    Ok(interp.heap.car(inner))
}

fn cadr(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let inner = interp.heap.cdr(arg(args, 0));
    Ok(interp.heap.car(inner))
}

fn cdar(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let inner = interp.heap.car(arg(args, 0));
    Ok(interp.heap.cdr(inner))
}

fn cddr(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let inner = interp.heap.cdr(arg(args, 0));
    Ok(interp.heap.cdr(inner))
}

fn cons(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    interp.alloc_cons(arg(args, 0), arg(args, 1))
}

fn rplaca(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(interp.heap.set_car(arg(args, 0), arg(args, 1)))
}

fn rplacd(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(interp.heap.set_cdr(arg(args, 0), arg(args, 1)))
}

fn list(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    Ok(interp.heap.vec_to_list(args))
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
    fn cons_car_cdr_compose() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(car (cons 1 2))"), Value::Fixnum(1));
        assert_eq!(run(&mut interp, "(cdr (cons 1 2))"), Value::Fixnum(2));
    }

    #[test]
    fn cxxr_compositions_walk_nested_conses() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(cadr (list 1 2 3))"), Value::Fixnum(2));
        assert_eq!(run(&mut interp, "(caar (list (list 1 2) 3))"), Value::Fixnum(1));
    }

    #[test]
    fn rplaca_mutates_in_place() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(let ((x (cons 1 2))) (rplaca x 9) (car x))");
        assert_eq!(v, Value::Fixnum(9));
    }

    #[test]
    fn list_builds_a_proper_list() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(list 1 2 3)");
        assert_eq!(interp.heap.list_to_vec(v), vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)]);
    }
}
