// ABOUTME: Simple-vector allocation, indexed access, and unbound slots (core §4.8)
//
// The original's `iref` memory is untyped: any iref block can be indexed as
// a vector of words. A safe Rust arena can't offer that without reinventing
// unchecked casts, so `MAKEI`/`IREF`/`IBOUNDP`/`IMAKUNBOUND` here are
// restricted to the typed `SimpleVector` iref variant, and "unbound" is
// represented with a reserved `:UNBOUND` keyword sentinel rather than
// growing `Value` with another case.

use super::{arg, as_fixnum, bool_value, def, def_setter};
use crate::error::{Failure, Signal};
use crate::heap::IrefObject;
use crate::interp::Interp;
use crate::value::Value;

pub(super) fn register(interp: &mut Interp) {
    def(interp, "MAKE-SIMPLE-VECTOR", make_simple_vector, 1, 2);
    def(interp, "MAKEI", makei, 1, -1);
    def_setter(interp, "IREF", iref, 2, 2, Some(setf_iref));
    def(interp, "IBOUNDP", iboundp, 2, 2);
    def(interp, "IMAKUNBOUND", imakunbound, 2, 2);
}

fn unbound_marker(interp: &mut Interp) -> Value {
    Value::Iref(interp.intern_keyword("UNBOUND"))
}

fn make_simple_vector(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let len = as_fixnum(arg(args, 0))?.max(0) as usize;
    let initial = if args.len() > 1 { args[1] } else { Value::Nil };
    interp.alloc_iref(IrefObject::SimpleVector(vec![initial; len]))
}

/// `(makei length &rest initial-values)`, matching the original's
/// `(makei length subtype &rest initial-values)` arity shape minus the
/// subtype argument, which this core's typed arena makes unnecessary.
/// Unsupplied slots start out unbound (`:UNBOUND`) rather than NIL.
fn makei(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let len = as_fixnum(arg(args, 0))?.max(0) as usize;
    let marker = unbound_marker(interp);
    let mut items = vec![marker; len];
    for (i, v) in args[1.min(args.len())..].iter().enumerate() {
        if i < len {
            items[i] = *v;
        }
    }
    interp.alloc_iref(IrefObject::SimpleVector(items))
}

fn iref(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let idx = as_fixnum(arg(args, 1))?;
    match arg(args, 0) {
        Value::Iref(i) => match interp.heap.irefs.get(i) {
            IrefObject::SimpleVector(items) => {
                if idx < 0 || idx as usize >= items.len() {
                    Err(Failure::IndexOutOfBounds(arg(args, 1)).into())
                } else {
                    Ok(items[idx as usize])
                }
            }
            _ => Err(Signal::runtime_error("IREF expects a simple-vector")),
        },
        _ => Err(Signal::runtime_error("IREF expects a simple-vector")),
    }
}

fn setf_iref(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let idx = as_fixnum(arg(args, 1))?;
    let value = arg(args, 2);
    match arg(args, 0) {
        Value::Iref(i) => match interp.heap.irefs.get_mut(i) {
            IrefObject::SimpleVector(items) => {
                if idx < 0 || idx as usize >= items.len() {
                    Err(Failure::IndexOutOfBounds(arg(args, 1)).into())
                } else {
                    items[idx as usize] = value;
                    Ok(value)
                }
            }
            _ => Err(Signal::runtime_error("IREF expects a simple-vector")),
        },
        _ => Err(Signal::runtime_error("IREF expects a simple-vector")),
    }
}

fn iboundp(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let idx = as_fixnum(arg(args, 1))?;
    let marker = unbound_marker(interp);
    let slot = match arg(args, 0) {
        Value::Iref(i) => match interp.heap.irefs.get(i) {
            IrefObject::SimpleVector(items) => items.get(idx.max(0) as usize).copied(),
            _ => return Err(Signal::runtime_error("IBOUNDP expects a simple-vector")),
        },
        _ => return Err(Signal::runtime_error("IBOUNDP expects a simple-vector")),
    };
    Ok(bool_value(interp, matches!(slot, Some(v) if v != marker)))
}

fn imakunbound(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let idx = as_fixnum(arg(args, 1))?;
    let marker = unbound_marker(interp);
    match arg(args, 0) {
        Value::Iref(i) => match interp.heap.irefs.get_mut(i) {
            IrefObject::SimpleVector(items) => {
                if idx < 0 || idx as usize >= items.len() {
                    Err(Failure::IndexOutOfBounds(arg(args, 1)).into())
                } else {
                    items[idx as usize] = marker;
                    Ok(arg(args, 0))
                }
            }
            _ => Err(Signal::runtime_error("IMAKUNBOUND expects a simple-vector")),
        },
        _ => Err(Signal::runtime_error("IMAKUNBOUND expects a simple-vector")),
    }
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
    fn iref_reads_back_a_stored_slot() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(iref (makei 3 1 2 3) 1)");
        assert_eq!(v, Value::Fixnum(2));
    }

    #[test]
    fn setf_iref_mutates_a_slot() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(let ((v (make-simple-vector 3 0))) (setf (iref v 1) 42) (iref v 1))");
        assert_eq!(v, Value::Fixnum(42));
    }

    #[test]
    fn out_of_range_index_is_a_failure() {
        let mut interp = Interp::boot(1 << 20);
        let env = interp.global_env.clone();
        let form = read_one(&mut interp, "(iref (makei 2) 9)").unwrap();
        let err = crate::eval::eval(&mut interp, form, &env);
        assert!(matches!(
            err,
            Err(Signal::Unwind(crate::control::Unwind::Failure(Failure::IndexOutOfBounds(_))))
        ));
    }

    #[test]
    fn unsupplied_slots_start_unbound() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(iboundp (makei 2) 0)"), Value::Nil);
        assert_eq!(run(&mut interp, "(iboundp (makei 1 5) 0)"), interp.t_value());
    }

    #[test]
    fn imakunbound_clears_a_slot() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(let ((v (makei 1 5))) (imakunbound v 0) (iboundp v 0))");
        assert_eq!(v, Value::Nil);
    }
}
