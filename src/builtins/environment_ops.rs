// ABOUTME: Raw call-stack reflection (core §4.3, §4.8)
//
// `MAKEF` and `FREF` let Lisp code read its own call stack as plain data,
// the way the original's debugger and break loop walk the frame array by
// hand. `MAKEF` hands back the current depth as a stable index; `FREF`
// re-reads whatever value sits there.

use super::{arg, as_fixnum, def};
use crate::error::{Failure, Signal};
use crate::interp::Interp;
use crate::value::Value;

pub(super) fn register(interp: &mut Interp) {
    def(interp, "MAKEF", makef, 0, 0);
    def(interp, "FREF", fref, 1, 1);
}

fn makef(interp: &mut Interp, _args: &[Value]) -> Result<Value, Signal> {
    Ok(Value::Fixnum(interp.stack.len() as i64))
}

fn fref(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let idx = as_fixnum(arg(args, 0))?;
    if idx < 0 {
        return Err(Failure::IndexOutOfBounds(arg(args, 0)).into());
    }
    interp
        .stack
        .value_at(idx as usize)
        .ok_or_else(|| Failure::IndexOutOfBounds(arg(args, 0)).into())
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
    fn fref_reads_back_a_live_stack_slot() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(fref 0)");
        // Slot 0 of the innermost frame is always the callee itself, here
        // the FREF builtin's own function object.
        assert!(matches!(v, Value::Iref(_)));
    }
}
