// ABOUTME: Uninterned-symbol generation and the string hash primitive (core §4.8, §4.4)

use super::{def, string_arg};
use crate::error::Signal;
use crate::heap::{IrefObject, SymbolData};
use crate::interp::Interp;
use crate::value::Value;

pub(super) fn register(interp: &mut Interp) {
    def(interp, "GENSYM", gensym, 0, 0);
    def(interp, "HASH", hash, 1, 1);
}

/// `(gensym)`: a fresh, uninterned symbol named `G<n>`. Unlike `INTERN`, this
/// never goes through a package's hash chains, so it can never collide with
/// (or be found by) an ordinary `READ`.
fn gensym(interp: &mut Interp, _args: &[Value]) -> Result<Value, Signal> {
    let n = interp.gensym_counter;
    interp.gensym_counter += 1;
    interp.alloc_iref(IrefObject::Symbol(SymbolData::new(format!("G{n}"))))
}

/// `(hash x)`: the same hash the package symbol tables bucket on (§4.4),
/// exposed so Lisp code can build its own hash-based structures over it.
fn hash(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let text = match args[0] {
        Value::Iref(i) if matches!(interp.heap.irefs.get(i), IrefObject::Symbol(_)) => {
            crate::symbol::symbol_name(&interp.heap, i).to_string()
        }
        _ => string_arg(interp, args[0])?,
    };
    Ok(Value::Fixnum(crate::symbol::hash(&text) as i64))
}
