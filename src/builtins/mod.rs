// ABOUTME: The static built-in function table (core §4.8)
//
// The original registers each primitive in a fixed C array of `{name,
// function pointer, min arity, max arity, setter}` entries, walked once at
// startup to populate every symbol's function cell. `install` does the same
// walk here, just calling `def`/`def_setter` instead of indexing a static
// array literal, with one file per functional category the way the teacher
// lays its own `src/builtins/` directory out.

mod core_ops;
mod environment_ops;
mod io_ops;
mod list_ops;
mod numeric_ops;
mod process_ops;
mod string_ops;
mod symbol_ops;
mod vector_ops;

use crate::heap::{BuiltinData, BuiltinFn, FunctionData, IrefObject};
use crate::interp::Interp;
use crate::value::Value;

/// Registers every primitive this core provides into the `LISP` package,
/// called once from `Interp::boot` before any user form is read.
pub fn install(interp: &mut Interp) {
    core_ops::register(interp);
    list_ops::register(interp);
    numeric_ops::register(interp);
    vector_ops::register(interp);
    string_ops::register(interp);
    symbol_ops::register(interp);
    environment_ops::register(interp);
    io_ops::register(interp);
    process_ops::register(interp);
}

/// Installs `name` as an ordinary builtin with no SETF setter.
pub(super) fn def(interp: &mut Interp, name: &'static str, func: BuiltinFn, min_arity: i32, max_arity: i32) {
    def_setter(interp, name, func, min_arity, max_arity, None);
}

/// Installs `name` as a builtin, optionally recording a setter function the
/// way the original's table pairs an accessor with its mutator (CAR/RPLACA,
/// IREF/setf-IREF, JREF/setf-JREF). `_SETF` in `eval.rs` currently dispatches
/// these places directly rather than through this table, but the table still
/// carries the pairing for introspection and fidelity to the original shape.
pub(super) fn def_setter(
    interp: &mut Interp,
    name: &'static str,
    func: BuiltinFn,
    min_arity: i32,
    max_arity: i32,
    setter: Option<BuiltinFn>,
) {
    let data = BuiltinData { name, func, min_arity, max_arity, setter };
    let fn_value = interp.heap.make_iref(IrefObject::Function(FunctionData::Builtin(data)));
    let sym = interp.intern(name);
    if let IrefObject::Symbol(s) = interp.heap.irefs.get_mut(sym) {
        s.function = Some(fn_value);
    }
}

pub(super) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).copied().unwrap_or(Value::Nil)
}

pub(super) fn bool_value(interp: &Interp, b: bool) -> Value {
    if b {
        interp.t_value()
    } else {
        Value::Nil
    }
}

pub(super) fn as_fixnum(v: Value) -> Result<i64, crate::error::Signal> {
    match v {
        Value::Fixnum(n) => Ok(n),
        _ => Err(crate::error::Signal::runtime_error(format!("expected a fixnum, got {}", v.type_name()))),
    }
}

/// Widens a fixnum or boxed double to an `f64` for arithmetic and comparison
/// builtins, which work in `f64` throughout and narrow back on the way out.
pub(super) fn as_f64(interp: &Interp, v: Value) -> Result<f64, crate::error::Signal> {
    match v {
        Value::Fixnum(n) => Ok(n as f64),
        Value::Jref(i) => match interp.heap.jrefs.get(i) {
            crate::heap::JrefObject::Double(d) => Ok(*d),
            _ => Err(crate::error::Signal::runtime_error("expected a number")),
        },
        _ => Err(crate::error::Signal::runtime_error(format!("expected a number, got {}", v.type_name()))),
    }
}

/// Narrows an arithmetic result back to a fixnum when it's an exact integer
/// in range, boxing it as a double otherwise (the same narrowing the reader
/// applies to a numeric literal, §6).
pub(super) fn narrow(interp: &mut Interp, n: f64) -> Result<Value, crate::error::Signal> {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < i64::MAX as f64 {
        Ok(Value::Fixnum(n as i64))
    } else {
        interp.alloc_jref(crate::heap::JrefObject::Double(n))
    }
}

pub(super) fn string_arg(interp: &Interp, v: Value) -> Result<String, crate::error::Signal> {
    match v {
        Value::Jref(i) => match interp.heap.jrefs.get(i) {
            crate::heap::JrefObject::SimpleString(s) => Ok(s.clone()),
            _ => Err(crate::error::Signal::runtime_error("expected a string")),
        },
        _ => Err(crate::error::Signal::runtime_error(format!("expected a string, got {}", v.type_name()))),
    }
}
