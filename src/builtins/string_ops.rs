// ABOUTME: String construction, char-indexed access, and comparison (core §4.8)
//
// `JREF`/`setf-JREF` index by character, not byte, unlike the original's raw
// buffer offsets: UTF-8 means a byte offset can land inside a multi-byte
// character's encoding, which a safe string type has no way to represent.

use super::{arg, as_fixnum, bool_value, def, def_setter, string_arg};
use crate::error::{Failure, Signal};
use crate::heap::{IrefObject, JrefObject};
use crate::interp::Interp;
use crate::value::Value;

pub(super) fn register(interp: &mut Interp) {
    def(interp, "STRING", string_builtin, 0, -1);
    def(interp, "MAKE-STRING", make_string, 1, 2);
    def(interp, "MAKEJ", make_string, 1, 2);
    def_setter(interp, "JREF", jref, 2, 2, Some(setf_jref));
    def(interp, "STRING=", string_equal, 2, 2);
}

/// `(string x)`: coerces a symbol, character, or string to a (fresh) string.
/// With more than one argument, concatenates a list of characters, the
/// original's degenerate variadic shape for `STRING`.
fn string_builtin(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    if args.len() == 1 {
        match args[0] {
            Value::Char(c) => return interp.alloc_jref(JrefObject::SimpleString(c.to_string())),
            Value::Jref(i) => {
                if let JrefObject::SimpleString(s) = interp.heap.jrefs.get(i) {
                    let s = s.clone();
                    return interp.alloc_jref(JrefObject::SimpleString(s));
                }
            }
            Value::Iref(i) => {
                if matches!(interp.heap.irefs.get(i), IrefObject::Symbol(_)) {
                    let name = crate::symbol::symbol_name(&interp.heap, i).to_string();
                    return interp.alloc_jref(JrefObject::SimpleString(name));
                }
            }
            _ => {}
        }
        return Err(Signal::runtime_error("STRING: cannot coerce argument to a string"));
    }
    let mut s = String::new();
    for a in args {
        match a {
            Value::Char(c) => s.push(*c),
            _ => return Err(Signal::runtime_error("STRING: expected a character")),
        }
    }
    interp.alloc_jref(JrefObject::SimpleString(s))
}

fn make_string(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let len = as_fixnum(arg(args, 0))?.max(0) as usize;
    let ch = match args.get(1) {
        Some(Value::Char(c)) => *c,
        _ => ' ',
    };
    interp.alloc_jref(JrefObject::SimpleString(ch.to_string().repeat(len)))
}

fn jref(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let idx = as_fixnum(arg(args, 1))?;
    match arg(args, 0) {
        Value::Jref(i) => match interp.heap.jrefs.get(i) {
            JrefObject::SimpleString(s) => {
                if idx < 0 {
                    return Err(Failure::IndexOutOfBounds(arg(args, 1)).into());
                }
                s.chars()
                    .nth(idx as usize)
                    .map(Value::Char)
                    .ok_or_else(|| Failure::IndexOutOfBounds(arg(args, 1)).into())
            }
            _ => Err(Signal::runtime_error("JREF expects a string")),
        },
        _ => Err(Signal::runtime_error("JREF expects a string")),
    }
}

fn setf_jref(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let idx = as_fixnum(arg(args, 1))?;
    let value = arg(args, 2);
    let ch = match value {
        Value::Char(c) => c,
        _ => return Err(Signal::runtime_error("(SETF JREF) expects a character value")),
    };
    match arg(args, 0) {
        Value::Jref(i) => match interp.heap.jrefs.get_mut(i) {
            JrefObject::SimpleString(s) => {
                let mut chars: Vec<char> = s.chars().collect();
                if idx < 0 || idx as usize >= chars.len() {
                    return Err(Failure::IndexOutOfBounds(arg(args, 1)).into());
                }
                chars[idx as usize] = ch;
                *s = chars.into_iter().collect();
                Ok(value)
            }
            _ => Err(Signal::runtime_error("JREF expects a string")),
        },
        _ => Err(Signal::runtime_error("JREF expects a string")),
    }
}

fn string_equal(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let a = string_arg(interp, arg(args, 0))?;
    let b = string_arg(interp, arg(args, 1))?;
    Ok(bool_value(interp, a == b))
}
