// ABOUTME: The printer: `Value` back to text (core §6, §8)
//
// The original's `lwrite` walks a tagged word the same way `lread` builds
// one, recursing through cons cells and switching on the pointer's low-bit
// tag for atoms. This mirrors that shape over the arena-indexed `Value`,
// needing `&Heap` (not `&Interp`) since printing never allocates.

use crate::heap::{Heap, IrefObject, JrefObject};
use crate::value::Value;
use std::fmt::Write as _;

/// Prints `v` the way the reader would need to read it back, round-tripping
/// under `equal` for every value the reader can produce (§8) except a float
/// whose decimal rendering loses precision relative to its `%g` neighbor.
pub fn print_value(heap: &Heap, v: Value) -> String {
    let mut out = String::new();
    write_value(heap, v, &mut out);
    out
}

fn write_value(heap: &Heap, v: Value, out: &mut String) {
    match v {
        Value::Nil => out.push_str("NIL"),
        Value::Fixnum(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Char(c) => {
            let _ = write!(out, "#\\{}", char_name(c));
        }
        Value::Cons(_) => write_list(heap, v, out),
        Value::Iref(i) => write_iref(heap, i, out),
        Value::Jref(i) => write_jref(heap, i, out),
    }
}

fn char_name(c: char) -> String {
    match c {
        ' ' => "SPACE".to_string(),
        '\n' => "NEWLINE".to_string(),
        '\t' => "TAB".to_string(),
        _ => c.to_string(),
    }
}

fn write_list(heap: &Heap, mut v: Value, out: &mut String) {
    out.push('(');
    let mut first = true;
    loop {
        match v {
            Value::Cons(i) => {
                if !first {
                    out.push(' ');
                }
                first = false;
                let cell = heap.conses.get(i);
                write_value(heap, cell.car, out);
                v = cell.cdr;
            }
            Value::Nil => break,
            other => {
                out.push_str(" . ");
                write_value(heap, other, out);
                break;
            }
        }
    }
    out.push(')');
}

/// Whether `data`'s home package is the keyword package, so the reader's
/// `:NAME` syntax round-trips a keyword back to the same symbol rather than
/// interning a same-named symbol into whatever package happens to be current
/// at read time.
fn is_keyword_symbol(heap: &Heap, data: &crate::heap::SymbolData) -> bool {
    match data.package {
        Some(pkg) => matches!(heap.irefs.get(pkg), IrefObject::Package(p) if p.name == "KEYWORD"),
        None => false,
    }
}

fn write_iref(heap: &Heap, i: usize, out: &mut String) {
    match heap.irefs.get(i) {
        IrefObject::Symbol(data) => {
            if is_keyword_symbol(heap, data) {
                out.push(':');
            }
            out.push_str(&data.name);
        }
        IrefObject::SimpleVector(items) => {
            out.push_str("#(");
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(' ');
                }
                write_value(heap, *item, out);
            }
            out.push(')');
        }
        IrefObject::Package(data) => {
            let _ = write!(out, "#<PACKAGE {}>", data.name);
        }
        IrefObject::Function(func) => {
            let name = match func {
                crate::heap::FunctionData::Builtin(b) => b.name.to_string(),
                crate::heap::FunctionData::Closure(c) => {
                    c.name.clone().unwrap_or_else(|| "LAMBDA".to_string())
                }
            };
            let _ = write!(out, "#<FUNCTION {name}>");
        }
        IrefObject::Structure(data) => {
            let _ = write!(out, "#<{}", data.type_name);
            for (name, slot) in data.slot_names.iter().zip(data.slots.iter()) {
                out.push(' ');
                let _ = write!(out, ":{name} ");
                write_value(heap, *slot, out);
            }
            out.push('>');
        }
    }
}

fn write_jref(heap: &Heap, i: usize, out: &mut String) {
    match heap.jrefs.get(i) {
        JrefObject::SimpleString(s) => {
            out.push('"');
            for c in s.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
        JrefObject::Double(d) => {
            if d.fract() == 0.0 && d.is_finite() {
                let _ = write!(out, "{d}.0");
            } else {
                let _ = write!(out, "{d}");
            }
        }
        JrefObject::BitVector(bits) => {
            out.push_str("#*");
            for b in bits {
                out.push(if *b { '1' } else { '0' });
            }
        }
        JrefObject::FileStream(data) => {
            let _ = write!(out, "#<FILE-STREAM {}>", data.path);
        }
        JrefObject::StandardStream(kind) => {
            let _ = write!(out, "#<STANDARD-STREAM {kind:?}>");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Interp;

    #[test]
    fn prints_nil_and_fixnums() {
        let interp = Interp::boot(1 << 20);
        assert_eq!(print_value(&interp.heap, Value::Nil), "NIL");
        assert_eq!(print_value(&interp.heap, Value::Fixnum(-5)), "-5");
    }

    #[test]
    fn prints_a_list_with_a_dotted_tail() {
        let mut interp = Interp::boot(1 << 20);
        let tail = interp.heap.cons(Value::Fixnum(2), Value::Fixnum(3));
        let v = interp.heap.cons(Value::Fixnum(1), tail);
        assert_eq!(print_value(&interp.heap, v), "(1 2 . 3)");
    }

    #[test]
    fn prints_a_proper_list() {
        let mut interp = Interp::boot(1 << 20);
        let v = interp.heap.vec_to_list(&[Value::Fixnum(1), Value::Fixnum(2)]);
        assert_eq!(print_value(&interp.heap, v), "(1 2)");
    }

    #[test]
    fn prints_a_symbol_by_its_upcased_name() {
        let mut interp = Interp::boot(1 << 20);
        let sym = interp.intern("FOO");
        assert_eq!(print_value(&interp.heap, Value::Iref(sym)), "FOO");
    }

    #[test]
    fn prints_a_keyword_with_its_colon_prefix() {
        let mut interp = Interp::boot(1 << 20);
        let kw = interp.intern_keyword("FOO");
        assert_eq!(print_value(&interp.heap, Value::Iref(kw)), ":FOO");
    }

    #[test]
    fn prints_a_string_with_escapes() {
        let mut interp = Interp::boot(1 << 20);
        let v = interp
            .alloc_jref(crate::heap::JrefObject::SimpleString("a\"b".to_string()))
            .unwrap();
        assert_eq!(print_value(&interp.heap, v), r#""a\"b""#);
    }

    #[test]
    fn print_then_read_round_trips_a_list() {
        let mut interp = Interp::boot(1 << 20);
        let v = interp.heap.vec_to_list(&[Value::Fixnum(1), Value::Fixnum(2), Value::Nil]);
        let text = print_value(&interp.heap, v);
        let read_back = crate::reader::read_one(&mut interp, &text).unwrap();
        assert_eq!(print_value(&interp.heap, read_back), text);
    }
}
