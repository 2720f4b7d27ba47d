// ABOUTME: Lexical and dynamic binding lookup (core §4.5)
//
// The original environment is a list of (key, info) pairs layered on a call
// frame's environment slot, where the key's shape distinguishes value,
// function, go-tag, block-name, symbol-macro, and macrolet bindings. Here
// that list becomes an `Rc`-linked chain of frames (as the teacher's
// `Environment` chains `Rc<Environment>` parents), generalized to carry a
// `BindKind` tag per entry instead of assuming every binding is a value cell.

use crate::control::MarkerId;
use crate::heap::IrefObject;
use crate::value::{HeapIndex, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub type LexEnvRef = Rc<LexFrame>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    Value,
    Function,
    GoTag,
    BlockName,
}

#[derive(Debug, Clone)]
pub enum LexEntry {
    /// Ordinary lexical value or function binding. `name` is the symbol's
    /// heap index; `slot` holds the current value so `SETQ`/closures can
    /// mutate it in place.
    Binding {
        kind: BindKind,
        name: HeapIndex,
        slot: RefCell<Value>,
    },
    /// A local macro (MACROLET) or symbol-macro (SYMBOL-MACROLET): expansion
    /// is looked up, not evaluated as a value.
    MacroBinding { name: HeapIndex, expander: Value },
    SymbolMacroBinding { name: HeapIndex, expansion: Value },
    /// Established by TAGBODY/BLOCK/CATCH at entry; `marker` identifies the
    /// matching dynamic-list record (`control.rs`) that GO/RETURN-FROM must
    /// unwind to.
    GoTag { tag: Value, marker: MarkerId },
    BlockName { name: HeapIndex, marker: MarkerId },
}

#[derive(Debug)]
pub struct LexFrame {
    pub parent: Option<LexEnvRef>,
    pub entries: Vec<LexEntry>,
}

impl LexFrame {
    pub fn root() -> LexEnvRef {
        Rc::new(LexFrame {
            parent: None,
            entries: Vec::new(),
        })
    }

    pub fn child(parent: LexEnvRef, entries: Vec<LexEntry>) -> LexEnvRef {
        Rc::new(LexFrame { parent: Some(parent), entries })
    }

    pub fn child_empty(parent: LexEnvRef) -> LexEnvRef {
        Self::child(parent, Vec::new())
    }
}

/// Outcome of a lexical lookup: either a lexical value slot, a local macro or
/// symbol-macro expansion, a go-tag/block-name marker, or "not found here",
/// which sends the caller to the symbol's global cell (value/function) or to
/// a failure (go-tag/block-name/catch).
pub enum Lookup<'a> {
    Binding(&'a RefCell<Value>),
    Macro(Value),
    SymbolMacro(Value),
    GoTag(MarkerId),
    BlockName(MarkerId),
    NotFound,
}

/// Walks `env` outward looking for `name`/`kind`. Lexical scoping means the
/// first (innermost) match wins; nothing here ever consults the symbol's
/// global cell — that fallback is the caller's job (§4.5).
pub fn lookup_lexical<'a>(env: &'a LexEnvRef, name: HeapIndex, kind: BindKind) -> Lookup<'a> {
    let mut frame = env;
    loop {
        for entry in frame.entries.iter().rev() {
            match entry {
                LexEntry::Binding { kind: k, name: n, slot } if *k == kind && *n == name => {
                    return Lookup::Binding(slot);
                }
                LexEntry::MacroBinding { name: n, expander } if kind == BindKind::Function && *n == name => {
                    return Lookup::Macro(*expander);
                }
                LexEntry::SymbolMacroBinding { name: n, expansion } if kind == BindKind::Value && *n == name => {
                    return Lookup::SymbolMacro(*expansion);
                }
                LexEntry::BlockName { name: n, marker } if kind == BindKind::BlockName && *n == name => {
                    return Lookup::BlockName(*marker);
                }
                _ => {}
            }
        }
        match &frame.parent {
            Some(p) => frame = p,
            None => return Lookup::NotFound,
        }
    }
}

/// GO tags are looked up by their literal tag value (a symbol or integer),
/// not by binding name, since TAGBODY allows both kinds of tag.
pub fn lookup_go_tag(env: &LexEnvRef, tag: Value, heap: &crate::heap::Heap) -> Option<MarkerId> {
    let mut frame = env;
    loop {
        for entry in frame.entries.iter().rev() {
            if let LexEntry::GoTag { tag: t, marker } = entry {
                if tags_eq(*t, tag, heap) {
                    return Some(*marker);
                }
            }
        }
        match &frame.parent {
            Some(p) => frame = p,
            None => return None,
        }
    }
}

pub fn tags_eq(a: Value, b: Value, heap: &crate::heap::Heap) -> bool {
    match (a, b) {
        (Value::Fixnum(x), Value::Fixnum(y)) => x == y,
        (Value::Iref(x), Value::Iref(y)) => {
            matches!(
                (heap.irefs.get(x), heap.irefs.get(y)),
                (IrefObject::Symbol(_), IrefObject::Symbol(_))
            ) && x == y
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn shadowing_finds_innermost_binding() {
        let root = LexFrame::root();
        let outer = LexFrame::child(
            root,
            vec![LexEntry::Binding {
                kind: BindKind::Value,
                name: 1,
                slot: RefCell::new(Value::Fixnum(10)),
            }],
        );
        let inner = LexFrame::child(
            outer,
            vec![LexEntry::Binding {
                kind: BindKind::Value,
                name: 1,
                slot: RefCell::new(Value::Fixnum(20)),
            }],
        );

        match lookup_lexical(&inner, 1, BindKind::Value) {
            Lookup::Binding(slot) => assert_eq!(*slot.borrow(), Value::Fixnum(20)),
            _ => panic!("expected a binding"),
        }
    }

    #[test]
    fn parent_lookup_falls_through() {
        let root = LexFrame::root();
        let outer = LexFrame::child(
            root,
            vec![LexEntry::Binding {
                kind: BindKind::Value,
                name: 1,
                slot: RefCell::new(Value::Fixnum(42)),
            }],
        );
        let inner = LexFrame::child_empty(outer);
        match lookup_lexical(&inner, 1, BindKind::Value) {
            Lookup::Binding(slot) => assert_eq!(*slot.borrow(), Value::Fixnum(42)),
            _ => panic!("expected a binding"),
        }
    }

    #[test]
    fn missing_binding_is_not_found() {
        let root = LexFrame::root();
        match lookup_lexical(&root, 99, BindKind::Value) {
            Lookup::NotFound => {}
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn go_tags_match_by_symbol_identity() {
        let heap = Heap::new(1 << 20);
        let root = LexFrame::root();
        let env = LexFrame::child(
            root,
            vec![LexEntry::GoTag {
                tag: Value::Fixnum(7),
                marker: 3,
            }],
        );
        assert_eq!(lookup_go_tag(&env, Value::Fixnum(7), &heap), Some(3));
        assert_eq!(lookup_go_tag(&env, Value::Fixnum(8), &heap), None);
    }
}
