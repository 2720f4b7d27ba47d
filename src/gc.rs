// ABOUTME: Stop-the-world mark-sweep collector (core §4.2)
//
// The original marks from a handful of fixed roots (the register file, the
// explicit stack, the package list) and sweeps every arena's free list back
// into shape in one pass. Roots here are the same four sources generalized
// to this design's types: the explicit `Stack`, the `DynamicEnv` record
// list, the package registry, and the lexical environment chains captured
// by every live closure. Cyclic cons/vector/package structures are handled
// by `Arena::mark` returning `false` on a value already marked this cycle,
// exactly as the original's mark bit stops it from re-walking a cycle.

use crate::heap::{FunctionData, Heap, IrefObject, JrefObject};
use crate::interp::Interp;
use crate::value::{HeapIndex, Value};

/// Runs one full mark-sweep cycle over `interp`'s heap, rooted at the stack,
/// dynamic environment, package registry, global environment, and current
/// package/keyword-package cells. Returns the number of (cons, iref, jref)
/// slots reclaimed, mostly useful for diagnostics and tests.
pub fn collect(interp: &mut Interp) -> (usize, usize, usize) {
    let mut roots: Vec<Value> = Vec::new();

    interp.stack.for_each_root(|v| roots.push(v));
    interp.dynamic.for_each_root(|v| roots.push(v));
    for &pkg in &interp.packages {
        roots.push(Value::Iref(pkg));
    }
    roots.push(Value::Iref(interp.current_package));
    roots.push(Value::Iref(interp.keyword_package));
    for &v in &interp.last_values {
        roots.push(v);
    }

    for v in roots {
        mark_value(&mut interp.heap, v);
    }
    mark_env_chain(&mut interp.heap, interp.global_env.clone());

    let freed_conses = interp.heap.conses.sweep();
    let freed_irefs = interp.heap.irefs.sweep();
    let freed_jrefs = interp.heap.jrefs.sweep();
    (freed_conses, freed_irefs, freed_jrefs)
}

fn mark_value(heap: &mut Heap, v: Value) {
    match v {
        Value::Nil | Value::Fixnum(_) | Value::Char(_) => {}
        Value::Cons(i) => {
            if heap.conses.mark(i) {
                let cell = *heap.conses.get(i);
                mark_value(heap, cell.car);
                mark_value(heap, cell.cdr);
            }
        }
        Value::Iref(i) => mark_iref(heap, i),
        Value::Jref(i) => {
            heap.jrefs.mark(i);
        }
    }
}

/// What an iref's children look like, extracted via an immutable borrow and
/// cloned (cheap: `Value`s are `Copy`, the vectors are small) so the borrow
/// can be dropped before recursing with `&mut Heap`.
enum Recurse {
    Values(Vec<Value>),
    /// A closure: its captured lexical chain is walked separately, since
    /// `LexFrame` isn't itself heap-arena data.
    ValuesAndEnv(Vec<Value>, crate::env::LexEnvRef),
    None,
}

fn mark_iref(heap: &mut Heap, idx: HeapIndex) {
    if !heap.irefs.mark(idx) {
        return;
    }

    let recurse = match heap.irefs.get(idx) {
        IrefObject::Symbol(s) => {
            let mut vs = vec![s.plist];
            vs.extend(s.value);
            vs.extend(s.function);
            vs.extend(s.macro_function);
            vs.extend(s.symbol_macro);
            Recurse::Values(vs)
        }
        IrefObject::SimpleVector(items) => Recurse::Values(items.clone()),
        IrefObject::Package(p) => {
            let mut vs = Vec::new();
            for chain in p.external.iter().chain(p.internal.iter()) {
                for &sym in chain {
                    vs.push(Value::Iref(sym));
                }
            }
            for &used in &p.use_list {
                vs.push(Value::Iref(used));
            }
            Recurse::Values(vs)
        }
        IrefObject::Function(FunctionData::Builtin(_)) => Recurse::None,
        IrefObject::Function(FunctionData::Closure(c)) => {
            Recurse::ValuesAndEnv(vec![c.lambda_list, c.body], c.env.clone())
        }
        IrefObject::Structure(s) => Recurse::Values(s.slots.clone()),
    };

    match recurse {
        Recurse::Values(vs) => {
            for v in vs {
                mark_value(heap, v);
            }
        }
        Recurse::ValuesAndEnv(vs, env) => {
            for v in vs {
                mark_value(heap, v);
            }
            mark_env_chain(heap, env);
        }
        Recurse::None => {}
    }
}

/// Marks every value reachable from a lexical environment chain: binding
/// slots, macro expanders, symbol-macro expansions, and go-tags. Shared
/// ancestor frames reachable from several closures get re-marked once per
/// closure; harmless since `LexFrame` chains are acyclic (only child-to-
/// parent `Rc` links exist), just not maximally efficient.
fn mark_env_chain(heap: &mut Heap, env: crate::env::LexEnvRef) {
    use crate::env::LexEntry;

    let mut frame = Some(env);
    while let Some(f) = frame {
        for entry in &f.entries {
            match entry {
                LexEntry::Binding { slot, .. } => mark_value(heap, *slot.borrow()),
                LexEntry::MacroBinding { expander, .. } => mark_value(heap, *expander),
                LexEntry::SymbolMacroBinding { expansion, .. } => mark_value(heap, *expansion),
                LexEntry::GoTag { tag, .. } => mark_value(heap, *tag),
                LexEntry::BlockName { .. } => {}
            }
        }
        frame = f.parent.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Interp;

    #[test]
    fn unreachable_cons_is_collected() {
        let mut interp = Interp::boot(1 << 20);
        let garbage = interp.heap.cons(Value::Fixnum(1), Value::Nil);
        drop(garbage);
        let before = interp.heap.conses.live_count();
        let (freed_conses, _, _) = collect(&mut interp);
        assert!(freed_conses >= 1);
        assert!(interp.heap.conses.live_count() < before);
    }

    #[test]
    fn stack_rooted_cons_survives_collection() {
        let mut interp = Interp::boot(1 << 20);
        let kept = interp.heap.cons(Value::Fixnum(42), Value::Nil);
        interp.stack.push(kept);
        collect(&mut interp);
        assert_eq!(interp.heap.car(kept), Value::Fixnum(42));
    }

    #[test]
    fn mark_bits_are_clear_after_collection() {
        let mut interp = Interp::boot(1 << 20);
        interp.heap.cons(Value::Fixnum(1), Value::Nil);
        collect(&mut interp);
        assert!(interp.heap.conses.all_mark_bits_clear());
        assert!(interp.heap.irefs.all_mark_bits_clear());
        assert!(interp.heap.jrefs.all_mark_bits_clear());
    }

    #[test]
    fn cyclic_cons_does_not_infinite_loop() {
        let mut interp = Interp::boot(1 << 20);
        let a = interp.heap.cons(Value::Fixnum(1), Value::Nil);
        interp.heap.set_cdr(a, a);
        interp.stack.push(a);
        collect(&mut interp);
        assert_eq!(interp.heap.car(a), Value::Fixnum(1));
    }
}
