// ABOUTME: Lambda-list argument binding (core §4.6)
//
// The original drives argument binding off a cons-encoded lambda list,
// switching sections on the `&OPTIONAL`/`&REST`/`&KEY`/... marker symbols
// as it walks it. That list is kept as data here too (on `ClosureData`,
// re-parsed per call) rather than pre-compiled, so `FUNCTION`/`LAMBDA-LIST`
// introspection sees the original form. Default-value forms are evaluated
// against the environment being built, section by section, so a later
// default can see an earlier parameter exactly as CL lambda lists allow.

use crate::env::{BindKind, LexEntry, LexEnvRef, LexFrame};
use crate::error::{Failure, Signal};
use crate::heap::Heap;
use crate::interp::Interp;
use crate::value::{HeapIndex, Value};
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Required,
    Optional,
    Rest,
    Key,
    Aux,
}

/// One parsed parameter spec. `Destructure` stands in for a nested
/// lambda-list pattern in parameter position.
enum Spec {
    Simple(HeapIndex),
    WithDefault(HeapIndex, Value, Option<HeapIndex>),
    Destructure(Value),
}

fn marker_name(heap: &Heap, v: Value) -> Option<String> {
    match v {
        Value::Iref(i) => {
            let name = crate::symbol::symbol_name(heap, i);
            if name.starts_with('&') {
                Some(name.to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Evaluates `lambda_list`/`args` against a fresh child frame of
/// `closure_env` (the closure's captured lexical environment, or the
/// calling environment for a non-closure such as a local FLET/LABELS
/// function). `caller_env` supplies the `&ENVIRONMENT` binding when
/// present. `eval_form` evaluates a default-value form in the
/// in-progress frame.
pub fn bind(
    interp: &mut Interp,
    lambda_list: Value,
    args: &[Value],
    closure_env: LexEnvRef,
    caller_env: &LexEnvRef,
    eval_form: &mut dyn FnMut(&mut Interp, Value, &LexEnvRef) -> Result<Value, Signal>,
) -> Result<LexEnvRef, Signal> {
    let mut entries: Vec<LexEntry> = Vec::new();
    let whole_sym = find_whole(interp, lambda_list);
    if let Some(name) = whole_sym {
        let list = interp.heap.vec_to_list(args);
        entries.push(LexEntry::Binding { kind: BindKind::Value, name, slot: RefCell::new(list) });
    }

    bind_into(interp, lambda_list, args, &closure_env, caller_env, &mut entries, eval_form)?;
    Ok(LexFrame::child(closure_env, entries))
}

fn find_whole(interp: &Interp, lambda_list: Value) -> Option<HeapIndex> {
    let specs = interp.heap.list_to_vec(lambda_list);
    let mut iter = specs.into_iter();
    while let Some(item) = iter.next() {
        if marker_name(&interp.heap, item).as_deref() == Some("&WHOLE") {
            if let Some(Value::Iref(name)) = iter.next() {
                return Some(name);
            }
        }
    }
    None
}

/// Walks the lambda list's sections, binding `args` into `entries`. Shared
/// by the top-level call and by destructured sub-patterns (which reuse the
/// same flat `entries` vec rather than opening a nested frame).
fn bind_into(
    interp: &mut Interp,
    lambda_list: Value,
    args: &[Value],
    scope_env: &LexEnvRef,
    caller_env: &LexEnvRef,
    entries: &mut Vec<LexEntry>,
    eval_form: &mut dyn FnMut(&mut Interp, Value, &LexEnvRef) -> Result<Value, Signal>,
) -> Result<(), Signal> {
    let raw_specs = interp.heap.list_to_vec(lambda_list);
    let mut section = Section::Required;
    let mut arg_idx = 0usize;
    let mut allow_other_keys = false;

    let mut i = 0;
    while i < raw_specs.len() {
        let item = raw_specs[i];
        i += 1;
        if let Some(marker) = marker_name(&interp.heap, item) {
            match marker.as_str() {
                "&OPTIONAL" => section = Section::Optional,
                "&REST" | "&BODY" => section = Section::Rest,
                "&KEY" => section = Section::Key,
                "&AUX" => section = Section::Aux,
                "&ALLOW-OTHER-KEYS" => allow_other_keys = true,
                "&WHOLE" => {
                    i += 1; // already consumed in find_whole
                }
                "&ENVIRONMENT" => {
                    // No Value variant represents a lexical environment, so
                    // an &ENVIRONMENT parameter has nothing to bind to; the
                    // caller_env is available to MACROLET expanders directly
                    // rather than through a value-cell lookup.
                    let _ = caller_env;
                    i += 1;
                }
                _ => {}
            }
            continue;
        }

        match section {
            Section::Required => {
                let actual = *args.get(arg_idx).ok_or(Failure::TooFewArguments)?;
                arg_idx += 1;
                bind_one_required(interp, item, actual, scope_env, caller_env, entries, eval_form)?;
            }
            Section::Optional => {
                let (name, default, supplied) = parse_optional_or_key_spec(&interp.heap, item);
                let (value, was_supplied) = if arg_idx < args.len() {
                    let v = args[arg_idx];
                    arg_idx += 1;
                    (v, true)
                } else {
                    let scope = LexFrame::child(scope_env.clone(), entries.clone());
                    let v = eval_form(interp, default, &scope)?;
                    (v, false)
                };
                entries.push(LexEntry::Binding { kind: BindKind::Value, name, slot: RefCell::new(value) });
                if let Some(sup) = supplied {
                    entries.push(LexEntry::Binding {
                        kind: BindKind::Value,
                        name: sup,
                        slot: RefCell::new(if was_supplied { interp.t_value() } else { Value::Nil }),
                    });
                }
            }
            Section::Rest => {
                if let Value::Iref(name) = item {
                    let rest = interp.heap.vec_to_list(&args[arg_idx.min(args.len())..]);
                    arg_idx = args.len();
                    entries.push(LexEntry::Binding { kind: BindKind::Value, name, slot: RefCell::new(rest) });
                }
            }
            Section::Key => {
                let (name, default, supplied) = parse_optional_or_key_spec(&interp.heap, item);
                let keyword_name = crate::symbol::symbol_name(&interp.heap, name).to_string();
                let mut found = None;
                let mut k = arg_idx;
                while k + 1 < args.len() {
                    if let Value::Iref(key_sym) = args[k] {
                        if crate::symbol::symbol_name(&interp.heap, key_sym) == keyword_name {
                            found = Some(args[k + 1]);
                            break;
                        }
                    }
                    k += 2;
                }
                let (value, was_supplied) = match found {
                    Some(v) => (v, true),
                    None => {
                        let scope = LexFrame::child(scope_env.clone(), entries.clone());
                        let v = eval_form(interp, default, &scope)?;
                        (v, false)
                    }
                };
                entries.push(LexEntry::Binding { kind: BindKind::Value, name, slot: RefCell::new(value) });
                if let Some(sup) = supplied {
                    entries.push(LexEntry::Binding {
                        kind: BindKind::Value,
                        name: sup,
                        slot: RefCell::new(if was_supplied { interp.t_value() } else { Value::Nil }),
                    });
                }
            }
            Section::Aux => {
                let (name, default, _) = parse_optional_or_key_spec(&interp.heap, item);
                let scope = LexFrame::child(scope_env.clone(), entries.clone());
                let v = eval_form(interp, default, &scope)?;
                entries.push(LexEntry::Binding { kind: BindKind::Value, name, slot: RefCell::new(v) });
            }
        }
    }

    if matches!(section, Section::Required | Section::Optional) && arg_idx < args.len() && !allow_other_keys {
        return Err(Failure::TooManyArguments.into());
    }

    Ok(())
}

fn parse_optional_or_key_spec(heap: &Heap, item: Value) -> (HeapIndex, Value, Option<HeapIndex>) {
    match item {
        Value::Iref(name) => (name, Value::Nil, None),
        Value::Cons(_) => {
            let parts = heap.list_to_vec(item);
            let name = match parts.first() {
                Some(Value::Iref(n)) => *n,
                _ => panic!("malformed lambda-list parameter"),
            };
            let default = parts.get(1).copied().unwrap_or(Value::Nil);
            let supplied = match parts.get(2) {
                Some(Value::Iref(s)) => Some(*s),
                _ => None,
            };
            (name, default, supplied)
        }
        _ => panic!("malformed lambda-list parameter"),
    }
}

fn bind_one_required(
    interp: &mut Interp,
    pattern: Value,
    actual: Value,
    scope_env: &LexEnvRef,
    caller_env: &LexEnvRef,
    entries: &mut Vec<LexEntry>,
    eval_form: &mut dyn FnMut(&mut Interp, Value, &LexEnvRef) -> Result<Value, Signal>,
) -> Result<(), Signal> {
    match pattern {
        Value::Iref(name) => {
            entries.push(LexEntry::Binding { kind: BindKind::Value, name, slot: RefCell::new(actual) });
            Ok(())
        }
        Value::Cons(_) => {
            // Destructuring: `actual` is itself treated as an argument list
            // bound against the nested pattern, flattened into the same
            // frame (§4.6: "handled recursively on the paired actual value").
            let sub_args = interp.heap.list_to_vec(actual);
            bind_into(interp, pattern, &sub_args, scope_env, caller_env, entries, eval_form)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Lookup;

    fn lit_list(interp: &mut Interp, syms: &[&str]) -> Value {
        let items: Vec<Value> = syms
            .iter()
            .map(|s| {
                if let Some(stripped) = s.strip_prefix('&') {
                    Value::Iref(interp.intern(&format!("&{}", stripped.to_uppercase())))
                } else {
                    Value::Iref(interp.intern(s))
                }
            })
            .collect();
        interp.heap.vec_to_list(&items)
    }

    fn noop_eval(_interp: &mut Interp, form: Value, _env: &LexEnvRef) -> Result<Value, Signal> {
        Ok(form)
    }

    #[test]
    fn required_params_bind_in_order() {
        let mut interp = Interp::boot(1 << 20);
        let ll = lit_list(&mut interp, &["X", "Y"]);
        let closure_env = LexFrame::root();
        let caller_env = closure_env.clone();
        let env = bind(
            &mut interp,
            ll,
            &[Value::Fixnum(1), Value::Fixnum(2)],
            closure_env,
            &caller_env,
            &mut noop_eval,
        )
        .unwrap();
        let x = interp.intern("X");
        match crate::env::lookup_lexical(&env, x, BindKind::Value) {
            Lookup::Binding(slot) => assert_eq!(*slot.borrow(), Value::Fixnum(1)),
            _ => panic!("expected X bound"),
        }
    }

    #[test]
    fn too_few_required_args_fails() {
        let mut interp = Interp::boot(1 << 20);
        let ll = lit_list(&mut interp, &["X", "Y"]);
        let closure_env = LexFrame::root();
        let caller_env = closure_env.clone();
        let err = bind(&mut interp, ll, &[Value::Fixnum(1)], closure_env, &caller_env, &mut noop_eval);
        assert!(matches!(
            err,
            Err(Signal::Unwind(crate::control::Unwind::Failure(Failure::TooFewArguments)))
        ));
    }

    #[test]
    fn too_many_args_with_no_rest_fails() {
        let mut interp = Interp::boot(1 << 20);
        let ll = lit_list(&mut interp, &["X"]);
        let closure_env = LexFrame::root();
        let caller_env = closure_env.clone();
        let err = bind(
            &mut interp,
            ll,
            &[Value::Fixnum(1), Value::Fixnum(2)],
            closure_env,
            &caller_env,
            &mut noop_eval,
        );
        assert!(matches!(
            err,
            Err(Signal::Unwind(crate::control::Unwind::Failure(Failure::TooManyArguments)))
        ));
    }

    #[test]
    fn rest_param_collects_remaining_actuals() {
        let mut interp = Interp::boot(1 << 20);
        let ll = lit_list(&mut interp, &["X", "&REST", "MORE"]);
        let closure_env = LexFrame::root();
        let caller_env = closure_env.clone();
        let env = bind(
            &mut interp,
            ll,
            &[Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)],
            closure_env,
            &caller_env,
            &mut noop_eval,
        )
        .unwrap();
        let more = interp.intern("MORE");
        match crate::env::lookup_lexical(&env, more, BindKind::Value) {
            Lookup::Binding(slot) => {
                let items = interp.heap.list_to_vec(*slot.borrow());
                assert_eq!(items, vec![Value::Fixnum(2), Value::Fixnum(3)]);
            }
            _ => panic!("expected MORE bound"),
        }
    }

    #[test]
    fn optional_missing_defaults_to_nil() {
        let mut interp = Interp::boot(1 << 20);
        let ll = lit_list(&mut interp, &["X", "&OPTIONAL", "Y"]);
        let closure_env = LexFrame::root();
        let caller_env = closure_env.clone();
        let env = bind(&mut interp, ll, &[Value::Fixnum(1)], closure_env, &caller_env, &mut noop_eval).unwrap();
        let y = interp.intern("Y");
        match crate::env::lookup_lexical(&env, y, BindKind::Value) {
            Lookup::Binding(slot) => assert_eq!(*slot.borrow(), Value::Nil),
            _ => panic!("expected Y bound"),
        }
    }
}
