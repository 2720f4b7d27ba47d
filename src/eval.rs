// ABOUTME: The evaluator and the 22 special operators (core §4.7)
//
// The original's `eval` is one C switch over a special-operator index found
// on the head symbol's property, falling through to macro-expansion and
// then ordinary application. Here the same shape is a Rust match over the
// head symbol's name, because a Rust enum makes a poor substitute for the
// original's packed-index dispatch but a `match` on an upcased `&str`
// reads the same way the original's switch does. Non-local exits
// (GO/RETURN-FROM/THROW) are modeled as `Unwind` variants threaded through
// `Result`, per the redesign invited by Design Notes §9; the dynamic list
// unwinding they imply is centralized in `unwind_effects_to`, below, so
// every construct that pushes a dynamic record gets its effect run exactly
// once, whichever path takes it out of scope.

use crate::control::{DynRecord, Unwind};
use crate::env::{BindKind, LexEntry, LexEnvRef, LexFrame, Lookup};
use crate::error::{Failure, Signal};
use crate::heap::{ClosureData, FunctionData, Heap, IrefObject, JrefObject};
use crate::interp::Interp;
use crate::value::{HeapIndex, Value};
use std::cell::RefCell;

/// Evaluates `form` in `env`, updating `interp.last_values` to reflect this
/// call's full value list (§4.7's "multiple values" register).
pub fn eval(interp: &mut Interp, form: Value, env: &LexEnvRef) -> Result<Value, Signal> {
    match form {
        Value::Nil | Value::Fixnum(_) | Value::Char(_) | Value::Jref(_) => single(interp, form),
        Value::Iref(i) => {
            if matches!(interp.heap.irefs.get(i), IrefObject::Symbol(_)) {
                eval_symbol(interp, i, env)
            } else {
                single(interp, form)
            }
        }
        Value::Cons(i) => {
            let cell = *interp.heap.conses.get(i);
            eval_pair(interp, cell.car, cell.cdr, env)
        }
    }
}

fn single(interp: &mut Interp, v: Value) -> Result<Value, Signal> {
    interp.last_values = vec![v];
    Ok(v)
}

fn eval_symbol(interp: &mut Interp, sym: HeapIndex, env: &LexEnvRef) -> Result<Value, Signal> {
    match crate::env::lookup_lexical(env, sym, BindKind::Value) {
        Lookup::Binding(slot) => single(interp, *slot.borrow()),
        Lookup::SymbolMacro(expansion) => eval(interp, expansion, env),
        Lookup::NotFound => match interp.heap.irefs.get(sym) {
            IrefObject::Symbol(s) => match s.value {
                Some(v) => single(interp, v),
                None => Err(Failure::VariableUnbound(Value::Iref(sym)).into()),
            },
            _ => unreachable!("symbol lookup on a non-symbol iref"),
        },
        _ => unreachable!("value lookup never returns a function-kind result"),
    }
}

/// Dispatches a pair `(head . args)`: a special operator, a macro call, or
/// an ordinary application.
fn eval_pair(interp: &mut Interp, head: Value, args_list: Value, env: &LexEnvRef) -> Result<Value, Signal> {
    if let Value::Iref(head_sym) = head {
        if matches!(interp.heap.irefs.get(head_sym), IrefObject::Symbol(_)) {
            let name = crate::symbol::symbol_name(&interp.heap, head_sym).to_string();
            if let Some(result) = dispatch_special(interp, &name, args_list, env)? {
                return Ok(result);
            }
            return eval_call_by_symbol(interp, head_sym, args_list, env);
        }
    }
    // Head is not a bare symbol: the only other legal form is a literal
    // lambda expression called in place, `((LAMBDA (...) ...) args...)`.
    let operator = eval_operator_literal(interp, head, env)?;
    let args = eval_args(interp, args_list, env)?;
    apply(interp, operator, &args, env)
}

fn eval_operator_literal(interp: &mut Interp, head: Value, env: &LexEnvRef) -> Result<Value, Signal> {
    if let Value::Cons(_) = head {
        let parts = interp.heap.list_to_vec(head);
        if let Some(Value::Iref(s)) = parts.first() {
            if crate::symbol::symbol_name(&interp.heap, *s) == "LAMBDA" {
                let lambda_list = parts.get(1).copied().unwrap_or(Value::Nil);
                let body = interp.heap.vec_to_list(&parts[2.min(parts.len())..]);
                let closure = ClosureData { lambda_list, body, env: env.clone(), name: None };
                return interp.alloc_iref(IrefObject::Function(FunctionData::Closure(closure)));
            }
        }
    }
    Err(Signal::runtime_error("head of a call must be a symbol or a LAMBDA expression"))
}

/// Returns `Some(value)` if `name` names one of the 22 special operators
/// (handled here); `None` means the caller should fall through to macro
/// expansion / ordinary application.
fn dispatch_special(
    interp: &mut Interp,
    name: &str,
    args_list: Value,
    env: &LexEnvRef,
) -> Result<Option<Value>, Signal> {
    let args = interp.heap.list_to_vec(args_list);
    let result = match name {
        "QUOTE" => single(interp, args.first().copied().unwrap_or(Value::Nil)),
        "IF" => eval_if(interp, &args, env),
        "PROGN" => eval_body(interp, &args, env),
        "LET" => eval_let(interp, &args, env, false),
        "LET*" => eval_let(interp, &args, env, true),
        "FLET" => eval_flet(interp, &args, env, false),
        "LABELS" => eval_flet(interp, &args, env, true),
        "MACROLET" => eval_macrolet(interp, &args, env),
        "SYMBOL-MACROLET" => eval_symbol_macrolet(interp, &args, env),
        "SETQ" => eval_setq(interp, &args, env),
        "FUNCTION" => eval_function(interp, &args, env),
        "TAGBODY" => eval_tagbody(interp, &args, env),
        "GO" => eval_go(interp, &args, env),
        "BLOCK" => eval_block(interp, &args, env),
        "RETURN-FROM" => eval_return_from(interp, &args, env),
        "CATCH" => eval_catch(interp, &args, env),
        "THROW" => eval_throw(interp, &args, env),
        "UNWIND-PROTECT" => eval_unwind_protect(interp, &args, env),
        "MULTIPLE-VALUE-CALL" => eval_multiple_value_call(interp, &args, env),
        "MULTIPLE-VALUE-PROG1" => eval_multiple_value_prog1(interp, &args, env),
        "PROGV" => eval_progv(interp, &args, env),
        "DECLARE" => single(interp, Value::Nil),
        "_SETF" => eval_setf(interp, &args, env),
        _ => return Ok(None),
    };
    result.map(Some)
}

/// Evaluates a PROGN-style body: each form in sequence, yielding the last
/// (NIL for an empty body).
pub fn eval_body(interp: &mut Interp, forms: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let mut result = Value::Nil;
    if forms.is_empty() {
        return single(interp, result);
    }
    for form in forms {
        result = eval(interp, *form, env)?;
    }
    Ok(result)
}

/// Evaluates each argument form in turn, pushing every result onto
/// `interp.stack` as soon as it's computed so a collection triggered by a
/// later argument's allocation can't reclaim an earlier one before it's
/// installed into the call frame (§4.3's rooting contract).
fn eval_args(interp: &mut Interp, args_list: Value, env: &LexEnvRef) -> Result<Vec<Value>, Signal> {
    let forms = interp.heap.list_to_vec(args_list);
    let base = interp.stack.len();
    let mut out = Vec::with_capacity(forms.len());
    for form in forms {
        let v = match eval(interp, form, env) {
            Ok(v) => v,
            Err(e) => {
                interp.stack.truncate(base);
                return Err(e);
            }
        };
        interp.stack.push(v);
        out.push(v);
    }
    interp.stack.truncate(base);
    Ok(out)
}

fn eval_if(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let test = eval(interp, *args.first().unwrap_or(&Value::Nil), env)?;
    if test.is_truthy() {
        eval(interp, *args.get(1).unwrap_or(&Value::Nil), env)
    } else {
        match args.get(2) {
            Some(form) => eval(interp, *form, env),
            None => single(interp, Value::Nil),
        }
    }
}

/// Leading `(DECLARE (SPECIAL sym ...) ...)` forms at the head of a body,
/// consulted by LET/LET* to decide which bindings are dynamic (§4.5).
fn declared_specials(heap: &Heap, body: &[Value]) -> Vec<HeapIndex> {
    let mut specials = Vec::new();
    for form in body {
        let parts = heap.list_to_vec(*form);
        match parts.first() {
            Some(Value::Iref(s)) if crate::symbol::symbol_name(heap, *s) == "DECLARE" => {
                for decl in &parts[1..] {
                    let decl_parts = heap.list_to_vec(*decl);
                    if let Some(Value::Iref(k)) = decl_parts.first() {
                        if crate::symbol::symbol_name(heap, *k) == "SPECIAL" {
                            for sym in &decl_parts[1..] {
                                if let Value::Iref(name) = sym {
                                    specials.push(*name);
                                }
                            }
                        }
                    }
                }
            }
            _ => break,
        }
    }
    specials
}

fn skip_declares(heap: &Heap, body: &[Value]) -> usize {
    let mut i = 0;
    while i < body.len() {
        let parts = heap.list_to_vec(body[i]);
        match parts.first() {
            Some(Value::Iref(s)) if crate::symbol::symbol_name(heap, *s) == "DECLARE" => i += 1,
            _ => break,
        }
    }
    i
}

fn is_special_symbol(heap: &Heap, sym: HeapIndex, locally_special: &[HeapIndex]) -> bool {
    locally_special.contains(&sym)
        || matches!(heap.irefs.get(sym), IrefObject::Symbol(s) if s.special)
}

fn eval_let(interp: &mut Interp, args: &[Value], env: &LexEnvRef, sequential: bool) -> Result<Value, Signal> {
    let bindings = interp.heap.list_to_vec(*args.first().unwrap_or(&Value::Nil));
    let body = &args[1.min(args.len())..];
    let locally_special = declared_specials(&interp.heap, body);
    let depth_before = interp.dynamic.len();

    let mut lexical_entries: Vec<LexEntry> = Vec::new();
    // LET* installs each binding as it's evaluated, so later initializers
    // (and specials) see earlier ones; LET evaluates every initializer
    // against the unmodified outer environment first (§5).
    let mut current_env = env.clone();

    for binding in &bindings {
        let (name, init_form) = match binding {
            Value::Iref(n) => (*n, Value::Nil),
            Value::Cons(_) => {
                let parts = interp.heap.list_to_vec(*binding);
                let name = match parts.first() {
                    Some(Value::Iref(n)) => *n,
                    _ => return Err(Signal::runtime_error("malformed LET binding")),
                };
                (name, parts.get(1).copied().unwrap_or(Value::Nil))
            }
            _ => return Err(Signal::runtime_error("malformed LET binding")),
        };

        let eval_env = if sequential { current_env.clone() } else { env.clone() };
        let value = eval(interp, init_form, &eval_env)?;
        // Root `value` on the explicit stack for the span between its own
        // evaluation and its installation below: nothing else scans
        // `lexical_entries` (a plain Rust `Vec`, not yet a GC root) until it
        // becomes part of a `LexFrame`, so a collection triggered while
        // evaluating a later initializer could otherwise reclaim it first.
        interp.stack.push(value);

        if is_special_symbol(&interp.heap, name, &locally_special) {
            let saved = match interp.heap.irefs.get(name) {
                IrefObject::Symbol(s) => s.value,
                _ => None,
            };
            interp.dynamic.push(DynRecord::SpecialBinding { symbol: name, saved });
            if let IrefObject::Symbol(s) = interp.heap.irefs.get_mut(name) {
                s.value = Some(value);
            }
        } else {
            lexical_entries.push(LexEntry::Binding { kind: BindKind::Value, name, slot: RefCell::new(value) });
            if sequential {
                current_env = LexFrame::child(env.clone(), lexical_entries.clone());
            }
        }
        interp.stack.pop();
    }

    let body_env = if sequential { current_env } else { LexFrame::child(env.clone(), lexical_entries) };

    let body_start = skip_declares(&interp.heap, body);
    let result = eval_body(interp, &body[body_start..], &body_env);
    let cleanup = unwind_effects_to(interp, depth_before);
    match (result, cleanup) {
        (Ok(v), Ok(())) => Ok(v),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), _) => Err(e),
    }
}

fn parse_function_binding(heap: &Heap, binding: Value) -> (HeapIndex, Value, Vec<Value>) {
    let parts = heap.list_to_vec(binding);
    let name = match parts.first() {
        Some(Value::Iref(n)) => *n,
        _ => panic!("malformed function binding"),
    };
    let lambda_list = parts.get(1).copied().unwrap_or(Value::Nil);
    let body = parts[2.min(parts.len())..].to_vec();
    (name, lambda_list, body)
}

fn eval_flet(interp: &mut Interp, args: &[Value], env: &LexEnvRef, recursive: bool) -> Result<Value, Signal> {
    let bindings = interp.heap.list_to_vec(*args.first().unwrap_or(&Value::Nil));
    let body = &args[1.min(args.len())..];

    if !recursive {
        let mut entries = Vec::new();
        for binding in &bindings {
            let (name, lambda_list, closure_body) = parse_function_binding(&interp.heap, *binding);
            let body_list = interp.heap.vec_to_list(&closure_body);
            let closure = ClosureData { lambda_list, body: body_list, env: env.clone(), name: None };
            let fn_value = interp.alloc_iref(IrefObject::Function(FunctionData::Closure(closure)))?;
            entries.push(LexEntry::Binding { kind: BindKind::Function, name, slot: RefCell::new(fn_value) });
        }
        let new_env = LexFrame::child(env.clone(), entries);
        let start = skip_declares(&interp.heap, body);
        return eval_body(interp, &body[start..], &new_env);
    }

    // LABELS: tie the knot. Build placeholder bindings first so each
    // closure's captured environment already contains every sibling, then
    // backfill the real closure values into the `RefCell` slots.
    let mut entries = Vec::new();
    let mut specs = Vec::new();
    for binding in &bindings {
        let (name, lambda_list, closure_body) = parse_function_binding(&interp.heap, *binding);
        entries.push(LexEntry::Binding { kind: BindKind::Function, name, slot: RefCell::new(Value::Nil) });
        specs.push((lambda_list, closure_body));
    }
    let new_env = LexFrame::child(env.clone(), entries);
    for (i, (lambda_list, closure_body)) in specs.into_iter().enumerate() {
        let body_list = interp.heap.vec_to_list(&closure_body);
        let closure = ClosureData { lambda_list, body: body_list, env: new_env.clone(), name: None };
        let fn_value = interp.alloc_iref(IrefObject::Function(FunctionData::Closure(closure)))?;
        if let LexEntry::Binding { slot, .. } = &new_env.entries[i] {
            *slot.borrow_mut() = fn_value;
        }
    }
    let start = skip_declares(&interp.heap, body);
    eval_body(interp, &body[start..], &new_env)
}

fn eval_macrolet(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let bindings = interp.heap.list_to_vec(*args.first().unwrap_or(&Value::Nil));
    let body = &args[1.min(args.len())..];
    let mut entries = Vec::new();
    for binding in &bindings {
        let (name, lambda_list, closure_body) = parse_function_binding(&interp.heap, *binding);
        let body_list = interp.heap.vec_to_list(&closure_body);
        let closure = ClosureData { lambda_list, body: body_list, env: env.clone(), name: None };
        let expander = interp.alloc_iref(IrefObject::Function(FunctionData::Closure(closure)))?;
        entries.push(LexEntry::MacroBinding { name, expander });
    }
    let new_env = LexFrame::child(env.clone(), entries);
    let start = skip_declares(&interp.heap, body);
    eval_body(interp, &body[start..], &new_env)
}

fn eval_symbol_macrolet(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let bindings = interp.heap.list_to_vec(*args.first().unwrap_or(&Value::Nil));
    let body = &args[1.min(args.len())..];
    let mut entries = Vec::new();
    for binding in &bindings {
        let parts = interp.heap.list_to_vec(*binding);
        if let Some(Value::Iref(name)) = parts.first() {
            let expansion = parts.get(1).copied().unwrap_or(Value::Nil);
            entries.push(LexEntry::SymbolMacroBinding { name: *name, expansion });
        }
    }
    let new_env = LexFrame::child(env.clone(), entries);
    let start = skip_declares(&interp.heap, body);
    eval_body(interp, &body[start..], &new_env)
}

fn eval_setq(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let mut result = Value::Nil;
    let mut i = 0;
    while i < args.len() {
        let place = args[i];
        let value_form = *args.get(i + 1).unwrap_or(&Value::Nil);
        let value = eval(interp, value_form, env)?;
        result = assign_symbol(interp, place, value, env)?;
        i += 2;
    }
    single(interp, result)
}

fn assign_symbol(interp: &mut Interp, place: Value, value: Value, env: &LexEnvRef) -> Result<Value, Signal> {
    let name = match place {
        Value::Iref(n) if matches!(interp.heap.irefs.get(n), IrefObject::Symbol(_)) => n,
        _ => return Err(Signal::runtime_error("SETQ place must be a symbol")),
    };
    match crate::env::lookup_lexical(env, name, BindKind::Value) {
        Lookup::Binding(slot) => {
            *slot.borrow_mut() = value;
            Ok(value)
        }
        Lookup::SymbolMacro(expansion) => assign_symbol(interp, expansion, value, env),
        Lookup::NotFound => {
            if let IrefObject::Symbol(s) = interp.heap.irefs.get_mut(name) {
                s.value = Some(value);
            }
            Ok(value)
        }
        _ => unreachable!(),
    }
}

fn eval_function(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let spec = *args.first().unwrap_or(&Value::Nil);
    let fn_value = eval_operator_literal(interp, spec, env).or_else(|_| resolve_function_symbol(interp, spec, env))?;
    single(interp, fn_value)
}

fn resolve_function_symbol(interp: &mut Interp, spec: Value, env: &LexEnvRef) -> Result<Value, Signal> {
    let name = match spec {
        Value::Iref(n) if matches!(interp.heap.irefs.get(n), IrefObject::Symbol(_)) => n,
        _ => return Err(Signal::runtime_error("FUNCTION expects a symbol or LAMBDA form")),
    };
    match crate::env::lookup_lexical(env, name, BindKind::Function) {
        Lookup::Binding(slot) => Ok(*slot.borrow()),
        Lookup::Macro(_) => Err(Signal::runtime_error("cannot take FUNCTION of a macro")),
        Lookup::NotFound => match interp.heap.irefs.get(name) {
            IrefObject::Symbol(s) => s.function.ok_or_else(|| Failure::FunctionUnbound(spec).into()),
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

/// Pops dynamic records down to `target_depth`, running each one's effect:
/// a special binding is restored, a cleanup form is evaluated. Used both on
/// ordinary scope exit (target = the construct's own push depth) and by a
/// BLOCK/CATCH/TAGBODY handler catching a non-local exit (target = the
/// found marker's index). A cleanup form's own error replaces whatever
/// unwind was already in flight (§4.7: a documented simplification).
fn unwind_effects_to(interp: &mut Interp, target_depth: usize) -> Result<(), Signal> {
    while interp.dynamic.len() > target_depth {
        let record = match interp.dynamic.pop() {
            Some(r) => r,
            None => break,
        };
        match record {
            DynRecord::SpecialBinding { symbol, saved } => {
                if let IrefObject::Symbol(s) = interp.heap.irefs.get_mut(symbol) {
                    s.value = saved;
                }
            }
            DynRecord::Cleanup { body, env } => {
                eval(interp, body, &env)?;
            }
            DynRecord::BlockMarker { .. } | DynRecord::CatchMarker { .. } | DynRecord::TagbodyMarker { .. } => {}
        }
    }
    Ok(())
}

fn eval_tagbody(interp: &mut Interp, forms: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let marker = interp.dynamic.fresh_marker();
    let mut entries = Vec::new();
    for form in forms {
        if !matches!(form, Value::Cons(_)) {
            entries.push(LexEntry::GoTag { tag: *form, marker });
        }
    }
    let new_env = LexFrame::child(env.clone(), entries);
    let depth_before = interp.dynamic.len();
    interp.dynamic.push(DynRecord::TagbodyMarker { id: marker });

    let mut idx = 0;
    loop {
        if idx >= forms.len() {
            let cleanup = unwind_effects_to(interp, depth_before);
            return cleanup.map(|()| Value::Nil).and_then(|v| single(interp, v));
        }
        if matches!(forms[idx], Value::Cons(_)) {
            match eval(interp, forms[idx], &new_env) {
                Ok(_) => idx += 1,
                Err(Signal::Unwind(Unwind::Go { marker: m, tag })) if m == marker => {
                    match forms.iter().position(|f| crate::env::tags_eq(*f, tag, &interp.heap)) {
                        Some(pos) => idx = pos + 1,
                        None => idx += 1,
                    }
                }
                Err(e) => return Err(e),
            }
        } else {
            idx += 1;
        }
    }
}

fn eval_go(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let tag = *args.first().unwrap_or(&Value::Nil);
    match crate::env::lookup_go_tag(env, tag, &interp.heap) {
        Some(marker) => {
            if interp.dynamic.find_marker(marker).is_some() {
                Err(Signal::Unwind(Unwind::Go { marker, tag }))
            } else {
                Err(Failure::TagbodyExtentExited.into())
            }
        }
        None => Err(Failure::GoTagNotBound(tag).into()),
    }
}

fn eval_block(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let name = match args.first() {
        Some(Value::Iref(n)) => *n,
        _ => return Err(Signal::runtime_error("BLOCK name must be a symbol")),
    };
    let body = &args[1.min(args.len())..];
    let marker = interp.dynamic.fresh_marker();
    let new_env = LexFrame::child(env.clone(), vec![LexEntry::BlockName { name, marker }]);
    let depth_before = interp.dynamic.len();
    interp.dynamic.push(DynRecord::BlockMarker { id: marker });

    match eval_body(interp, body, &new_env) {
        Ok(v) => {
            unwind_effects_to(interp, depth_before)?;
            Ok(v)
        }
        Err(Signal::Unwind(Unwind::Return { marker: m, values })) if m == marker => {
            unwind_effects_to(interp, depth_before)?;
            let first = values.first().copied().unwrap_or(Value::Nil);
            interp.last_values = values;
            Ok(first)
        }
        Err(e) => Err(e),
    }
}

fn eval_return_from(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let name = match args.first() {
        Some(Value::Iref(n)) => *n,
        _ => return Err(Signal::runtime_error("RETURN-FROM name must be a symbol")),
    };
    let value_form = args.get(1).copied().unwrap_or(Value::Nil);
    match crate::env::lookup_lexical(env, name, BindKind::BlockName) {
        Lookup::BlockName(marker) => {
            if interp.dynamic.find_marker(marker).is_none() {
                return Err(Failure::BlockExtentExited.into());
            }
            eval(interp, value_form, env)?;
            Err(Signal::Unwind(Unwind::Return { marker, values: interp.last_values.clone() }))
        }
        _ => Err(Failure::BlockNameNotBound(Value::Iref(name)).into()),
    }
}

fn eval_catch(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let tag = eval(interp, *args.first().unwrap_or(&Value::Nil), env)?;
    let body = &args[1.min(args.len())..];
    let marker = interp.dynamic.fresh_marker();
    let depth_before = interp.dynamic.len();
    interp.dynamic.push(DynRecord::CatchMarker { id: marker, tag });

    match eval_body(interp, body, env) {
        Ok(v) => {
            unwind_effects_to(interp, depth_before)?;
            Ok(v)
        }
        Err(Signal::Unwind(Unwind::Throw { marker: m, values, .. })) if m == marker => {
            unwind_effects_to(interp, depth_before)?;
            let first = values.first().copied().unwrap_or(Value::Nil);
            interp.last_values = values;
            Ok(first)
        }
        Err(e) => Err(e),
    }
}

fn eval_throw(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let tag = eval(interp, *args.first().unwrap_or(&Value::Nil), env)?;
    let value_form = args.get(1).copied().unwrap_or(Value::Nil);
    match interp.dynamic.find_catch(tag) {
        Some(_) => {
            eval(interp, value_form, env)?;
            let marker = catch_marker_for_tag(interp, tag).ok_or(Failure::CatchTagNotBound(tag))?;
            Err(Signal::Unwind(Unwind::Throw { marker, tag, values: interp.last_values.clone() }))
        }
        None => Err(Failure::CatchTagNotBound(tag).into()),
    }
}

fn catch_marker_for_tag(interp: &Interp, tag: Value) -> Option<crate::control::MarkerId> {
    interp.dynamic.find_catch(tag).and_then(|idx| match interp.dynamic.record_at(idx) {
        Some(DynRecord::CatchMarker { id, .. }) => Some(*id),
        _ => None,
    })
}

fn eval_unwind_protect(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let protected = *args.first().unwrap_or(&Value::Nil);
    let cleanup_form = interp.heap.vec_to_list(&args[1.min(args.len())..]);
    let depth_before = interp.dynamic.len();
    interp.dynamic.push(DynRecord::Cleanup { body: cleanup_form_as_progn(interp, cleanup_form), env: env.clone() });

    let body_result = eval(interp, protected, env);
    let cleanup_result = unwind_effects_to(interp, depth_before);
    match cleanup_result {
        Err(e) => Err(e),
        Ok(()) => body_result,
    }
}

fn cleanup_form_as_progn(interp: &mut Interp, forms: Value) -> Value {
    let progn_sym = interp.intern("PROGN");
    interp.heap.cons(Value::Iref(progn_sym), forms)
}

fn eval_multiple_value_call(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let fn_form = *args.first().unwrap_or(&Value::Nil);
    let operator = eval(interp, fn_form, env)?;
    let mut gathered = Vec::new();
    for form in &args[1.min(args.len())..] {
        eval(interp, *form, env)?;
        gathered.extend(interp.last_values.clone());
    }
    apply(interp, operator, &gathered, env)
}

fn eval_multiple_value_prog1(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let first_form = *args.first().unwrap_or(&Value::Nil);
    let primary = eval(interp, first_form, env)?;
    let saved_values = interp.last_values.clone();
    for form in &args[1.min(args.len())..] {
        eval(interp, *form, env)?;
    }
    interp.last_values = saved_values;
    Ok(primary)
}

fn eval_progv(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let symbols_form = *args.first().unwrap_or(&Value::Nil);
    let values_form = *args.get(1).unwrap_or(&Value::Nil);
    let symbols_list = eval(interp, symbols_form, env)?;
    let values_list = eval(interp, values_form, env)?;
    let symbols = interp.heap.list_to_vec(symbols_list);
    let mut values = interp.heap.list_to_vec(values_list);
    values.resize(symbols.len(), Value::Nil);

    let depth_before = interp.dynamic.len();
    for (sym, value) in symbols.iter().zip(values.iter()) {
        if let Value::Iref(name) = sym {
            let saved = match interp.heap.irefs.get(*name) {
                IrefObject::Symbol(s) => s.value,
                _ => None,
            };
            interp.dynamic.push(DynRecord::SpecialBinding { symbol: *name, saved });
            if let IrefObject::Symbol(s) = interp.heap.irefs.get_mut(*name) {
                s.value = Some(*value);
            }
        }
    }

    let body = &args[2.min(args.len())..];
    let result = eval_body(interp, body, env);
    let cleanup = unwind_effects_to(interp, depth_before);
    match (result, cleanup) {
        (Ok(v), Ok(())) => Ok(v),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), _) => Err(e),
    }
}

/// Generalized assignment (`_SETF`): resolves the place form's setter and
/// applies it. Supports the places this core actually has mutators for —
/// a bare symbol, CAR/CDR (via RPLACA/RPLACD), and simple-vector IREF —
/// rather than a full user-extensible `SETF`-method table.
fn eval_setf(interp: &mut Interp, args: &[Value], env: &LexEnvRef) -> Result<Value, Signal> {
    let place = *args.first().unwrap_or(&Value::Nil);
    let value_form = *args.get(1).unwrap_or(&Value::Nil);
    let value = eval(interp, value_form, env)?;

    match place {
        Value::Iref(_) => {
            let result = assign_symbol(interp, place, value, env)?;
            single(interp, result)
        }
        Value::Cons(_) => {
            let parts = interp.heap.list_to_vec(place);
            let op_name = match parts.first() {
                Some(Value::Iref(s)) => crate::symbol::symbol_name(&interp.heap, *s).to_string(),
                _ => return Err(Signal::runtime_error("malformed SETF place")),
            };
            let target = eval(interp, *parts.get(1).unwrap_or(&Value::Nil), env)?;
            match op_name.as_str() {
                "CAR" => {
                    interp.heap.set_car(target, value);
                }
                "CDR" => {
                    interp.heap.set_cdr(target, value);
                }
                "IREF" => {
                    let index_form = *parts.get(2).unwrap_or(&Value::Nil);
                    let index_value = eval(interp, index_form, env)?;
                    set_simple_vector_index(interp, target, index_value, value)?;
                }
                "JREF" => {
                    let index_form = *parts.get(2).unwrap_or(&Value::Nil);
                    let index_value = eval(interp, index_form, env)?;
                    set_string_char(interp, target, index_value, value)?;
                }
                other => return Err(Signal::runtime_error(format!("no SETF expander for {other}"))),
            }
            single(interp, value)
        }
        _ => Err(Signal::runtime_error("malformed SETF place")),
    }
}

fn set_simple_vector_index(interp: &mut Interp, vector: Value, index: Value, value: Value) -> Result<(), Signal> {
    let idx = match index {
        Value::Fixnum(n) if n >= 0 => n as usize,
        _ => return Err(Failure::IndexOutOfBounds(index).into()),
    };
    match vector {
        Value::Iref(i) => match interp.heap.irefs.get_mut(i) {
            IrefObject::SimpleVector(items) => {
                if idx >= items.len() {
                    return Err(Failure::IndexOutOfBounds(index).into());
                }
                items[idx] = value;
                Ok(())
            }
            _ => Err(Signal::runtime_error("IREF target is not a simple-vector")),
        },
        _ => Err(Signal::runtime_error("IREF target is not a simple-vector")),
    }
}

/// `(setf (jref string index) char)`: replaces the character at `index`
/// (char-indexed, not byte-indexed, so UTF-8 multi-byte characters don't
/// split a valid string into invalid halves).
fn set_string_char(interp: &mut Interp, string: Value, index: Value, value: Value) -> Result<(), Signal> {
    let idx = match index {
        Value::Fixnum(n) if n >= 0 => n as usize,
        _ => return Err(Failure::IndexOutOfBounds(index).into()),
    };
    let ch = match value {
        Value::Char(c) => c,
        _ => return Err(Signal::runtime_error("(SETF JREF) expects a character value")),
    };
    match string {
        Value::Jref(i) => match interp.heap.jrefs.get_mut(i) {
            JrefObject::SimpleString(s) => {
                let mut chars: Vec<char> = s.chars().collect();
                if idx >= chars.len() {
                    return Err(Failure::IndexOutOfBounds(index).into());
                }
                chars[idx] = ch;
                *s = chars.into_iter().collect();
                Ok(())
            }
            _ => Err(Signal::runtime_error("JREF target is not a string")),
        },
        _ => Err(Signal::runtime_error("JREF target is not a string")),
    }
}

/// Resolves `head_sym` as an operator (macro or function) and either
/// expands-then-reevaluates, or evaluates arguments and calls.
fn eval_call_by_symbol(interp: &mut Interp, head_sym: HeapIndex, args_list: Value, env: &LexEnvRef) -> Result<Value, Signal> {
    match resolve_operator(interp, head_sym, env)? {
        Operator::Macro(expander) => {
            let arg_forms = interp.heap.list_to_vec(args_list);
            let expansion = apply(interp, expander, &arg_forms, env)?;
            eval(interp, expansion, env)
        }
        Operator::Function(callee) => {
            let args = eval_args(interp, args_list, env)?;
            apply(interp, callee, &args, env)
        }
    }
}

enum Operator {
    Macro(Value),
    Function(Value),
}

fn resolve_operator(interp: &mut Interp, sym: HeapIndex, env: &LexEnvRef) -> Result<Operator, Signal> {
    match crate::env::lookup_lexical(env, sym, BindKind::Function) {
        Lookup::Binding(slot) => Ok(Operator::Function(*slot.borrow())),
        Lookup::Macro(expander) => Ok(Operator::Macro(expander)),
        Lookup::NotFound => match interp.heap.irefs.get(sym) {
            IrefObject::Symbol(s) => {
                if let Some(m) = s.macro_function {
                    Ok(Operator::Macro(m))
                } else if let Some(f) = s.function {
                    Ok(Operator::Function(f))
                } else {
                    Err(Failure::FunctionUnbound(Value::Iref(sym)).into())
                }
            }
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

/// Applies a function or builtin to already-evaluated `args`, through the
/// explicit call-frame discipline of §4.3.
pub fn apply(interp: &mut Interp, callee: Value, args: &[Value], caller_env: &LexEnvRef) -> Result<Value, Signal> {
    let function = match callee {
        Value::Iref(i) => match interp.heap.irefs.get(i) {
            IrefObject::Function(f) => f.clone(),
            _ => return Err(Signal::runtime_error("value is not callable")),
        },
        _ => return Err(Signal::runtime_error("value is not callable")),
    };

    interp.stack.push_frame(callee, args, caller_env.clone());
    let result = match function {
        FunctionData::Builtin(data) => {
            let min_arity = data.min_arity.max(0) as usize;
            if args.len() < min_arity {
                Err(Failure::TooFewArguments.into())
            } else if data.max_arity >= 0 && args.len() > data.max_arity as usize {
                Err(Failure::TooManyArguments.into())
            } else {
                (data.func)(interp, args)
            }
        }
        FunctionData::Closure(c) => {
            let new_env = crate::lambda_list::bind(interp, c.lambda_list, args, c.env.clone(), caller_env, &mut eval)?;
            let body_forms = interp.heap.list_to_vec(c.body);
            let start = skip_declares(&interp.heap, &body_forms);
            eval_body(interp, &body_forms[start..], &new_env)
        }
    };
    interp.stack.pop_frame();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_one;

    fn run(interp: &mut Interp, src: &str) -> Value {
        let env = interp.global_env.clone();
        let form = read_one(interp, src).unwrap();
        eval(interp, form, &env).unwrap()
    }

    #[test]
    fn quote_returns_literal_unevaluated() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(quote (1 2 3))");
        assert_eq!(interp.heap.list_to_vec(v), vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)]);
    }

    #[test]
    fn if_picks_the_right_branch() {
        let mut interp = Interp::boot(1 << 20);
        assert_eq!(run(&mut interp, "(if 1 2 3)"), Value::Fixnum(2));
        assert_eq!(run(&mut interp, "(if nil 2 3)"), Value::Fixnum(3));
    }

    #[test]
    fn let_star_sees_earlier_bindings() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(let* ((x 10) (y (+ x 1))) y)");
        assert_eq!(v, Value::Fixnum(11));
    }

    #[test]
    fn setq_mutates_an_existing_binding() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(let ((x 1)) (setq x 42) x)");
        assert_eq!(v, Value::Fixnum(42));
    }

    #[test]
    fn tagbody_go_skips_forms() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(
            &mut interp,
            "(let ((x 0)) (tagbody (setq x 1) (go skip) (setq x 2) skip (setq x 3)) x)",
        );
        assert_eq!(v, Value::Fixnum(3));
    }

    #[test]
    fn block_return_from_delivers_value() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(block nil (return-from nil 7) 8)");
        assert_eq!(v, Value::Fixnum(7));
    }

    #[test]
    fn catch_throw_delivers_value() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(catch 'x (throw 'x 99) 100)");
        assert_eq!(v, Value::Fixnum(99));
    }

    #[test]
    fn unwind_protect_cleanup_runs_once_on_normal_exit() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(let ((x 0)) (unwind-protect 1 (setq x (+ x 1))) x)");
        assert_eq!(v, Value::Fixnum(1));
    }

    #[test]
    fn unwind_protect_cleanup_runs_on_nonlocal_exit() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(
            &mut interp,
            "(let ((x 0)) (block nil (unwind-protect (return-from nil 1) (setq x (+ x 1)))) x)",
        );
        assert_eq!(v, Value::Fixnum(1));
    }

    #[test]
    fn labels_supports_self_recursion() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(
            &mut interp,
            "(labels ((fact (n) (if (= n 0) 1 (* n (fact (- n 1)))))) (fact 5))",
        );
        assert_eq!(v, Value::Fixnum(120));
    }

    #[test]
    fn go_to_extinct_marker_fails() {
        let mut interp = Interp::boot(1 << 20);
        // A GO tag whose lexical binding still resolves, but whose dynamic
        // TAGBODY marker was never (or no longer) pushed: the "dynamic
        // extent exited" case (§7 kind 9), not a plain unbound tag.
        let marker = interp.dynamic.fresh_marker();
        let tag = Value::Iref(interp.intern("DONE"));
        let env = LexFrame::child(interp.global_env.clone(), vec![LexEntry::GoTag { tag, marker }]);
        let err = eval_go(&mut interp, &[tag], &env);
        assert!(matches!(
            err,
            Err(Signal::Unwind(Unwind::Failure(Failure::TagbodyExtentExited)))
        ));
    }
}
