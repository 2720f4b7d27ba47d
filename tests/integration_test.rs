// ABOUTME: End-to-end evaluator scenarios exercising the full read/eval/print pipeline

use lisp801_core::error::Signal;
use lisp801_core::interp::Interp;
use lisp801_core::printer::print_value;
use lisp801_core::reader::read_one;
use lisp801_core::value::Value;

fn eval_str(interp: &mut Interp, src: &str) -> Result<Value, Signal> {
    let env = interp.global_env.clone();
    let form = read_one(interp, src)?;
    lisp801_core::eval::eval(interp, form, &env)
}

fn eval_ok(interp: &mut Interp, src: &str) -> Value {
    eval_str(interp, src).unwrap_or_else(|e| panic!("evaluating {src:?} failed: {e:?}"))
}

fn print_str(interp: &Interp, v: Value) -> String {
    print_value(&interp.heap, v)
}

#[test]
fn arithmetic_and_printing_round_trip() {
    let mut interp = Interp::boot(1 << 20);
    let v = eval_ok(&mut interp, "(+ 1 2 3)");
    assert_eq!(v, Value::Fixnum(6));
    assert_eq!(print_str(&interp, v), "6");
}

#[test]
fn let_star_shadows_sequentially() {
    let mut interp = Interp::boot(1 << 20);
    let v = eval_ok(&mut interp, "(let* ((x 1) (y (+ x 1))) (+ x y))");
    assert_eq!(v, Value::Fixnum(3));
}

#[test]
fn labels_supports_self_recursive_factorial() {
    let mut interp = Interp::boot(1 << 20);
    let v = eval_ok(
        &mut interp,
        "(labels ((fact (n) (if (eq n 0) 1 (* n (fact (- n 1)))))) (fact 5))",
    );
    assert_eq!(v, Value::Fixnum(120));
}

#[test]
fn catch_throw_unwinds_through_intervening_unwind_protect() {
    let mut interp = Interp::boot(1 << 20);
    eval_ok(&mut interp, "(setq ran 0)");
    let v = eval_ok(
        &mut interp,
        "(catch 'tag (unwind-protect (throw 'tag 42) (setq ran 1)))",
    );
    assert_eq!(v, Value::Fixnum(42));
    assert_eq!(eval_ok(&mut interp, "ran"), Value::Fixnum(1));
}

#[test]
fn tagbody_go_loops_to_a_label() {
    let mut interp = Interp::boot(1 << 20);
    let v = eval_ok(
        &mut interp,
        "(let ((i 0)) (tagbody top (setq i (+ i 1)) (if (< i 5) (go top))) i)",
    );
    assert_eq!(v, Value::Fixnum(5));
}

#[test]
fn block_return_from_exits_early() {
    let mut interp = Interp::boot(1 << 20);
    let v = eval_ok(
        &mut interp,
        "(block done (if t (return-from done 7)) 99)",
    );
    assert_eq!(v, Value::Fixnum(7));
}

#[test]
fn eq_is_identity_not_structural_equality() {
    let mut interp = Interp::boot(1 << 20);
    let t = eval_ok(&mut interp, "(eq 'a 'a)");
    assert!(t.is_truthy());
    let f = eval_ok(&mut interp, "(eq (cons 1 2) (cons 1 2))");
    assert!(f.is_nil());
}

#[test]
fn keyword_symbols_self_evaluate() {
    let mut interp = Interp::boot(1 << 20);
    let v = eval_ok(&mut interp, ":FOO");
    assert_eq!(print_str(&interp, v), ":FOO");
}

#[test]
fn unbound_variable_surfaces_as_a_recoverable_failure() {
    let mut interp = Interp::boot(1 << 20);
    match eval_str(&mut interp, "totally-undefined-name") {
        Err(Signal::Unwind(lisp801_core::control::Unwind::Failure(f))) => assert_eq!(f.kind(), 0),
        other => panic!("expected a VariableUnbound failure, got {other:?}"),
    }
}

#[test]
fn exit_propagates_past_eval_as_a_signal() {
    let mut interp = Interp::boot(1 << 20);
    match eval_str(&mut interp, "(exit 0)") {
        Err(Signal::Exit(0)) => {}
        other => panic!("expected Signal::Exit(0), got {other:?}"),
    }
}

#[test]
fn standard_stream_specials_are_bound_at_boot() {
    let mut interp = Interp::boot(1 << 20);
    for name in ["*standard-input*", "*standard-output*", "*error-output*", "*packages*"] {
        eval_ok(&mut interp, name);
    }
}

#[test]
fn loading_a_file_then_evaluating_sees_its_top_level_definitions() {
    let mut interp = Interp::boot(1 << 20);
    let path = std::env::temp_dir().join("lisp801-core-integration-load.lisp");
    std::fs::write(&path, "(setq answer 42)\n(setq doubled (* answer 2))\n").unwrap();
    lisp801_core::repl::load_file(&mut interp, &path).unwrap();
    assert_eq!(eval_ok(&mut interp, "doubled"), Value::Fixnum(84));
    let _ = std::fs::remove_file(&path);
}
