// ABOUTME: Process-level primitives: exit, uname, program spawn, dynamic load (core §4.8, §6)
//
// The original reaches `uname(2)`/`fork`/`exec` directly from C; this core
// has no FFI layer, so these go through `std::process`/`std::env::consts`
// instead, kept behind the same symbol names and argument shapes as the
// original's table (§6's External Interfaces, SPEC_FULL §B.5/§B.6).

use super::{arg, as_fixnum, def, string_arg};
use crate::error::Signal;
use crate::interp::Interp;
use crate::value::Value;
use std::process::Command;

pub(super) fn register(interp: &mut Interp) {
    def(interp, "EXIT", exit, 0, 1);
    def(interp, "QUIT", exit, 0, 1);
    def(interp, "UNAME", uname, 0, 0);
    def(interp, "RUN-PROGRAM", run_program, 1, 2);
    def(interp, "LOAD-LIBRARY", load_library, 1, 1);
}

/// `(exit &optional code)`: unwinds straight past every CATCH/BLOCK and
/// UNWIND-PROTECT cleanup runs on the way (§4.7), landing at the REPL
/// driver as a process exit request.
fn exit(_interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let code = match args.first() {
        Some(v) => as_fixnum(*v)? as i32,
        None => 0,
    };
    Err(Signal::Exit(code))
}

/// `(uname)`: a list of OS name fields — sysname, release, machine — the
/// same shape `uname(2)`'s `struct utsname` exposes, sourced from
/// `std::env::consts` since this core has no FFI binding to the syscall.
fn uname(interp: &mut Interp, _args: &[Value]) -> Result<Value, Signal> {
    let sysname = interp.alloc_jref(crate::heap::JrefObject::SimpleString(std::env::consts::OS.to_string()))?;
    let machine = interp.alloc_jref(crate::heap::JrefObject::SimpleString(std::env::consts::ARCH.to_string()))?;
    let family = interp.alloc_jref(crate::heap::JrefObject::SimpleString(std::env::consts::FAMILY.to_string()))?;
    Ok(interp.heap.vec_to_list(&[sysname, family, machine]))
}

/// `(run-program path args)`: spawns `path` with the string list `args`,
/// waits for it to finish, and returns its exit status (or -1 if the
/// process was terminated by a signal rather than exiting normally).
fn run_program(interp: &mut Interp, args: &[Value]) -> Result<Value, Signal> {
    let path = string_arg(interp, arg(args, 0))?;
    let arg_values = interp.heap.list_to_vec(arg(args, 1));
    let mut program_args = Vec::with_capacity(arg_values.len());
    for a in arg_values {
        program_args.push(string_arg(interp, a)?);
    }
    let status = Command::new(&path)
        .args(&program_args)
        .status()
        .map_err(|e| Signal::runtime_error(format!("cannot run {path}: {e}")))?;
    Ok(Value::Fixnum(status.code().unwrap_or(-1) as i64))
}

/// `(load-library path)`: the original loads a shared object and calls its
/// `init` entry point against the current frame pointer. This core has no
/// bytecode or native-code backend (Non-goal, spec §1/§9), so the symbol
/// stays registered and catchable rather than silently missing, but always
/// signals rather than doing anything.
fn load_library(_interp: &mut Interp, _args: &[Value]) -> Result<Value, Signal> {
    Err(Signal::runtime_error(
        "LOAD-LIBRARY: dynamic library loading is not supported by this core",
    ))
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
    fn exit_propagates_as_a_signal_not_a_value() {
        let mut interp = Interp::boot(1 << 20);
        let env = interp.global_env.clone();
        let form = read_one(&mut interp, "(exit 7)").unwrap();
        match crate::eval::eval(&mut interp, form, &env) {
            Err(Signal::Exit(7)) => {}
            other => panic!("expected Signal::Exit(7), got {other:?}"),
        }
    }

    #[test]
    fn exit_runs_pending_unwind_protect_cleanup_on_the_way_out() {
        let mut interp = Interp::boot(1 << 20);
        let env = interp.global_env.clone();
        // CLEANUP-RAN is a global (special) symbol so its value survives
        // past the aborted call, letting the test observe that the
        // UNWIND-PROTECT cleanup ran even though EXIT never returns.
        run(&mut interp, "(setq cleanup-ran 0)");
        let form = read_one(&mut interp, "(unwind-protect (exit 0) (setq cleanup-ran 1))").unwrap();
        match crate::eval::eval(&mut interp, form, &env) {
            Err(Signal::Exit(0)) => {}
            other => panic!("expected Signal::Exit(0), got {other:?}"),
        }
        assert_eq!(run(&mut interp, "cleanup-ran"), Value::Fixnum(1));
    }

    #[test]
    fn uname_returns_a_three_element_list_of_strings() {
        let mut interp = Interp::boot(1 << 20);
        let v = run(&mut interp, "(uname)");
        let items = interp.heap.list_to_vec(v);
        assert_eq!(items.len(), 3);
        for item in items {
            assert!(super::string_arg(&interp, item).is_ok());
        }
    }

    #[test]
    fn load_library_signals_rather_than_panicking() {
        let mut interp = Interp::boot(1 << 20);
        let env = interp.global_env.clone();
        let form = read_one(&mut interp, r#"(load-library "nope.so")"#).unwrap();
        assert!(crate::eval::eval(&mut interp, form, &env).is_err());
    }
}
