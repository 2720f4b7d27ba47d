// ABOUTME: File loading, the break loop, and the interactive REPL driver (core §4.7, §6, §7)
//
// The original's `dbgr` is reached by a raw `longjmp` out of the evaluator
// into a loop reading from the controlling terminal, re-using the same frame
// pointer the failing call had so "use"/"return" splice a value back into
// the exact in-flight computation. This core's evaluator unwinds through
// ordinary `Result`s instead (Design Notes §9), so by the time a `Failure`
// reaches this module the failing call's Rust stack frame is already gone.
// The break loop here is driven off the explicit `Stack`/`DynamicEnv`
// instead: it can still show the backtrace and let "use"/"return" supply a
// value, but that value becomes the result of the top-level form being
// retried rather than being spliced back into the original call. This is the
// one place the redesign changes user-visible behavior, and it's recorded as
// a resolved Open Question in DESIGN.md.

use crate::error::{Fatal, Signal};
use crate::interp::Interp;
use crate::value::Value;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use std::path::Path;

/// Reads and evaluates every top-level form in `path`, in order, stopping at
/// the first failure (§6: files given on the command line are loaded before
/// the REPL starts).
pub fn load_file(interp: &mut Interp, path: &Path) -> Result<(), Signal> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Signal::Fatal(Fatal::ReadError(format!("cannot read {}: {e}", path.display()))))?;
    let forms = crate::reader::read_all(interp, &contents)?;
    let env = interp.global_env.clone();
    for form in forms {
        if let Err(signal) = crate::eval::eval(interp, form, &env) {
            match signal {
                Signal::Exit(_) => return Err(signal),
                other => {
                    report_signal(interp, &other);
                    break_loop(interp)?;
                }
            }
        }
    }
    Ok(())
}

/// Prints a failure/error to `*ERROR-OUTPUT*` the way the original's `dbgr`
/// announces the ten-kind taxonomy before dropping into the break loop.
fn report_signal(interp: &Interp, signal: &Signal) {
    match signal {
        Signal::Unwind(crate::control::Unwind::Failure(f)) => {
            eprintln!(
                "; failure {} ({}): {}",
                f.kind(),
                f,
                crate::printer::print_value(&interp.heap, f.offender())
            );
        }
        Signal::Unwind(other) => eprintln!("; unhandled unwind: {other:?}"),
        Signal::RuntimeError(msg) => eprintln!("; error: {msg}"),
        Signal::Fatal(f) => eprintln!("; fatal: {f}"),
        Signal::Exit(code) => eprintln!("; exit {code}"),
    }
}

/// The interactive break loop entered on an unhandled `Failure` (§4.7, §7).
/// Offers the three fixed restarts, each selected by the first letter of a
/// read symbol, plus a numeric command to re-scope the backtrace to an
/// ancestor frame (clamped at the root, per Design Notes §9).
fn break_loop(interp: &mut Interp) -> Result<(), Signal> {
    let mut depth = 0usize;
    loop {
        if let Some(frame) = interp.stack.frame_at(depth) {
            println!(
                "[{depth}] {}",
                crate::printer::print_value(&interp.heap, frame.callee)
            );
        }
        print!("break> ");
        use std::io::Write;
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            return Ok(()); // EOF: treat like abort
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Ok(n) = line.parse::<usize>() {
            depth = n;
            continue;
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();
        let first = command.chars().next().unwrap_or(' ').to_ascii_lowercase();

        match first {
            'a' => return Ok(()), // abort to top level
            'u' | 'r' => {
                // "use"/"return" both resume the interrupted top-level form
                // with a substitute value, since this core has no way to
                // splice a value back into the original (already-unwound)
                // call frame.
                if rest.is_empty() {
                    println!("; usage: u <form>  or  r <form>");
                    continue;
                }
                match evaluate_line(interp, rest) {
                    Ok(v) => {
                        println!("=> {}", crate::printer::print_value(&interp.heap, v));
                        return Ok(());
                    }
                    Err(signal @ Signal::Exit(_)) => return Err(signal),
                    Err(signal) => report_signal(interp, &signal),
                }
            }
            _ => match evaluate_line(interp, line) {
                Ok(v) => println!("=> {}", crate::printer::print_value(&interp.heap, v)),
                Err(signal @ Signal::Exit(_)) => return Err(signal),
                Err(signal) => report_signal(interp, &signal),
            },
        }
    }
}

fn evaluate_line(interp: &mut Interp, line: &str) -> Result<Value, Signal> {
    let form = crate::reader::read_one(interp, line)?;
    let env = interp.global_env.clone();
    crate::eval::eval(interp, form, &env)
}

/// Runs the `rustyline`-backed REPL loop (§6). Returns the process exit code
/// requested by `(exit)`/`(quit)`, or 0 on ordinary EOF.
pub fn run_repl(interp: &mut Interp) -> i32 {
    println!("{}", crate::config::WELCOME_MESSAGE);
    println!("{}", crate::config::WELCOME_SUBTITLE);

    let config = Config::builder().auto_add_history(true).build();
    let mut rl = match DefaultEditor::with_config(config) {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("failed to initialize REPL: {e}");
            return 1;
        }
    };
    let _ = rl.load_history(crate::config::HISTORY_FILE);

    loop {
        match rl.readline("lisp> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                match evaluate_line(interp, &line) {
                    Ok(v) => println!("=> {}", crate::printer::print_value(&interp.heap, v)),
                    Err(Signal::Exit(code)) => {
                        let _ = rl.save_history(crate::config::HISTORY_FILE);
                        return code;
                    }
                    Err(signal) => {
                        report_signal(interp, &signal);
                        if matches!(signal, Signal::Unwind(crate::control::Unwind::Failure(_))) {
                            if let Err(Signal::Exit(code)) = break_loop(interp) {
                                let _ = rl.save_history(crate::config::HISTORY_FILE);
                                return code;
                            }
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(crate::config::HISTORY_FILE);
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_file_evaluates_every_top_level_form_in_order() {
        let mut interp = Interp::boot(1 << 20);
        let path = std::env::temp_dir().join("lisp801-core-repl-load-test.lisp");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "(setq x 1)").unwrap();
            writeln!(f, "(setq x (+ x 1))").unwrap();
        }
        load_file(&mut interp, &path).unwrap();
        let env = interp.global_env.clone();
        let form = crate::reader::read_one(&mut interp, "x").unwrap();
        assert_eq!(crate::eval::eval(&mut interp, form, &env).unwrap(), Value::Fixnum(2));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn evaluate_line_surfaces_exit_as_a_signal() {
        let mut interp = Interp::boot(1 << 20);
        match evaluate_line(&mut interp, "(exit 3)") {
            Err(Signal::Exit(3)) => {}
            other => panic!("expected Signal::Exit(3), got {other:?}"),
        }
    }
}
