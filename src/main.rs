mod builtins;
mod config;
mod control;
mod env;
mod error;
mod eval;
mod gc;
mod heap;
mod interp;
mod lambda_list;
mod printer;
mod reader;
mod repl;
mod stack;
mod symbol;
mod value;

use clap::Parser;
use error::Signal;
use interp::Interp;
use std::path::PathBuf;

/// A Common-Lisp-family evaluator core: tagged values, mark-sweep heap, and
/// the 22 special operators, with a REPL and file-loading CLI.
#[derive(Parser, Debug)]
#[command(name = "lisp801-core")]
#[command(version = config::VERSION)]
#[command(about = "A Common-Lisp-family evaluator core")]
struct CliArgs {
    /// Source files to load, in order, before the REPL starts
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Word budget for the managed heap (§4.1)
    #[arg(long = "heap-words", value_name = "N", default_value_t = config::DEFAULT_HEAP_WORDS)]
    heap_words: usize,

    /// Load the given files and exit without starting the REPL
    #[arg(long = "no-repl")]
    no_repl: bool,
}

fn main() {
    let args = CliArgs::parse();
    let mut interp = Interp::boot(args.heap_words);

    for path in &args.files {
        match repl::load_file(&mut interp, path) {
            Ok(()) => {}
            Err(Signal::Exit(code)) => std::process::exit(code),
            Err(signal) => {
                eprintln!("; could not load {}: {signal:?}", path.display());
                std::process::exit(1);
            }
        }
    }

    if args.no_repl {
        return;
    }

    let code = repl::run_repl(&mut interp);
    std::process::exit(code);
}
