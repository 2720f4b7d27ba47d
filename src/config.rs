// ABOUTME: Configuration and constants for the Lisp interpreter
// This module contains version info, welcome messages, and heap-sizing defaults.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const WELCOME_MESSAGE: &str = "Lisp evaluator core — mark-sweep heap, 22 special operators";
pub const WELCOME_SUBTITLE: &str = "Type a form and press Enter. Ctrl-D exits; (exit) or (quit) too.";

/// Default word budget for the managed heap (§4.1), used when `--heap-words`
/// is not given on the command line.
pub const DEFAULT_HEAP_WORDS: usize = 1 << 20;

/// Filename the REPL's line history is persisted to between sessions.
pub const HISTORY_FILE: &str = ".lisp_history";

#[allow(dead_code)]
pub const HELP_TEXT: &str = r#"
Available commands:
  (exit) or (quit)     - Exit the interpreter
  (gc)                 - Force a collection cycle

At the break loop (entered on an unhandled failure):
  a                     - abort to top level
  u <form>              - use a value in place of the failing expression
  r <form>              - return a value from the enclosing function
  <n>                   - re-scope the backtrace to frame n

Type any Lisp form to evaluate it.
"#;
