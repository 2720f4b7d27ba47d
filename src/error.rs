// ABOUTME: The fixed failure taxonomy routed to the break loop (core §7)

use crate::control::Unwind;
use crate::value::Value;
use thiserror::Error;

/// One of the ten failure kinds the original's `dbgr` dispatches on, each
/// carrying the single offending value the original passes alongside the
/// numeric kind.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum Failure {
    #[error("variable unbound: {0}")]
    VariableUnbound(Value),
    #[error("function unbound: {0}")]
    FunctionUnbound(Value),
    #[error("array index out of bounds: {0}")]
    IndexOutOfBounds(Value),
    #[error("go-tag not bound: {0}")]
    GoTagNotBound(Value),
    #[error("block name not bound: {0}")]
    BlockNameNotBound(Value),
    #[error("catch tag not dynamically bound: {0}")]
    CatchTagNotBound(Value),
    #[error("too many arguments")]
    TooManyArguments,
    #[error("too few arguments")]
    TooFewArguments,
    #[error("dynamic extent of block exited")]
    BlockExtentExited,
    #[error("dynamic extent of tagbody exited")]
    TagbodyExtentExited,
}

impl Failure {
    /// The fixed numeric kind from §7, used when invoking a user-installed
    /// handler function on `(kind, offender)`.
    pub fn kind(&self) -> u8 {
        match self {
            Failure::VariableUnbound(_) => 0,
            Failure::FunctionUnbound(_) => 1,
            Failure::IndexOutOfBounds(_) => 2,
            Failure::GoTagNotBound(_) => 3,
            Failure::BlockNameNotBound(_) => 4,
            Failure::CatchTagNotBound(_) => 5,
            Failure::TooManyArguments => 6,
            Failure::TooFewArguments => 7,
            Failure::BlockExtentExited => 8,
            Failure::TagbodyExtentExited => 9,
        }
    }

    /// The offending value carried by this failure, or NIL for the arity and
    /// dynamic-extent kinds that don't name a single value.
    pub fn offender(&self) -> Value {
        match self {
            Failure::VariableUnbound(v)
            | Failure::FunctionUnbound(v)
            | Failure::IndexOutOfBounds(v)
            | Failure::GoTagNotBound(v)
            | Failure::BlockNameNotBound(v)
            | Failure::CatchTagNotBound(v) => *v,
            _ => Value::Nil,
        }
    }
}

/// Unrecoverable process-terminating conditions (§7): printed to
/// `*ERROR-OUTPUT*` and followed by process exit, never routed through the
/// break loop or a user handler.
#[derive(Error, Debug, Clone)]
pub enum Fatal {
    #[error("out of memory: heap exhausted after retrying collection")]
    OutOfMemory,
    #[error("control stack exhausted")]
    StackExhausted,
    #[error("reader error: {0}")]
    ReadError(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// The error type threaded through every evaluator and builtin `Result`.
/// `Unwind` covers the recoverable non-local transfers (§4.7) including the
/// terminal `Failure` case routed to the break loop; `Fatal` covers the
/// process-terminating conditions that never reach a user handler.
/// `RuntimeError` is not part of the original's ten-kind taxonomy: the
/// original's untyped C casts have no safe equivalent, so builtins use this
/// to reject a wrong-typed or wrong-arity argument without inducing
/// undefined behavior. The break loop prints it like any other error but
/// does not offer it to a user-installed `(kind, offender)` handler.
#[derive(Debug, Clone)]
pub enum Signal {
    Unwind(Unwind),
    RuntimeError(String),
    Fatal(Fatal),
    /// Requested by `EXIT`/`QUIT` (§6): propagates past every CATCH/BLOCK/
    /// TAGBODY handler (none of them match a bare `Signal::Exit`) straight
    /// out to the REPL driver, which translates it into a process exit
    /// code. UNWIND-PROTECT cleanups still run on the way out, since
    /// `unwind_effects_to` pops pending dynamic records regardless of which
    /// `Signal` variant is in flight.
    Exit(i32),
}

impl Signal {
    pub fn runtime_error(msg: impl Into<String>) -> Signal {
        Signal::RuntimeError(msg.into())
    }
}

impl From<Failure> for Signal {
    fn from(f: Failure) -> Self {
        Signal::Unwind(Unwind::Failure(f))
    }
}

impl From<Unwind> for Signal {
    fn from(u: Unwind) -> Self {
        Signal::Unwind(u)
    }
}

impl From<Fatal> for Signal {
    fn from(f: Fatal) -> Self {
        Signal::Fatal(f)
    }
}
