// ABOUTME: Dynamic environment and non-local exits (core §4.7, Design Notes §9)
//
// The original walks a singly-linked list of unwind records with `setjmp`/
// `longjmp`, running each intervening record's cleanup (a special-binding
// restore, an UNWIND-PROTECT body, or nothing for a stale marker) as it goes.
// Per the redesign note in spec §9, this becomes an explicit "unwind result"
// value threaded through the evaluator's `Result`, rather than a C
// `jmp_buf`. `Unwind` is that value; `DynamicEnv` is the record stack the
// evaluator walks to find where a GO/RETURN-FROM/THROW lands.

use crate::error::Failure;
use crate::value::{HeapIndex, Value};

pub type MarkerId = u64;

#[derive(Debug, Clone)]
pub enum DynRecord {
    /// A special variable's old value cell content, saved so it can be
    /// restored on any exit from the binding's scope.
    SpecialBinding { symbol: HeapIndex, saved: Option<Value> },
    /// An UNWIND-PROTECT cleanup form plus the environment to run it in.
    Cleanup { body: Value, env: crate::env::LexEnvRef },
    BlockMarker { id: MarkerId },
    CatchMarker { id: MarkerId, tag: Value },
    TagbodyMarker { id: MarkerId },
}

/// The stack of unwind records, walked from its head (top) down during a
/// non-local exit exactly as the original's singly-linked dynamic list is.
pub struct DynamicEnv {
    records: Vec<DynRecord>,
    next_marker: MarkerId,
}

impl DynamicEnv {
    pub fn new() -> Self {
        DynamicEnv { records: Vec::new(), next_marker: 1 }
    }

    pub fn fresh_marker(&mut self) -> MarkerId {
        let id = self.next_marker;
        self.next_marker += 1;
        id
    }

    pub fn push(&mut self, record: DynRecord) {
        self.records.push(record);
    }

    pub fn pop(&mut self) -> Option<DynRecord> {
        self.records.pop()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Roots for the collector: every value reachable directly from dynamic
    /// records (catch tags, cleanup/body forms held as data).
    pub fn for_each_root(&self, mut visit: impl FnMut(Value)) {
        for record in &self.records {
            match record {
                DynRecord::SpecialBinding { saved: Some(v), .. } => visit(*v),
                DynRecord::Cleanup { body, .. } => visit(*body),
                DynRecord::CatchMarker { tag, .. } => visit(*tag),
                _ => {}
            }
        }
    }

    /// Position (from the end) of the innermost still-active BLOCK/TAGBODY
    /// marker matching `id`, or `None` if its dynamic extent has already
    /// been exited (the stale-marker case in §4.7/§7).
    pub fn find_marker(&self, id: MarkerId) -> Option<usize> {
        self.records.iter().rposition(|r| {
            matches!(r,
                DynRecord::BlockMarker { id: m } | DynRecord::TagbodyMarker { id: m } if *m == id
            )
        })
    }

    /// Position (from the end) of the innermost CATCH whose tag is `eq` to
    /// `tag`, or `None` if nothing dynamically bound catches it.
    pub fn find_catch(&self, tag: Value) -> Option<usize> {
        self.records
            .iter()
            .rposition(|r| matches!(r, DynRecord::CatchMarker { tag: t, .. } if *t == tag))
    }

    pub fn record_at(&self, idx: usize) -> Option<&DynRecord> {
        self.records.get(idx)
    }
}

impl Default for DynamicEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// The non-local control transfer threaded through every `eval` call's
/// `Result::Err` arm. `Failure` is the terminal case routed to the break
/// loop (§4.7/§7); the other three carry a target marker that identifies
/// where unwinding should stop.
#[derive(Debug, Clone)]
pub enum Unwind {
    Failure(Failure),
    Go { marker: MarkerId, tag: Value },
    Return { marker: MarkerId, values: Vec<Value> },
    Throw { marker: MarkerId, tag: Value, values: Vec<Value> },
}

impl From<Failure> for Unwind {
    fn from(f: Failure) -> Self {
        Unwind::Failure(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_unique_and_increasing() {
        let mut dyn_env = DynamicEnv::new();
        let a = dyn_env.fresh_marker();
        let b = dyn_env.fresh_marker();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn find_marker_sees_innermost_first() {
        let mut dyn_env = DynamicEnv::new();
        dyn_env.push(DynRecord::BlockMarker { id: 1 });
        dyn_env.push(DynRecord::BlockMarker { id: 2 });
        assert_eq!(dyn_env.find_marker(2), Some(1));
        assert_eq!(dyn_env.find_marker(1), Some(0));
        assert_eq!(dyn_env.find_marker(99), None);
    }

    #[test]
    fn popped_marker_is_no_longer_found() {
        let mut dyn_env = DynamicEnv::new();
        dyn_env.push(DynRecord::TagbodyMarker { id: 5 });
        dyn_env.pop();
        assert_eq!(dyn_env.find_marker(5), None);
    }

    #[test]
    fn find_catch_matches_by_tag_value() {
        let mut dyn_env = DynamicEnv::new();
        dyn_env.push(DynRecord::CatchMarker { id: 1, tag: Value::Fixnum(42) });
        assert_eq!(dyn_env.find_catch(Value::Fixnum(42)), Some(0));
        assert_eq!(dyn_env.find_catch(Value::Fixnum(7)), None);
    }
}
