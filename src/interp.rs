// ABOUTME: The central interpreter state and allocate-with-collection protocol (core §4.1, §4.2, §4.4)
//
// The original keeps its heap, register file, and package list as file-scope
// globals that every primitive reaches into directly. Bundling them into one
// `Interp` struct instead keeps the same single-threaded, single-owner shape
// (§5: no concurrency, no reentrancy) while letting ordinary borrow checking
// stand in for the original's "don't call anything reentrant while a global
// is mid-update" discipline.

use crate::control::DynamicEnv;
use crate::env::{LexEnvRef, LexFrame};
use crate::error::{Fatal, Signal};
use crate::heap::{Heap, IrefObject, JrefObject, StandardStreamKind, SymbolData};
use crate::stack::Stack;
use crate::symbol;
use crate::value::{HeapIndex, Value};

pub const KEYWORD_PACKAGE_NAME: &str = "KEYWORD";
pub const LISP_PACKAGE_NAME: &str = "LISP";

pub struct Interp {
    pub heap: Heap,
    pub stack: Stack,
    pub dynamic: DynamicEnv,
    /// The `*PACKAGES*` registry: every package ever created, in creation
    /// order, so FIND-PACKAGE/LIST-ALL-PACKAGES can enumerate them.
    pub packages: Vec<HeapIndex>,
    pub current_package: HeapIndex,
    pub keyword_package: HeapIndex,
    /// The most recent form's full value list (§4.6's "multiple values"):
    /// an empty vec means `(values)`, a single-element vec is the ordinary
    /// one-value case every ordinary form produces.
    pub last_values: Vec<Value>,
    /// Root lexical frame. Ordinarily empty: top-level bindings live in
    /// symbol cells, not here, but it anchors the parent chain every
    /// closure and LET eventually bottoms out at.
    pub global_env: LexEnvRef,
    pub t_symbol: HeapIndex,
    /// Monotonic counter behind `GENSYM` (§4.8): each call mints `G<n>` and
    /// bumps this, so two gensyms never collide within a session.
    pub gensym_counter: u64,
}

/// How many times allocation retries a collection before giving up and
/// reporting `Fatal::OutOfMemory` (§4.1/§4.2/§7: "triple retry... abort the
/// process with an out-of-memory fatal").
const ALLOC_RETRY_ATTEMPTS: usize = 3;

impl Interp {
    pub fn boot(word_budget: usize) -> Self {
        let mut heap = Heap::new(word_budget);
        let keyword_package = symbol::make_package(&mut heap, KEYWORD_PACKAGE_NAME);
        let lisp_package = symbol::make_package(&mut heap, LISP_PACKAGE_NAME);

        let mut interp = Interp {
            heap,
            stack: Stack::new(),
            dynamic: DynamicEnv::new(),
            packages: vec![keyword_package, lisp_package],
            current_package: lisp_package,
            keyword_package,
            last_values: Vec::new(),
            global_env: LexFrame::root(),
            t_symbol: 0,
            gensym_counter: 0,
        };

        let t_symbol = symbol::intern_external(&mut interp.heap, lisp_package, "T");
        if let IrefObject::Symbol(data) = interp.heap.irefs.get_mut(t_symbol) {
            data.special = true;
            data.constant = true;
            data.value = Some(Value::Iref(t_symbol));
        }
        interp.t_symbol = t_symbol;

        interp.install_standard_streams();
        crate::builtins::install(&mut interp);
        interp
    }

    /// Binds `*STANDARD-INPUT*`, `*STANDARD-OUTPUT*`, `*ERROR-OUTPUT*`, and
    /// `*PACKAGES*` as special variables at boot, per spec §6's "process-wide
    /// state ... must be installed as special variables at boot."
    fn install_standard_streams(&mut self) {
        let stdin = self.heap.make_jref(JrefObject::StandardStream(StandardStreamKind::Stdin));
        let stdout = self.heap.make_jref(JrefObject::StandardStream(StandardStreamKind::Stdout));
        let stderr = self.heap.make_jref(JrefObject::StandardStream(StandardStreamKind::Stderr));
        self.bind_special("*STANDARD-INPUT*", stdin);
        self.bind_special("*STANDARD-OUTPUT*", stdout);
        self.bind_special("*ERROR-OUTPUT*", stderr);

        let package_values: Vec<Value> = self.packages.iter().map(|p| Value::Iref(*p)).collect();
        let packages_list = self.heap.vec_to_list(&package_values);
        self.bind_special("*PACKAGES*", packages_list);
    }

    fn bind_special(&mut self, name: &str, value: Value) {
        let sym = symbol::intern_external(&mut self.heap, self.current_package, name);
        if let IrefObject::Symbol(data) = self.heap.irefs.get_mut(sym) {
            data.special = true;
            data.value = Some(value);
        }
    }

    pub fn t_value(&self) -> Value {
        Value::Iref(self.t_symbol)
    }

    /// Interns `name` into the current package, the path every reader symbol
    /// token goes through (§4.4).
    pub fn intern(&mut self, name: &str) -> HeapIndex {
        symbol::intern(&mut self.heap, self.current_package, name)
    }

    /// Interns into the keyword package. Per §4.4, keyword symbols are
    /// self-evaluating: the value cell is set to the symbol itself at
    /// intern time, not left unbound.
    pub fn intern_keyword(&mut self, name: &str) -> HeapIndex {
        let sym = symbol::intern_external(&mut self.heap, self.keyword_package, name);
        if let IrefObject::Symbol(s) = self.heap.irefs.get_mut(sym) {
            if s.value.is_none() {
                s.value = Some(Value::Iref(sym));
            }
        }
        sym
    }

    /// Allocates a cons cell, retrying a collection up to
    /// `ALLOC_RETRY_ATTEMPTS` times if the heap is over budget before
    /// falling through to `Fatal::OutOfMemory` (§4.1/§4.2/§7).
    pub fn alloc_cons(&mut self, car: Value, cdr: Value) -> Result<Value, Signal> {
        self.collect_if_over_budget()?;
        Ok(self.heap.cons(car, cdr))
    }

    pub fn alloc_iref(&mut self, obj: IrefObject) -> Result<Value, Signal> {
        self.collect_if_over_budget()?;
        Ok(self.heap.make_iref(obj))
    }

    pub fn alloc_jref(&mut self, obj: crate::heap::JrefObject) -> Result<Value, Signal> {
        self.collect_if_over_budget()?;
        Ok(self.heap.make_jref(obj))
    }

    fn collect_if_over_budget(&mut self) -> Result<(), Signal> {
        if !self.heap.is_over_budget() {
            return Ok(());
        }
        for _ in 0..ALLOC_RETRY_ATTEMPTS {
            crate::gc::collect(self);
            if !self.heap.is_over_budget() {
                return Ok(());
            }
        }
        Err(Signal::Fatal(Fatal::OutOfMemory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_creates_keyword_and_lisp_packages() {
        let interp = Interp::boot(1 << 20);
        assert_eq!(interp.packages.len(), 2);
        assert_eq!(interp.current_package, interp.packages[1]);
    }

    #[test]
    fn standard_streams_and_packages_are_bound_as_specials_at_boot() {
        let mut interp = Interp::boot(1 << 20);
        for name in ["*STANDARD-INPUT*", "*STANDARD-OUTPUT*", "*ERROR-OUTPUT*", "*PACKAGES*"] {
            let sym = interp.intern(name);
            match interp.heap.irefs.get(sym) {
                IrefObject::Symbol(s) => {
                    assert!(s.special, "{name} should be declared special");
                    assert!(s.value.is_some(), "{name} should have a boot-time value");
                }
                _ => panic!("{name} should be a symbol"),
            }
        }
    }

    #[test]
    fn t_is_self_evaluating_and_constant() {
        let interp = Interp::boot(1 << 20);
        match interp.heap.irefs.get(interp.t_symbol) {
            IrefObject::Symbol(s) => {
                assert!(s.special);
                assert!(s.constant);
                assert_eq!(s.value, Some(Value::Iref(interp.t_symbol)));
            }
            _ => panic!("T should be a symbol"),
        }
    }

    #[test]
    fn alloc_cons_succeeds_under_budget() {
        let mut interp = Interp::boot(1 << 20);
        let v = interp.alloc_cons(Value::Fixnum(1), Value::Nil).unwrap();
        assert_eq!(interp.heap.car(v), Value::Fixnum(1));
    }

    #[test]
    fn alloc_over_budget_collects_then_succeeds_if_garbage_exists() {
        let mut interp = Interp::boot(16);
        // Allocate some garbage no root keeps alive.
        for _ in 0..4 {
            interp.heap.cons(Value::Fixnum(0), Value::Nil);
        }
        let result = interp.alloc_cons(Value::Fixnum(99), Value::Nil);
        assert!(result.is_ok());
    }
}
