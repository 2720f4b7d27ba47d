// ABOUTME: Symbol interning and package hash tables (core §4.4)

use crate::heap::{Heap, IrefObject, PackageData, SymbolData, PACKAGE_HASH_BUCKETS};
use crate::value::{HeapIndex, Value};

/// The original's accumulator hash: shift left 4, XOR in the next byte, and
/// fold a nonzero top nibble back into the low bits. A classic "PJW-ish"
/// string hash, kept bit-for-bit so `hash(name) mod 1021` matches the
/// original's bucket choice exactly (testable property, spec §8).
pub fn hash(name: &str) -> u32 {
    let mut h: u32 = 0;
    for byte in name.bytes() {
        h = (h << 4).wrapping_add(byte as u32);
        let top = h & 0xf000_0000;
        if top != 0 {
            h ^= top >> 24;
            h &= !top;
        }
    }
    h
}

pub fn bucket_of(name: &str) -> usize {
    (hash(name) % PACKAGE_HASH_BUCKETS as u32) as usize
}

/// Creates a fresh, empty package and returns its iref index.
pub fn make_package(heap: &mut Heap, name: &str) -> HeapIndex {
    match heap.make_iref(IrefObject::Package(PackageData::new(name.to_string()))) {
        Value::Iref(idx) => idx,
        _ => unreachable!(),
    }
}

fn find_in_chains(heap: &Heap, chains: &[Vec<HeapIndex>], bucket: usize, name: &str) -> Option<HeapIndex> {
    chains[bucket].iter().copied().find(|&sym_idx| {
        matches!(heap.irefs.get(sym_idx), IrefObject::Symbol(s) if s.name == name)
    })
}

/// Looks up `name` in `package`'s external then internal tables without
/// interning a new symbol on miss.
pub fn find_symbol(heap: &Heap, package: HeapIndex, name: &str) -> Option<HeapIndex> {
    let bucket = bucket_of(name);
    let pkg = match heap.irefs.get(package) {
        IrefObject::Package(p) => p,
        _ => return None,
    };
    find_in_chains(heap, &pkg.external, bucket, name)
        .or_else(|| find_in_chains(heap, &pkg.internal, bucket, name))
}

/// Interns `name` into `package`: returns the existing symbol if found in
/// either table, otherwise allocates a fresh one and prepends it to the
/// internal chain for `hash(name) mod 1021` (§4.4).
pub fn intern(heap: &mut Heap, package: HeapIndex, name: &str) -> HeapIndex {
    if let Some(existing) = find_symbol(heap, package, name) {
        return existing;
    }

    let mut data = SymbolData::new(name.to_string());
    data.package = Some(package);
    let sym_value = heap.make_iref(IrefObject::Symbol(data));
    let sym_idx = match sym_value {
        Value::Iref(i) => i,
        _ => unreachable!(),
    };

    let bucket = bucket_of(name);
    match heap.irefs.get_mut(package) {
        IrefObject::Package(p) => p.internal[bucket].push(sym_idx),
        _ => unreachable!("intern called with a non-package heap index"),
    }
    sym_idx
}

/// Interns into the external table directly; used for keyword-package
/// symbols, which the reader always treats as externally visible.
pub fn intern_external(heap: &mut Heap, package: HeapIndex, name: &str) -> HeapIndex {
    if let Some(existing) = find_symbol(heap, package, name) {
        return existing;
    }
    let mut data = SymbolData::new(name.to_string());
    data.package = Some(package);
    let sym_value = heap.make_iref(IrefObject::Symbol(data));
    let sym_idx = match sym_value {
        Value::Iref(i) => i,
        _ => unreachable!(),
    };
    let bucket = bucket_of(name);
    match heap.irefs.get_mut(package) {
        IrefObject::Package(p) => p.external[bucket].push(sym_idx),
        _ => unreachable!(),
    }
    sym_idx
}

pub fn symbol_name(heap: &Heap, sym: HeapIndex) -> &str {
    match heap.irefs.get(sym) {
        IrefObject::Symbol(s) => &s.name,
        _ => panic!("not a symbol"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_bucketed() {
        let h1 = hash("FOO");
        let h2 = hash("FOO");
        assert_eq!(h1, h2);
        assert!(bucket_of("FOO") < PACKAGE_HASH_BUCKETS);
    }

    #[test]
    fn interning_is_idempotent() {
        let mut heap = Heap::new(1 << 20);
        let pkg = make_package(&mut heap, "TEST");
        let a = intern(&mut heap, pkg, "FOO");
        let b = intern(&mut heap, pkg, "FOO");
        assert_eq!(a, b);
        let c = intern(&mut heap, pkg, "BAR");
        assert_ne!(a, c);
    }

    #[test]
    fn interned_symbol_lands_in_its_hash_bucket() {
        let mut heap = Heap::new(1 << 20);
        let pkg = make_package(&mut heap, "TEST");
        let sym = intern(&mut heap, pkg, "QUUX");
        let bucket = bucket_of("QUUX");
        let pkg_data = match heap.irefs.get(pkg) {
            IrefObject::Package(p) => p,
            _ => unreachable!(),
        };
        assert!(pkg_data.internal[bucket].contains(&sym));
    }

    #[test]
    fn external_intern_is_found_by_plain_find() {
        let mut heap = Heap::new(1 << 20);
        let pkg = make_package(&mut heap, "KEYWORD");
        let sym = intern_external(&mut heap, pkg, "FOO");
        assert_eq!(find_symbol(&heap, pkg, "FOO"), Some(sym));
    }
}
