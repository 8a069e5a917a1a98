// intern.rs
//
// String interning for Symbol IDs.

use std::hash::BuildHasher;

use crate::Symbol;
use rustc_hash::FxBuildHasher;

/// Interns strings to unique Symbol IDs
#[derive(Debug, Clone)]
pub struct Interner {
    map: hashbrown::HashMap<String, Symbol, FxBuildHasher>,
    strings: Vec<String>,
}

impl Default for Interner {
    fn default() -> Self {
        Self {
            map: hashbrown::HashMap::with_hasher(FxBuildHasher),
            strings: Vec::new(),
        }
    }
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        use hashbrown::hash_map::RawEntryMut;

        let hash = self.map.hasher().hash_one(s);
        let entry = self.map.raw_entry_mut().from_hash(hash, |k| k == s);

        match entry {
            RawEntryMut::Occupied(e) => *e.get(),
            RawEntryMut::Vacant(e) => {
                let sym = Symbol::new(self.strings.len() as u32);
                let owned = s.to_string();
                self.strings.push(owned.clone());
                e.insert_hashed_nocheck(hash, owned, sym);
                sym
            }
        }
    }

    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.index() as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Look up a string without interning it.
    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        self.map.get(s).copied()
    }

    /// Names the language treats specially during resolution.
    pub fn seed_builtin_symbols(&mut self) {
        for name in [
            "int", "float", "double", "bool", "void", "auto", "block", "span", "dyn", "Math",
            "Host", "size", "input", "this",
        ] {
            let _ = self.intern(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_returns_same_symbol() {
        let mut interner = Interner::new();
        let s1 = interner.intern("processFrame");
        let s2 = interner.intern("processFrame");
        let s3 = interner.intern("processSample");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
    }

    #[test]
    fn lookup_does_not_intern() {
        let mut interner = Interner::new();
        assert!(interner.lookup("gain").is_none());
        let sym = interner.intern("gain");
        assert_eq!(interner.lookup("gain"), Some(sym));
        assert_eq!(interner.resolve(sym), "gain");
        assert_eq!(interner.len(), 1);
    }
}
