// ident.rs
//
// Namespaced identifiers (`Outer::Inner::name`) used as symbol table keys.

use smallvec::SmallVec;

use crate::{Interner, Symbol};

/// A `::`-separated identifier. The root namespace is the empty identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NamespacedIdentifier {
    segments: SmallVec<[Symbol; 2]>,
}

impl NamespacedIdentifier {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn single(sym: Symbol) -> Self {
        let mut segments = SmallVec::new();
        segments.push(sym);
        Self { segments }
    }

    pub fn from_segments(segments: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_qualified(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn segments(&self) -> &[Symbol] {
        &self.segments
    }

    /// Last segment, `None` for the root namespace.
    pub fn name(&self) -> Option<Symbol> {
        self.segments.last().copied()
    }

    /// Identifier of the enclosing namespace.
    pub fn parent(&self) -> NamespacedIdentifier {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    pub fn child(&self, sym: Symbol) -> NamespacedIdentifier {
        let mut segments = self.segments.clone();
        segments.push(sym);
        Self { segments }
    }

    /// Append a (possibly qualified) relative path.
    pub fn join(&self, other: &NamespacedIdentifier) -> NamespacedIdentifier {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().copied());
        Self { segments }
    }

    /// True if `self` equals `prefix` or lives below it.
    pub fn starts_with(&self, prefix: &NamespacedIdentifier) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    pub fn display(&self, interner: &Interner) -> String {
        let parts: Vec<&str> = self.segments.iter().map(|s| interner.resolve(*s)).collect();
        parts.join("::")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_and_child_round_out() {
        let mut interner = Interner::new();
        let dsp = interner.intern("Dsp");
        let gain = interner.intern("gain");

        let ns = NamespacedIdentifier::single(dsp);
        let id = ns.child(gain);
        assert!(id.is_qualified());
        assert_eq!(id.parent(), ns);
        assert_eq!(id.name(), Some(gain));
        assert!(id.starts_with(&ns));
        assert!(!ns.starts_with(&id));
        assert_eq!(id.display(&interner), "Dsp::gain");
    }

    #[test]
    fn root_is_empty() {
        let root = NamespacedIdentifier::root();
        assert!(root.is_root());
        assert_eq!(root.name(), None);
        assert_eq!(root.parent(), root);
    }
}
