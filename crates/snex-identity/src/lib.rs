// src/lib.rs
//
// Foundational identity primitives shared by every stage of the SNEX pipeline:
// source spans, interned symbols and namespaced identifiers.

mod ident;
mod intern;
mod span;

pub use ident::NamespacedIdentifier;
pub use intern::Interner;
pub use span::Span;

/// Interned string handle. Equality is index equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}
