//! Identifier interning.
//!
//! Every identifier that survives parsing (definition names, library names,
//! port and parameter names, hierarchical path segments) is interned once
//! into a compilation-owned [`Interner`] and carried around as a [`NameId`].
//! Registries and tries key on ids, so name comparison is an integer compare;
//! the actual text is only needed for diagnostics and the JSON dump.

use ahash::AHashMap;

/// Index into the interner's storage.
///
/// Uses `u32` to save space. This limits a compilation to ~4 billion unique
/// identifiers, which is more than sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NameId(u32);

impl NameId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owns the text of every interned identifier in one compilation.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, NameId>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text`, returning the existing id if it was seen before.
    pub fn intern(&mut self, text: &str) -> NameId {
        if let Some(&id) = self.lookup.get(text) {
            return id;
        }
        let id = NameId(u32::try_from(self.strings.len()).expect("interner overflow"));
        let boxed: Box<str> = text.into();
        self.strings.push(boxed.clone());
        self.lookup.insert(boxed, id);
        id
    }

    /// Returns the id for `text` if it has been interned, without inserting.
    #[must_use]
    pub fn get(&self, text: &str) -> Option<NameId> {
        self.lookup.get(text).copied()
    }

    /// Returns the text for an id.
    ///
    /// # Panics
    /// Panics if the id did not come from this interner.
    #[must_use]
    pub fn resolve(&self, id: NameId) -> &str {
        &self.strings[id.index()]
    }

    /// Number of distinct identifiers interned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let mut interner = Interner::new();
        let a = interner.intern("top");
        let b = interner.intern("mod");
        let a2 = interner.intern("top");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "top");
        assert_eq!(interner.resolve(b), "mod");
        assert_eq!(interner.len(), 2);
    }
}
