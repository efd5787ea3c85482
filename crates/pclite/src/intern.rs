//! String interning for identifier and import-path names.
//!
//! Mirrors the interner pattern used elsewhere in this compiler family: a flat
//! vector of owned strings plus a hash map for dedup, returning a small `Copy`
//! id instead of cloning strings at every reference site.

use ahash::AHashMap;

/// Index into an [`Interner`]'s storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StringId(u32);

#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<String>,
    map: AHashMap<String, StringId>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(s.to_owned());
        self.map.insert(s.to_owned(), id);
        id
    }

    /// # Panics
    /// Panics if `id` was not produced by this interner.
    #[must_use]
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_string_returns_same_id() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("foo");
        let c = interner.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.get(a), "foo");
        assert_eq!(interner.get(c), "bar");
    }
}
