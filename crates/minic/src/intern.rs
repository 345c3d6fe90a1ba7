//! String interning for identifier names.
//!
//! The parser interns every identifier it sees and stores `StringId`s in the
//! AST instead of owned strings. During execution the interner is only
//! consulted when building error messages.

use ahash::AHashMap;

/// Index into the string interner's storage.
///
/// Uses `u32` to keep AST nodes small; ~4 billion unique identifiers is more
/// than sufficient for a single translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(u32);

impl StringId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Storage for interned identifier names.
///
/// Populated during parsing, then owned by the `Program` and shared with
/// every run of the executor.
#[derive(Debug, Default)]
pub struct Interns {
    strings: Vec<String>,
    ids: AHashMap<String, StringId>,
}

impl Interns {
    /// Interns a name, returning the existing id if it was seen before.
    pub fn intern(&mut self, name: &str) -> StringId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = StringId(u32::try_from(self.strings.len()).expect("interner overflow"));
        self.strings.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }

    /// Resolves an id back to the name it was interned from.
    pub fn resolve(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interns = Interns::default();
        let a = interns.intern("main");
        let b = interns.intern("fact");
        let c = interns.intern("main");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interns.resolve(a), "main");
        assert_eq!(interns.resolve(b), "fact");
    }
}
