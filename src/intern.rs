//! Interning for the stropped source vocabulary.
//!
//! Identifier tags, bold words, operator marks, and string denotation
//! bodies all share one text pool; a [`Symbol`] is an index into it, so
//! symbol comparison never touches the text again. Upper stropping is
//! preserved: `ABS` and `abs` are distinct symbols, and the pool can say
//! which spelling class an interned lexeme belongs to.
//!
//! Like the mode table, the pool is seeded at construction: the `=` mark,
//! which serves both as the declaration mark and as the equality operator,
//! is always [`Symbol::EQUALS`], so the parser can name it without
//! interning.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Interned identifier, bold word, operator mark, or string denotation
/// body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Symbol(u32);

impl Symbol {
    pub const EMPTY: Symbol = Symbol(0);
    /// The `=` mark, pre-interned: the declaration mark and the equality
    /// operator share it.
    pub const EQUALS: Symbol = Symbol(1);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Symbol pool: one contiguous text buffer with per-symbol extents, found
/// again through fingerprint buckets.
pub struct Interner {
    text: String,
    extents: Vec<(u32, u32)>,
    buckets: HashMap<u64, Vec<Symbol>>,
}

impl Interner {
    pub fn new() -> Self {
        let mut pool = Interner {
            text: String::new(),
            extents: Vec::new(),
            buckets: HashMap::new(),
        };
        // Seeding order fixes the well-known symbols above.
        pool.intern("");
        pool.intern("=");
        pool
    }

    fn fingerprint(s: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        let key = Self::fingerprint(s);
        if let Some(bucket) = self.buckets.get(&key) {
            for &sym in bucket {
                if self.resolve(sym) == s {
                    return sym;
                }
            }
        }
        let start = self.text.len() as u32;
        self.text.push_str(s);
        let sym = Symbol(self.extents.len() as u32);
        self.extents.push((start, self.text.len() as u32));
        self.buckets.entry(key).or_default().push(sym);
        sym
    }

    pub fn resolve(&self, sym: Symbol) -> &str {
        let (start, end) = self.extents[sym.index()];
        &self.text[start as usize..end as usize]
    }

    /// Look up an existing symbol without creating a new entry.
    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        let key = Self::fingerprint(s);
        self.buckets
            .get(&key)?
            .iter()
            .copied()
            .find(|&sym| self.resolve(sym) == s)
    }

    /// Is this lexeme upper-stropped — a bold word or bold operator, as
    /// against a lower-case tag or a worthy-character mark?
    pub fn is_bold(&self, sym: Symbol) -> bool {
        self.resolve(sym)
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.len() <= 2
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut pool = Interner::new();
        let s1 = pool.intern("upb");
        let s2 = pool.intern("upb");
        assert_eq!(s1, s2);
        assert_eq!(pool.resolve(s1), "upb");
    }

    #[test]
    fn distinct_lexemes_get_distinct_symbols() {
        let mut pool = Interner::new();
        assert_ne!(pool.intern("lwb"), pool.intern("upb"));
    }

    #[test]
    fn stropping_distinguishes_bold_words_from_tags() {
        let mut pool = Interner::new();
        let bold = pool.intern("ABS");
        let tag = pool.intern("abs");
        assert_ne!(bold, tag);
        assert!(pool.is_bold(bold));
        assert!(!pool.is_bold(tag));
    }

    #[test]
    fn operator_marks_are_not_bold() {
        let mut pool = Interner::new();
        let mark = pool.intern("+:=");
        assert!(!pool.is_bold(mark));
        assert_eq!(pool.resolve(mark), "+:=");
    }

    #[test]
    fn equals_mark_is_seeded() {
        let mut pool = Interner::new();
        assert_eq!(pool.intern("="), Symbol::EQUALS);
        assert_eq!(pool.resolve(Symbol::EQUALS), "=");
        // A freshly seeded pool holds nothing beyond the well-known marks.
        assert!(pool.is_empty());
        pool.intern("x");
        assert!(!pool.is_empty());
    }

    #[test]
    fn empty_symbol_resolves_to_empty_text() {
        let pool = Interner::new();
        assert_eq!(pool.resolve(Symbol::EMPTY), "");
        assert!(!pool.is_bold(Symbol::EMPTY));
    }

    #[test]
    fn lookup_does_not_insert() {
        let mut pool = Interner::new();
        assert!(pool.lookup("sema").is_none());
        let before = pool.len();
        let _ = pool.lookup("sema");
        assert_eq!(pool.len(), before);
        pool.intern("sema");
        assert!(pool.lookup("sema").is_some());
    }
}
