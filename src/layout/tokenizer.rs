use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::codec::{MAX_VARUINT_BYTES, varuint_bytes};

/// An interned path and its pre-encoded varuint id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringToken {
    pub id: u64,
    pub path: SmolStr,
    pub varint: ArrayVec<u8, MAX_VARUINT_BYTES>,
}

impl StringToken {
    fn new(id: u64, path: SmolStr) -> Self {
        Self {
            id,
            path,
            varint: varuint_bytes(id),
        }
    }
}

/// Bidirectional path ↔ token table of a layout.
///
/// The empty path is always token 0. Ids are dense, so `count()` is also the
/// first id a path outside the table would be written past.
#[derive(Debug, Clone)]
pub struct StringTokenizer {
    tokens: FxHashMap<SmolStr, StringToken>,
    strings: Vec<SmolStr>,
}

impl Default for StringTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTokenizer {
    pub fn new() -> Self {
        let mut tokenizer = Self {
            tokens: FxHashMap::default(),
            strings: Vec::new(),
        };
        tokenizer.add("");
        tokenizer
    }

    /// Intern `path`, returning its token. Adding a known path is a lookup.
    pub fn add(&mut self, path: &str) -> StringToken {
        if let Some(token) = self.tokens.get(path) {
            return token.clone();
        }
        let path = SmolStr::new(path);
        let token = StringToken::new(self.strings.len() as u64, path.clone());
        self.strings.push(path.clone());
        self.tokens.insert(path, token.clone());
        token
    }

    #[inline]
    pub fn find_token(&self, path: &str) -> Option<&StringToken> {
        self.tokens.get(path)
    }

    #[inline]
    pub fn find_string(&self, id: u64) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(SmolStr::as_str)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.strings.len()
    }
}
