//! Compiled schemas: column placement, presence bits and the path tokenizer.

pub mod builder;
pub mod layout_type;
pub mod resolver;
pub mod tokenizer;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub use builder::{ColumnDef, LayoutBuilder, SchemaDef, TypeDef};
pub use layout_type::{
    LayoutType, ScopeKind, ScopeType, SparsePrimitive, TypeArgument, TypeArgumentList,
};
pub use resolver::{LayoutResolver, LayoutResolverNamespace, NamespaceDef};
pub use tokenizer::{StringToken, StringTokenizer};

use crate::types::SchemaId;

// ─── Layout Bit ─────────────────────────────────────────────────────────────

/// Position of a flag in a scope's presence bitmask.
///
/// `LayoutBit::INVALID` marks a column with no flag: it reads as set and
/// writes to it are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutBit {
    index: i32,
}

impl LayoutBit {
    pub const INVALID: LayoutBit = LayoutBit { index: -1 };

    pub const fn new(index: u32) -> Self {
        Self {
            index: index as i32,
        }
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.index < 0
    }

    /// Absolute byte holding this bit, for a bitmask starting at `base`.
    #[inline]
    pub fn offset(self, base: usize) -> usize {
        base + (self.index as usize) / 8
    }

    #[inline]
    pub fn bit(self) -> u8 {
        (self.index as usize % 8) as u8
    }
}

// ─── Columns ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Fixed,
    Variable,
    Sparse,
}

#[derive(Debug, Clone)]
pub struct LayoutColumn {
    pub path: SmolStr,
    pub token: StringToken,
    pub ty: LayoutType,
    pub type_args: TypeArgumentList,
    pub storage: StorageKind,
    /// Position among the columns of the same storage kind.
    pub index: usize,
    /// Fixed columns: byte offset from the scope start. Zero otherwise.
    pub offset: usize,
    pub null_bit: LayoutBit,
    /// Value bit of a fixed boolean column.
    pub bool_bit: LayoutBit,
    /// Fixed columns: slot width. Variable columns: max length, 0 for unbounded.
    pub size: usize,
}

// ─── Layout ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Layout {
    pub(crate) name: SmolStr,
    pub(crate) schema_id: SchemaId,
    pub(crate) size: usize,
    pub(crate) num_bitmask_bytes: usize,
    pub(crate) num_fixed: usize,
    pub(crate) num_variable: usize,
    pub(crate) columns: Vec<LayoutColumn>,
    pub(crate) tokenizer: StringTokenizer,
    pub(crate) paths: FxHashMap<SmolStr, usize>,
}

impl Layout {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    /// Bytes of the fixed region, presence bitmask included.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn num_bitmask_bytes(&self) -> usize {
        self.num_bitmask_bytes
    }

    #[inline]
    pub fn num_fixed(&self) -> usize {
        self.num_fixed
    }

    #[inline]
    pub fn num_variable(&self) -> usize {
        self.num_variable
    }

    /// All columns: fixed, then variable, then sparse.
    #[inline]
    pub fn columns(&self) -> &[LayoutColumn] {
        &self.columns
    }

    #[inline]
    pub fn tokenizer(&self) -> &StringTokenizer {
        &self.tokenizer
    }

    pub fn try_find(&self, path: &str) -> Option<&LayoutColumn> {
        self.paths.get(path).map(|&i| &self.columns[i])
    }

    pub fn variable_columns(&self) -> &[LayoutColumn] {
        &self.columns[self.num_fixed..self.num_fixed + self.num_variable]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_bit_addressing() {
        let bit = LayoutBit::new(11);
        assert_eq!(bit.offset(100), 101);
        assert_eq!(bit.bit(), 3);
        assert!(!bit.is_invalid());
        assert!(LayoutBit::INVALID.is_invalid());
    }
}
