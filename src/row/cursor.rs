use std::sync::Arc;

use smol_str::SmolStr;

use crate::layout::{Layout, LayoutType, ScopeType, StringToken, TypeArgumentList};

/// Position within one scope of a row.
///
/// A cursor holds offsets, not bytes. Any mutation that shifts bytes at or
/// before those offsets leaves every cursor except the one passed to the
/// mutating call pointing at stale positions.
#[derive(Debug, Clone)]
pub struct RowCursor {
    pub(crate) layout: Arc<Layout>,
    pub(crate) scope_type: ScopeType,
    pub(crate) scope_type_args: TypeArgumentList,
    pub(crate) immutable: bool,
    /// Admit writes into a set/map scope; uniqueness is checked by a later rebuild.
    pub(crate) defer_unique_index: bool,
    /// First byte of the scope's content (the count prefix for typed collections).
    pub(crate) start: usize,
    pub(crate) exists: bool,
    pub(crate) write_path: Option<SmolStr>,
    pub(crate) write_path_token: Option<StringToken>,
    pub(crate) path_offset: usize,
    pub(crate) path_token: u64,
    pub(crate) meta_offset: usize,
    pub(crate) cell_type: Option<LayoutType>,
    pub(crate) cell_type_args: TypeArgumentList,
    pub(crate) value_offset: usize,
    /// One past the current field, when known.
    pub(crate) end_offset: Option<usize>,
    pub(crate) count: usize,
    pub(crate) index: usize,
}

impl RowCursor {
    pub(crate) fn new_scope(
        layout: Arc<Layout>,
        scope_type: ScopeType,
        scope_type_args: TypeArgumentList,
        immutable: bool,
        start: usize,
        meta_offset: usize,
    ) -> Self {
        Self {
            layout,
            scope_type,
            scope_type_args,
            immutable,
            defer_unique_index: false,
            start,
            exists: false,
            write_path: None,
            write_path_token: None,
            path_offset: 0,
            path_token: 0,
            meta_offset,
            cell_type: None,
            cell_type_args: TypeArgumentList::empty(),
            value_offset: meta_offset,
            end_offset: None,
            count: 0,
            index: 0,
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Accessors
    // ════════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    #[inline]
    pub fn scope_type(&self) -> ScopeType {
        self.scope_type
    }

    #[inline]
    pub fn scope_type_args(&self) -> &TypeArgumentList {
        &self.scope_type_args
    }

    #[inline]
    pub fn immutable(&self) -> bool {
        self.immutable
    }

    #[inline]
    pub fn defer_unique_index(&self) -> bool {
        self.defer_unique_index
    }

    pub fn set_defer_unique_index(&mut self, defer: bool) {
        self.defer_unique_index = defer;
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Whether the cursor addresses a field, as opposed to an insertion point.
    #[inline]
    pub fn exists(&self) -> bool {
        self.exists
    }

    #[inline]
    pub fn write_path(&self) -> Option<&str> {
        self.write_path.as_deref()
    }

    #[inline]
    pub fn write_path_token(&self) -> Option<&StringToken> {
        self.write_path_token.as_ref()
    }

    #[inline]
    pub fn path_offset(&self) -> usize {
        self.path_offset
    }

    #[inline]
    pub fn path_token(&self) -> u64 {
        self.path_token
    }

    #[inline]
    pub fn meta_offset(&self) -> usize {
        self.meta_offset
    }

    /// `Some(LayoutType::EndScope)` once the scope is exhausted.
    #[inline]
    pub fn cell_type(&self) -> Option<LayoutType> {
        self.cell_type
    }

    #[inline]
    pub fn cell_type_args(&self) -> &TypeArgumentList {
        &self.cell_type_args
    }

    #[inline]
    pub fn value_offset(&self) -> usize {
        self.value_offset
    }

    #[inline]
    pub fn end_offset(&self) -> Option<usize> {
        self.end_offset
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Move every absolute offset by `delta` after bytes ahead of the cursor shifted.
    pub(crate) fn shift_offsets(&mut self, delta: isize) {
        let shift = |offset: usize| offset.wrapping_add_signed(delta);
        self.meta_offset = shift(self.meta_offset);
        self.value_offset = shift(self.value_offset);
        self.path_offset = shift(self.path_offset);
        self.end_offset = self.end_offset.map(shift);
    }
}
