use std::cmp::Ordering;

use tracing::{debug, trace};

use super::buffer::RowBuffer;
use super::cursor::RowCursor;
use crate::error::{Result, RowError};
use crate::layout::{LayoutType, ScopeKind, ScopeType, TypeArgument, TypeArgumentList};
use crate::types::*;

/// One element of a set or map, as seen by the unique index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueIndexItem {
    pub code: LayoutCode,
    pub meta_offset: usize,
    pub value_offset: usize,
    /// Encoded size, metadata included.
    pub size: usize,
}

impl UniqueIndexItem {
    #[inline]
    fn value_len(&self) -> usize {
        self.size - (self.value_offset - self.meta_offset)
    }
}

impl RowBuffer {
    // ════════════════════════════════════════════════════════════════════════
    // Ordering
    // ════════════════════════════════════════════════════════════════════════

    /// Total order of set elements: type code, then encoded value length, then
    /// the value bytes.
    pub fn compare_field_value(&self, left: &UniqueIndexItem, right: &UniqueIndexItem) -> Ordering {
        left.code
            .cmp(&right.code)
            .then_with(|| left.value_len().cmp(&right.value_len()))
            .then_with(|| {
                let l = &self.buf[left.value_offset..left.value_offset + left.value_len()];
                let r = &self.buf[right.value_offset..right.value_offset + right.value_len()];
                l.cmp(r)
            })
    }

    /// Order of map entries: by key alone, under [`RowBuffer::compare_field_value`].
    pub fn compare_key_value_field_value(
        &self,
        scope: &RowCursor,
        left: &UniqueIndexItem,
        right: &UniqueIndexItem,
    ) -> Ordering {
        let left_key = self.map_entry_key(scope, left);
        let right_key = self.map_entry_key(scope, right);
        self.compare_field_value(&left_key, &right_key)
    }

    /// The key field of a map entry.
    fn map_entry_key(&self, scope: &RowCursor, entry: &UniqueIndexItem) -> UniqueIndexItem {
        let mut key = RowCursor::new_scope(
            scope.layout.clone(),
            ScopeType::new(ScopeKind::TypedTuple),
            scope.scope_type_args.clone(),
            true,
            entry.value_offset,
            entry.value_offset,
        );
        key.count = 2;
        self.read_sparse_metadata(&mut key);
        self.unique_index_item(&key)
    }

    fn unique_index_item(&self, edit: &RowCursor) -> UniqueIndexItem {
        let Some(ty) = edit.cell_type else {
            panic!("no field at offset {} to index", edit.meta_offset);
        };
        UniqueIndexItem {
            code: ty.layout_code(),
            meta_offset: edit.meta_offset,
            value_offset: edit.value_offset,
            size: self.sparse_compute_size(edit),
        }
    }

    fn compare_unique_elements(
        &self,
        scope: &RowCursor,
        left: &UniqueIndexItem,
        right: &UniqueIndexItem,
    ) -> Ordering {
        if scope.scope_type.kind == ScopeKind::TypedMap {
            self.compare_key_value_field_value(scope, left, right)
        } else {
            self.compare_field_value(left, right)
        }
    }

    /// Copy of a set/map scope cursor positioned before its first element.
    fn rewind_unique_scope(&self, scope: &RowCursor) -> RowCursor {
        assert!(
            scope.scope_type.kind.is_unique(),
            "{:?} scopes have no unique index",
            scope.scope_type.kind
        );
        let mut dst = scope.clone();
        dst.meta_offset = scope.start + SIZE_PREFIX_LEN;
        dst.value_offset = dst.meta_offset;
        dst.end_offset = None;
        dst.index = 0;
        dst.count = self.read_at::<u32>(scope.start) as usize;
        dst.cell_type = None;
        dst.cell_type_args = TypeArgumentList::empty();
        dst.exists = false;
        dst
    }

    // ════════════════════════════════════════════════════════════════════════
    // Move into a set or map
    // ════════════════════════════════════════════════════════════════════════

    /// Sorted position of `src` within `scope`: on the equal element when one
    /// exists, otherwise on the first greater element or the end of the scope.
    pub fn prepare_sparse_move(&self, scope: &RowCursor, src: &RowCursor) -> RowCursor {
        let src_item = self.unique_index_item(src);
        let mut dst = self.rewind_unique_scope(scope);
        while self.sparse_iterator_move_next(&mut dst) {
            let item = self.unique_index_item(&dst);
            dst.end_offset = Some(item.meta_offset + item.size);
            let cmp = self.compare_unique_elements(scope, &src_item, &item);
            if cmp != Ordering::Greater {
                dst.exists = cmp == Ordering::Equal;
                return dst;
            }
        }
        dst
    }

    /// Move the field at `source` into its sorted place in `destination_scope`.
    ///
    /// The source field is deleted whether or not the move succeeds. With
    /// `Upsert` an equal element is replaced.
    pub fn typed_collection_move_field(
        &mut self,
        destination_scope: &mut RowCursor,
        source: &mut RowCursor,
        options: UpdateOptions,
    ) -> Result<()> {
        let Some(src_type) = source.cell_type.filter(|_| source.exists) else {
            return Err(RowError::NotFound);
        };
        let src_args = source.cell_type_args.clone();

        if let Err(e) = Self::check_move_target(destination_scope, src_type, &src_args, options) {
            self.remove_sparse(source)?;
            return Err(e);
        }

        let mut dst = self.prepare_sparse_move(destination_scope, source);
        let conflict = match options {
            UpdateOptions::Update if !dst.exists => Some(RowError::NotFound),
            UpdateOptions::Insert if dst.exists => Some(RowError::Exists),
            _ => None,
        };
        if let Some(e) = conflict {
            self.remove_sparse(source)?;
            return Err(e);
        }

        let src_size = self.sparse_compute_size(source);
        let value_bytes = src_size - (source.value_offset - source.meta_offset);

        let before = self.len();
        let (meta_bytes, space_needed) =
            self.ensure_sparse(&mut dst, src_type, &src_args, value_bytes, options.into())?;
        let shift = self.len() as isize - before as isize;
        self.write_sparse_metadata(&mut dst, src_type, &src_args, meta_bytes);
        if source.start >= dst.meta_offset {
            source.start = source.start.wrapping_add_signed(shift);
        }
        if source.meta_offset >= dst.meta_offset {
            source.shift_offsets(shift);
        }
        self.buf.copy_within(
            source.value_offset..source.value_offset + value_bytes,
            dst.value_offset,
        );
        dst.end_offset = Some(dst.meta_offset + space_needed);

        let source_meta = source.meta_offset;
        self.remove_sparse(source)?;
        if source_meta < destination_scope.start {
            destination_scope.start -= src_size;
            destination_scope.shift_offsets(-(src_size as isize));
        }
        destination_scope.count = dst.count;

        trace!(
            kind = ?destination_scope.scope_type.kind,
            count = dst.count,
            value_bytes,
            "moved field into unique scope"
        );
        Ok(())
    }

    fn check_move_target(
        scope: &RowCursor,
        src_type: LayoutType,
        src_args: &TypeArgumentList,
        options: UpdateOptions,
    ) -> Result<()> {
        if scope.immutable {
            return Err(RowError::InsufficientPermissions);
        }
        let compatible = match scope.scope_type.kind {
            ScopeKind::TypedSet => TypeArgument::with_args(src_type, src_args.clone())
                .is_compatible(&scope.scope_type_args[0]),
            ScopeKind::TypedMap => {
                matches!(
                    src_type.as_scope(),
                    Some(ScopeType { kind: ScopeKind::TypedTuple, .. })
                ) && src_args == &scope.scope_type_args
            }
            kind => panic!("{kind:?} scopes have no unique index"),
        };
        if !compatible || options == UpdateOptions::InsertAt {
            return Err(RowError::TypeConstraint);
        }
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════════
    // Rebuild
    // ════════════════════════════════════════════════════════════════════════

    /// Sort the elements of a set or map written with `defer_unique_index`.
    ///
    /// Fails with `Exists` on a duplicate, leaving the scope unchanged.
    pub fn typed_collection_unique_index_rebuild(&mut self, scope: &RowCursor) -> Result<()> {
        let mut dst = self.rewind_unique_scope(scope);
        if dst.count <= 1 {
            return Ok(());
        }

        let mut items = Vec::with_capacity(dst.count);
        while self.sparse_iterator_move_next(&mut dst) {
            let item = self.unique_index_item(&dst);
            dst.end_offset = Some(item.meta_offset + item.size);
            items.push(item);
        }
        let first = scope.start + SIZE_PREFIX_LEN;
        let end = dst.meta_offset;

        // Insertion sort, scanning back from each new element.
        for i in 1..items.len() {
            let item = items[i];
            let mut j = i;
            while j > 0 {
                match self.compare_unique_elements(scope, &items[j - 1], &item) {
                    Ordering::Equal => {
                        debug!(
                            start = scope.start,
                            index = j - 1,
                            "duplicate element in unique scope"
                        );
                        return Err(RowError::Exists);
                    }
                    Ordering::Less => break,
                    Ordering::Greater => {
                        items[j] = items[j - 1];
                        j -= 1;
                    }
                }
            }
            items[j] = item;
        }

        let scratch = self.buf[first..end].to_vec();
        let mut offset = first;
        for item in &items {
            let src = item.meta_offset - first;
            self.buf[offset..offset + item.size].copy_from_slice(&scratch[src..src + item.size]);
            offset += item.size;
        }
        debug_assert_eq!(offset, end, "rebuild rewrote the whole scope");
        Ok(())
    }
}
