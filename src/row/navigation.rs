use smol_str::SmolStr;

use super::buffer::RowBuffer;
use super::cursor::RowCursor;
use crate::layout::{LayoutType, StringToken};

impl RowCursor {
    // ════════════════════════════════════════════════════════════════════════
    // Navigation
    // ════════════════════════════════════════════════════════════════════════

    /// Advance to the next field. `false` once the scope is exhausted.
    pub fn move_next(&mut self, row: &RowBuffer) -> bool {
        row.sparse_iterator_move_next(self)
    }

    /// Scan the rest of an object or schema scope for `path`.
    ///
    /// Either way the cursor is left ready to write `path`: on the field when
    /// found, at the end of the scope otherwise. The write path takes the
    /// layout's token for `path` when one is interned.
    pub fn find(&mut self, row: &RowBuffer, path: &str) -> bool {
        debug_assert!(
            !self.scope_type.kind.is_indexed(),
            "find in an indexed {:?} scope",
            self.scope_type.kind
        );
        if self.cell_type != Some(LayoutType::EndScope) {
            while row.sparse_iterator_move_next(self) {
                if row.sparse_path_equals(self, path) {
                    break;
                }
            }
        }
        self.write_path = Some(SmolStr::new(path));
        self.write_path_token = self.layout.tokenizer().find_token(path).cloned();
        self.exists
    }

    /// [`RowCursor::find`] by a token of the layout's tokenizer.
    pub fn find_token(&mut self, row: &RowBuffer, token: &StringToken) -> bool {
        debug_assert!(
            !self.scope_type.kind.is_indexed(),
            "find in an indexed {:?} scope",
            self.scope_type.kind
        );
        if self.cell_type != Some(LayoutType::EndScope) {
            while row.sparse_iterator_move_next(self) {
                if self.path_token == token.id {
                    break;
                }
            }
        }
        self.write_path = Some(token.path.clone());
        self.write_path_token = Some(token.clone());
        self.exists
    }

    /// Position an indexed scope's cursor at element `index`, or at the end of
    /// the scope if it has fewer elements.
    pub fn move_to(&mut self, row: &RowBuffer, index: usize) -> bool {
        debug_assert!(
            self.scope_type.kind.is_indexed(),
            "move_to in a path-addressed {:?} scope",
            self.scope_type.kind
        );
        if self.cell_type.is_none() && !row.sparse_iterator_move_next(self) {
            return false;
        }
        while self.index < index {
            if !row.sparse_iterator_move_next(self) {
                break;
            }
        }
        self.exists
    }

    /// Step past `child`, a scope nested at this cursor's current field.
    /// Exhausts `child` and records where the next field starts.
    pub fn skip(&mut self, row: &RowBuffer, child: &mut RowCursor) {
        self.end_offset = Some(row.skip_scope(child));
    }

    /// Copy of this cursor that rejects writes.
    pub fn as_read_only(&self) -> RowCursor {
        let mut cursor = self.clone();
        cursor.immutable = true;
        cursor
    }
}
