use super::buffer::RowBuffer;
use super::cursor::RowCursor;
use crate::codec::{
    count_7bit_encoded, encode_varint, encode_varuint, length_prefix, rotate_sign_to_lsb,
    rotate_sign_to_msb, varuint_value,
};
use crate::error::{Result, RowError};
use crate::layout::{LayoutColumn, LayoutType, ScopeKind, SparsePrimitive, StorageKind};

impl RowBuffer {
    // ════════════════════════════════════════════════════════════════════════
    // Internal: column checks
    // ════════════════════════════════════════════════════════════════════════

    fn check_column(
        scope: &RowCursor,
        col: &LayoutColumn,
        storage: StorageKind,
        expected: LayoutType,
    ) -> Result<()> {
        assert_eq!(
            scope.scope_type.kind,
            ScopeKind::Udt,
            "schematized columns live in a schema scope"
        );
        assert_eq!(col.storage, storage, "column `{}` storage", col.path);
        if !col.ty.same_kind(expected) {
            return Err(RowError::TypeMismatch {
                expected: expected.layout_code(),
                actual: col.ty.layout_code(),
            });
        }
        Ok(())
    }

    fn check_column_write(
        scope: &RowCursor,
        col: &LayoutColumn,
        storage: StorageKind,
        expected: LayoutType,
    ) -> Result<()> {
        Self::check_column(scope, col, storage, expected)?;
        if scope.immutable {
            return Err(RowError::InsufficientPermissions);
        }
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════════
    // Fixed columns
    // ════════════════════════════════════════════════════════════════════════

    /// `NotFound` when the column's presence bit is clear.
    pub fn read_fixed_column<T: SparsePrimitive>(
        &self,
        scope: &RowCursor,
        col: &LayoutColumn,
    ) -> Result<T> {
        Self::check_column(scope, col, StorageKind::Fixed, T::LAYOUT_TYPE)?;
        if !self.read_bit(scope.start, col.null_bit) {
            return Err(RowError::NotFound);
        }
        Ok(self.read_at(scope.start + col.offset))
    }

    pub fn write_fixed_column<T: SparsePrimitive>(
        &mut self,
        scope: &RowCursor,
        col: &LayoutColumn,
        value: T,
    ) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Fixed, T::LAYOUT_TYPE)?;
        self.write_at(scope.start + col.offset, value);
        self.set_bit(scope.start, col.null_bit);
        Ok(())
    }

    pub fn read_fixed_bool(&self, scope: &RowCursor, col: &LayoutColumn) -> Result<bool> {
        Self::check_column(scope, col, StorageKind::Fixed, LayoutType::Boolean)?;
        if !self.read_bit(scope.start, col.null_bit) {
            return Err(RowError::NotFound);
        }
        Ok(self.read_bit(scope.start, col.bool_bit))
    }

    pub fn write_fixed_bool(
        &mut self,
        scope: &RowCursor,
        col: &LayoutColumn,
        value: bool,
    ) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Fixed, LayoutType::Boolean)?;
        if value {
            self.set_bit(scope.start, col.bool_bit);
        } else {
            self.unset_bit(scope.start, col.bool_bit);
        }
        self.set_bit(scope.start, col.null_bit);
        Ok(())
    }

    pub fn read_fixed_column_string(&self, scope: &RowCursor, col: &LayoutColumn) -> Result<&str> {
        Self::check_column(scope, col, StorageKind::Fixed, LayoutType::Utf8)?;
        if !self.read_bit(scope.start, col.null_bit) {
            return Err(RowError::NotFound);
        }
        self.read_fixed_string(scope.start + col.offset, col.size)
    }

    pub fn write_fixed_column_string(
        &mut self,
        scope: &RowCursor,
        col: &LayoutColumn,
        value: &str,
    ) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Fixed, LayoutType::Utf8)?;
        self.write_fixed_string(scope.start + col.offset, value, col.size)?;
        self.set_bit(scope.start, col.null_bit);
        Ok(())
    }

    pub fn read_fixed_column_binary(&self, scope: &RowCursor, col: &LayoutColumn) -> Result<&[u8]> {
        Self::check_column(scope, col, StorageKind::Fixed, LayoutType::Binary)?;
        if !self.read_bit(scope.start, col.null_bit) {
            return Err(RowError::NotFound);
        }
        Ok(self.read_fixed_binary(scope.start + col.offset, col.size))
    }

    pub fn write_fixed_column_binary(
        &mut self,
        scope: &RowCursor,
        col: &LayoutColumn,
        value: &[u8],
    ) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Fixed, LayoutType::Binary)?;
        self.write_fixed_binary(scope.start + col.offset, value, col.size)?;
        self.set_bit(scope.start, col.null_bit);
        Ok(())
    }

    /// Clear a nullable fixed column. Columns without a presence bit cannot be deleted.
    pub fn delete_fixed_column(&mut self, scope: &RowCursor, col: &LayoutColumn) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Fixed, col.ty)?;
        if col.null_bit.is_invalid() {
            return Err(RowError::TypeConstraint);
        }
        let offset = scope.start + col.offset;
        self.buf[offset..offset + col.size].fill(0);
        self.unset_bit(scope.start, col.bool_bit);
        self.unset_bit(scope.start, col.null_bit);
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════════
    // Variable columns
    // ════════════════════════════════════════════════════════════════════════

    /// Offset and encoded size of a present variable column, `None` if absent.
    fn variable_column_span(&self, scope: &RowCursor, col: &LayoutColumn) -> Option<(usize, usize)> {
        if !self.read_bit(scope.start, col.null_bit) {
            return None;
        }
        let offset = self.compute_variable_value_offset(&scope.layout, scope.start, col.index);
        let (len, prefix) = self.read_varuint_at(offset);
        let size = if col.ty.is_varint() {
            prefix
        } else {
            prefix + len as usize
        };
        Some((offset, size))
    }

    fn read_variable_column_bytes(&self, scope: &RowCursor, col: &LayoutColumn) -> Result<&[u8]> {
        let (offset, _) = self
            .variable_column_span(scope, col)
            .ok_or(RowError::NotFound)?;
        let (len, prefix) = self.read_varuint_at(offset);
        let start = offset + prefix;
        Ok(&self.buf[start..start + len as usize])
    }

    /// Replace the column's encoding with `encoded_len` bytes produced by
    /// `encode`, shifting the rest of the scope. The scope cursor is moved along.
    fn write_variable_column<F>(
        &mut self,
        scope: &mut RowCursor,
        col: &LayoutColumn,
        encoded_len: usize,
        encode: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut [u8]),
    {
        let offset = self.compute_variable_value_offset(&scope.layout, scope.start, col.index);
        let existing = self.variable_column_span(scope, col).map_or(0, |(_, size)| size);
        let shift = self.ensure_variable(offset, existing, encoded_len)?;
        encode(&mut self.buf[offset..offset + encoded_len]);
        self.set_bit(scope.start, col.null_bit);
        scope.shift_offsets(shift);
        Ok(())
    }

    fn write_variable_column_bytes(
        &mut self,
        scope: &mut RowCursor,
        col: &LayoutColumn,
        value: &[u8],
    ) -> Result<()> {
        if col.size > 0 && value.len() > col.size {
            return Err(RowError::TooBig {
                size: value.len(),
                max: col.size,
            });
        }
        let len = length_prefix(value.len())?;
        let prefix = count_7bit_encoded(len);
        self.write_variable_column(scope, col, prefix + value.len(), |dst| {
            encode_varuint(dst, len);
            dst[prefix..].copy_from_slice(value);
        })
    }

    pub fn read_variable_column_string(&self, scope: &RowCursor, col: &LayoutColumn) -> Result<&str> {
        Self::check_column(scope, col, StorageKind::Variable, LayoutType::Utf8)?;
        let raw = self.read_variable_column_bytes(scope, col)?;
        std::str::from_utf8(raw).map_err(|e| RowError::InvalidRow(e.to_string()))
    }

    pub fn write_variable_column_string(
        &mut self,
        scope: &mut RowCursor,
        col: &LayoutColumn,
        value: &str,
    ) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Variable, LayoutType::Utf8)?;
        self.write_variable_column_bytes(scope, col, value.as_bytes())
    }

    pub fn read_variable_column_binary(&self, scope: &RowCursor, col: &LayoutColumn) -> Result<&[u8]> {
        Self::check_column(scope, col, StorageKind::Variable, LayoutType::Binary)?;
        self.read_variable_column_bytes(scope, col)
    }

    pub fn write_variable_column_binary(
        &mut self,
        scope: &mut RowCursor,
        col: &LayoutColumn,
        value: &[u8],
    ) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Variable, LayoutType::Binary)?;
        self.write_variable_column_bytes(scope, col, value)
    }

    pub fn read_variable_column_varint(&self, scope: &RowCursor, col: &LayoutColumn) -> Result<i64> {
        Self::check_column(scope, col, StorageKind::Variable, LayoutType::VarInt)?;
        let (offset, _) = self
            .variable_column_span(scope, col)
            .ok_or(RowError::NotFound)?;
        let (raw, _) = self.read_varuint_at(offset);
        Ok(rotate_sign_to_msb(raw))
    }

    pub fn write_variable_column_varint(
        &mut self,
        scope: &mut RowCursor,
        col: &LayoutColumn,
        value: i64,
    ) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Variable, LayoutType::VarInt)?;
        let len = count_7bit_encoded(rotate_sign_to_lsb(value));
        self.write_variable_column(scope, col, len, |dst| {
            encode_varint(dst, value);
        })
    }

    pub fn read_variable_column_varuint(&self, scope: &RowCursor, col: &LayoutColumn) -> Result<u64> {
        Self::check_column(scope, col, StorageKind::Variable, LayoutType::VarUInt)?;
        let (offset, _) = self
            .variable_column_span(scope, col)
            .ok_or(RowError::NotFound)?;
        Ok(self.read_varuint_at(offset).0)
    }

    pub fn write_variable_column_varuint(
        &mut self,
        scope: &mut RowCursor,
        col: &LayoutColumn,
        value: u64,
    ) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Variable, LayoutType::VarUInt)?;
        let value = varuint_value(value)?;
        self.write_variable_column(scope, col, count_7bit_encoded(value), |dst| {
            encode_varuint(dst, value);
        })
    }

    /// Remove a variable column's value. Absent columns are left as they are.
    pub fn delete_variable_column(&mut self, scope: &mut RowCursor, col: &LayoutColumn) -> Result<()> {
        Self::check_column_write(scope, col, StorageKind::Variable, col.ty)?;
        let Some((offset, size)) = self.variable_column_span(scope, col) else {
            return Ok(());
        };
        let shift = self.ensure_variable(offset, size, 0)?;
        self.unset_bit(scope.start, col.null_bit);
        scope.shift_offsets(shift);
        Ok(())
    }
}
