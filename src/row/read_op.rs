use smol_str::SmolStr;

use super::buffer::RowBuffer;
use super::cursor::RowCursor;
use crate::codec::rotate_sign_to_msb;
use crate::error::{Result, RowError};
use crate::layout::{
    LayoutType, ScopeKind, ScopeType, SparsePrimitive, TypeArgument, TypeArgumentList,
};
use crate::types::*;

impl RowBuffer {
    // ════════════════════════════════════════════════════════════════════════
    // Internal: type codes and type arguments
    // ════════════════════════════════════════════════════════════════════════

    /// Whether fields at the cursor's position carry no type code of their own.
    pub(crate) fn has_implicit_type_code(edit: &RowCursor) -> bool {
        let args = &edit.scope_type_args;
        match edit.scope_type.kind {
            ScopeKind::TypedArray | ScopeKind::TypedSet | ScopeKind::Nullable => {
                !args[0].ty.always_requires_type_code()
            }
            ScopeKind::TypedMap => true,
            ScopeKind::TypedTuple | ScopeKind::Tagged | ScopeKind::Tagged2 => {
                !args[edit.index].ty.always_requires_type_code()
            }
            ScopeKind::Object | ScopeKind::Array | ScopeKind::Tuple | ScopeKind::Udt => false,
        }
    }

    /// Type of the field at the cursor's position in a scope with implicit codes.
    fn set_implicit_type_code(edit: &mut RowCursor) {
        let (ty, args) = match edit.scope_type.kind {
            ScopeKind::TypedArray | ScopeKind::TypedSet | ScopeKind::Nullable => {
                let arg = &edit.scope_type_args[0];
                (arg.ty, arg.args.clone())
            }
            ScopeKind::TypedMap => {
                let tuple = ScopeType {
                    kind: ScopeKind::TypedTuple,
                    immutable: edit.scope_type.immutable,
                };
                (LayoutType::Scope(tuple), edit.scope_type_args.clone())
            }
            ScopeKind::TypedTuple | ScopeKind::Tagged | ScopeKind::Tagged2 => {
                let arg = &edit.scope_type_args[edit.index];
                (arg.ty, arg.args.clone())
            }
            kind => panic!("{kind:?} scopes have no implicit type code"),
        };
        edit.cell_type = Some(ty);
        edit.cell_type_args = args;
    }

    fn read_layout_type_at(&self, offset: usize) -> LayoutType {
        let code = self.read_code_at(offset);
        match LayoutType::from_code(code) {
            Some(ty) => ty,
            None => panic!("corrupted row: invalid layout code at {offset}"),
        }
    }

    /// Decode the arguments of `ty` at `offset`. Returns the list and its encoded length.
    pub(crate) fn read_type_argument_list(
        &self,
        ty: LayoutType,
        offset: usize,
    ) -> (TypeArgumentList, usize) {
        let Some(scope) = ty.as_scope() else {
            return (TypeArgumentList::empty(), 0);
        };
        let mut len = 0;
        let (mut args, arity) = match scope.kind {
            ScopeKind::Object | ScopeKind::Array => return (TypeArgumentList::empty(), 0),
            ScopeKind::Udt => {
                let id = SchemaId(self.read_at::<i32>(offset));
                return (TypeArgumentList::from_schema_id(id), SchemaId::SIZE);
            }
            ScopeKind::TypedArray | ScopeKind::TypedSet | ScopeKind::Nullable => (Vec::new(), 1),
            ScopeKind::TypedMap => (Vec::new(), 2),
            ScopeKind::Tagged => (vec![TypeArgument::new(LayoutType::UInt8)], 1),
            ScopeKind::Tagged2 => (vec![TypeArgument::new(LayoutType::UInt8)], 2),
            ScopeKind::Tuple | ScopeKind::TypedTuple => {
                let (n, n_len) = self.read_varuint_at(offset);
                len += n_len;
                (Vec::with_capacity(n as usize), n as usize)
            }
        };
        for _ in 0..arity {
            let (arg, arg_len) = self.read_type_argument(offset + len);
            args.push(arg);
            len += arg_len;
        }
        (TypeArgumentList::new(args), len)
    }

    fn read_type_argument(&self, offset: usize) -> (TypeArgument, usize) {
        let ty = self.read_layout_type_at(offset);
        let (args, len) = self.read_type_argument_list(ty, offset + LAYOUT_CODE_LEN);
        (TypeArgument::with_args(ty, args), LAYOUT_CODE_LEN + len)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Sparse metadata
    // ════════════════════════════════════════════════════════════════════════

    /// Decode the type, type arguments and path of the field at `edit.meta_offset`.
    /// Stops at an end-of-scope code.
    pub fn read_sparse_metadata(&self, edit: &mut RowCursor) {
        if Self::has_implicit_type_code(edit) {
            Self::set_implicit_type_code(edit);
            edit.value_offset = edit.meta_offset;
        } else {
            let ty = self.read_layout_type_at(edit.meta_offset);
            if ty == LayoutType::EndScope {
                edit.cell_type = Some(LayoutType::EndScope);
                edit.cell_type_args = TypeArgumentList::empty();
                edit.value_offset = edit.meta_offset;
                return;
            }
            let (args, len) =
                self.read_type_argument_list(ty, edit.meta_offset + LAYOUT_CODE_LEN);
            edit.cell_type = Some(ty);
            edit.cell_type_args = args;
            edit.value_offset = edit.meta_offset + LAYOUT_CODE_LEN + len;
        }
        self.read_sparse_path_metadata(edit);
    }

    fn read_sparse_path_metadata(&self, edit: &mut RowCursor) {
        if edit.scope_type.kind.is_indexed() {
            return;
        }
        let offset = edit.value_offset;
        let (token, len) = self.read_varuint_at(offset);
        let interned = edit.layout.tokenizer().count() as u64;
        edit.path_token = token;
        if token < interned {
            edit.path_offset = offset;
            edit.value_offset = offset + len;
        } else {
            let path_len = (token - interned) as usize;
            edit.path_offset = offset + len;
            edit.value_offset = offset + len + path_len;
        }
    }

    /// Whether the field at the cursor is stored under `path`.
    pub(crate) fn sparse_path_equals(&self, edit: &RowCursor, path: &str) -> bool {
        let tokenizer = edit.layout.tokenizer();
        let interned = tokenizer.count() as u64;
        if edit.path_token < interned {
            return tokenizer.find_string(edit.path_token) == Some(path);
        }
        let len = (edit.path_token - interned) as usize;
        &self.buf[edit.path_offset..edit.path_offset + len] == path.as_bytes()
    }

    // ════════════════════════════════════════════════════════════════════════
    // Sizes
    // ════════════════════════════════════════════════════════════════════════

    /// Encoded size of the field at the cursor, metadata included.
    pub fn sparse_compute_size(&self, edit: &RowCursor) -> usize {
        match edit.cell_type {
            Some(LayoutType::Scope(_)) => {
                let mut child = self.sparse_iterator_read_scope(edit, true);
                self.skip_scope(&mut child) - edit.meta_offset
            }
            Some(ty) => self.sparse_compute_primitive_size(ty, edit.meta_offset, edit.value_offset),
            None => panic!("no field at offset {} to size", edit.meta_offset),
        }
    }

    fn sparse_compute_primitive_size(&self, ty: LayoutType, meta: usize, value: usize) -> usize {
        let meta_bytes = value - meta;
        match ty {
            LayoutType::Utf8 | LayoutType::Binary => {
                let (len, prefix) = self.read_varuint_at(value);
                meta_bytes + prefix + len as usize
            }
            LayoutType::VarInt | LayoutType::VarUInt => {
                let (_, prefix) = self.read_varuint_at(value);
                meta_bytes + prefix
            }
            ty => match ty.fixed_size() {
                Some(size) => meta_bytes + size,
                None => panic!("{ty} has no primitive size"),
            },
        }
    }

    /// Exhaust a scope cursor. Returns the offset one past the scope's last byte.
    pub(crate) fn skip_scope(&self, edit: &mut RowCursor) -> usize {
        while self.sparse_iterator_move_next(edit) {}
        if edit.scope_type.kind.is_sized() {
            edit.meta_offset
        } else {
            edit.meta_offset + LAYOUT_CODE_LEN
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Iteration
    // ════════════════════════════════════════════════════════════════════════

    /// Advance to the next field of the scope. `false` once the scope is exhausted.
    pub fn sparse_iterator_move_next(&self, edit: &mut RowCursor) -> bool {
        if edit.cell_type == Some(LayoutType::EndScope) {
            return false;
        }

        if edit.cell_type.is_some() {
            if edit.scope_type.kind.is_indexed() {
                edit.index += 1;
            }
            edit.meta_offset = match edit.end_offset.take() {
                Some(end) => end,
                None => edit.meta_offset + self.sparse_compute_size(edit),
            };
        }

        let exhausted = edit.scope_type.kind.is_sized() && edit.index == edit.count;
        if edit.meta_offset < self.buf.len() && !exhausted {
            self.read_sparse_metadata(edit);
            if edit.cell_type != Some(LayoutType::EndScope) {
                edit.exists = true;
                return true;
            }
        }

        edit.cell_type = Some(LayoutType::EndScope);
        edit.cell_type_args = TypeArgumentList::empty();
        edit.exists = false;
        edit.value_offset = edit.meta_offset;
        false
    }

    /// Cursor over the children of the scope field at `edit`, before its first child.
    pub fn sparse_iterator_read_scope(&self, edit: &RowCursor, immutable: bool) -> RowCursor {
        let Some(LayoutType::Scope(scope)) = edit.cell_type else {
            panic!("field at {} is not a scope", edit.meta_offset);
        };
        let immutable = immutable || edit.immutable || scope.immutable;
        let value = edit.value_offset;
        let args = edit.cell_type_args.clone();

        match scope.kind {
            ScopeKind::Object | ScopeKind::Array => {
                RowCursor::new_scope(edit.layout.clone(), scope, args, immutable, value, value)
            }
            ScopeKind::TypedArray | ScopeKind::TypedSet | ScopeKind::TypedMap => {
                let count = self.read_at::<u32>(value) as usize;
                let mut child = RowCursor::new_scope(
                    edit.layout.clone(),
                    scope,
                    args,
                    immutable,
                    value,
                    value + SIZE_PREFIX_LEN,
                );
                child.count = count;
                child
            }
            ScopeKind::Tuple | ScopeKind::TypedTuple | ScopeKind::Tagged | ScopeKind::Tagged2 => {
                let count = args.len();
                let mut child =
                    RowCursor::new_scope(edit.layout.clone(), scope, args, immutable, value, value);
                child.count = count;
                child
            }
            ScopeKind::Nullable => {
                let has_value = self.buf[value] != 0;
                let (meta, index) = if has_value {
                    (value + 1, 1)
                } else {
                    let inner = &args[0];
                    (value + 1 + self.count_default_value(inner.ty, &inner.args), 2)
                };
                let mut child =
                    RowCursor::new_scope(edit.layout.clone(), scope, args, immutable, value, meta);
                child.count = 2;
                child.index = index;
                child
            }
            ScopeKind::Udt => {
                let udt = self.resolve_layout(args.schema_id());
                let meta = self.compute_variable_value_offset(&udt, value, udt.num_variable());
                RowCursor::new_scope(udt, scope, args, immutable, value, meta)
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Typed sparse reads
    // ════════════════════════════════════════════════════════════════════════

    fn prepare_sparse_read(edit: &RowCursor, expected: LayoutType) -> Result<()> {
        match edit.cell_type {
            Some(ty) if edit.exists => {
                if ty.same_kind(expected) {
                    Ok(())
                } else {
                    Err(RowError::TypeMismatch {
                        expected: expected.layout_code(),
                        actual: ty.layout_code(),
                    })
                }
            }
            _ => Err(RowError::NotFound),
        }
    }

    pub fn read_sparse<T: SparsePrimitive>(&self, edit: &RowCursor) -> Result<T> {
        Self::prepare_sparse_read(edit, T::LAYOUT_TYPE)?;
        Ok(self.read_at(edit.value_offset))
    }

    pub fn read_sparse_null(&self, edit: &RowCursor) -> Result<()> {
        Self::prepare_sparse_read(edit, LayoutType::Null)
    }

    pub fn read_sparse_bool(&self, edit: &RowCursor) -> Result<bool> {
        Self::prepare_sparse_read(edit, LayoutType::Boolean)?;
        Ok(edit.cell_type == Some(LayoutType::Boolean))
    }

    fn read_sparse_len_prefixed(&self, edit: &RowCursor, expected: LayoutType) -> Result<&[u8]> {
        Self::prepare_sparse_read(edit, expected)?;
        let (len, prefix) = self.read_varuint_at(edit.value_offset);
        let start = edit.value_offset + prefix;
        Ok(&self.buf[start..start + len as usize])
    }

    pub fn read_sparse_string(&self, edit: &RowCursor) -> Result<&str> {
        let raw = self.read_sparse_len_prefixed(edit, LayoutType::Utf8)?;
        std::str::from_utf8(raw).map_err(|e| RowError::InvalidRow(e.to_string()))
    }

    pub fn read_sparse_binary(&self, edit: &RowCursor) -> Result<&[u8]> {
        self.read_sparse_len_prefixed(edit, LayoutType::Binary)
    }

    pub fn read_sparse_varint(&self, edit: &RowCursor) -> Result<i64> {
        Self::prepare_sparse_read(edit, LayoutType::VarInt)?;
        let (raw, _) = self.read_varuint_at(edit.value_offset);
        Ok(rotate_sign_to_msb(raw))
    }

    pub fn read_sparse_varuint(&self, edit: &RowCursor) -> Result<u64> {
        Self::prepare_sparse_read(edit, LayoutType::VarUInt)?;
        Ok(self.read_varuint_at(edit.value_offset).0)
    }

    /// Path of the field at the cursor in an object or schema scope.
    pub fn read_sparse_path(&self, edit: &RowCursor) -> Result<SmolStr> {
        if !edit.exists {
            return Err(RowError::NotFound);
        }
        assert!(
            !edit.scope_type.kind.is_indexed(),
            "fields of {:?} scopes have no path",
            edit.scope_type.kind
        );
        let tokenizer = edit.layout.tokenizer();
        let interned = tokenizer.count() as u64;
        if edit.path_token < interned {
            return tokenizer
                .find_string(edit.path_token)
                .map(SmolStr::new)
                .ok_or(RowError::NotFound);
        }
        let len = (edit.path_token - interned) as usize;
        let raw = &self.buf[edit.path_offset..edit.path_offset + len];
        std::str::from_utf8(raw)
            .map(SmolStr::new)
            .map_err(|e| RowError::InvalidRow(e.to_string()))
    }

    /// Child cursor of the `kind` scope field at `edit`.
    pub fn read_scope(&self, edit: &RowCursor, kind: ScopeKind) -> Result<RowCursor> {
        match edit.cell_type {
            Some(LayoutType::Scope(scope)) if edit.exists && scope.kind == kind => {
                Ok(self.sparse_iterator_read_scope(edit, false))
            }
            Some(ty) if edit.exists => Err(RowError::TypeMismatch {
                expected: ScopeType::new(kind).layout_code(),
                actual: ty.layout_code(),
            }),
            _ => Err(RowError::NotFound),
        }
    }
}
