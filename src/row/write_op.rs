use std::sync::Arc;

use tracing::trace;

use super::buffer::RowBuffer;
use super::cursor::RowCursor;
use crate::codec::{
    count_7bit_encoded, encode_varint, encode_varuint, length_prefix, rotate_sign_to_lsb,
    varuint_value,
};
use crate::error::{Result, RowError};
use crate::layout::{
    Layout, LayoutType, ScopeKind, ScopeType, SparsePrimitive, TypeArgument, TypeArgumentList,
};
use crate::types::*;

impl RowBuffer {
    // ════════════════════════════════════════════════════════════════════════
    // Internal: metadata encoding
    // ════════════════════════════════════════════════════════════════════════

    /// Encode `ty` and its arguments at `offset`. Returns the bytes written.
    fn write_type_argument(
        &mut self,
        offset: usize,
        ty: LayoutType,
        args: &TypeArgumentList,
    ) -> usize {
        self.buf[offset] = ty.layout_code() as u8;
        let mut len = LAYOUT_CODE_LEN;
        let Some(scope) = ty.as_scope() else {
            return len;
        };
        let skip = match scope.kind {
            ScopeKind::Object | ScopeKind::Array => return len,
            ScopeKind::Udt => {
                self.write_at(offset + len, args.schema_id().0);
                return len + SchemaId::SIZE;
            }
            ScopeKind::Tuple | ScopeKind::TypedTuple => {
                len += encode_varuint(&mut self.buf[offset + len..], args.len() as u64);
                0
            }
            // the tag argument is implicit
            ScopeKind::Tagged | ScopeKind::Tagged2 => 1,
            ScopeKind::TypedArray
            | ScopeKind::TypedSet
            | ScopeKind::TypedMap
            | ScopeKind::Nullable => 0,
        };
        for arg in args.iter().skip(skip) {
            len += self.write_type_argument(offset + len, arg.ty, &arg.args);
        }
        len
    }

    /// Encoded size of the path the cursor is about to write.
    fn count_sparse_path(edit: &RowCursor) -> usize {
        if let Some(token) = &edit.write_path_token {
            return token.varint.len();
        }
        let path = Self::pending_write_path(edit);
        let token = (edit.layout.tokenizer().count() + path.len()) as u64;
        count_7bit_encoded(token) + path.len()
    }

    fn pending_write_path(edit: &RowCursor) -> &str {
        match edit.write_path.as_deref() {
            Some(path) => path,
            None => panic!(
                "write into a {:?} scope without a path; position the cursor with find",
                edit.scope_type.kind
            ),
        }
    }

    fn write_sparse_path(&mut self, edit: &mut RowCursor, offset: usize) {
        if edit.scope_type.kind.is_indexed() {
            return;
        }
        if let Some(token) = &edit.write_path_token {
            self.buf[offset..offset + token.varint.len()].copy_from_slice(&token.varint);
            edit.path_offset = offset;
            edit.path_token = token.id;
            return;
        }
        let path = Self::pending_write_path(edit);
        let token = (edit.layout.tokenizer().count() + path.len()) as u64;
        let len = encode_varuint(&mut self.buf[offset..], token);
        self.buf[offset + len..offset + len + path.len()].copy_from_slice(path.as_bytes());
        edit.path_offset = offset + len;
        edit.path_token = token;
    }

    /// Write the type code, type arguments and path of a field whose space
    /// `ensure_sparse` reserved. Leaves `value_offset` after the metadata.
    pub fn write_sparse_metadata(
        &mut self,
        edit: &mut RowCursor,
        cell_type: LayoutType,
        type_args: &TypeArgumentList,
        meta_bytes: usize,
    ) {
        let mut offset = edit.meta_offset;
        if !Self::has_implicit_type_code(edit) {
            offset += self.write_type_argument(offset, cell_type, type_args);
        }
        self.write_sparse_path(edit, offset);
        edit.value_offset = edit.meta_offset + meta_bytes;
    }

    // ════════════════════════════════════════════════════════════════════════
    // Internal: space management
    // ════════════════════════════════════════════════════════════════════════

    /// Resize the field at the cursor so it can hold `num_bytes` of value
    /// behind its metadata, or remove it for `RowOptions::Delete`.
    ///
    /// Returns `(meta_bytes, space_needed)`. On return the cursor describes the
    /// field as it will be once written.
    pub(crate) fn ensure_sparse(
        &mut self,
        edit: &mut RowCursor,
        cell_type: LayoutType,
        type_args: &TypeArgumentList,
        num_bytes: usize,
        options: RowOptions,
    ) -> Result<(usize, usize)> {
        let kind = edit.scope_type.kind;
        let deleting = options == RowOptions::Delete;

        let mut meta_bytes = if Self::has_implicit_type_code(edit) {
            0
        } else {
            cell_type.count_type_argument(type_args)
        };
        if !kind.is_indexed() && !deleting {
            meta_bytes += Self::count_sparse_path(edit);
        }

        let space_available = if edit.exists {
            self.sparse_compute_size(edit)
        } else {
            0
        };
        let space_needed = if deleting { 0 } else { meta_bytes + num_bytes };
        let shift = self.resize_span(edit.meta_offset, space_available, space_needed)?;

        if kind.has_size_prefix() {
            let inserted = matches!(options, RowOptions::Insert | RowOptions::InsertAt)
                || (matches!(options, RowOptions::Upsert | RowOptions::None) && !edit.exists);
            if inserted {
                edit.count += 1;
            } else if deleting && edit.exists {
                edit.count -= 1;
            }
            self.write_at(edit.start, edit.count as u32);
        }

        trace!(
            meta_offset = edit.meta_offset,
            space_available,
            space_needed,
            shift,
            ?options,
            "ensure sparse"
        );

        edit.end_offset = None;
        if deleting {
            edit.cell_type = None;
            edit.cell_type_args = TypeArgumentList::empty();
            edit.exists = false;
        } else {
            edit.cell_type = Some(cell_type);
            edit.cell_type_args = type_args.clone();
            edit.exists = true;
        }
        Ok((meta_bytes, space_needed))
    }

    // ════════════════════════════════════════════════════════════════════════
    // Internal: write preconditions
    // ════════════════════════════════════════════════════════════════════════

    /// Checks a typed write makes before touching any bytes.
    fn prepare_sparse_write(
        edit: &mut RowCursor,
        type_arg: &TypeArgument,
        options: UpdateOptions,
    ) -> Result<()> {
        let kind = edit.scope_type.kind;
        if edit.immutable || (kind.is_unique() && !edit.defer_unique_index) {
            return Err(RowError::InsufficientPermissions);
        }

        let args = &edit.scope_type_args;
        if kind.is_fixed_arity() && kind != ScopeKind::Nullable {
            if edit.index < args.len() && !type_arg.is_compatible(&args[edit.index]) {
                return Err(RowError::TypeConstraint);
            }
        } else if kind == ScopeKind::TypedMap {
            let is_entry = matches!(
                type_arg.ty.as_scope(),
                Some(ScopeType { kind: ScopeKind::TypedTuple, .. })
            );
            if !is_entry || &type_arg.args != args {
                return Err(RowError::TypeConstraint);
            }
        } else if kind.is_typed() && !type_arg.is_compatible(&args[0]) {
            return Err(RowError::TypeConstraint);
        }

        if options == UpdateOptions::InsertAt && (kind.is_fixed_arity() || !kind.is_indexed()) {
            return Err(RowError::TypeConstraint);
        }
        if options != UpdateOptions::InsertAt && kind.is_fixed_arity() && !edit.exists {
            return Err(RowError::TypeConstraint);
        }
        if options == UpdateOptions::Insert && edit.exists {
            return Err(RowError::Exists);
        }
        if options == UpdateOptions::Update && !edit.exists {
            return Err(RowError::NotFound);
        }
        if options == UpdateOptions::InsertAt {
            edit.exists = false;
        }
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════════
    // Primitive writes
    // ════════════════════════════════════════════════════════════════════════

    /// prepare → ensure → metadata → value → end hint.
    fn write_sparse_primitive<F>(
        &mut self,
        edit: &mut RowCursor,
        ty: LayoutType,
        num_bytes: usize,
        options: UpdateOptions,
        encode: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut [u8]),
    {
        let no_args = TypeArgumentList::empty();
        Self::prepare_sparse_write(edit, &TypeArgument::new(ty), options)?;
        let (meta_bytes, space_needed) =
            self.ensure_sparse(edit, ty, &no_args, num_bytes, options.into())?;
        self.write_sparse_metadata(edit, ty, &no_args, meta_bytes);
        let value = edit.value_offset;
        encode(&mut self.buf[value..value + num_bytes]);
        edit.end_offset = Some(edit.meta_offset + space_needed);
        Ok(())
    }

    pub fn write_sparse<T: SparsePrimitive>(
        &mut self,
        edit: &mut RowCursor,
        value: T,
        options: UpdateOptions,
    ) -> Result<()> {
        self.write_sparse_primitive(edit, T::LAYOUT_TYPE, T::SIZE, options, |dst| {
            value.encode(dst)
        })
    }

    pub fn write_sparse_null(&mut self, edit: &mut RowCursor, options: UpdateOptions) -> Result<()> {
        self.write_sparse_primitive(edit, LayoutType::Null, 0, options, |_| {})
    }

    /// The value is carried by the type code alone.
    pub fn write_sparse_bool(
        &mut self,
        edit: &mut RowCursor,
        value: bool,
        options: UpdateOptions,
    ) -> Result<()> {
        let ty = if value {
            LayoutType::Boolean
        } else {
            LayoutType::BooleanFalse
        };
        self.write_sparse_primitive(edit, ty, 0, options, |_| {})
    }

    fn write_sparse_len_prefixed(
        &mut self,
        edit: &mut RowCursor,
        ty: LayoutType,
        value: &[u8],
        options: UpdateOptions,
    ) -> Result<()> {
        let len = length_prefix(value.len())?;
        let prefix = count_7bit_encoded(len);
        self.write_sparse_primitive(edit, ty, prefix + value.len(), options, |dst| {
            encode_varuint(dst, len);
            dst[prefix..].copy_from_slice(value);
        })
    }

    pub fn write_sparse_string(
        &mut self,
        edit: &mut RowCursor,
        value: &str,
        options: UpdateOptions,
    ) -> Result<()> {
        self.write_sparse_len_prefixed(edit, LayoutType::Utf8, value.as_bytes(), options)
    }

    pub fn write_sparse_binary(
        &mut self,
        edit: &mut RowCursor,
        value: &[u8],
        options: UpdateOptions,
    ) -> Result<()> {
        self.write_sparse_len_prefixed(edit, LayoutType::Binary, value, options)
    }

    pub fn write_sparse_varint(
        &mut self,
        edit: &mut RowCursor,
        value: i64,
        options: UpdateOptions,
    ) -> Result<()> {
        let len = count_7bit_encoded(rotate_sign_to_lsb(value));
        self.write_sparse_primitive(edit, LayoutType::VarInt, len, options, |dst| {
            encode_varint(dst, value);
        })
    }

    pub fn write_sparse_varuint(
        &mut self,
        edit: &mut RowCursor,
        value: u64,
        options: UpdateOptions,
    ) -> Result<()> {
        let value = varuint_value(value)?;
        let len = count_7bit_encoded(value);
        self.write_sparse_primitive(edit, LayoutType::VarUInt, len, options, |dst| {
            encode_varuint(dst, value);
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // Scope writes
    // ════════════════════════════════════════════════════════════════════════
    //
    // Each opens a child scope filled with its empty/default content and
    // returns a cursor before the child's first element. The parent's end
    // hint stays unset since the child grows as it is written.

    /// prepare → ensure → metadata → initial content. Returns the value offset.
    fn write_sparse_scope<F>(
        &mut self,
        edit: &mut RowCursor,
        ty: LayoutType,
        type_args: &TypeArgumentList,
        num_bytes: usize,
        options: UpdateOptions,
        init: F,
    ) -> Result<usize>
    where
        F: FnOnce(&mut RowBuffer, usize),
    {
        let type_arg = TypeArgument::with_args(ty, type_args.clone());
        Self::prepare_sparse_write(edit, &type_arg, options)?;
        let (meta_bytes, _) = self.ensure_sparse(edit, ty, type_args, num_bytes, options.into())?;
        self.write_sparse_metadata(edit, ty, type_args, meta_bytes);
        init(self, edit.value_offset);
        Ok(edit.value_offset)
    }

    fn child_scope(
        edit: &RowCursor,
        kind: ScopeKind,
        args: TypeArgumentList,
        start: usize,
        meta: usize,
    ) -> RowCursor {
        RowCursor::new_scope(
            edit.layout.clone(),
            ScopeType::new(kind),
            args,
            false,
            start,
            meta,
        )
    }

    pub fn write_sparse_object(
        &mut self,
        edit: &mut RowCursor,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        let args = TypeArgumentList::empty();
        let value = self.write_sparse_scope(edit, LayoutType::OBJECT, &args, 1, options, |row, at| {
            row.buf[at] = LayoutCode::EndScope as u8;
        })?;
        Ok(Self::child_scope(edit, ScopeKind::Object, args, value, value))
    }

    pub fn write_sparse_array(
        &mut self,
        edit: &mut RowCursor,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        let args = TypeArgumentList::empty();
        let value = self.write_sparse_scope(edit, LayoutType::ARRAY, &args, 1, options, |row, at| {
            row.buf[at] = LayoutCode::EndScope as u8;
        })?;
        Ok(Self::child_scope(edit, ScopeKind::Array, args, value, value))
    }

    fn write_sized_collection(
        &mut self,
        edit: &mut RowCursor,
        kind: ScopeKind,
        args: TypeArgumentList,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        let ty = LayoutType::Scope(ScopeType::new(kind));
        let value = self.write_sparse_scope(edit, ty, &args, SIZE_PREFIX_LEN, options, |row, at| {
            row.write_at(at, 0u32);
        })?;
        Ok(Self::child_scope(edit, kind, args, value, value + SIZE_PREFIX_LEN))
    }

    /// `args` holds the element type.
    pub fn write_typed_array(
        &mut self,
        edit: &mut RowCursor,
        args: TypeArgumentList,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        assert_eq!(args.len(), 1, "typed array takes one type argument");
        self.write_sized_collection(edit, ScopeKind::TypedArray, args, options)
    }

    /// `args` holds the element type. Writes into the returned scope need
    /// `defer_unique_index` and a later unique index rebuild, or go through
    /// `typed_collection_move_field`.
    pub fn write_typed_set(
        &mut self,
        edit: &mut RowCursor,
        args: TypeArgumentList,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        assert_eq!(args.len(), 1, "typed set takes one type argument");
        self.write_sized_collection(edit, ScopeKind::TypedSet, args, options)
    }

    /// `args` holds the key and value types.
    pub fn write_typed_map(
        &mut self,
        edit: &mut RowCursor,
        args: TypeArgumentList,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        assert_eq!(args.len(), 2, "typed map takes key and value type arguments");
        self.write_sized_collection(edit, ScopeKind::TypedMap, args, options)
    }

    /// Every element starts out null.
    pub fn write_sparse_tuple(
        &mut self,
        edit: &mut RowCursor,
        args: TypeArgumentList,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        let arity = args.len();
        let value = self.write_sparse_scope(
            edit,
            LayoutType::TUPLE,
            &args,
            arity + LAYOUT_CODE_LEN,
            options,
            |row, at| {
                row.buf[at..at + arity].fill(LayoutCode::Null as u8);
                row.buf[at + arity] = LayoutCode::EndScope as u8;
            },
        )?;
        let mut child = Self::child_scope(edit, ScopeKind::Tuple, args, value, value);
        child.count = arity;
        Ok(child)
    }

    fn write_fixed_arity_scope(
        &mut self,
        edit: &mut RowCursor,
        kind: ScopeKind,
        args: TypeArgumentList,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        let ty = LayoutType::Scope(ScopeType::new(kind));
        let num_bytes = self.count_default_value(ty, &args);
        let value = self.write_sparse_scope(edit, ty, &args, num_bytes, options, |row, at| {
            row.write_default_value(at, ty, &args);
        })?;
        let mut child = Self::child_scope(edit, kind, args, value, value);
        child.count = child.scope_type_args.len();
        Ok(child)
    }

    /// Every element starts at its default value.
    pub fn write_typed_tuple(
        &mut self,
        edit: &mut RowCursor,
        args: TypeArgumentList,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        self.write_fixed_arity_scope(edit, ScopeKind::TypedTuple, args, options)
    }

    /// `args` starts with the `UInt8` tag, see [`TypeArgumentList::tagged`].
    /// One carried value makes a tagged scope, two make a tagged2 scope.
    pub fn write_tagged(
        &mut self,
        edit: &mut RowCursor,
        args: TypeArgumentList,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        let kind = match args.len() {
            2 => ScopeKind::Tagged,
            3 => ScopeKind::Tagged2,
            n => panic!("tagged scope takes a tag plus one or two values, got {n} arguments"),
        };
        self.write_fixed_arity_scope(edit, kind, args, options)
    }

    /// Absent nullables keep a default value behind the has-value flag.
    pub fn write_nullable(
        &mut self,
        edit: &mut RowCursor,
        args: TypeArgumentList,
        has_value: bool,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        assert_eq!(args.len(), 1, "nullable takes one type argument");
        let ty = LayoutType::NULLABLE;
        let num_bytes = self.count_default_value(ty, &args);
        let value = self.write_sparse_scope(edit, ty, &args, num_bytes, options, |row, at| {
            row.write_default_value(at, ty, &args);
            row.buf[at] = u8::from(has_value);
        })?;
        let meta = if has_value {
            value + 1
        } else {
            value + num_bytes
        };
        let mut child = Self::child_scope(edit, ScopeKind::Nullable, args, value, meta);
        child.count = 2;
        child.index = if has_value { 1 } else { 2 };
        Ok(child)
    }

    /// Nested schema instance with every fixed column cleared.
    pub fn write_sparse_udt(
        &mut self,
        edit: &mut RowCursor,
        udt: &Arc<Layout>,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        let args = TypeArgumentList::from_schema_id(udt.schema_id());
        let size = udt.size();
        let value = self.write_sparse_scope(
            edit,
            LayoutType::UDT,
            &args,
            size + LAYOUT_CODE_LEN,
            options,
            |row, at| {
                row.buf[at..at + size].fill(0);
                row.buf[at + size] = LayoutCode::EndScope as u8;
            },
        )?;
        Ok(RowCursor::new_scope(
            udt.clone(),
            ScopeType::new(ScopeKind::Udt),
            args,
            false,
            value,
            value + size,
        ))
    }

    /// Open a scope of any kind described by `scope`.
    pub fn write_scope(
        &mut self,
        edit: &mut RowCursor,
        scope: &TypeArgument,
        options: UpdateOptions,
    ) -> Result<RowCursor> {
        let Some(scope_type) = scope.ty.as_scope() else {
            panic!("{} is not a scope type", scope.ty);
        };
        let args = scope.args.clone();
        match scope_type.kind {
            ScopeKind::Object => self.write_sparse_object(edit, options),
            ScopeKind::Array => self.write_sparse_array(edit, options),
            ScopeKind::TypedArray => self.write_typed_array(edit, args, options),
            ScopeKind::TypedSet => self.write_typed_set(edit, args, options),
            ScopeKind::TypedMap => self.write_typed_map(edit, args, options),
            ScopeKind::Tuple => self.write_sparse_tuple(edit, args, options),
            ScopeKind::TypedTuple => self.write_typed_tuple(edit, args, options),
            ScopeKind::Tagged | ScopeKind::Tagged2 => self.write_tagged(edit, args, options),
            ScopeKind::Nullable => self.write_nullable(edit, args, true, options),
            ScopeKind::Udt => {
                let udt = self.resolve_layout(args.schema_id());
                self.write_sparse_udt(edit, &udt, options)
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Delete
    // ════════════════════════════════════════════════════════════════════════

    /// Remove the field at the cursor. A cursor at an insertion point is a no-op.
    pub fn delete_sparse(&mut self, edit: &mut RowCursor) -> Result<()> {
        if edit.immutable {
            return Err(RowError::InsufficientPermissions);
        }
        if edit.scope_type.kind.is_fixed_arity() {
            return Err(RowError::TypeConstraint);
        }
        if !edit.exists {
            return Ok(());
        }
        self.remove_sparse(edit)
    }

    /// Delete without permission checks.
    pub(crate) fn remove_sparse(&mut self, edit: &mut RowCursor) -> Result<()> {
        let Some(ty) = edit.cell_type else {
            return Ok(());
        };
        let args = edit.cell_type_args.clone();
        let before = self.len();
        let size = self.sparse_compute_size(edit);
        self.ensure_sparse(edit, ty, &args, 0, RowOptions::Delete)?;
        debug_assert_eq!(before - size, self.len(), "delete shrinks the row by the field size");
        Ok(())
    }
}
