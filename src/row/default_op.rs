use super::buffer::RowBuffer;
use crate::layout::{LayoutType, ScopeKind, TypeArgumentList};
use crate::types::*;

impl RowBuffer {
    // ════════════════════════════════════════════════════════════════════════
    // Default values
    // ════════════════════════════════════════════════════════════════════════
    //
    // Fixed-arity scopes are written in full when opened: every element holds
    // the default of its type until overwritten.

    /// Encoded size of the default value of `ty`, type code excluded.
    pub fn count_default_value(&self, ty: LayoutType, args: &TypeArgumentList) -> usize {
        match ty {
            // booleans and null are carried by their type code
            LayoutType::Null | LayoutType::Boolean | LayoutType::BooleanFalse => LAYOUT_CODE_LEN,
            LayoutType::VarInt | LayoutType::VarUInt | LayoutType::Utf8 | LayoutType::Binary => 1,
            LayoutType::Scope(scope) => match scope.kind {
                ScopeKind::Object | ScopeKind::Array => LAYOUT_CODE_LEN,
                ScopeKind::TypedArray | ScopeKind::TypedSet | ScopeKind::TypedMap => {
                    SIZE_PREFIX_LEN
                }
                ScopeKind::Tuple => args.len() + LAYOUT_CODE_LEN,
                ScopeKind::TypedTuple | ScopeKind::Tagged | ScopeKind::Tagged2 => args
                    .iter()
                    .map(|arg| self.count_default_value(arg.ty, &arg.args))
                    .sum(),
                ScopeKind::Nullable => {
                    let inner = &args[0];
                    1 + self.count_default_value(inner.ty, &inner.args)
                }
                ScopeKind::Udt => self.resolve_layout(args.schema_id()).size() + LAYOUT_CODE_LEN,
            },
            ty => match ty.fixed_size() {
                Some(size) => size,
                None => panic!("{ty} has no default value"),
            },
        }
    }

    /// Write the default value of `ty` at `offset`. Returns the bytes written,
    /// always equal to [`RowBuffer::count_default_value`].
    pub fn write_default_value(
        &mut self,
        offset: usize,
        ty: LayoutType,
        args: &TypeArgumentList,
    ) -> usize {
        match ty {
            LayoutType::Null => {
                self.buf[offset] = LayoutCode::Null as u8;
                LAYOUT_CODE_LEN
            }
            LayoutType::Boolean | LayoutType::BooleanFalse => {
                self.buf[offset] = LayoutCode::BooleanFalse as u8;
                LAYOUT_CODE_LEN
            }
            LayoutType::VarInt | LayoutType::VarUInt | LayoutType::Utf8 | LayoutType::Binary => {
                self.buf[offset] = 0;
                1
            }
            LayoutType::Scope(scope) => match scope.kind {
                ScopeKind::Object | ScopeKind::Array => {
                    self.buf[offset] = LayoutCode::EndScope as u8;
                    LAYOUT_CODE_LEN
                }
                ScopeKind::TypedArray | ScopeKind::TypedSet | ScopeKind::TypedMap => {
                    self.write_at(offset, 0u32);
                    SIZE_PREFIX_LEN
                }
                ScopeKind::Tuple => {
                    let arity = args.len();
                    self.buf[offset..offset + arity].fill(LayoutCode::Null as u8);
                    self.buf[offset + arity] = LayoutCode::EndScope as u8;
                    arity + LAYOUT_CODE_LEN
                }
                ScopeKind::TypedTuple | ScopeKind::Tagged | ScopeKind::Tagged2 => {
                    let mut len = 0;
                    for arg in args.iter() {
                        len += self.write_default_value(offset + len, arg.ty, &arg.args);
                    }
                    len
                }
                ScopeKind::Nullable => {
                    self.buf[offset] = 0;
                    let inner = &args[0];
                    1 + self.write_default_value(offset + 1, inner.ty, &inner.args)
                }
                ScopeKind::Udt => {
                    let size = self.resolve_layout(args.schema_id()).size();
                    self.buf[offset..offset + size].fill(0);
                    self.buf[offset + size] = LayoutCode::EndScope as u8;
                    size + LAYOUT_CODE_LEN
                }
            },
            ty => match ty.fixed_size() {
                Some(size) => {
                    self.buf[offset..offset + size].fill(0);
                    size
                }
                None => panic!("{ty} has no default value"),
            },
        }
    }
}
