use std::io::{Read, Write};
use std::sync::Arc;

use tracing::{debug, warn};

use super::cursor::RowCursor;
use crate::codec::{FixedWidth, decode_varuint};
use crate::config::RowConfig;
use crate::error::{Result, RowError};
use crate::layout::{Layout, LayoutBit, LayoutResolver, ScopeKind, ScopeType, TypeArgumentList};
use crate::types::*;

// ════════════════════════════════════════════════════════════════════════════
// Unbound
// ════════════════════════════════════════════════════════════════════════════

/// A row buffer with no layout attached: only an allocation and its config.
///
/// Binding happens by value, so an unbound buffer can never reach the
/// operations that need a resolver.
#[derive(Debug, Default)]
pub struct UnboundRowBuffer {
    buf: Vec<u8>,
    config: RowConfig,
}

impl UnboundRowBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(RowConfig {
            initial_capacity: capacity,
            ..RowConfig::default()
        })
    }

    pub fn with_config(config: RowConfig) -> Self {
        Self {
            buf: Vec::with_capacity(config.initial_capacity),
            config,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[inline]
    pub fn config(&self) -> &RowConfig {
        &self.config
    }

    /// Start an empty row: fresh header, zeroed fixed region, no variable or sparse fields.
    pub fn init_layout(
        self,
        version: HybridRowVersion,
        layout: Arc<Layout>,
        resolver: Arc<dyn LayoutResolver>,
    ) -> RowBuffer {
        let mut buf = self.buf;
        buf.clear();
        buf.resize(HEADER_SIZE + layout.size(), 0);
        let header = HybridRowHeader::new(version, layout.schema_id());
        header.encode(&mut buf);
        debug!(
            schema_id = %layout.schema_id(),
            layout = layout.name(),
            len = buf.len(),
            "initialized empty row"
        );
        RowBuffer {
            buf,
            header,
            layout,
            resolver,
            config: self.config,
        }
    }

    /// Copy `bytes` into this allocation and validate them as a row.
    pub fn load(
        self,
        bytes: &[u8],
        expected_version: HybridRowVersion,
        resolver: Arc<dyn LayoutResolver>,
    ) -> Result<RowBuffer> {
        let mut buf = self.buf;
        buf.clear();
        buf.extend_from_slice(bytes);
        RowBuffer::bind(buf, self.config, expected_version, resolver)
    }

    /// Read exactly `byte_count` bytes from `reader` and validate them as a row.
    pub fn read_from_stream<R: Read>(
        self,
        reader: &mut R,
        byte_count: usize,
        expected_version: HybridRowVersion,
        resolver: Arc<dyn LayoutResolver>,
    ) -> Result<RowBuffer> {
        if byte_count > self.config.max_row_size {
            return Err(RowError::TooBig {
                size: byte_count,
                max: self.config.max_row_size,
            });
        }
        let mut buf = self.buf;
        buf.clear();
        buf.resize(byte_count, 0);
        reader.read_exact(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => RowError::InsufficientBuffer,
            _ => RowError::Io(e),
        })?;
        RowBuffer::bind(buf, self.config, expected_version, resolver)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Bound
// ════════════════════════════════════════════════════════════════════════════

/// One row, owned, with its root layout and a resolver for nested schemas.
#[derive(Debug)]
pub struct RowBuffer {
    pub(crate) buf: Vec<u8>,
    header: HybridRowHeader,
    layout: Arc<Layout>,
    resolver: Arc<dyn LayoutResolver>,
    config: RowConfig,
}

impl RowBuffer {
    /// Adopt `bytes` as a row. `InvalidRow` unless the header carries
    /// `expected_version`, its schema resolves, and the fixed region fits.
    pub fn from_bytes(
        bytes: Vec<u8>,
        expected_version: HybridRowVersion,
        resolver: Arc<dyn LayoutResolver>,
    ) -> Result<Self> {
        Self::from_bytes_with_config(bytes, expected_version, resolver, RowConfig::default())
    }

    pub fn from_bytes_with_config(
        bytes: Vec<u8>,
        expected_version: HybridRowVersion,
        resolver: Arc<dyn LayoutResolver>,
        config: RowConfig,
    ) -> Result<Self> {
        Self::bind(bytes, config, expected_version, resolver)
    }

    pub fn read_from_stream<R: Read>(
        reader: &mut R,
        byte_count: usize,
        expected_version: HybridRowVersion,
        resolver: Arc<dyn LayoutResolver>,
    ) -> Result<Self> {
        UnboundRowBuffer::with_capacity(byte_count).read_from_stream(
            reader,
            byte_count,
            expected_version,
            resolver,
        )
    }

    fn bind(
        buf: Vec<u8>,
        config: RowConfig,
        expected_version: HybridRowVersion,
        resolver: Arc<dyn LayoutResolver>,
    ) -> Result<Self> {
        let reject = |reason: String| {
            warn!(len = buf.len(), %reason, "rejected row");
            RowError::InvalidRow(reason)
        };

        if buf.len() > config.max_row_size {
            return Err(RowError::TooBig {
                size: buf.len(),
                max: config.max_row_size,
            });
        }
        let header = HybridRowHeader::decode(&buf).map_err(|e| match e {
            RowError::InvalidRow(reason) => reject(reason),
            other => other,
        })?;
        if header.version != expected_version {
            return Err(reject(format!(
                "version {:#04x} does not match expected {:#04x}",
                u8::from(header.version),
                u8::from(expected_version)
            )));
        }
        let Some(layout) = resolver.resolve(header.schema_id) else {
            return Err(reject(format!("unknown schema id {}", header.schema_id)));
        };
        if HEADER_SIZE + layout.size() > buf.len() {
            return Err(reject(format!(
                "fixed region of {} bytes does not fit in {} byte row",
                layout.size(),
                buf.len()
            )));
        }

        debug!(
            schema_id = %header.schema_id,
            layout = layout.name(),
            len = buf.len(),
            "bound row"
        );
        Ok(Self {
            buf,
            header,
            layout,
            resolver,
            config,
        })
    }

    /// Drop the content and the resolver, keeping the allocation.
    pub fn reset(self) -> UnboundRowBuffer {
        let mut buf = self.buf;
        buf.clear();
        UnboundRowBuffer {
            buf,
            config: self.config,
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Accessors
    // ════════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn header(&self) -> HybridRowHeader {
        self.header
    }

    #[inline]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    #[inline]
    pub fn resolver(&self) -> &Arc<dyn LayoutResolver> {
        &self.resolver
    }

    #[inline]
    pub fn config(&self) -> &RowConfig {
        &self.config
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn to_byte_array(&self) -> Vec<u8> {
        self.buf.clone()
    }

    pub fn write_to_stream<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.buf)?;
        Ok(())
    }

    /// Layout of a nested schema. A row naming a schema its resolver does
    /// not know is corrupt.
    pub(crate) fn resolve_layout(&self, schema_id: SchemaId) -> Arc<Layout> {
        match self.resolver.resolve(schema_id) {
            Some(layout) => layout,
            None => panic!("nested schema {schema_id} is not resolvable"),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Root cursors
    // ════════════════════════════════════════════════════════════════════════

    /// Cursor over the root scope, before its first sparse field.
    pub fn create_cursor(&self) -> RowCursor {
        let layout = self.layout.clone();
        let sparse_start =
            self.compute_variable_value_offset(&layout, HEADER_SIZE, layout.num_variable());
        let args = TypeArgumentList::from_schema_id(layout.schema_id());
        RowCursor::new_scope(
            layout,
            ScopeType::new(ScopeKind::Udt),
            args,
            false,
            HEADER_SIZE,
            sparse_start,
        )
    }

    /// Cursor over the root scope, positioned past its last field.
    pub fn create_cursor_for_append(&self) -> RowCursor {
        let layout = self.layout.clone();
        let args = TypeArgumentList::from_schema_id(layout.schema_id());
        RowCursor::new_scope(
            layout,
            ScopeType::new(ScopeKind::Udt),
            args,
            false,
            HEADER_SIZE,
            self.buf.len(),
        )
    }

    // ════════════════════════════════════════════════════════════════════════
    // Absolute reads/writes
    // ════════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn read_at<T: FixedWidth>(&self, offset: usize) -> T {
        T::decode(&self.buf[offset..offset + T::SIZE])
    }

    #[inline]
    pub fn write_at<T: FixedWidth>(&mut self, offset: usize, value: T) {
        value.encode(&mut self.buf[offset..offset + T::SIZE]);
    }

    #[inline]
    pub fn read_fixed_binary(&self, offset: usize, len: usize) -> &[u8] {
        &self.buf[offset..offset + len]
    }

    /// Write `value` into a `len`-byte slot, zero padding the rest.
    pub fn write_fixed_binary(&mut self, offset: usize, value: &[u8], len: usize) -> Result<()> {
        if value.len() > len {
            return Err(RowError::TooBig {
                size: value.len(),
                max: len,
            });
        }
        let slot = &mut self.buf[offset..offset + len];
        slot[..value.len()].copy_from_slice(value);
        slot[value.len()..].fill(0);
        Ok(())
    }

    /// UTF-8 text of a `len`-byte slot with its zero padding removed.
    pub fn read_fixed_string(&self, offset: usize, len: usize) -> Result<&str> {
        let raw = self.read_fixed_binary(offset, len);
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        std::str::from_utf8(&raw[..end]).map_err(|e| RowError::InvalidRow(e.to_string()))
    }

    pub fn write_fixed_string(&mut self, offset: usize, value: &str, len: usize) -> Result<()> {
        self.write_fixed_binary(offset, value.as_bytes(), len)
    }

    /// Decode a varuint inside the row. A malformed one means the row is corrupt.
    pub(crate) fn read_varuint_at(&self, offset: usize) -> (u64, usize) {
        match decode_varuint(&self.buf[offset..]) {
            Ok(decoded) => decoded,
            Err(e) => panic!("corrupted row: varuint at {offset}: {e}"),
        }
    }

    pub(crate) fn read_code_at(&self, offset: usize) -> LayoutCode {
        match LayoutCode::try_from(self.buf[offset]) {
            Ok(code) => code,
            Err(e) => panic!("corrupted row at {offset}: {e}"),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Bits
    // ════════════════════════════════════════════════════════════════════════

    /// Bit of the bitmask starting at `base`. An invalid bit is always set.
    #[inline]
    pub fn read_bit(&self, base: usize, bit: LayoutBit) -> bool {
        if bit.is_invalid() {
            return true;
        }
        self.buf[bit.offset(base)] & (1 << bit.bit()) != 0
    }

    #[inline]
    pub fn set_bit(&mut self, base: usize, bit: LayoutBit) {
        if bit.is_invalid() {
            return;
        }
        self.buf[bit.offset(base)] |= 1 << bit.bit();
    }

    #[inline]
    pub fn unset_bit(&mut self, base: usize, bit: LayoutBit) {
        if bit.is_invalid() {
            return;
        }
        self.buf[bit.offset(base)] &= !(1 << bit.bit());
    }

    // ════════════════════════════════════════════════════════════════════════
    // Shift
    // ════════════════════════════════════════════════════════════════════════

    /// Resize the `old_len` bytes at `offset` to `new_len`, moving the tail of
    /// the row. Returns the signed shift. Nothing moves if the row would
    /// outgrow `max_row_size`.
    pub(crate) fn resize_span(
        &mut self,
        offset: usize,
        old_len: usize,
        new_len: usize,
    ) -> Result<isize> {
        let old_end = offset + old_len;
        let len = self.buf.len();

        if new_len > old_len {
            let growth = new_len - old_len;
            let size = len + growth;
            if size > self.config.max_row_size {
                return Err(RowError::TooBig {
                    size,
                    max: self.config.max_row_size,
                });
            }
            self.buf.resize(size, 0);
            // Shift tail right
            self.buf.copy_within(old_end..len, old_end + growth);
            if self.config.zero_fill_gaps {
                self.buf[offset..offset + new_len].fill(0);
            }
        } else if new_len < old_len {
            let shrink = old_len - new_len;
            // Shift tail left
            self.buf.copy_within(old_end..len, old_end - shrink);
            self.buf.truncate(len - shrink);
            if self.config.zero_fill_gaps {
                self.buf[offset..offset + new_len].fill(0);
            }
        }
        Ok(new_len as isize - old_len as isize)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Variable region
    // ════════════════════════════════════════════════════════════════════════

    /// Absolute offset of variable column `var_index` of the scope whose fixed
    /// region starts at `scope_offset`. With `var_index == num_variable` this is
    /// where the scope's sparse fields begin.
    pub fn compute_variable_value_offset(
        &self,
        layout: &Layout,
        scope_offset: usize,
        var_index: usize,
    ) -> usize {
        let mut offset = scope_offset + layout.size();
        for col in &layout.variable_columns()[..var_index] {
            if self.read_bit(scope_offset, col.null_bit) {
                let (len, prefix) = self.read_varuint_at(offset);
                offset += if col.ty.is_varint() {
                    prefix
                } else {
                    prefix + len as usize
                };
            }
        }
        offset
    }

    /// Make room for a `needed`-byte variable value where `existing` bytes
    /// sit now, shifting everything after it. Returns the shift.
    pub fn ensure_variable(
        &mut self,
        offset: usize,
        existing: usize,
        needed: usize,
    ) -> Result<isize> {
        self.resize_span(offset, existing, needed)
    }
}
