//! Primitive byte codecs.
//!
//! Fixed-width values are little-endian. Variable-length integers use 7 value
//! bits per byte with the high bit as a continuation flag; signed values are
//! first rotated so the sign lands in the least significant bit.

use arrayvec::ArrayVec;
use uuid::Uuid;

use crate::error::RowError;
use crate::types::{DateTime, Decimal, Float128, MongoDbObjectId, UnixDateTime};

/// A u64 needs at most ten 7-bit groups.
pub const MAX_VARUINT_BYTES: usize = 10;

// ─── Fixed Width ────────────────────────────────────────────────────────────

/// A value with a constant encoded size.
pub trait FixedWidth: Copy {
    const SIZE: usize;

    /// Write `Self::SIZE` bytes at the front of `dst`.
    fn encode(self, dst: &mut [u8]);

    /// Read `Self::SIZE` bytes from the front of `src`.
    fn decode(src: &[u8]) -> Self;
}

#[inline]
fn take<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut raw = [0u8; N];
    raw.copy_from_slice(&src[..N]);
    raw
}

macro_rules! impl_fixed_width_le {
    ($($t:ty),* $(,)?) => {
        $(
            impl FixedWidth for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn encode(self, dst: &mut [u8]) {
                    dst[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(src: &[u8]) -> Self {
                    <$t>::from_le_bytes(take(src))
                }
            }
        )*
    };
}

impl_fixed_width_le!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl FixedWidth for Float128 {
    const SIZE: usize = 16;

    #[inline]
    fn encode(self, dst: &mut [u8]) {
        self.low.encode(dst);
        self.high.encode(&mut dst[8..]);
    }

    #[inline]
    fn decode(src: &[u8]) -> Self {
        Float128 {
            low: i64::decode(src),
            high: i64::decode(&src[8..]),
        }
    }
}

impl FixedWidth for Decimal {
    const SIZE: usize = 16;

    #[inline]
    fn encode(self, dst: &mut [u8]) {
        self.low.encode(dst);
        self.high.encode(&mut dst[8..]);
    }

    #[inline]
    fn decode(src: &[u8]) -> Self {
        Decimal {
            low: u64::decode(src),
            high: u64::decode(&src[8..]),
        }
    }
}

impl FixedWidth for DateTime {
    const SIZE: usize = 8;

    #[inline]
    fn encode(self, dst: &mut [u8]) {
        self.0.encode(dst);
    }

    #[inline]
    fn decode(src: &[u8]) -> Self {
        DateTime(i64::decode(src))
    }
}

impl FixedWidth for UnixDateTime {
    const SIZE: usize = 8;

    #[inline]
    fn encode(self, dst: &mut [u8]) {
        self.0.encode(dst);
    }

    #[inline]
    fn decode(src: &[u8]) -> Self {
        UnixDateTime(i64::decode(src))
    }
}

/// GUIDs use the mixed-endian field order of the .NET byte form.
impl FixedWidth for Uuid {
    const SIZE: usize = 16;

    #[inline]
    fn encode(self, dst: &mut [u8]) {
        dst[..16].copy_from_slice(&self.to_bytes_le());
    }

    #[inline]
    fn decode(src: &[u8]) -> Self {
        Uuid::from_bytes_le(take(src))
    }
}

impl FixedWidth for MongoDbObjectId {
    const SIZE: usize = 12;

    #[inline]
    fn encode(self, dst: &mut [u8]) {
        dst[..12].copy_from_slice(&self.0);
    }

    #[inline]
    fn decode(src: &[u8]) -> Self {
        MongoDbObjectId(take(src))
    }
}

// ─── Variable Length ────────────────────────────────────────────────────────

/// Number of bytes `encode_varuint` produces for `value`.
#[inline]
pub fn count_7bit_encoded(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Encode `value` at the front of `dst`, returning the bytes written.
#[inline]
pub fn encode_varuint(dst: &mut [u8], mut value: u64) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        dst[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    dst[i] = value as u8;
    i + 1
}

/// Encode `value` into a stack buffer.
pub fn varuint_bytes(value: u64) -> ArrayVec<u8, MAX_VARUINT_BYTES> {
    let mut raw = [0u8; MAX_VARUINT_BYTES];
    let len = encode_varuint(&mut raw, value);
    let mut out = ArrayVec::new();
    out.extend(raw[..len].iter().copied());
    out
}

/// Decode a varuint from the front of `src`. Returns `(value, bytes_read)`.
pub fn decode_varuint(src: &[u8]) -> Result<(u64, usize), RowError> {
    let mut value = 0u64;
    for (i, &byte) in src.iter().enumerate() {
        if i == MAX_VARUINT_BYTES {
            return Err(RowError::InvalidRow(
                "varuint continues past 10 groups".to_string(),
            ));
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte < 0x80 {
            return Ok((value, i + 1));
        }
    }
    if src.len() >= MAX_VARUINT_BYTES {
        return Err(RowError::InvalidRow(
            "varuint continues past 10 groups".to_string(),
        ));
    }
    Err(RowError::InsufficientBuffer)
}

/// Validate a byte length for use as a varuint length prefix.
///
/// Length prefixes, counts and path tokens are limited to the u32 range.
#[inline]
pub fn length_prefix(len: usize) -> Result<u64, RowError> {
    if len > u32::MAX as usize {
        return Err(RowError::TooBig {
            size: len,
            max: u32::MAX as usize,
        });
    }
    Ok(len as u64)
}

/// Validate a `VarUInt` field value. Stored varuints hold at most 32 bits.
#[inline]
pub fn varuint_value(value: u64) -> Result<u64, RowError> {
    if value > u64::from(u32::MAX) {
        return Err(RowError::TooBig {
            size: usize::try_from(value).unwrap_or(usize::MAX),
            max: u32::MAX as usize,
        });
    }
    Ok(value)
}

/// Map the sign bit to the LSB: `v >= 0` becomes `2v`, `v < 0` becomes `2|v| + 1`.
#[inline]
pub fn rotate_sign_to_lsb(value: i64) -> u64 {
    let raw = value as u64;
    if value < 0 {
        ((!raw).wrapping_add(1) << 1).wrapping_add(1)
    } else {
        raw << 1
    }
}

/// Inverse of [`rotate_sign_to_lsb`].
#[inline]
pub fn rotate_sign_to_msb(raw: u64) -> i64 {
    if raw & 1 != 0 {
        ((!(raw >> 1)).wrapping_add(1) | 0x8000_0000_0000_0000) as i64
    } else {
        (raw >> 1) as i64
    }
}

#[inline]
pub fn encode_varint(dst: &mut [u8], value: i64) -> usize {
    encode_varuint(dst, rotate_sign_to_lsb(value))
}

#[inline]
pub fn decode_varint(src: &[u8]) -> Result<(i64, usize), RowError> {
    let (raw, len) = decode_varuint(src)?;
    Ok((rotate_sign_to_msb(raw), len))
}
