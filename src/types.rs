use serde::{Deserialize, Serialize};

use crate::error::RowError;

// ─── Binary Layout ──────────────────────────────────────────────────────────
//
//  ┌──────────────────────────────────────────────┐
//  │ Header (5 bytes)                             │
//  │   version:   u8                              │
//  │   schema_id: i32 (LE)                        │
//  ├──────────────────────────────────────────────┤
//  │ Fixed region (layout.size bytes)             │
//  │   presence bitmask: [u8; num_bitmask_bytes]  │
//  │   fixed slots at layout-assigned offsets     │
//  ├──────────────────────────────────────────────┤
//  │ Variable region                              │
//  │   present variable columns in column order:  │
//  │   [len: varuint][bytes] or [varint]          │
//  ├──────────────────────────────────────────────┤
//  │ Sparse region (to end of row)                │
//  │   [code][type args][path][value] ...         │
//  └──────────────────────────────────────────────┘

pub const HEADER_SIZE: usize = 5; // 1 + 4

/// Size of the element-count prefix of typed arrays, sets and maps.
pub const SIZE_PREFIX_LEN: usize = 4;

/// Size of an encoded layout code.
pub const LAYOUT_CODE_LEN: usize = 1;

// ─── Layout Codes ───────────────────────────────────────────────────────────

/// One-byte type code stored in front of every self-describing sparse field.
///
/// Every scope code has an immutable twin at `code + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LayoutCode {
    Invalid = 0,
    Null = 1,
    BooleanFalse = 2,
    Boolean = 3,
    Int8 = 5,
    Int16 = 6,
    Int32 = 7,
    Int64 = 8,
    UInt8 = 9,
    UInt16 = 10,
    UInt32 = 11,
    UInt64 = 12,
    VarInt = 13,
    VarUInt = 14,
    Float32 = 15,
    Float64 = 16,
    Decimal = 17,
    DateTime = 18,
    Guid = 19,
    Utf8 = 20,
    Binary = 21,
    Float128 = 22,
    UnixDateTime = 23,
    MongoDbObjectId = 24,
    ObjectScope = 30,
    ImmutableObjectScope = 31,
    ArrayScope = 32,
    ImmutableArrayScope = 33,
    TypedArrayScope = 34,
    ImmutableTypedArrayScope = 35,
    TupleScope = 36,
    ImmutableTupleScope = 37,
    TypedTupleScope = 38,
    ImmutableTypedTupleScope = 39,
    TypedMapScope = 42,
    ImmutableTypedMapScope = 43,
    TypedSetScope = 46,
    ImmutableTypedSetScope = 47,
    NullableScope = 48,
    ImmutableNullableScope = 49,
    TaggedScope = 50,
    ImmutableTaggedScope = 51,
    Tagged2Scope = 52,
    ImmutableTagged2Scope = 53,
    Schema = 68,
    ImmutableSchema = 69,
    EndScope = 70,
}

impl LayoutCode {
    /// Codes whose value is carried entirely by the code itself. They are
    /// written even inside scopes whose element type is otherwise implicit.
    #[inline]
    pub fn always_requires_type_code(self) -> bool {
        matches!(
            self,
            LayoutCode::Null | LayoutCode::BooleanFalse | LayoutCode::Boolean
        )
    }

    /// Fold the boolean pair onto a single code for type comparisons.
    #[inline]
    pub fn canonicalize(self) -> LayoutCode {
        match self {
            LayoutCode::BooleanFalse => LayoutCode::Boolean,
            other => other,
        }
    }
}

impl TryFrom<u8> for LayoutCode {
    type Error = RowError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use LayoutCode::*;
        let code = match value {
            0 => Invalid,
            1 => Null,
            2 => BooleanFalse,
            3 => Boolean,
            5 => Int8,
            6 => Int16,
            7 => Int32,
            8 => Int64,
            9 => UInt8,
            10 => UInt16,
            11 => UInt32,
            12 => UInt64,
            13 => VarInt,
            14 => VarUInt,
            15 => Float32,
            16 => Float64,
            17 => Decimal,
            18 => DateTime,
            19 => Guid,
            20 => Utf8,
            21 => Binary,
            22 => Float128,
            23 => UnixDateTime,
            24 => MongoDbObjectId,
            30 => ObjectScope,
            31 => ImmutableObjectScope,
            32 => ArrayScope,
            33 => ImmutableArrayScope,
            34 => TypedArrayScope,
            35 => ImmutableTypedArrayScope,
            36 => TupleScope,
            37 => ImmutableTupleScope,
            38 => TypedTupleScope,
            39 => ImmutableTypedTupleScope,
            42 => TypedMapScope,
            43 => ImmutableTypedMapScope,
            46 => TypedSetScope,
            47 => ImmutableTypedSetScope,
            48 => NullableScope,
            49 => ImmutableNullableScope,
            50 => TaggedScope,
            51 => ImmutableTaggedScope,
            52 => Tagged2Scope,
            53 => ImmutableTagged2Scope,
            68 => Schema,
            69 => ImmutableSchema,
            70 => EndScope,
            other => {
                return Err(RowError::InvalidRow(format!(
                    "unknown layout code {other:#04x}"
                )));
            }
        };
        Ok(code)
    }
}

// ─── Format Version ─────────────────────────────────────────────────────────

/// Wire-compatibility tag stored in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum HybridRowVersion {
    #[default]
    Invalid = 0,
    V1 = 0x81,
}

impl TryFrom<u8> for HybridRowVersion {
    type Error = RowError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HybridRowVersion::Invalid),
            0x81 => Ok(HybridRowVersion::V1),
            other => Err(RowError::InvalidRow(format!(
                "unknown format version {other:#04x}"
            ))),
        }
    }
}

impl From<HybridRowVersion> for u8 {
    fn from(version: HybridRowVersion) -> u8 {
        version as u8
    }
}

// ─── Schema Id ──────────────────────────────────────────────────────────────

/// Identifies the layout a row (or nested UDT scope) was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub i32);

impl SchemaId {
    pub const INVALID: SchemaId = SchemaId(0);
    pub const SIZE: usize = 4;

    #[inline]
    pub fn is_valid(self) -> bool {
        self != SchemaId::INVALID
    }
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Header ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridRowHeader {
    pub version: HybridRowVersion,
    pub schema_id: SchemaId,
}

impl HybridRowHeader {
    pub fn new(version: HybridRowVersion, schema_id: SchemaId) -> Self {
        Self { version, schema_id }
    }

    /// Decode a header from the front of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, RowError> {
        if buf.len() < HEADER_SIZE {
            return Err(RowError::InvalidRow(format!(
                "{} bytes is shorter than the {HEADER_SIZE}-byte header",
                buf.len()
            )));
        }
        let version = HybridRowVersion::try_from(buf[0])?;
        let schema_id = SchemaId(i32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]));
        Ok(Self { version, schema_id })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.version.into();
        buf[1..HEADER_SIZE].copy_from_slice(&self.schema_id.0.to_le_bytes());
    }
}

// ─── Wide Values ────────────────────────────────────────────────────────────

/// IEEE 754 binary128 value carried as two raw 64-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Float128 {
    pub high: i64,
    pub low: i64,
}

impl Float128 {
    pub const fn new(high: i64, low: i64) -> Self {
        Self { high, low }
    }
}

/// 128-bit decimal floating value, stored as two little-endian 64-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    pub low: u64,
    pub high: u64,
}

impl Decimal {
    pub const fn new(high: u64, low: u64) -> Self {
        Self { low, high }
    }
}

/// Calendar date-time as 100ns ticks since 0001-01-01T00:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DateTime(pub i64);

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UnixDateTime(pub i64);

/// 12-byte MongoDB ObjectId, stored verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MongoDbObjectId(pub [u8; 12]);

// ─── Update Options ─────────────────────────────────────────────────────────

/// How a sparse write treats an existing field at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateOptions {
    /// No precondition.
    None,
    /// The field must already exist.
    Update,
    /// The field must not exist.
    Insert,
    /// Overwrite if present, insert otherwise.
    #[default]
    Upsert,
    /// Insert before the current element of an indexed scope.
    InsertAt,
}

/// `UpdateOptions` plus the delete that only `ensure_sparse` callers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowOptions {
    None,
    Update,
    Insert,
    Upsert,
    InsertAt,
    Delete,
}

impl From<UpdateOptions> for RowOptions {
    fn from(options: UpdateOptions) -> Self {
        match options {
            UpdateOptions::None => RowOptions::None,
            UpdateOptions::Update => RowOptions::Update,
            UpdateOptions::Insert => RowOptions::Insert,
            UpdateOptions::Upsert => RowOptions::Upsert,
            UpdateOptions::InsertAt => RowOptions::InsertAt,
        }
    }
}
