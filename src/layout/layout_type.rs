use std::sync::Arc;

use uuid::Uuid;

use crate::codec::{FixedWidth, count_7bit_encoded};
use crate::types::{
    DateTime, Decimal, Float128, LAYOUT_CODE_LEN, LayoutCode, MongoDbObjectId, SchemaId,
    UnixDateTime,
};

// ─── Scope Types ────────────────────────────────────────────────────────────

/// The nesting contexts a sparse field can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Object,
    Array,
    TypedArray,
    TypedSet,
    TypedMap,
    Tuple,
    TypedTuple,
    Tagged,
    Tagged2,
    Nullable,
    Udt,
}

impl ScopeKind {
    /// Children are addressed by position rather than by path.
    #[inline]
    pub fn is_indexed(self) -> bool {
        !matches!(self, ScopeKind::Object | ScopeKind::Udt)
    }

    /// Iteration stops at `index == count` instead of at an end-of-scope code.
    #[inline]
    pub fn is_sized(self) -> bool {
        matches!(
            self,
            ScopeKind::TypedArray
                | ScopeKind::TypedSet
                | ScopeKind::TypedMap
                | ScopeKind::TypedTuple
                | ScopeKind::Tagged
                | ScopeKind::Tagged2
                | ScopeKind::Nullable
        )
    }

    /// Element count is implied by the type arguments.
    #[inline]
    pub fn is_fixed_arity(self) -> bool {
        matches!(
            self,
            ScopeKind::Tuple
                | ScopeKind::TypedTuple
                | ScopeKind::Tagged
                | ScopeKind::Tagged2
                | ScopeKind::Nullable
        )
    }

    /// Sized, variable-arity scopes carry a u32 element count before the first element.
    #[inline]
    pub fn has_size_prefix(self) -> bool {
        self.is_sized() && !self.is_fixed_arity()
    }

    #[inline]
    pub fn is_unique(self) -> bool {
        matches!(self, ScopeKind::TypedSet | ScopeKind::TypedMap)
    }

    #[inline]
    pub fn is_typed(self) -> bool {
        matches!(
            self,
            ScopeKind::TypedArray
                | ScopeKind::TypedSet
                | ScopeKind::TypedMap
                | ScopeKind::TypedTuple
                | ScopeKind::Tagged
                | ScopeKind::Tagged2
                | ScopeKind::Nullable
        )
    }

    fn code(self, immutable: bool) -> LayoutCode {
        use LayoutCode::*;
        match (self, immutable) {
            (ScopeKind::Object, false) => ObjectScope,
            (ScopeKind::Object, true) => ImmutableObjectScope,
            (ScopeKind::Array, false) => ArrayScope,
            (ScopeKind::Array, true) => ImmutableArrayScope,
            (ScopeKind::TypedArray, false) => TypedArrayScope,
            (ScopeKind::TypedArray, true) => ImmutableTypedArrayScope,
            (ScopeKind::TypedSet, false) => TypedSetScope,
            (ScopeKind::TypedSet, true) => ImmutableTypedSetScope,
            (ScopeKind::TypedMap, false) => TypedMapScope,
            (ScopeKind::TypedMap, true) => ImmutableTypedMapScope,
            (ScopeKind::Tuple, false) => TupleScope,
            (ScopeKind::Tuple, true) => ImmutableTupleScope,
            (ScopeKind::TypedTuple, false) => TypedTupleScope,
            (ScopeKind::TypedTuple, true) => ImmutableTypedTupleScope,
            (ScopeKind::Tagged, false) => TaggedScope,
            (ScopeKind::Tagged, true) => ImmutableTaggedScope,
            (ScopeKind::Tagged2, false) => Tagged2Scope,
            (ScopeKind::Tagged2, true) => ImmutableTagged2Scope,
            (ScopeKind::Nullable, false) => NullableScope,
            (ScopeKind::Nullable, true) => ImmutableNullableScope,
            (ScopeKind::Udt, false) => Schema,
            (ScopeKind::Udt, true) => ImmutableSchema,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeType {
    pub kind: ScopeKind,
    pub immutable: bool,
}

impl ScopeType {
    pub const fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            immutable: false,
        }
    }

    pub const fn immutable(kind: ScopeKind) -> Self {
        Self {
            kind,
            immutable: true,
        }
    }

    #[inline]
    pub fn layout_code(self) -> LayoutCode {
        self.kind.code(self.immutable)
    }
}

// ─── Layout Type ────────────────────────────────────────────────────────────

/// Every type a sparse field or schematized column can have.
///
/// `Boolean` and `BooleanFalse` are one logical type: a sparse boolean's value
/// is its type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutType {
    EndScope,
    Null,
    Boolean,
    BooleanFalse,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    VarInt,
    VarUInt,
    Float32,
    Float64,
    Float128,
    Decimal,
    DateTime,
    UnixDateTime,
    Guid,
    MongoDbObjectId,
    Utf8,
    Binary,
    Scope(ScopeType),
}

impl LayoutType {
    pub const OBJECT: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::Object));
    pub const ARRAY: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::Array));
    pub const TYPED_ARRAY: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::TypedArray));
    pub const TYPED_SET: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::TypedSet));
    pub const TYPED_MAP: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::TypedMap));
    pub const TUPLE: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::Tuple));
    pub const TYPED_TUPLE: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::TypedTuple));
    pub const TAGGED: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::Tagged));
    pub const TAGGED2: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::Tagged2));
    pub const NULLABLE: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::Nullable));
    pub const UDT: LayoutType = LayoutType::Scope(ScopeType::new(ScopeKind::Udt));

    pub fn layout_code(self) -> LayoutCode {
        match self {
            LayoutType::EndScope => LayoutCode::EndScope,
            LayoutType::Null => LayoutCode::Null,
            LayoutType::Boolean => LayoutCode::Boolean,
            LayoutType::BooleanFalse => LayoutCode::BooleanFalse,
            LayoutType::Int8 => LayoutCode::Int8,
            LayoutType::Int16 => LayoutCode::Int16,
            LayoutType::Int32 => LayoutCode::Int32,
            LayoutType::Int64 => LayoutCode::Int64,
            LayoutType::UInt8 => LayoutCode::UInt8,
            LayoutType::UInt16 => LayoutCode::UInt16,
            LayoutType::UInt32 => LayoutCode::UInt32,
            LayoutType::UInt64 => LayoutCode::UInt64,
            LayoutType::VarInt => LayoutCode::VarInt,
            LayoutType::VarUInt => LayoutCode::VarUInt,
            LayoutType::Float32 => LayoutCode::Float32,
            LayoutType::Float64 => LayoutCode::Float64,
            LayoutType::Float128 => LayoutCode::Float128,
            LayoutType::Decimal => LayoutCode::Decimal,
            LayoutType::DateTime => LayoutCode::DateTime,
            LayoutType::UnixDateTime => LayoutCode::UnixDateTime,
            LayoutType::Guid => LayoutCode::Guid,
            LayoutType::MongoDbObjectId => LayoutCode::MongoDbObjectId,
            LayoutType::Utf8 => LayoutCode::Utf8,
            LayoutType::Binary => LayoutCode::Binary,
            LayoutType::Scope(scope) => scope.layout_code(),
        }
    }

    /// `None` for `LayoutCode::Invalid`.
    pub fn from_code(code: LayoutCode) -> Option<LayoutType> {
        use LayoutCode as C;
        let scope = |kind, immutable| Some(LayoutType::Scope(ScopeType { kind, immutable }));
        match code {
            C::Invalid => None,
            C::EndScope => Some(LayoutType::EndScope),
            C::Null => Some(LayoutType::Null),
            C::Boolean => Some(LayoutType::Boolean),
            C::BooleanFalse => Some(LayoutType::BooleanFalse),
            C::Int8 => Some(LayoutType::Int8),
            C::Int16 => Some(LayoutType::Int16),
            C::Int32 => Some(LayoutType::Int32),
            C::Int64 => Some(LayoutType::Int64),
            C::UInt8 => Some(LayoutType::UInt8),
            C::UInt16 => Some(LayoutType::UInt16),
            C::UInt32 => Some(LayoutType::UInt32),
            C::UInt64 => Some(LayoutType::UInt64),
            C::VarInt => Some(LayoutType::VarInt),
            C::VarUInt => Some(LayoutType::VarUInt),
            C::Float32 => Some(LayoutType::Float32),
            C::Float64 => Some(LayoutType::Float64),
            C::Float128 => Some(LayoutType::Float128),
            C::Decimal => Some(LayoutType::Decimal),
            C::DateTime => Some(LayoutType::DateTime),
            C::UnixDateTime => Some(LayoutType::UnixDateTime),
            C::Guid => Some(LayoutType::Guid),
            C::MongoDbObjectId => Some(LayoutType::MongoDbObjectId),
            C::Utf8 => Some(LayoutType::Utf8),
            C::Binary => Some(LayoutType::Binary),
            C::ObjectScope => scope(ScopeKind::Object, false),
            C::ImmutableObjectScope => scope(ScopeKind::Object, true),
            C::ArrayScope => scope(ScopeKind::Array, false),
            C::ImmutableArrayScope => scope(ScopeKind::Array, true),
            C::TypedArrayScope => scope(ScopeKind::TypedArray, false),
            C::ImmutableTypedArrayScope => scope(ScopeKind::TypedArray, true),
            C::TypedSetScope => scope(ScopeKind::TypedSet, false),
            C::ImmutableTypedSetScope => scope(ScopeKind::TypedSet, true),
            C::TypedMapScope => scope(ScopeKind::TypedMap, false),
            C::ImmutableTypedMapScope => scope(ScopeKind::TypedMap, true),
            C::TupleScope => scope(ScopeKind::Tuple, false),
            C::ImmutableTupleScope => scope(ScopeKind::Tuple, true),
            C::TypedTupleScope => scope(ScopeKind::TypedTuple, false),
            C::ImmutableTypedTupleScope => scope(ScopeKind::TypedTuple, true),
            C::TaggedScope => scope(ScopeKind::Tagged, false),
            C::ImmutableTaggedScope => scope(ScopeKind::Tagged, true),
            C::Tagged2Scope => scope(ScopeKind::Tagged2, false),
            C::ImmutableTagged2Scope => scope(ScopeKind::Tagged2, true),
            C::NullableScope => scope(ScopeKind::Nullable, false),
            C::ImmutableNullableScope => scope(ScopeKind::Nullable, true),
            C::Schema => scope(ScopeKind::Udt, false),
            C::ImmutableSchema => scope(ScopeKind::Udt, true),
        }
    }

    #[inline]
    pub fn as_scope(self) -> Option<ScopeType> {
        match self {
            LayoutType::Scope(scope) => Some(scope),
            _ => None,
        }
    }

    #[inline]
    pub fn is_scope(self) -> bool {
        matches!(self, LayoutType::Scope(_))
    }

    #[inline]
    pub fn is_bool(self) -> bool {
        matches!(self, LayoutType::Boolean | LayoutType::BooleanFalse)
    }

    /// Varint-typed values are their own length prefix.
    #[inline]
    pub fn is_varint(self) -> bool {
        matches!(self, LayoutType::VarInt | LayoutType::VarUInt)
    }

    /// Types that can live in the variable region of a layout.
    #[inline]
    pub fn is_variable_len(self) -> bool {
        matches!(
            self,
            LayoutType::Utf8 | LayoutType::Binary | LayoutType::VarInt | LayoutType::VarUInt
        )
    }

    #[inline]
    pub fn always_requires_type_code(self) -> bool {
        self.layout_code().always_requires_type_code()
    }

    /// Encoded value size of a fixed-width primitive; `None` for variable and scope types.
    pub fn fixed_size(self) -> Option<usize> {
        let size = match self {
            LayoutType::Null | LayoutType::Boolean | LayoutType::BooleanFalse => 0,
            LayoutType::Int8 | LayoutType::UInt8 => 1,
            LayoutType::Int16 | LayoutType::UInt16 => 2,
            LayoutType::Int32 | LayoutType::UInt32 | LayoutType::Float32 => 4,
            LayoutType::Int64
            | LayoutType::UInt64
            | LayoutType::Float64
            | LayoutType::DateTime
            | LayoutType::UnixDateTime => 8,
            LayoutType::MongoDbObjectId => 12,
            LayoutType::Float128 | LayoutType::Decimal | LayoutType::Guid => 16,
            LayoutType::EndScope
            | LayoutType::VarInt
            | LayoutType::VarUInt
            | LayoutType::Utf8
            | LayoutType::Binary
            | LayoutType::Scope(_) => return None,
        };
        Some(size)
    }

    /// Same logical type, treating the two boolean codes as one.
    #[inline]
    pub fn same_kind(self, other: LayoutType) -> bool {
        self.layout_code().canonicalize() == other.layout_code().canonicalize()
    }

    /// Encoded size of this type's code plus its type arguments.
    pub fn count_type_argument(self, args: &TypeArgumentList) -> usize {
        let nested = |skip: usize| -> usize {
            args.iter()
                .skip(skip)
                .map(|arg| arg.ty.count_type_argument(&arg.args))
                .sum()
        };
        let args_len = match self {
            LayoutType::Scope(scope) => match scope.kind {
                ScopeKind::Object | ScopeKind::Array => 0,
                ScopeKind::TypedArray
                | ScopeKind::TypedSet
                | ScopeKind::TypedMap
                | ScopeKind::Nullable => nested(0),
                ScopeKind::Tagged | ScopeKind::Tagged2 => nested(1),
                ScopeKind::Tuple | ScopeKind::TypedTuple => {
                    count_7bit_encoded(args.len() as u64) + nested(0)
                }
                ScopeKind::Udt => SchemaId::SIZE,
            },
            _ => 0,
        };
        LAYOUT_CODE_LEN + args_len
    }

    pub fn name(self) -> &'static str {
        match self {
            LayoutType::EndScope => "end",
            LayoutType::Null => "null",
            LayoutType::Boolean | LayoutType::BooleanFalse => "bool",
            LayoutType::Int8 => "int8",
            LayoutType::Int16 => "int16",
            LayoutType::Int32 => "int32",
            LayoutType::Int64 => "int64",
            LayoutType::UInt8 => "uint8",
            LayoutType::UInt16 => "uint16",
            LayoutType::UInt32 => "uint32",
            LayoutType::UInt64 => "uint64",
            LayoutType::VarInt => "varint",
            LayoutType::VarUInt => "varuint",
            LayoutType::Float32 => "float32",
            LayoutType::Float64 => "float64",
            LayoutType::Float128 => "float128",
            LayoutType::Decimal => "decimal",
            LayoutType::DateTime => "datetime",
            LayoutType::UnixDateTime => "unixdatetime",
            LayoutType::Guid => "guid",
            LayoutType::MongoDbObjectId => "mongodbobjectid",
            LayoutType::Utf8 => "utf8",
            LayoutType::Binary => "binary",
            LayoutType::Scope(scope) => match scope.kind {
                ScopeKind::Object => "object",
                ScopeKind::Array => "array",
                ScopeKind::TypedArray => "typed_array",
                ScopeKind::TypedSet => "typed_set",
                ScopeKind::TypedMap => "typed_map",
                ScopeKind::Tuple => "tuple",
                ScopeKind::TypedTuple => "typed_tuple",
                ScopeKind::Tagged => "tagged",
                ScopeKind::Tagged2 => "tagged2",
                ScopeKind::Nullable => "nullable",
                ScopeKind::Udt => "schema",
            },
        }
    }

    /// Inverse of [`LayoutType::name`] for the types a schema document can name.
    pub fn from_name(name: &str) -> Option<LayoutType> {
        let ty = match name {
            "null" => LayoutType::Null,
            "bool" => LayoutType::Boolean,
            "int8" => LayoutType::Int8,
            "int16" => LayoutType::Int16,
            "int32" => LayoutType::Int32,
            "int64" => LayoutType::Int64,
            "uint8" => LayoutType::UInt8,
            "uint16" => LayoutType::UInt16,
            "uint32" => LayoutType::UInt32,
            "uint64" => LayoutType::UInt64,
            "varint" => LayoutType::VarInt,
            "varuint" => LayoutType::VarUInt,
            "float32" => LayoutType::Float32,
            "float64" => LayoutType::Float64,
            "float128" => LayoutType::Float128,
            "decimal" => LayoutType::Decimal,
            "datetime" => LayoutType::DateTime,
            "unixdatetime" => LayoutType::UnixDateTime,
            "guid" => LayoutType::Guid,
            "mongodbobjectid" => LayoutType::MongoDbObjectId,
            "utf8" => LayoutType::Utf8,
            "binary" => LayoutType::Binary,
            "object" => LayoutType::OBJECT,
            "array" => LayoutType::ARRAY,
            "typed_array" => LayoutType::TYPED_ARRAY,
            "typed_set" => LayoutType::TYPED_SET,
            "typed_map" => LayoutType::TYPED_MAP,
            "tuple" => LayoutType::TUPLE,
            "typed_tuple" => LayoutType::TYPED_TUPLE,
            "tagged" => LayoutType::TAGGED,
            "tagged2" => LayoutType::TAGGED2,
            "nullable" => LayoutType::NULLABLE,
            "schema" => LayoutType::UDT,
            _ => return None,
        };
        Some(ty)
    }
}

impl std::fmt::Display for LayoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Type Arguments ─────────────────────────────────────────────────────────

/// A type together with the arguments that parameterize it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeArgument {
    pub ty: LayoutType,
    pub args: TypeArgumentList,
}

impl TypeArgument {
    pub fn new(ty: LayoutType) -> Self {
        Self {
            ty,
            args: TypeArgumentList::empty(),
        }
    }

    pub fn with_args(ty: LayoutType, args: TypeArgumentList) -> Self {
        Self { ty, args }
    }

    /// Equality with the boolean codes folded together at the top level.
    pub fn is_compatible(&self, other: &TypeArgument) -> bool {
        self.ty.same_kind(other.ty) && self.args == other.args
    }
}

/// Ordered type arguments, or the schema id of a UDT.
///
/// Backed by an `Arc` so cursors clone it without allocating. Tagged scopes
/// keep their implicit `UInt8` tag as argument 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeArgumentList {
    args: Arc<[TypeArgument]>,
    schema_id: SchemaId,
}

impl Default for TypeArgumentList {
    fn default() -> Self {
        Self::empty()
    }
}

impl TypeArgumentList {
    pub fn empty() -> Self {
        Self {
            args: Arc::from(Vec::new()),
            schema_id: SchemaId::INVALID,
        }
    }

    pub fn new(args: Vec<TypeArgument>) -> Self {
        Self {
            args: Arc::from(args),
            schema_id: SchemaId::INVALID,
        }
    }

    pub fn from_schema_id(schema_id: SchemaId) -> Self {
        Self {
            args: Arc::from(Vec::new()),
            schema_id,
        }
    }

    /// Arguments of a tagged scope carrying a value of type `value`.
    pub fn tagged(value: TypeArgument) -> Self {
        Self::new(vec![TypeArgument::new(LayoutType::UInt8), value])
    }

    /// Arguments of a tagged scope carrying two values.
    pub fn tagged2(first: TypeArgument, second: TypeArgument) -> Self {
        Self::new(vec![TypeArgument::new(LayoutType::UInt8), first, second])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<&TypeArgument> {
        self.args.get(i)
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, TypeArgument> {
        self.args.iter()
    }

    #[inline]
    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }
}

impl std::ops::Index<usize> for TypeArgumentList {
    type Output = TypeArgument;

    fn index(&self, i: usize) -> &TypeArgument {
        &self.args[i]
    }
}

// ─── Sparse Primitives ──────────────────────────────────────────────────────

/// A fixed-width value that maps onto exactly one layout type.
pub trait SparsePrimitive: FixedWidth {
    const LAYOUT_TYPE: LayoutType;
}

macro_rules! impl_sparse_primitive {
    ($($t:ty => $layout:ident),* $(,)?) => {
        $(
            impl SparsePrimitive for $t {
                const LAYOUT_TYPE: LayoutType = LayoutType::$layout;
            }
        )*
    };
}

impl_sparse_primitive!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    Float128 => Float128,
    Decimal => Decimal,
    DateTime => DateTime,
    UnixDateTime => UnixDateTime,
    Uuid => Guid,
    MongoDbObjectId => MongoDbObjectId,
);
