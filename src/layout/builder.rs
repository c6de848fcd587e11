use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::{
    Layout, LayoutBit, LayoutColumn, LayoutType, ScopeKind, StorageKind, StringTokenizer,
    TypeArgument, TypeArgumentList,
};
use crate::error::RowError;
use crate::types::SchemaId;

#[derive(Debug, Clone)]
struct PendingColumn {
    path: SmolStr,
    ty: LayoutType,
    type_args: TypeArgumentList,
    nullable: bool,
    length: usize,
}

/// Assembles a [`Layout`] column by column.
///
/// Presence bits go to nullable fixed columns, the value bits of fixed booleans
/// and every variable column, in that order. Fixed slots follow the bitmask.
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    name: SmolStr,
    schema_id: SchemaId,
    fixed: Vec<PendingColumn>,
    variable: Vec<PendingColumn>,
    sparse: Vec<PendingColumn>,
}

impl LayoutBuilder {
    pub fn new(name: &str, schema_id: SchemaId) -> Self {
        Self {
            name: SmolStr::new(name),
            schema_id,
            fixed: Vec::new(),
            variable: Vec::new(),
            sparse: Vec::new(),
        }
    }

    /// `length` is the slot width of a fixed `Utf8`/`Binary` column and ignored otherwise.
    pub fn add_fixed_column(
        &mut self,
        path: &str,
        ty: LayoutType,
        nullable: bool,
        length: usize,
    ) -> &mut Self {
        self.fixed.push(PendingColumn {
            path: SmolStr::new(path),
            ty,
            type_args: TypeArgumentList::empty(),
            nullable,
            length,
        });
        self
    }

    /// `length` caps the encoded value size; 0 is unbounded.
    pub fn add_variable_column(&mut self, path: &str, ty: LayoutType, length: usize) -> &mut Self {
        self.variable.push(PendingColumn {
            path: SmolStr::new(path),
            ty,
            type_args: TypeArgumentList::empty(),
            nullable: true,
            length,
        });
        self
    }

    pub fn add_sparse_column(
        &mut self,
        path: &str,
        ty: LayoutType,
        type_args: TypeArgumentList,
    ) -> &mut Self {
        self.sparse.push(PendingColumn {
            path: SmolStr::new(path),
            ty,
            type_args,
            nullable: true,
            length: 0,
        });
        self
    }

    pub fn build(&self) -> Result<Layout, RowError> {
        let mut next_bit = 0u32;
        let mut alloc_bit = || {
            let bit = LayoutBit::new(next_bit);
            next_bit += 1;
            bit
        };

        let mut fixed_bits = Vec::with_capacity(self.fixed.len());
        for col in &self.fixed {
            let width = match col.ty {
                LayoutType::Utf8 | LayoutType::Binary if col.length > 0 => col.length,
                LayoutType::Null => {
                    return Err(RowError::Config(format!(
                        "`{}` cannot be a fixed column",
                        col.path
                    )));
                }
                ty => ty.fixed_size().ok_or_else(|| {
                    RowError::Config(format!(
                        "fixed column `{}` has non-fixed type {ty}",
                        col.path
                    ))
                })?,
            };
            let null_bit = if col.nullable {
                alloc_bit()
            } else {
                LayoutBit::INVALID
            };
            let bool_bit = if col.ty.is_bool() {
                alloc_bit()
            } else {
                LayoutBit::INVALID
            };
            fixed_bits.push((null_bit, bool_bit, width));
        }
        let mut variable_bits = Vec::with_capacity(self.variable.len());
        for col in &self.variable {
            if !col.ty.is_variable_len() {
                return Err(RowError::Config(format!(
                    "variable column `{}` has type {}",
                    col.path, col.ty
                )));
            }
            variable_bits.push(alloc_bit());
        }
        for col in &self.sparse {
            if col.ty == LayoutType::EndScope {
                return Err(RowError::Config(format!(
                    "`{}` cannot be a sparse column",
                    col.path
                )));
            }
        }

        let num_bitmask_bytes = (next_bit as usize).div_ceil(8);
        let mut tokenizer = StringTokenizer::new();
        let mut paths = FxHashMap::default();
        let mut columns = Vec::with_capacity(self.fixed.len() + self.variable.len() + self.sparse.len());
        let mut push = |col: &PendingColumn, column: LayoutColumn| -> Result<(), RowError> {
            if paths.insert(col.path.clone(), columns.len()).is_some() {
                return Err(RowError::Config(format!("duplicate column path `{}`", col.path)));
            }
            columns.push(column);
            Ok(())
        };

        let mut offset = num_bitmask_bytes;
        for (i, (col, &(null_bit, bool_bit, width))) in self.fixed.iter().zip(&fixed_bits).enumerate() {
            let column = LayoutColumn {
                path: col.path.clone(),
                token: tokenizer.add(&col.path),
                ty: col.ty,
                type_args: col.type_args.clone(),
                storage: StorageKind::Fixed,
                index: i,
                offset,
                null_bit,
                bool_bit,
                size: width,
            };
            push(col, column)?;
            offset += width;
        }
        for (i, (col, &null_bit)) in self.variable.iter().zip(&variable_bits).enumerate() {
            let column = LayoutColumn {
                path: col.path.clone(),
                token: tokenizer.add(&col.path),
                ty: col.ty,
                type_args: col.type_args.clone(),
                storage: StorageKind::Variable,
                index: i,
                offset: 0,
                null_bit,
                bool_bit: LayoutBit::INVALID,
                size: col.length,
            };
            push(col, column)?;
        }
        for (i, col) in self.sparse.iter().enumerate() {
            let column = LayoutColumn {
                path: col.path.clone(),
                token: tokenizer.add(&col.path),
                ty: col.ty,
                type_args: col.type_args.clone(),
                storage: StorageKind::Sparse,
                index: i,
                offset: 0,
                null_bit: LayoutBit::INVALID,
                bool_bit: LayoutBit::INVALID,
                size: 0,
            };
            push(col, column)?;
        }

        Ok(Layout {
            name: self.name.clone(),
            schema_id: self.schema_id,
            size: offset,
            num_bitmask_bytes,
            num_fixed: self.fixed.len(),
            num_variable: self.variable.len(),
            columns,
            tokenizer,
            paths,
        })
    }
}

// ─── Schema Documents ───────────────────────────────────────────────────────

/// A type reference inside a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<TypeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<SchemaId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub path: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub storage: StorageKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub length: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<TypeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<SchemaId>,
}

/// A schema as loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDef {
    pub name: String,
    pub id: SchemaId,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl SchemaDef {
    pub fn from_json(json: &str) -> Result<Self, RowError> {
        serde_json::from_str(json).map_err(|e| RowError::Config(e.to_string()))
    }

    pub fn compile(&self) -> Result<Layout, RowError> {
        let mut builder = LayoutBuilder::new(&self.name, self.id);
        for col in &self.columns {
            let arg = resolve_type(&col.ty, &col.args, col.schema_id)?;
            match col.storage {
                StorageKind::Fixed => {
                    builder.add_fixed_column(&col.path, arg.ty, col.nullable, col.length)
                }
                StorageKind::Variable => builder.add_variable_column(&col.path, arg.ty, col.length),
                StorageKind::Sparse => builder.add_sparse_column(&col.path, arg.ty, arg.args),
            };
        }
        builder.build()
    }
}

fn resolve_type(
    name: &str,
    args: &[TypeDef],
    schema_id: Option<SchemaId>,
) -> Result<TypeArgument, RowError> {
    let ty = LayoutType::from_name(name)
        .ok_or_else(|| RowError::Config(format!("unknown type `{name}`")))?;
    let Some(scope) = ty.as_scope() else {
        return Ok(TypeArgument::new(ty));
    };

    if scope.kind == ScopeKind::Udt {
        let id = schema_id
            .filter(|id| id.is_valid())
            .ok_or_else(|| RowError::Config("schema type needs a schema_id".to_string()))?;
        return Ok(TypeArgument::with_args(ty, TypeArgumentList::from_schema_id(id)));
    }

    let expected = match scope.kind {
        ScopeKind::Object | ScopeKind::Array => Some(0),
        ScopeKind::TypedArray | ScopeKind::TypedSet | ScopeKind::Nullable | ScopeKind::Tagged => {
            Some(1)
        }
        ScopeKind::TypedMap | ScopeKind::Tagged2 => Some(2),
        ScopeKind::Tuple | ScopeKind::TypedTuple | ScopeKind::Udt => None,
    };
    if let Some(n) = expected.filter(|&n| n != args.len()) {
        return Err(RowError::Config(format!(
            "`{name}` takes {n} type arguments, got {}",
            args.len()
        )));
    }

    let mut resolved = Vec::with_capacity(args.len() + 1);
    if matches!(scope.kind, ScopeKind::Tagged | ScopeKind::Tagged2) {
        resolved.push(TypeArgument::new(LayoutType::UInt8));
    }
    for arg in args {
        resolved.push(resolve_type(&arg.ty, &arg.args, arg.schema_id)?);
    }
    Ok(TypeArgument::with_args(ty, TypeArgumentList::new(resolved)))
}
