//! HybridRow: a schema-driven binary row format.
//!
//! A row is a header, a fixed region of schematized columns, a variable
//! region of length-prefixed columns, and a sparse region of self-describing
//! fields that may nest into objects, arrays, typed collections, tuples and
//! nested schemas. All access goes through [`RowBuffer`] and [`RowCursor`].

pub mod codec;
pub mod config;
pub mod error;
pub mod layout;
pub mod row;
pub mod types;

pub use config::RowConfig;
pub use error::{Result, RowError};
pub use layout::{
    Layout, LayoutBuilder, LayoutResolver, LayoutResolverNamespace, LayoutType, ScopeKind,
    TypeArgument, TypeArgumentList,
};
pub use row::{RowBuffer, RowCursor, UnboundRowBuffer, UniqueIndexItem};
pub use types::{HybridRowVersion, SchemaId, UpdateOptions};
