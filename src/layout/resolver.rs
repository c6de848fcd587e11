use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::Layout;
use super::builder::SchemaDef;
use crate::error::RowError;
use crate::types::SchemaId;

/// Schema id → layout lookup a bound row consults for its root and nested UDTs.
pub trait LayoutResolver: std::fmt::Debug + Send + Sync {
    fn resolve(&self, schema_id: SchemaId) -> Option<Arc<Layout>>;
}

/// A fixed set of layouts held in memory.
#[derive(Debug, Default)]
pub struct LayoutResolverNamespace {
    layouts: FxHashMap<SchemaId, Arc<Layout>>,
}

/// JSON form of a namespace: a list of schemas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceDef {
    #[serde(default)]
    pub schemas: Vec<SchemaDef>,
}

impl LayoutResolverNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `layout`, returning the layout it replaced under the same id.
    pub fn register(&mut self, layout: Arc<Layout>) -> Option<Arc<Layout>> {
        self.layouts.insert(layout.schema_id(), layout)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn from_def(def: &NamespaceDef) -> Result<Self, RowError> {
        let mut namespace = Self::new();
        for schema in &def.schemas {
            let layout = schema.compile()?;
            if namespace.register(Arc::new(layout)).is_some() {
                return Err(RowError::Config(format!(
                    "schema id {} defined twice",
                    schema.id
                )));
            }
        }
        Ok(namespace)
    }

    pub fn from_json(json: &str) -> Result<Self, RowError> {
        let def: NamespaceDef =
            serde_json::from_str(json).map_err(|e| RowError::Config(e.to_string()))?;
        Self::from_def(&def)
    }
}

impl LayoutResolver for LayoutResolverNamespace {
    fn resolve(&self, schema_id: SchemaId) -> Option<Arc<Layout>> {
        self.layouts.get(&schema_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_from_json() {
        let json = r#"{
            "schemas": [
                { "name": "Point", "id": 2, "columns": [
                    { "path": "x", "type": "int32", "storage": "fixed" },
                    { "path": "y", "type": "int32", "storage": "fixed" }
                ]},
                { "name": "Shape", "id": 1, "columns": [
                    { "path": "origin", "type": "schema", "storage": "sparse", "schema_id": 2 }
                ]}
            ]
        }"#;
        let namespace = LayoutResolverNamespace::from_json(json).unwrap();
        assert_eq!(namespace.len(), 2);
        let point = namespace.resolve(SchemaId(2)).unwrap();
        assert_eq!(point.name(), "Point");
        assert_eq!(point.size(), 8);
        assert!(namespace.resolve(SchemaId(3)).is_none());
    }

    #[test]
    fn test_duplicate_schema_id_rejected() {
        let json = r#"{ "schemas": [
            { "name": "A", "id": 1, "columns": [] },
            { "name": "B", "id": 1, "columns": [] }
        ]}"#;
        assert!(matches!(
            LayoutResolverNamespace::from_json(json),
            Err(RowError::Config(_))
        ));
    }
}
