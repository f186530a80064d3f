//! Metadata lookup for the rewriter
//!
//! The rewriter consults metadata read-only: column types and nullability,
//! table unique keys, and column defaults. `MetadataLookup` is the seam an
//! embedder implements against its own catalog; `Catalog` is the in-memory
//! implementation used by tests and embedded deployments.

use crate::ast::ColumnRef;
use dashmap::DashMap;
use meridian_common::error::MetadataError;
use meridian_common::prelude::*;
use meridian_common::types::{DataType, Schema, Value};
use std::sync::Arc;

/// Read-only metadata interface consulted during rewriting
pub trait MetadataLookup: Send + Sync {
    /// Resolve the declared type of a column
    fn resolve_type(&self, table: &str, column: &str) -> Result<DataType, MetadataError>;

    /// Whether a column may hold NULL
    fn is_nullable(&self, table: &str, column: &str) -> Result<bool, MetadataError>;

    /// The columns of a unique key on the table, when one exists
    fn unique_key(&self, table: &str) -> Option<Vec<ColumnRef>>;

    /// The declared default value of a column, when one exists
    fn column_default(&self, table: &str, column: &str) -> Option<Value>;

    /// The full schema of a table
    fn table_schema(&self, table: &str) -> Result<Schema, MetadataError>;
}

/// Metadata for one registered table
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub name: String,
    pub schema: Schema,
    /// Column names forming a unique key, when known
    pub unique_key: Vec<String>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            unique_key: Vec::new(),
        }
    }

    pub fn with_unique_key(mut self, columns: Vec<String>) -> Self {
        self.unique_key = columns;
        self
    }
}

/// In-memory catalog. Tables are indexed case-insensitively; one catalog
/// instance can serve many concurrent rewrites.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: DashMap<String, Arc<TableInfo>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&self, info: TableInfo) {
        let key = info.name.to_lowercase();
        debug!(table = %info.name, columns = info.schema.columns.len(), "registering table");
        self.tables.insert(key, Arc::new(info));
    }

    pub fn table(&self, name: &str) -> Option<Arc<TableInfo>> {
        self.tables.get(&name.to_lowercase()).map(|t| t.clone())
    }

    fn lookup(&self, table: &str) -> Result<Arc<TableInfo>, MetadataError> {
        self.table(table)
            .ok_or_else(|| MetadataError::TableNotFound(table.to_string()))
    }
}

impl MetadataLookup for Catalog {
    fn resolve_type(&self, table: &str, column: &str) -> Result<DataType, MetadataError> {
        let info = self.lookup(table)?;
        info.schema
            .column_by_name(column)
            .map(|(_, c)| c.data_type.clone())
            .ok_or_else(|| MetadataError::ColumnNotFound(format!("{}.{}", table, column)))
    }

    fn is_nullable(&self, table: &str, column: &str) -> Result<bool, MetadataError> {
        let info = self.lookup(table)?;
        info.schema
            .column_by_name(column)
            .map(|(_, c)| c.nullable)
            .ok_or_else(|| MetadataError::ColumnNotFound(format!("{}.{}", table, column)))
    }

    fn unique_key(&self, table: &str) -> Option<Vec<ColumnRef>> {
        let info = self.table(table)?;
        if info.unique_key.is_empty() {
            return None;
        }
        let mut key = Vec::with_capacity(info.unique_key.len());
        for name in &info.unique_key {
            let (_, col) = info.schema.column_by_name(name)?;
            key.push(ColumnRef {
                table: info.name.clone(),
                name: col.name.clone(),
                ty: col.data_type.clone(),
                nullable: col.nullable,
            });
        }
        Some(key)
    }

    fn column_default(&self, table: &str, column: &str) -> Option<Value> {
        let info = self.table(table)?;
        let (_, col) = info.schema.column_by_name(column)?;
        col.default.clone()
    }

    fn table_schema(&self, table: &str) -> Result<Schema, MetadataError> {
        self.lookup(table).map(|info| info.schema.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_common::testing::fixtures;

    fn test_catalog() -> Catalog {
        let catalog = Catalog::new();
        let mut schema = fixtures::sample_schema();
        schema.columns[1].default = Some(Value::Int32(0));
        catalog.register_table(
            TableInfo::new("pm1", schema).with_unique_key(vec!["e2".to_string()]),
        );
        catalog
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let catalog = test_catalog();
        assert_eq!(
            catalog.resolve_type("PM1", "E1").unwrap(),
            DataType::String
        );
        assert!(catalog.is_nullable("pm1", "e1").unwrap());
    }

    #[test]
    fn test_unknown_table_and_column() {
        let catalog = test_catalog();
        assert!(matches!(
            catalog.resolve_type("nope", "e1"),
            Err(MetadataError::TableNotFound(_))
        ));
        assert!(matches!(
            catalog.resolve_type("pm1", "nope"),
            Err(MetadataError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_unique_key_and_default() {
        let catalog = test_catalog();
        let key = catalog.unique_key("pm1").unwrap();
        assert_eq!(key.len(), 1);
        assert_eq!(key[0].name, "e2");
        assert_eq!(catalog.column_default("pm1", "e2"), Some(Value::Int32(0)));
        assert_eq!(catalog.column_default("pm1", "e1"), None);
    }
}
