//! Testing utilities and fixtures

/// Test fixtures for common scenarios
pub mod fixtures {
    use crate::types::*;

    /// The canonical test table: pm1.g1 (e1 TEXT, e2 INTEGER, e3 BOOLEAN, e4 DOUBLE)
    pub fn sample_schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("e1", DataType::String),
            ColumnDef::new("e2", DataType::Int32),
            ColumnDef::new("e3", DataType::Boolean),
            ColumnDef::new("e4", DataType::Float64),
        ])
    }

    /// A schema with one nullable and one non-nullable column of each of the
    /// types the nullability-gated rewrite rules care about.
    pub fn nullability_schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("s_null", DataType::String),
            ColumnDef::new("s_req", DataType::String).not_null(),
            ColumnDef::new("i_null", DataType::Int32),
            ColumnDef::new("i_req", DataType::Int32).not_null(),
        ])
    }

    /// Generate sample rows matching `sample_schema`
    pub fn sample_rows(count: usize) -> Vec<Row> {
        (0..count)
            .map(|i| {
                Row::new(vec![
                    if i % 5 == 0 {
                        Value::Null
                    } else {
                        Value::String(format!("name_{}", i).into())
                    },
                    Value::Int32(i as i32),
                    Value::Boolean(i % 2 == 0),
                    Value::Float64(i as f64 * 1.5),
                ])
            })
            .collect()
    }
}
