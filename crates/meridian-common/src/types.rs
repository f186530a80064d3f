//! Core types for Meridian
//!
//! The scalar type system is deliberately closed: the rewriter reasons about
//! a fixed set of SQL scalar types plus a NULL type, and every expression
//! node carries one of these resolved types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Data Types
// ============================================================================

/// SQL scalar data types known to the rewriter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// The type of an untyped NULL literal
    Null,
    /// Boolean
    Boolean,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Fixed-precision decimal
    Decimal { precision: u8, scale: u8 },
    /// Variable-length string
    String,
    /// Fixed-length string
    Char(u32),
    /// Variable-length string with max length
    Varchar(u32),
    /// Binary data
    Binary,
    /// Date (days since epoch)
    Date,
    /// Time (microseconds since midnight)
    Time,
    /// Timestamp (microseconds since epoch)
    Timestamp,
    /// UUID
    Uuid,
}

impl DataType {
    /// Returns true if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Float32
                | DataType::Float64
                | DataType::Decimal { .. }
        )
    }

    /// Returns true if this type is a string type
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            DataType::String | DataType::Char(_) | DataType::Varchar(_)
        )
    }

    /// Returns true if this type is a temporal type
    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Time | DataType::Timestamp)
    }

    /// Returns true if values of the two types can appear on the two sides
    /// of a comparison without an explicit conversion
    pub fn is_comparable_to(&self, other: &DataType) -> bool {
        if self == other || *self == DataType::Null || *other == DataType::Null {
            return true;
        }
        (self.is_numeric() && other.is_numeric()) || (self.is_string() && other.is_string())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "NULL"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Int16 => write!(f, "SMALLINT"),
            DataType::Int32 => write!(f, "INTEGER"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float32 => write!(f, "REAL"),
            DataType::Float64 => write!(f, "DOUBLE"),
            DataType::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            DataType::String => write!(f, "TEXT"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Binary => write!(f, "BYTEA"),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Uuid => write!(f, "UUID"),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(i128, u8), // unscaled value, scale
    String(Arc<str>),
    Binary(Arc<[u8]>),
    Date(i32),      // days since epoch
    Time(i64),      // microseconds since midnight
    Timestamp(i64), // microseconds since epoch
    Uuid([u8; 16]),
}

impl Value {
    /// Returns the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Int16(_) => DataType::Int16,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float32(_) => DataType::Float32,
            Value::Float64(_) => DataType::Float64,
            Value::Decimal(_, scale) => DataType::Decimal {
                precision: 38,
                scale: *scale,
            },
            Value::String(_) => DataType::String,
            Value::Binary(_) => DataType::Binary,
            Value::Date(_) => DataType::Date,
            Value::Time(_) => DataType::Time,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Uuid(_) => DataType::Uuid,
        }
    }

    /// Returns true if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Int16(v) => Some(*v as f64),
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Decimal(v, s) => Some(*v as f64 / 10f64.powi(*s as i32)),
            _ => None,
        }
    }

    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// SQL comparison of two values.
    ///
    /// Returns `None` when either side is NULL or the values are not
    /// comparable; numeric values compare across widths.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.as_ref().cmp(b.as_ref())),
            (Binary(a), Binary(b)) => Some(a.as_ref().cmp(b.as_ref())),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Uuid(a), Uuid(b)) => Some(a.cmp(b)),
            (Decimal(a, sa), Decimal(b, sb)) => compare_decimals(*a, *sa, *b, *sb),
            _ => {
                // Cross-width numeric comparison
                if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
                    return Some(a.cmp(&b));
                }
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                }
            }
        }
    }

    /// Structural equality suitable for duplicate elimination: NULLs are
    /// considered identical here (unlike SQL equality, which is UNKNOWN).
    pub fn same_as(&self, other: &Value) -> bool {
        if self.is_null() && other.is_null() {
            return true;
        }
        self.compare(other) == Some(Ordering::Equal)
    }
}

fn compare_decimals(a: i128, sa: u8, b: i128, sb: u8) -> Option<Ordering> {
    // Align to the larger scale; overflow falls back to float compare
    let (hi, lo, swap) = if sa >= sb { (sa, sb, false) } else { (sb, sa, true) };
    let factor = 10i128.checked_pow((hi - lo) as u32)?;
    let (av, bv) = if swap {
        (a.checked_mul(factor)?, b)
    } else {
        (a, b.checked_mul(factor)?)
    };
    Some(av.cmp(&bv))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v, scale) => {
                let divisor = 10i128.pow(*scale as u32);
                if *scale == 0 {
                    write!(f, "{}", v)
                } else {
                    write!(
                        f,
                        "{}.{:0>width$}",
                        v / divisor,
                        (v % divisor).abs(),
                        width = *scale as usize
                    )
                }
            }
            Value::String(v) => write!(f, "'{}'", v),
            Value::Binary(v) => write!(f, "X'{}'", hex::encode(v.as_ref())),
            Value::Date(v) => {
                let d = chrono::NaiveDate::from_num_days_from_ce_opt(*v + 719_163);
                match d {
                    Some(d) => write!(f, "DATE '{}'", d),
                    None => write!(f, "DATE <{}>", v),
                }
            }
            Value::Time(v) => write!(f, "TIME <{}>", v),
            Value::Timestamp(v) => {
                match chrono::DateTime::from_timestamp_micros(*v) {
                    Some(ts) => write!(f, "TIMESTAMP '{}'", ts.naive_utc()),
                    None => write!(f, "TIMESTAMP <{}>", v),
                }
            }
            Value::Uuid(v) => write!(f, "'{}'", uuid::Uuid::from_bytes(*v)),
        }
    }
}

// ============================================================================
// Row
// ============================================================================

/// A row of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self { values: vec![] }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Definition of a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Schema of a table or result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    pub fn empty() -> Self {
        Self { columns: vec![] }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    pub fn column_by_name(&self, name: &str) -> Option<(usize, &ColumnDef)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}
