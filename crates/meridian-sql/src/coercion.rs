//! Type coercion rules
//!
//! Widening and narrowing judgments drive two rewrites: set-operation branch
//! alignment (projections widen to the narrowest common supertype) and
//! conversion-comparison inversion (only conversions known to be widening
//! may move across a comparison).

use meridian_common::types::DataType;

/// Type coercion rules
pub struct TypeCoercion;

impl TypeCoercion {
    /// Whether a value of `from` converts to `to` without loss for every
    /// possible value. A conversion that is not widening is treated as
    /// narrowing by the rewriter regardless of runtime values.
    pub fn can_widen(from: &DataType, to: &DataType) -> bool {
        use DataType::*;

        if from == to {
            return true;
        }
        match (from, to) {
            // A typed NULL widens to anything
            (Null, _) => true,

            // Integer ladder
            (Int16, Int32) | (Int16, Int64) | (Int32, Int64) => true,

            // Integers into floating point: f64 holds all i32 exactly, f32
            // holds all i16 exactly; anything wider can lose precision
            (Int16, Float32) => true,
            (Int16, Float64) | (Int32, Float64) => true,
            (Float32, Float64) => true,

            // Integers into sufficiently-wide decimals
            (Int16, Decimal { precision, scale }) => *scale == 0 && *precision >= 5,
            (Int32, Decimal { precision, scale }) => *scale == 0 && *precision >= 10,
            (Int64, Decimal { precision, scale }) => *scale == 0 && *precision >= 19,

            // Fixed-width strings into unbounded text
            (Char(_), String) | (Varchar(_), String) => true,
            (Char(n), Varchar(m)) | (Varchar(n), Varchar(m)) => n <= m,

            // Date fits in a timestamp at midnight
            (Date, Timestamp) => true,

            _ => false,
        }
    }

    /// Whether converting `from` to `to` can lose information
    pub fn is_narrowing(from: &DataType, to: &DataType) -> bool {
        !Self::can_widen(from, to)
    }

    /// The narrowest type every input widens to, if one exists within the
    /// scalar model. `Null` entries contribute no constraint.
    pub fn common_supertype(types: &[DataType]) -> Option<DataType> {
        let mut result: Option<DataType> = None;
        for ty in types {
            if *ty == DataType::Null {
                continue;
            }
            result = Some(match result {
                None => ty.clone(),
                Some(acc) => Self::join(&acc, ty)?,
            });
        }
        result.or(Some(DataType::Null))
    }

    /// Least upper bound of two non-null types
    fn join(a: &DataType, b: &DataType) -> Option<DataType> {
        use DataType::*;

        if a == b {
            return Some(a.clone());
        }
        if Self::can_widen(a, b) {
            return Some(b.clone());
        }
        if Self::can_widen(b, a) {
            return Some(a.clone());
        }
        match (a, b) {
            // Mixed integer/float meets at f64
            (Int32 | Int64, Float32 | Float64) | (Float32 | Float64, Int32 | Int64) => {
                Some(Float64)
            }
            // Distinct bounded strings meet at unbounded text
            (Char(_) | Varchar(_), Char(_) | Varchar(_)) => Some(String),
            _ => None,
        }
    }
}
