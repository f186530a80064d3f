//! Constant evaluation
//!
//! `evaluate` attempts to reduce an expression to a single value at rewrite
//! time. `Ok(None)` means the expression is not constant-foldable and is
//! left to the executor; `Err` means the expression is constant but cannot
//! evaluate, which fails the whole rewrite since the statement could never
//! run successfully.

use super::Rewriter;
use crate::ast::Expression;
use crate::command::Command;
use crate::functions::Determinism;
use meridian_common::error::EvalError;
use meridian_common::prelude::*;
use std::sync::Arc;

impl Rewriter<'_> {
    /// Try to reduce an expression to a constant value
    pub(crate) fn evaluate(&self, expr: &Expression) -> Result<Option<Value>, EvalError> {
        match expr {
            Expression::Literal { value, .. } => Ok(Some(value.clone())),

            Expression::Convert { expr, target } => match self.evaluate(expr)? {
                Some(value) => convert_value(&value, target),
                None => Ok(None),
            },

            Expression::Function { name, args, .. } => self.evaluate_function(name, args),

            Expression::Parameter { index, .. } => {
                let Some(ctx) = self.context else {
                    return Ok(None);
                };
                if ctx.parameters.is_empty() {
                    // Parameters are late-bound in this rewrite
                    return Ok(None);
                }
                match ctx.parameters.get(*index) {
                    Some(v) => Ok(Some(v.clone())),
                    None => Err(EvalError::UnboundParameter(*index)),
                }
            }

            Expression::ScalarSubquery(query) => self.preevaluate_subquery(query),

            // Data-dependent or rewrite-phase-only nodes
            Expression::Column(_)
            | Expression::Case { .. }
            | Expression::Aggregate { .. }
            | Expression::InputValue { .. }
            | Expression::Changing { .. } => Ok(None),
        }
    }

    fn evaluate_function(&self, name: &str, args: &[Expression]) -> Result<Option<Value>, EvalError> {
        let determinism = self.registry.determinism(name);
        if determinism < self.phase() {
            return Ok(None);
        }

        // Session/command-scoped functions fold from context bindings only
        if determinism < Determinism::Deterministic {
            if determinism == Determinism::SessionDeterministic
                && !self.config.fold_session_functions
            {
                return Ok(None);
            }
            let bound = self
                .context
                .and_then(|c| c.bindings.get(&name.to_lowercase()))
                .cloned();
            return Ok(bound);
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.evaluate(arg)? {
                Some(v) => values.push(v),
                None => return Ok(None),
            }
        }

        // Decimal arithmetic stays with the executor's exact implementation
        if matches!(name, "+" | "-" | "*" | "/")
            && values.iter().any(|v| matches!(v, Value::Decimal(_, _)))
        {
            return Ok(None);
        }

        self.registry.invoke(name, &values).map(Some)
    }

    /// Bounded pre-evaluation of a scalar subquery. Only FROM-less constant
    /// projections qualify; anything touching a data source is left for the
    /// executor. Abandoned silently past the configured row bound.
    fn preevaluate_subquery(&self, query: &Command) -> Result<Option<Value>, EvalError> {
        if self.config.max_preevaluation_rows == 0 {
            return Ok(None);
        }
        let Command::Query(q) = query else {
            return Ok(None);
        };
        if !q.from.is_empty() || q.is_aggregate() || q.select.len() != 1 {
            return Ok(None);
        }
        if let Some(w) = &q.where_clause {
            // Only a statically-true filter keeps the single row
            if w.truth() != Some(crate::ast::Truth::True) {
                return Ok(None);
            }
        }
        if let Some(limit) = &q.limit {
            if limit.count == Some(0) || limit.offset.is_some_and(|o| o > 0) {
                return Ok(Some(Value::Null));
            }
        }
        self.evaluate(&q.select[0].expr)
    }
}

/// Convert a value to a target type. `Ok(None)` leaves the conversion to the
/// executor; `Err` is a provable failure (bad literal parse, out of range).
pub(crate) fn convert_value(value: &Value, target: &DataType) -> Result<Option<Value>, EvalError> {
    use DataType as T;
    use Value as V;

    if value.is_null() {
        return Ok(Some(V::Null));
    }
    if value.data_type() == *target {
        return Ok(Some(value.clone()));
    }

    let out = match (value, target) {
        // Integer widenings and range-checked narrowings
        (v, T::Int16) if v.as_i64().is_some() => {
            let n = v.as_i64().unwrap();
            V::Int16(i16::try_from(n).map_err(|_| EvalError::NumericOverflow)?)
        }
        (v, T::Int32) if v.as_i64().is_some() => {
            let n = v.as_i64().unwrap();
            V::Int32(i32::try_from(n).map_err(|_| EvalError::NumericOverflow)?)
        }
        (v, T::Int64) if v.as_i64().is_some() => V::Int64(v.as_i64().unwrap()),

        // Into floating point
        (v, T::Float32) if v.as_f64().is_some() => V::Float32(v.as_f64().unwrap() as f32),
        (v, T::Float64) if v.as_f64().is_some() => V::Float64(v.as_f64().unwrap()),

        // Float to integer only when the value is integral and in range
        (V::Float32(_) | V::Float64(_), T::Int16 | T::Int32 | T::Int64) => {
            let f = value.as_f64().unwrap();
            if f.fract() != 0.0 {
                return Err(EvalError::InvalidCast {
                    from: value.data_type().to_string(),
                    to: target.to_string(),
                });
            }
            let n = f as i64;
            match target {
                T::Int16 => V::Int16(i16::try_from(n).map_err(|_| EvalError::NumericOverflow)?),
                T::Int32 => V::Int32(i32::try_from(n).map_err(|_| EvalError::NumericOverflow)?),
                _ => V::Int64(n),
            }
        }

        // Anything renders to text
        (v, T::String) => V::String(Arc::from(v.to_string().as_str())),
        (V::String(s), T::Varchar(n)) => {
            if s.chars().count() as u32 <= *n {
                value.clone()
            } else {
                return Err(EvalError::InvalidCast {
                    from: "TEXT".to_string(),
                    to: target.to_string(),
                });
            }
        }

        // Literal parses
        (V::String(s), T::Int16 | T::Int32 | T::Int64) => {
            let n: i64 = s.trim().parse().map_err(|_| EvalError::BadParse {
                value: s.to_string(),
                target: target.to_string(),
            })?;
            return convert_value(&V::Int64(n), target);
        }
        (V::String(s), T::Float32 | T::Float64) => {
            let f: f64 = s.trim().parse().map_err(|_| EvalError::BadParse {
                value: s.to_string(),
                target: target.to_string(),
            })?;
            return convert_value(&V::Float64(f), target);
        }
        (V::String(s), T::Boolean) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "1" => V::Boolean(true),
            "false" | "f" | "0" => V::Boolean(false),
            _ => {
                return Err(EvalError::BadParse {
                    value: s.to_string(),
                    target: target.to_string(),
                })
            }
        },
        (V::String(s), T::Date) => {
            let d = chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
                EvalError::BadParse {
                    value: s.to_string(),
                    target: target.to_string(),
                }
            })?;
            let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            V::Date((d - epoch).num_days() as i32)
        }
        (V::String(s), T::Uuid) => {
            let u = uuid::Uuid::parse_str(s.trim()).map_err(|_| EvalError::BadParse {
                value: s.to_string(),
                target: target.to_string(),
            })?;
            V::Uuid(*u.as_bytes())
        }

        (V::Date(days), T::Timestamp) => V::Timestamp(*days as i64 * 86_400_000_000),

        // Left to the executor
        _ => return Ok(None),
    };
    Ok(Some(out))
}
