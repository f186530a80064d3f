//! Expression rewriting
//!
//! Post-order: children are rewritten first, then the node itself is
//! simplified. Macro functions expand to their canonical CASE forms before
//! simplification so that every later pass sees one shape per construct.

use super::Rewriter;
use crate::ast::{CompareOp, Criteria, Expression, Truth};
use meridian_common::error::RewriteError;
use meridian_common::prelude::*;

impl Rewriter<'_> {
    pub(crate) fn rewrite_expression(&self, expr: Expression) -> Result<Expression, RewriteError> {
        let expr = match expr {
            Expression::Function { name, args, ty } => {
                let args = args
                    .into_iter()
                    .map(|a| self.rewrite_expression(a))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(expanded) = self.expand_macro(&name, &args, &ty) {
                    // Expansions contain no further macros of the same name
                    return self.rewrite_expression(expanded);
                }
                Expression::Function { name, args, ty }
            }
            Expression::Convert { expr, target } => Expression::Convert {
                expr: Box::new(self.rewrite_expression(*expr)?),
                target,
            },
            Expression::Case {
                whens,
                otherwise,
                ty,
            } => {
                let whens = whens
                    .into_iter()
                    .map(|(c, e)| Ok((self.rewrite_criteria(c)?, self.rewrite_expression(e)?)))
                    .collect::<Result<Vec<_>, RewriteError>>()?;
                let otherwise = otherwise
                    .map(|e| self.rewrite_expression(*e))
                    .transpose()?
                    .map(Box::new);
                Expression::Case {
                    whens,
                    otherwise,
                    ty,
                }
            }
            Expression::ScalarSubquery(cmd) => {
                Expression::ScalarSubquery(Box::new(self.rewrite_command(*cmd)?))
            }
            other => other,
        };
        self.simplify_expression(expr)
    }

    /// Expand deterministic macro functions to their canonical CASE forms
    fn expand_macro(
        &self,
        name: &str,
        args: &[Expression],
        ty: &DataType,
    ) -> Option<Expression> {
        match (name.to_lowercase().as_str(), args) {
            ("ifnull" | "nvl", [a, b]) => Some(Expression::Case {
                whens: vec![(Criteria::is_null(a.clone()), b.clone())],
                otherwise: Some(Box::new(a.clone())),
                ty: ty.clone(),
            }),
            ("nullif", [a, b]) => Some(Expression::Case {
                whens: vec![(
                    Criteria::compare(a.clone(), CompareOp::Eq, b.clone()),
                    Expression::null(ty.clone()),
                )],
                otherwise: Some(Box::new(a.clone())),
                ty: ty.clone(),
            }),
            ("decode", args) if args.len() >= 3 => {
                let input = &args[0];
                let mut whens = Vec::new();
                let mut rest = &args[1..];
                while rest.len() >= 2 {
                    let (key, value) = (&rest[0], &rest[1]);
                    // DECODE treats NULL keys as matching NULL input
                    let when = if key.is_null_literal() {
                        Criteria::is_null(input.clone())
                    } else {
                        Criteria::compare(input.clone(), CompareOp::Eq, key.clone())
                    };
                    whens.push((when, value.clone()));
                    rest = &rest[2..];
                }
                let otherwise = rest.first().cloned().map(Box::new);
                Some(Expression::Case {
                    whens,
                    otherwise,
                    ty: ty.clone(),
                })
            }
            // Null-safe concatenation: NULL operands drop out instead of
            // poisoning the result
            ("concat2", [a, b]) => Some(Expression::Case {
                whens: vec![
                    (Criteria::is_null(a.clone()), b.clone()),
                    (Criteria::is_null(b.clone()), a.clone()),
                ],
                otherwise: Some(Box::new(Expression::Function {
                    name: "||".to_string(),
                    args: vec![a.clone(), b.clone()],
                    ty: ty.clone(),
                })),
                ty: ty.clone(),
            }),
            _ => None,
        }
    }

    fn simplify_expression(&self, expr: Expression) -> Result<Expression, RewriteError> {
        match expr {
            Expression::Function { name, args, ty } => {
                // NULL propagates through null-preserving functions
                if self.registry.preserves_null(&name)
                    && args.iter().any(Expression::is_null_literal)
                {
                    return Ok(Expression::null(ty));
                }
                if let Some(out) = arithmetic_identity(&name, &args, &ty) {
                    return Ok(out);
                }
                self.fold(Expression::Function { name, args, ty })
            }

            Expression::Convert { expr, target } => {
                if expr.data_type() == target {
                    return Ok(*expr);
                }
                self.fold(Expression::Convert { expr, target })
            }

            Expression::Case {
                whens,
                otherwise,
                ty,
            } => self.reduce_case(whens, otherwise, ty),

            e @ (Expression::Parameter { .. } | Expression::ScalarSubquery(_)) => self.fold(e),

            other => Ok(other),
        }
    }

    /// Reduce CASE branches in declaration order: FALSE and UNKNOWN
    /// conditions drop, the first TRUE condition becomes the tail.
    fn reduce_case(
        &self,
        whens: Vec<(Criteria, Expression)>,
        otherwise: Option<Box<Expression>>,
        ty: DataType,
    ) -> Result<Expression, RewriteError> {
        let mut kept = Vec::with_capacity(whens.len());
        let mut tail = otherwise;
        for (when, then) in whens {
            match when.truth() {
                Some(Truth::False) | Some(Truth::Unknown) => continue,
                Some(Truth::True) => {
                    tail = Some(Box::new(then));
                    break;
                }
                None => kept.push((when, then)),
            }
        }
        if kept.is_empty() {
            let out = tail.map(|b| *b).unwrap_or_else(|| Expression::null(ty.clone()));
            return self.coerce_to(out, ty);
        }
        Ok(Expression::Case {
            whens: kept,
            otherwise: tail,
            ty,
        })
    }

    /// Wrap in a Convert when the expression's type differs from the
    /// required result type
    fn coerce_to(&self, expr: Expression, ty: DataType) -> Result<Expression, RewriteError> {
        if expr.data_type() == ty || ty == DataType::Null {
            Ok(expr)
        } else {
            self.fold(Expression::Convert {
                expr: Box::new(expr),
                target: ty,
            })
        }
    }

    /// Fold to a literal when the evaluator can produce a value
    fn fold(&self, expr: Expression) -> Result<Expression, RewriteError> {
        let ty = expr.data_type();
        match self.evaluate(&expr)? {
            Some(value) => Ok(Expression::Literal { value, ty }),
            None => Ok(expr),
        }
    }
}

/// NULL-safe arithmetic identities. Adding zero, multiplying by one, and
/// dividing by one preserve both value and null behavior, so the operand
/// passes through untouched. `x * 0` is NOT folded: it must stay NULL for
/// NULL x.
fn arithmetic_identity(name: &str, args: &[Expression], ty: &DataType) -> Option<Expression> {
    let [left, right] = args else { return None };
    let is = |e: &Expression, n: i64| -> bool {
        match e.as_literal() {
            Some(v) if !v.is_null() => {
                v.as_i64() == Some(n) || v.as_f64() == Some(n as f64)
            }
            _ => false,
        }
    };
    let keep = |e: &Expression| -> Option<Expression> {
        // Only when the surviving operand already has the result type
        (e.data_type() == *ty).then(|| e.clone())
    };
    match name {
        "+" if is(right, 0) => keep(left),
        "+" if is(left, 0) => keep(right),
        "-" if is(right, 0) => keep(left),
        "*" if is(right, 1) => keep(left),
        "*" if is(left, 1) => keep(right),
        "/" if is(right, 1) => keep(left),
        _ => None,
    }
}
