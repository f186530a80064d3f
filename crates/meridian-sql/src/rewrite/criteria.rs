//! Criteria rewriting
//!
//! Bottom-up: child expressions, criteria, and subqueries are rewritten
//! first, then the node is simplified to a bounded fixpoint. Every rule is
//! an exact three-valued-logic equivalence, so rewriting is sound at any
//! depth, including beneath NOT; constant outcomes reduce to the canonical
//! markers `1 = 1`, `1 = 0`, and `NULL <> NULL`. Treating UNKNOWN as FALSE
//! is the filter root's business, in `rewrite_filter`.

use super::evaluator::convert_value;
use super::Rewriter;
use crate::ast::{CompareOp, CompoundOp, Criteria, Expression, Quantifier, Truth};
use crate::coercion::TypeCoercion;
use crate::command::{Command, Limit, SetOpKind};
use meridian_common::error::RewriteError;
use meridian_common::prelude::*;

impl Rewriter<'_> {
    pub(crate) fn rewrite_criteria(&self, criteria: Criteria) -> Result<Criteria, RewriteError> {
        let mut current = self.rewrite_criteria_children(criteria)?;
        for _ in 0..self.config.max_fixpoint_passes {
            let next = self.simplify_criteria(current.clone())?;
            if next == current {
                break;
            }
            trace!(criteria = %next, "criteria rule fired");
            current = next;
        }
        Ok(current)
    }

    fn rewrite_criteria_children(&self, criteria: Criteria) -> Result<Criteria, RewriteError> {
        Ok(match criteria {
            Criteria::Compare { left, op, right } => Criteria::Compare {
                left: self.rewrite_expression(left)?,
                op,
                right: self.rewrite_expression(right)?,
            },
            Criteria::Between {
                expr,
                low,
                high,
                negated,
            } => Criteria::Between {
                expr: self.rewrite_expression(expr)?,
                low: self.rewrite_expression(low)?,
                high: self.rewrite_expression(high)?,
                negated,
            },
            Criteria::In {
                expr,
                list,
                negated,
            } => Criteria::In {
                expr: self.rewrite_expression(expr)?,
                list: list
                    .into_iter()
                    .map(|e| self.rewrite_expression(e))
                    .collect::<Result<_, _>>()?,
                negated,
            },
            Criteria::Like {
                expr,
                pattern,
                escape,
                negated,
            } => Criteria::Like {
                expr: self.rewrite_expression(expr)?,
                pattern: self.rewrite_expression(pattern)?,
                escape,
                negated,
            },
            Criteria::IsNull { expr, negated } => Criteria::IsNull {
                expr: self.rewrite_expression(expr)?,
                negated,
            },
            Criteria::Compound { op, parts } => Criteria::Compound {
                op,
                parts: parts
                    .into_iter()
                    .map(|p| self.rewrite_criteria(p))
                    .collect::<Result<_, _>>()?,
            },
            Criteria::Not(inner) => Criteria::Not(Box::new(self.rewrite_criteria(*inner)?)),
            Criteria::Boolean(expr) => Criteria::Boolean(self.rewrite_expression(expr)?),
            Criteria::Exists { query, negated } => Criteria::Exists {
                query: Box::new(self.rewrite_command(*query)?),
                negated,
            },
            Criteria::SubqueryCompare {
                left,
                op,
                quantifier,
                query,
            } => Criteria::SubqueryCompare {
                left: self.rewrite_expression(left)?,
                op,
                quantifier,
                query: Box::new(self.rewrite_command(*query)?),
            },
            // Resolved by the procedural rewriter against the trigger
            pseudo @ (Criteria::HasCriteria { .. } | Criteria::TranslateCriteria { .. }) => pseudo,
        })
    }

    fn simplify_criteria(&self, criteria: Criteria) -> Result<Criteria, RewriteError> {
        match criteria {
            Criteria::Not(inner) => self.simplify_not(*inner),
            Criteria::Compare { left, op, right } => self.simplify_compare(left, op, right),
            Criteria::Between {
                expr,
                low,
                high,
                negated,
            } => {
                // BETWEEN decomposes into its comparison pair
                let parts = if negated {
                    Criteria::or(vec![
                        Criteria::compare(expr.clone(), CompareOp::Lt, low),
                        Criteria::compare(expr, CompareOp::Gt, high),
                    ])
                } else {
                    Criteria::and(vec![
                        Criteria::compare(expr.clone(), CompareOp::Ge, low),
                        Criteria::compare(expr, CompareOp::Le, high),
                    ])
                };
                Ok(parts)
            }
            Criteria::In {
                expr,
                list,
                negated,
            } => self.simplify_in(expr, list, negated),
            Criteria::Like {
                expr,
                pattern,
                escape,
                negated,
            } => self.simplify_like(expr, pattern, escape, negated),
            Criteria::IsNull { expr, negated } => self.simplify_is_null(expr, negated),
            Criteria::Compound { op, parts } => self.simplify_compound(op, parts),
            Criteria::Boolean(expr) => Ok(match expr.as_literal() {
                Some(Value::Boolean(true)) => Criteria::always_true(),
                Some(Value::Boolean(false)) => Criteria::always_false(),
                Some(Value::Null) => Criteria::unknown(),
                _ => Criteria::Boolean(expr),
            }),
            Criteria::Exists { query, negated } => self.simplify_exists(*query, negated),
            Criteria::SubqueryCompare {
                left,
                op,
                quantifier,
                query,
            } => self.simplify_subquery_compare(left, op, quantifier, *query),
            other => Ok(other),
        }
    }

    // ------------------------------------------------------------------
    // NOT
    // ------------------------------------------------------------------

    fn simplify_not(&self, inner: Criteria) -> Result<Criteria, RewriteError> {
        if let Some(truth) = inner.truth() {
            return Ok(Criteria::from_truth(truth.not()));
        }
        Ok(match inner {
            // Double negation
            Criteria::Not(x) => *x,
            // De Morgan; negated parts are re-simplified in place
            Criteria::Compound { op, parts } => {
                let dual = match op {
                    CompoundOp::And => CompoundOp::Or,
                    CompoundOp::Or => CompoundOp::And,
                };
                let parts = parts
                    .into_iter()
                    .map(|p| self.rewrite_criteria(Criteria::not(p)))
                    .collect::<Result<_, _>>()?;
                Criteria::Compound { op: dual, parts }
            }
            Criteria::Compare { left, op, right } => Criteria::Compare {
                left,
                op: op.negated(),
                right,
            },
            Criteria::IsNull { expr, negated } => Criteria::IsNull {
                expr,
                negated: !negated,
            },
            Criteria::Between {
                expr,
                low,
                high,
                negated,
            } => Criteria::Between {
                expr,
                low,
                high,
                negated: !negated,
            },
            Criteria::In {
                expr,
                list,
                negated,
            } => Criteria::In {
                expr,
                list,
                negated: !negated,
            },
            Criteria::Like {
                expr,
                pattern,
                escape,
                negated,
            } => Criteria::Like {
                expr,
                pattern,
                escape,
                negated: !negated,
            },
            Criteria::Exists { query, negated } => Criteria::Exists {
                query,
                negated: !negated,
            },
            // NOT (x op ANY q)  ==  x op' ALL q
            Criteria::SubqueryCompare {
                left,
                op,
                quantifier,
                query,
            } => Criteria::SubqueryCompare {
                left,
                op: op.negated(),
                quantifier: match quantifier {
                    Quantifier::Any => Quantifier::All,
                    Quantifier::All => Quantifier::Any,
                },
                query,
            },
            other => Criteria::Not(Box::new(other)),
        })
    }

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------

    fn simplify_compare(
        &self,
        left: Expression,
        op: CompareOp,
        right: Expression,
    ) -> Result<Criteria, RewriteError> {
        // A comparison against the NULL literal is UNKNOWN for every row
        if left.is_null_literal() || right.is_null_literal() {
            return Ok(Criteria::unknown());
        }
        if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) {
            if let Some(ord) = l.compare(r) {
                return Ok(Criteria::from_truth(Truth::from(op.evaluate(ord))));
            }
            return Ok(Criteria::Compare { left, op, right });
        }
        // Canonical operand order: constant on the right
        if left.is_literal() && !right.is_literal() {
            return Ok(Criteria::Compare {
                left: right,
                op: op.mirrored(),
                right: left,
            });
        }
        if right.is_literal() {
            if let Some(rewritten) = self.invert_linear(&left, op, &right)? {
                return Ok(rewritten);
            }
            if let Some(rewritten) = self.invert_conversion(&left, op, &right) {
                return Ok(rewritten);
            }
        }
        Ok(Criteria::Compare { left, op, right })
    }

    /// Move a linear arithmetic wrapper off the comparison's left side:
    /// `x + k op c` becomes `x op c - k`, and similarly for `-`, `*`, `/`.
    /// Multiplying or dividing by a negative constant flips the operator
    /// direction. Integer shapes are only inverted when the inverse is
    /// exact; everything else is left untouched.
    fn invert_linear(
        &self,
        left: &Expression,
        op: CompareOp,
        right: &Expression,
    ) -> Result<Option<Criteria>, RewriteError> {
        let Expression::Function { name, args, .. } = left else {
            return Ok(None);
        };
        let [a, b] = args.as_slice() else {
            return Ok(None);
        };
        let (x, k, k_on_right) = match (a.as_literal(), b.as_literal()) {
            (None, Some(k)) if !k.is_null() => (a, k, true),
            (Some(k), None) if !k.is_null() => (b, k, false),
            _ => return Ok(None),
        };
        let Some(c) = right.as_literal() else {
            return Ok(None);
        };
        if c.is_null() {
            return Ok(None);
        }

        let x_ty = x.data_type();
        let float = matches!(x_ty, DataType::Float32 | DataType::Float64)
            || matches!(k, Value::Float32(_) | Value::Float64(_))
            || matches!(c, Value::Float32(_) | Value::Float64(_));
        if matches!(k, Value::Decimal(_, _)) || matches!(c, Value::Decimal(_, _)) {
            return Ok(None);
        }

        let rebuilt = if float {
            let (Some(kf), Some(cf)) = (k.as_f64(), c.as_f64()) else {
                return Ok(None);
            };
            match name.as_str() {
                "+" => Some((op, cf - kf)),
                "-" if k_on_right => Some((op, cf + kf)),
                "-" => Some((op.mirrored(), kf - cf)),
                "*" if kf != 0.0 => {
                    let op = if kf < 0.0 { op.mirrored() } else { op };
                    Some((op, cf / kf))
                }
                "/" if k_on_right && kf != 0.0 => {
                    let op = if kf < 0.0 { op.mirrored() } else { op };
                    Some((op, cf * kf))
                }
                _ => None,
            }
            .map(|(op, v)| {
                Criteria::compare(
                    x.clone(),
                    op,
                    Expression::Literal {
                        value: Value::Float64(v),
                        ty: DataType::Float64,
                    },
                )
            })
        } else {
            let (Some(ki), Some(ci)) = (k.as_i64(), c.as_i64()) else {
                return Ok(None);
            };
            let exact = match name.as_str() {
                "+" => ci.checked_sub(ki).map(|v| (op, v)),
                "-" if k_on_right => ci.checked_add(ki).map(|v| (op, v)),
                "-" => ki.checked_sub(ci).map(|v| (op.mirrored(), v)),
                "*" if ki != 0 => {
                    if ci % ki == 0 {
                        let op = if ki < 0 { op.mirrored() } else { op };
                        Some((op, ci / ki))
                    } else {
                        // No integer solution: equality over a non-nullable
                        // operand can never hold
                        if op == CompareOp::Eq && !self.is_nullable(x) {
                            return Ok(Some(Criteria::always_false()));
                        }
                        return Ok(None);
                    }
                }
                // Integer division truncates, so its inverse is not exact
                _ => None,
            };
            exact.and_then(|(op, v)| {
                // Re-narrow the computed constant to the operand's type
                match convert_value(&Value::Int64(v), &x_ty) {
                    Ok(Some(value)) => Some(Criteria::compare(
                        x.clone(),
                        op,
                        Expression::Literal { value, ty: x_ty.clone() },
                    )),
                    _ => None,
                }
            })
        };
        Ok(rebuilt)
    }

    /// Move a widening conversion off the left side of an equality:
    /// `convert(x, wider) = c` becomes `x = c'` when `c` round-trips
    /// exactly through the narrower type. Narrowing conversions are never
    /// inverted.
    fn invert_conversion(
        &self,
        left: &Expression,
        op: CompareOp,
        right: &Expression,
    ) -> Option<Criteria> {
        if op != CompareOp::Eq && op != CompareOp::Ne {
            return None;
        }
        let Expression::Convert { expr, target } = left else {
            return None;
        };
        let source = expr.data_type();
        if TypeCoercion::is_narrowing(&source, target) {
            return None;
        }
        let c = right.as_literal()?;
        let narrowed = convert_value(c, &source).ok()??;
        let round_trip = convert_value(&narrowed, target).ok()??;
        if !round_trip.same_as(c) {
            return None;
        }
        Some(Criteria::compare(
            (**expr).clone(),
            op,
            Expression::Literal {
                value: narrowed,
                ty: source,
            },
        ))
    }

    // ------------------------------------------------------------------
    // IN
    // ------------------------------------------------------------------

    fn simplify_in(
        &self,
        expr: Expression,
        list: Vec<Expression>,
        negated: bool,
    ) -> Result<Criteria, RewriteError> {
        debug_assert!(!list.is_empty(), "resolver produced an empty IN list");

        // Structural duplicates contribute nothing
        let mut members: Vec<Expression> = Vec::with_capacity(list.len());
        for m in list {
            if !members.contains(&m) {
                members.push(m);
            }
        }

        // Fully constant membership folds to a truth marker
        if let Some(v) = expr.as_literal() {
            if members.iter().all(Expression::is_literal) {
                let truth = if v.is_null() {
                    Truth::Unknown
                } else {
                    let mut saw_null = false;
                    let mut matched = false;
                    for m in &members {
                        let mv = m.as_literal().unwrap();
                        if mv.is_null() {
                            saw_null = true;
                        } else if v.same_as(mv) {
                            matched = true;
                            break;
                        }
                    }
                    match (matched, saw_null) {
                        (true, _) => Truth::True,
                        (false, true) => Truth::Unknown,
                        (false, false) => Truth::False,
                    }
                };
                let truth = if negated { truth.not() } else { truth };
                return Ok(Criteria::from_truth(truth));
            }
        }

        // A single member degenerates to a comparison
        if members.len() == 1 {
            let op = if negated { CompareOp::Ne } else { CompareOp::Eq };
            return Ok(Criteria::Compare {
                left: expr,
                op,
                right: members.into_iter().next().unwrap(),
            });
        }
        Ok(Criteria::In {
            expr,
            list: members,
            negated,
        })
    }

    // ------------------------------------------------------------------
    // LIKE
    // ------------------------------------------------------------------

    fn simplify_like(
        &self,
        expr: Expression,
        pattern: Expression,
        escape: Option<char>,
        negated: bool,
    ) -> Result<Criteria, RewriteError> {
        let unchanged = |expr, pattern| Criteria::Like {
            expr,
            pattern,
            escape,
            negated,
        };
        let Some(pv) = pattern.as_literal() else {
            return Ok(unchanged(expr, pattern));
        };
        if pv.is_null() {
            return Ok(Criteria::unknown());
        }
        let Some(p) = pv.as_str() else {
            return Ok(unchanged(expr, pattern));
        };

        // A fully-constant match folds to a truth marker
        if let Some(v) = expr.as_literal() {
            let truth = match v.as_str() {
                Some(s) => {
                    let m = like_match(s, p, escape);
                    Truth::from(if negated { !m } else { m })
                }
                None if v.is_null() => Truth::Unknown,
                None => return Ok(unchanged(expr, pattern)),
            };
            return Ok(Criteria::from_truth(truth));
        }

        // A bare '%' matches every non-null value
        if p == "%" {
            if negated {
                return Ok(if self.is_nullable(&expr) {
                    unchanged(expr, pattern)
                } else {
                    Criteria::always_false()
                });
            }
            return Ok(Criteria::is_not_null(expr));
        }

        // No wildcards: plain equality on the unescaped text
        if let Some(literal) = unescape_exact(p, escape) {
            let op = if negated { CompareOp::Ne } else { CompareOp::Eq };
            return Ok(Criteria::Compare {
                left: expr,
                op,
                right: Expression::string(literal),
            });
        }
        Ok(unchanged(expr, pattern))
    }

    // ------------------------------------------------------------------
    // IS NULL
    // ------------------------------------------------------------------

    fn simplify_is_null(
        &self,
        expr: Expression,
        negated: bool,
    ) -> Result<Criteria, RewriteError> {
        if let Some(v) = expr.as_literal() {
            return Ok(Criteria::from_truth(Truth::from(v.is_null() != negated)));
        }
        if !self.is_nullable(&expr) {
            return Ok(Criteria::from_truth(Truth::from(negated)));
        }
        Ok(Criteria::IsNull { expr, negated })
    }

    // ------------------------------------------------------------------
    // AND / OR
    // ------------------------------------------------------------------

    fn simplify_compound(
        &self,
        op: CompoundOp,
        parts: Vec<Criteria>,
    ) -> Result<Criteria, RewriteError> {
        // Flatten nested compounds of the same operator
        let mut flat = Vec::with_capacity(parts.len());
        for p in parts {
            match p {
                Criteria::Compound { op: inner, parts } if inner == op => flat.extend(parts),
                other => flat.push(other),
            }
        }

        // Constant absorption per three-valued logic
        let mut kept: Vec<Criteria> = Vec::with_capacity(flat.len());
        let mut saw_unknown = false;
        for p in flat {
            match (op, p.truth()) {
                (CompoundOp::And, Some(Truth::True)) => continue,
                (CompoundOp::And, Some(Truth::False)) => return Ok(Criteria::always_false()),
                (CompoundOp::Or, Some(Truth::False)) => continue,
                (CompoundOp::Or, Some(Truth::True)) => return Ok(Criteria::always_true()),
                (_, Some(Truth::Unknown)) => saw_unknown = true,
                _ => {
                    if !kept.contains(&p) {
                        kept.push(p);
                    }
                }
            }
        }
        if kept.is_empty() {
            return Ok(match (op, saw_unknown) {
                (_, true) => Criteria::unknown(),
                (CompoundOp::And, false) => Criteria::always_true(),
                (CompoundOp::Or, false) => Criteria::always_false(),
            });
        }
        if saw_unknown {
            // UNKNOWN is not absorbing for either operator; keep the marker.
            // Filter roots may still strengthen it to FALSE, NOT may not.
            kept.push(Criteria::unknown());
        }

        if op == CompoundOp::And {
            match self.intersect_value_constraints(kept) {
                Some(parts) => kept = parts,
                None => return Ok(Criteria::always_false()),
            }
        }

        if kept.len() == 1 {
            return Ok(kept.into_iter().next().unwrap());
        }
        Ok(Criteria::Compound { op, parts: kept })
    }

    /// Combine value constraints on the same expression within a
    /// conjunction: IN lists intersect with each other and with
    /// equalities, and `<>` conjuncts remove members. Returns `None` when
    /// the conjunction is unsatisfiable, which requires a non-nullable key
    /// (a nullable key still yields UNKNOWN for NULL rows).
    fn intersect_value_constraints(&self, mut parts: Vec<Criteria>) -> Option<Vec<Criteria>> {
        'restart: loop {
            for i in 0..parts.len() {
                let (key, mut allowed) = match &parts[i] {
                    Criteria::In {
                        expr,
                        list,
                        negated: false,
                    } => (expr.clone(), list.clone()),
                    Criteria::Compare {
                        left,
                        op: CompareOp::Eq,
                        right,
                    } if right.is_literal() => (left.clone(), vec![right.clone()]),
                    _ => continue,
                };
                let mut absorbed = Vec::new();
                for (j, p) in parts.iter().enumerate() {
                    if j == i {
                        continue;
                    }
                    match p {
                        Criteria::In {
                            expr,
                            list,
                            negated: false,
                        } if *expr == key => {
                            allowed.retain(|m| list.contains(m));
                            absorbed.push(j);
                        }
                        Criteria::Compare {
                            left,
                            op: CompareOp::Eq,
                            right,
                        } if right.is_literal() && *left == key => {
                            allowed.retain(|m| m == right);
                            absorbed.push(j);
                        }
                        Criteria::Compare {
                            left,
                            op: CompareOp::Ne,
                            right,
                        } if right.is_literal() && *left == key => {
                            allowed.retain(|m| m != right);
                            absorbed.push(j);
                        }
                        _ => {}
                    }
                }
                if allowed.is_empty() {
                    if !self.is_nullable(&key) {
                        return None;
                    }
                    continue;
                }
                if absorbed.is_empty() {
                    continue;
                }
                parts[i] = if allowed.len() == 1 {
                    Criteria::Compare {
                        left: key,
                        op: CompareOp::Eq,
                        right: allowed.into_iter().next().unwrap(),
                    }
                } else {
                    Criteria::In {
                        expr: key,
                        list: allowed,
                        negated: false,
                    }
                };
                for j in absorbed.into_iter().rev() {
                    parts.remove(j);
                }
                continue 'restart;
            }
            return Some(parts);
        }
    }

    // ------------------------------------------------------------------
    // Subqueries
    // ------------------------------------------------------------------

    fn simplify_exists(&self, query: Command, negated: bool) -> Result<Criteria, RewriteError> {
        if statically_empty(&query) {
            return Ok(Criteria::from_truth(Truth::from(negated)));
        }
        // Existence needs at most one row
        let query = match query {
            Command::Query(mut q) if q.limit.is_none() => {
                q.limit = Some(Limit::rows(1));
                Command::Query(q)
            }
            other => other,
        };
        Ok(Criteria::Exists {
            query: Box::new(query),
            negated,
        })
    }

    fn simplify_subquery_compare(
        &self,
        left: Expression,
        op: CompareOp,
        quantifier: Quantifier,
        query: Command,
    ) -> Result<Criteria, RewriteError> {
        if statically_empty(&query) {
            return Ok(match quantifier {
                // No candidate row can ever satisfy ANY
                Quantifier::Any => Criteria::always_false(),
                // ALL over no rows holds for every non-null operand
                Quantifier::All => Criteria::is_not_null(left),
            });
        }
        Ok(Criteria::SubqueryCompare {
            left,
            op,
            quantifier,
            query: Box::new(query),
        })
    }
}

/// Whether a command provably returns no rows
pub(crate) fn statically_empty(command: &Command) -> bool {
    match command {
        Command::Query(q) => {
            if q.limit.is_some_and(|l| l.count == Some(0)) {
                return true;
            }
            match &q.where_clause {
                Some(w) => matches!(w.truth(), Some(Truth::False) | Some(Truth::Unknown)),
                None => false,
            }
        }
        Command::SetOp {
            op, left, right, ..
        } => match op {
            SetOpKind::Union => statically_empty(left) && statically_empty(right),
            SetOpKind::Except | SetOpKind::Intersect => {
                statically_empty(left) || (*op == SetOpKind::Intersect && statically_empty(right))
            }
        },
        _ => false,
    }
}

/// SQL LIKE matching with `%`, `_`, and an optional escape character
pub(crate) fn like_match(s: &str, pattern: &str, escape: Option<char>) -> bool {
    fn matches(s: &[char], p: &[char], escape: Option<char>) -> bool {
        match p.split_first() {
            None => s.is_empty(),
            Some((&c, rest)) if Some(c) == escape => match rest.split_first() {
                Some((&lit, rest)) => {
                    s.split_first().is_some_and(|(&sc, s_rest)| {
                        sc == lit && matches(s_rest, rest, escape)
                    })
                }
                None => false,
            },
            Some(('%', rest)) => {
                (0..=s.len()).any(|skip| matches(&s[skip..], rest, escape))
            }
            Some(('_', rest)) => s
                .split_first()
                .is_some_and(|(_, s_rest)| matches(s_rest, rest, escape)),
            Some((&c, rest)) => s
                .split_first()
                .is_some_and(|(&sc, s_rest)| sc == c && matches(s_rest, rest, escape)),
        }
    }
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    matches(&s, &p, escape)
}

/// If the pattern contains no active wildcards, return the literal text it
/// matches (with escapes resolved)
fn unescape_exact(pattern: &str, escape: Option<char>) -> Option<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if Some(c) == escape {
            out.push(chars.next()?);
        } else if c == '%' || c == '_' {
            return None;
        } else {
            out.push(c);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ColumnRef;
    use crate::functions::FunctionRegistry;
    use crate::metadata::Catalog;

    fn col(name: &str) -> Expression {
        Expression::column(ColumnRef::new("t", name, DataType::Int32))
    }

    fn req_col(name: &str) -> Expression {
        Expression::column(ColumnRef::new("t", name, DataType::Int32).not_null())
    }

    fn rewrite(c: Criteria) -> Criteria {
        let catalog = Catalog::new();
        let registry = FunctionRegistry::new();
        Rewriter::new(&catalog, &registry, None)
            .rewrite_criteria(c)
            .unwrap()
    }

    #[test]
    fn test_constant_compare_folds_to_markers() {
        let c = Criteria::compare(Expression::integer(3), CompareOp::Lt, Expression::integer(5));
        assert_eq!(rewrite(c), Criteria::always_true());
        let c = Criteria::compare(Expression::integer(3), CompareOp::Gt, Expression::integer(5));
        assert_eq!(rewrite(c), Criteria::always_false());
    }

    #[test]
    fn test_null_compare_is_unknown() {
        let c = Criteria::compare(
            col("x"),
            CompareOp::Eq,
            Expression::null(DataType::Int32),
        );
        assert_eq!(rewrite(c), Criteria::unknown());
    }

    #[test]
    fn test_constant_moves_right() {
        let c = Criteria::compare(Expression::integer(5), CompareOp::Lt, col("x"));
        assert_eq!(
            rewrite(c),
            Criteria::compare(col("x"), CompareOp::Gt, Expression::integer(5))
        );
    }

    #[test]
    fn test_double_negation_and_de_morgan() {
        let inner = Criteria::compare(col("x"), CompareOp::Eq, Expression::integer(1));
        assert_eq!(rewrite(Criteria::not(Criteria::not(inner.clone()))), inner);

        // NOT (a = 1 AND b = 2)  =>  a <> 1 OR b <> 2
        let c = Criteria::not(Criteria::and(vec![
            Criteria::compare(col("a"), CompareOp::Eq, Expression::integer(1)),
            Criteria::compare(col("b"), CompareOp::Eq, Expression::integer(2)),
        ]));
        assert_eq!(
            rewrite(c),
            Criteria::or(vec![
                Criteria::compare(col("a"), CompareOp::Ne, Expression::integer(1)),
                Criteria::compare(col("b"), CompareOp::Ne, Expression::integer(2)),
            ])
        );
    }

    #[test]
    fn test_linear_inversion() {
        // x + 3 < 10  =>  x < 7
        let c = Criteria::compare(
            Expression::function(
                "+",
                vec![col("x"), Expression::integer(3)],
                DataType::Int32,
            ),
            CompareOp::Lt,
            Expression::integer(10),
        );
        assert_eq!(
            rewrite(c),
            Criteria::compare(col("x"), CompareOp::Lt, Expression::integer(7))
        );

        // x * -2 < 10  =>  x > -5
        let c = Criteria::compare(
            Expression::function(
                "*",
                vec![col("x"), Expression::integer(-2)],
                DataType::Int32,
            ),
            CompareOp::Lt,
            Expression::integer(10),
        );
        assert_eq!(
            rewrite(c),
            Criteria::compare(col("x"), CompareOp::Gt, Expression::integer(-5))
        );

        // 5 - x = 2  =>  x = 3
        let c = Criteria::compare(
            Expression::function(
                "-",
                vec![Expression::integer(5), col("x")],
                DataType::Int32,
            ),
            CompareOp::Eq,
            Expression::integer(2),
        );
        assert_eq!(
            rewrite(c),
            Criteria::compare(col("x"), CompareOp::Eq, Expression::integer(3))
        );
    }

    #[test]
    fn test_inexact_inversion_is_conservative() {
        // x * 2 < 5 over integers stays untouched
        let c = Criteria::compare(
            Expression::function(
                "*",
                vec![col("x"), Expression::integer(2)],
                DataType::Int32,
            ),
            CompareOp::Lt,
            Expression::integer(5),
        );
        assert_eq!(rewrite(c.clone()), c);

        // x * 2 = 5 has no integer solution; non-nullable operand folds
        let c = Criteria::compare(
            Expression::function(
                "*",
                vec![req_col("x"), Expression::integer(2)],
                DataType::Int32,
            ),
            CompareOp::Eq,
            Expression::integer(5),
        );
        assert_eq!(rewrite(c), Criteria::always_false());

        // Integer division is never inverted
        let c = Criteria::compare(
            Expression::function(
                "/",
                vec![col("x"), Expression::integer(2)],
                DataType::Int32,
            ),
            CompareOp::Eq,
            Expression::integer(3),
        );
        assert_eq!(rewrite(c.clone()), c);
    }

    #[test]
    fn test_narrowing_conversion_not_inverted() {
        let s = Expression::column(ColumnRef::new("t", "s", DataType::String));
        let c = Criteria::compare(
            Expression::convert(s, DataType::Int32),
            CompareOp::Eq,
            Expression::integer(2),
        );
        assert_eq!(rewrite(c.clone()), c);
    }

    #[test]
    fn test_widening_conversion_inverted() {
        let c = Criteria::compare(
            Expression::convert(col("x"), DataType::Int64),
            CompareOp::Eq,
            Expression::literal(Value::Int64(7)),
        );
        assert_eq!(
            rewrite(c),
            Criteria::compare(col("x"), CompareOp::Eq, Expression::integer(7))
        );

        // A constant outside the narrow range stays untouched
        let c = Criteria::compare(
            Expression::convert(col("x"), DataType::Int64),
            CompareOp::Eq,
            Expression::literal(Value::Int64(1 << 40)),
        );
        assert_eq!(rewrite(c.clone()), c);
    }

    #[test]
    fn test_between_decomposes() {
        let c = Criteria::Between {
            expr: col("x"),
            low: Expression::integer(1),
            high: Expression::integer(9),
            negated: false,
        };
        assert_eq!(
            rewrite(c),
            Criteria::and(vec![
                Criteria::compare(col("x"), CompareOp::Ge, Expression::integer(1)),
                Criteria::compare(col("x"), CompareOp::Le, Expression::integer(9)),
            ])
        );
    }

    #[test]
    fn test_in_dedup_and_degeneration() {
        let c = Criteria::In {
            expr: col("x"),
            list: vec![
                Expression::integer(1),
                Expression::integer(2),
                Expression::integer(1),
            ],
            negated: false,
        };
        assert_eq!(
            rewrite(c),
            Criteria::In {
                expr: col("x"),
                list: vec![Expression::integer(1), Expression::integer(2)],
                negated: false,
            }
        );

        let c = Criteria::In {
            expr: col("x"),
            list: vec![Expression::integer(5), Expression::integer(5)],
            negated: true,
        };
        assert_eq!(
            rewrite(c),
            Criteria::compare(col("x"), CompareOp::Ne, Expression::integer(5))
        );
    }

    #[test]
    fn test_constant_in_folds() {
        let c = Criteria::In {
            expr: Expression::integer(2),
            list: vec![Expression::integer(1), Expression::integer(2)],
            negated: false,
        };
        assert_eq!(rewrite(c), Criteria::always_true());

        // No match but a NULL member: UNKNOWN
        let c = Criteria::In {
            expr: Expression::integer(9),
            list: vec![Expression::integer(1), Expression::null(DataType::Int32)],
            negated: false,
        };
        assert_eq!(rewrite(c), Criteria::unknown());
    }

    #[test]
    fn test_and_level_in_intersection() {
        // x IN (1, 2, 3) AND x IN (2, 3, 4)  =>  x IN (2, 3)
        let c = Criteria::and(vec![
            Criteria::In {
                expr: col("x"),
                list: vec![
                    Expression::integer(1),
                    Expression::integer(2),
                    Expression::integer(3),
                ],
                negated: false,
            },
            Criteria::In {
                expr: col("x"),
                list: vec![
                    Expression::integer(2),
                    Expression::integer(3),
                    Expression::integer(4),
                ],
                negated: false,
            },
        ]);
        assert_eq!(
            rewrite(c),
            Criteria::In {
                expr: col("x"),
                list: vec![Expression::integer(2), Expression::integer(3)],
                negated: false,
            }
        );
    }

    #[test]
    fn test_in_and_is_null_gated_on_nullability() {
        // Nullable binding: a NULL row makes the conjunction UNKNOWN, not
        // FALSE, so the tree stays as written
        let c = Criteria::and(vec![
            Criteria::In {
                expr: col("x"),
                list: vec![Expression::integer(1), Expression::integer(2)],
                negated: false,
            },
            Criteria::is_null(col("x")),
        ]);
        assert_eq!(rewrite(c.clone()), c);

        // Non-nullable binding: IS NULL folds to FALSE and sinks the AND
        let c = Criteria::and(vec![
            Criteria::In {
                expr: req_col("x"),
                list: vec![Expression::integer(1), Expression::integer(2)],
                negated: false,
            },
            Criteria::is_null(req_col("x")),
        ]);
        assert_eq!(rewrite(c), Criteria::always_false());
    }

    #[test]
    fn test_disjoint_equalities_gated_on_nullability() {
        // x = 1 AND x = 2 holds for no value, but a nullable x still
        // yields UNKNOWN on NULL rows
        let c = Criteria::and(vec![
            Criteria::compare(col("x"), CompareOp::Eq, Expression::integer(1)),
            Criteria::compare(col("x"), CompareOp::Eq, Expression::integer(2)),
        ]);
        assert_eq!(rewrite(c.clone()), c);

        let c = Criteria::and(vec![
            Criteria::compare(req_col("x"), CompareOp::Eq, Expression::integer(1)),
            Criteria::compare(req_col("x"), CompareOp::Eq, Expression::integer(2)),
        ]);
        assert_eq!(rewrite(c), Criteria::always_false());
    }

    #[test]
    fn test_ne_removes_in_member() {
        // x IN (1, 2) AND x <> 2  =>  x = 1
        let c = Criteria::and(vec![
            Criteria::In {
                expr: col("x"),
                list: vec![Expression::integer(1), Expression::integer(2)],
                negated: false,
            },
            Criteria::compare(col("x"), CompareOp::Ne, Expression::integer(2)),
        ]);
        assert_eq!(
            rewrite(c),
            Criteria::compare(col("x"), CompareOp::Eq, Expression::integer(1))
        );
    }

    #[test]
    fn test_like_degeneration() {
        let s = Expression::column(ColumnRef::new("t", "s", DataType::String));
        let c = Criteria::Like {
            expr: s.clone(),
            pattern: Expression::string("abc"),
            escape: None,
            negated: false,
        };
        assert_eq!(
            rewrite(c),
            Criteria::compare(s.clone(), CompareOp::Eq, Expression::string("abc"))
        );

        let c = Criteria::Like {
            expr: s.clone(),
            pattern: Expression::string("%"),
            escape: None,
            negated: false,
        };
        assert_eq!(rewrite(c), Criteria::is_not_null(s.clone()));

        // NOT LIKE '%' over a nullable column stays, over non-nullable folds
        let c = Criteria::Like {
            expr: s.clone(),
            pattern: Expression::string("%"),
            escape: None,
            negated: true,
        };
        assert_eq!(rewrite(c.clone()), c);
        let req = Expression::column(ColumnRef::new("t", "s", DataType::String).not_null());
        let c = Criteria::Like {
            expr: req,
            pattern: Expression::string("%"),
            escape: None,
            negated: true,
        };
        assert_eq!(rewrite(c), Criteria::always_false());
    }

    #[test]
    fn test_like_escape_handling() {
        // 'a\%b' with escape '\' has no active wildcard
        let s = Expression::column(ColumnRef::new("t", "s", DataType::String));
        let c = Criteria::Like {
            expr: s.clone(),
            pattern: Expression::string("a\\%b"),
            escape: Some('\\'),
            negated: false,
        };
        assert_eq!(
            rewrite(c),
            Criteria::compare(s, CompareOp::Eq, Expression::string("a%b"))
        );
    }

    #[test]
    fn test_like_matcher() {
        assert!(like_match("hello", "h%o", None));
        assert!(like_match("hello", "h_llo", None));
        assert!(!like_match("hello", "h_o", None));
        assert!(like_match("50%", "50\\%", Some('\\')));
        assert!(!like_match("505", "50\\%", Some('\\')));
        assert!(like_match("", "%", None));
    }

    #[test]
    fn test_is_null_on_non_nullable() {
        assert_eq!(rewrite(Criteria::is_null(req_col("x"))), Criteria::always_false());
        assert_eq!(
            rewrite(Criteria::is_not_null(req_col("x"))),
            Criteria::always_true()
        );
        let nullable = Criteria::is_null(col("x"));
        assert_eq!(rewrite(nullable.clone()), nullable);
    }

    #[test]
    fn test_compound_flattening_and_absorption() {
        let a = Criteria::compare(col("a"), CompareOp::Eq, Expression::integer(1));
        let b = Criteria::compare(col("b"), CompareOp::Eq, Expression::integer(2));
        let c = Criteria::and(vec![
            a.clone(),
            Criteria::and(vec![b.clone(), Criteria::always_true()]),
        ]);
        assert_eq!(rewrite(c), Criteria::and(vec![a.clone(), b.clone()]));

        let c = Criteria::or(vec![a.clone(), Criteria::always_true()]);
        assert_eq!(rewrite(c), Criteria::always_true());

        let c = Criteria::and(vec![a.clone(), Criteria::always_false()]);
        assert_eq!(rewrite(c), Criteria::always_false());

        // An UNKNOWN conjunct stays in place: the conjunction can still be
        // FALSE, and NOT over it must stay UNKNOWN-preserving
        let c = Criteria::and(vec![a.clone(), Criteria::unknown()]);
        assert_eq!(rewrite(c), Criteria::and(vec![a.clone(), Criteria::unknown()]));

        // NOT over such a conjunction distributes without inventing TRUE
        let c = Criteria::not(Criteria::and(vec![a.clone(), Criteria::unknown()]));
        assert_eq!(
            rewrite(c),
            Criteria::or(vec![
                Criteria::compare(col("a"), CompareOp::Ne, Expression::integer(1)),
                Criteria::unknown(),
            ])
        );
    }

    #[test]
    fn test_empty_subquery_folding() {
        let empty = Command::Query({
            let mut q = crate::command::Query::from_table(
                crate::command::TableRef::new("t"),
                vec![crate::command::SelectItem::new(col("x"))],
            );
            q.where_clause = Some(Criteria::always_false());
            q
        });
        let c = Criteria::Exists {
            query: Box::new(empty.clone()),
            negated: false,
        };
        assert_eq!(rewrite(c), Criteria::always_false());

        let c = Criteria::SubqueryCompare {
            left: col("x"),
            op: CompareOp::Eq,
            quantifier: Quantifier::Any,
            query: Box::new(empty.clone()),
        };
        assert_eq!(rewrite(c), Criteria::always_false());

        let c = Criteria::SubqueryCompare {
            left: col("x"),
            op: CompareOp::Eq,
            quantifier: Quantifier::All,
            query: Box::new(empty),
        };
        assert_eq!(rewrite(c), Criteria::is_not_null(col("x")));
    }

    #[test]
    fn test_exists_gets_limit_one() {
        let sub = Command::Query(crate::command::Query::from_table(
            crate::command::TableRef::new("t"),
            vec![crate::command::SelectItem::new(col("x"))],
        ));
        let c = Criteria::Exists {
            query: Box::new(sub),
            negated: false,
        };
        match rewrite(c) {
            Criteria::Exists { query, .. } => {
                let q = query.as_query().unwrap();
                assert_eq!(q.limit, Some(Limit::rows(1)));
            }
            other => panic!("expected EXISTS, got {}", other),
        }
    }
}
