//! Command rewriting
//!
//! Queries, set operations, and DML are rewritten clause by clause. The
//! structural rules live here: sort-key resolution, join lowering, set
//! operation branch alignment, SELECT INTO lowering, and predicate pushdown
//! into inline views.

use super::Rewriter;
use crate::ast::{ColumnRef, CompoundOp, Criteria, Expression, Truth};
use crate::coercion::TypeCoercion;
use crate::command::{
    Command, FromClause, InsertSource, JoinKind, OrderByItem, OrderKey, Query, SelectItem,
    SetOpKind, TableRef,
};
use meridian_common::error::RewriteError;
use meridian_common::prelude::*;
use std::collections::HashMap;

impl Rewriter<'_> {
    pub(crate) fn rewrite_command(&self, command: Command) -> Result<Command, RewriteError> {
        match command {
            Command::Query(q) => self.rewrite_query(q),
            Command::SetOp {
                op,
                all,
                left,
                right,
                order_by,
            } => self.rewrite_setop(op, all, *left, *right, order_by),
            Command::Insert {
                table,
                columns,
                source,
            } => {
                let source = match source {
                    InsertSource::Values(rows) => InsertSource::Values(
                        rows.into_iter()
                            .map(|row| {
                                row.into_iter()
                                    .map(|e| self.rewrite_expression(e))
                                    .collect::<Result<_, _>>()
                            })
                            .collect::<Result<_, _>>()?,
                    ),
                    InsertSource::Query(q) => {
                        InsertSource::Query(Box::new(self.rewrite_command(*q)?))
                    }
                };
                Ok(Command::Insert {
                    table,
                    columns,
                    source,
                })
            }
            Command::Update {
                table,
                assignments,
                criteria,
            } => Ok(Command::Update {
                table,
                assignments: assignments
                    .into_iter()
                    .map(|(c, e)| Ok((c, self.rewrite_expression(e)?)))
                    .collect::<Result<_, RewriteError>>()?,
                criteria: self.rewrite_filter(criteria)?,
            }),
            Command::Delete { table, criteria } => Ok(Command::Delete {
                table,
                criteria: self.rewrite_filter(criteria)?,
            }),
            Command::Block(b) => Ok(Command::Block(self.rewrite_block(b)?)),
        }
    }

    fn rewrite_query(&self, mut q: Query) -> Result<Command, RewriteError> {
        q.from = q
            .from
            .into_iter()
            .map(|f| self.rewrite_from(f))
            .collect::<Result<_, _>>()?;
        q.select = q
            .select
            .into_iter()
            .map(|item| {
                Ok(SelectItem {
                    expr: self.rewrite_expression(item.expr)?,
                    alias: item.alias,
                })
            })
            .collect::<Result<Vec<_>, RewriteError>>()?;
        q.where_clause = self.rewrite_filter(q.where_clause)?;
        q.group_by = q
            .group_by
            .into_iter()
            .map(|e| self.rewrite_expression(e))
            .collect::<Result<_, _>>()?;
        q.having = self.rewrite_filter(q.having)?;
        q.order_by = self.resolve_order_by(q.order_by, &q.select)?;
        self.supply_implicit_order(&mut q);
        self.push_down_predicates(&mut q)?;
        if let Some(target) = q.into.take() {
            return self.lower_select_into(q, target);
        }
        Ok(Command::Query(q))
    }

    /// Rewrite a WHERE/HAVING predicate. A statically-true predicate is
    /// elided; in filter context UNKNOWN rejects every row, so a
    /// statically-unknown predicate, or a conjunction carrying one,
    /// collapses to FALSE. This strengthening happens only at the filter
    /// root: inside the tree UNKNOWN must survive for NOT to stay exact.
    pub(crate) fn rewrite_filter(
        &self,
        criteria: Option<Criteria>,
    ) -> Result<Option<Criteria>, RewriteError> {
        let Some(c) = criteria else { return Ok(None) };
        let c = self.rewrite_criteria(c)?;
        if let Criteria::Compound {
            op: CompoundOp::And,
            parts,
        } = &c
        {
            if parts.iter().any(|p| p.truth() == Some(Truth::Unknown)) {
                return Ok(Some(Criteria::always_false()));
            }
        }
        Ok(match c.truth() {
            Some(Truth::True) => None,
            Some(Truth::Unknown) => Some(Criteria::always_false()),
            _ => Some(c),
        })
    }

    fn rewrite_from(&self, from: FromClause) -> Result<FromClause, RewriteError> {
        Ok(match from {
            FromClause::Table(t) => FromClause::Table(t),
            FromClause::InlineView { query, alias } => FromClause::InlineView {
                query: Box::new(self.rewrite_command(*query)?),
                alias,
            },
            FromClause::Join {
                kind,
                left,
                right,
                on,
            } => {
                let mut left = self.rewrite_from(*left)?;
                let mut right = self.rewrite_from(*right)?;
                let mut kind = kind;
                let mut on = on.map(|c| self.rewrite_criteria(c)).transpose()?;

                // UNION JOIN is a full outer join that matches nothing
                if kind == JoinKind::UnionJoin {
                    kind = JoinKind::FullOuter;
                    on = Some(Criteria::always_false());
                }
                // Planners only handle left-preserving outer joins of views
                if kind == JoinKind::RightOuter
                    && (matches!(left, FromClause::InlineView { .. })
                        || matches!(right, FromClause::InlineView { .. }))
                {
                    std::mem::swap(&mut left, &mut right);
                    kind = JoinKind::LeftOuter;
                }
                // A trivially-true inner join condition carries no information
                if kind == JoinKind::Inner
                    && on.as_ref().and_then(Criteria::truth) == Some(Truth::True)
                {
                    on = None;
                }
                FromClause::Join {
                    kind,
                    left: Box::new(left),
                    right: Box::new(right),
                    on,
                }
            }
        })
    }

    /// Resolve ordinal and name sort keys to their select expressions and
    /// drop duplicate keys; the first direction for a key wins.
    fn resolve_order_by(
        &self,
        items: Vec<OrderByItem>,
        select: &[SelectItem],
    ) -> Result<Vec<OrderByItem>, RewriteError> {
        let mut out: Vec<OrderByItem> = Vec::with_capacity(items.len());
        for item in items {
            let expr = match item.key {
                OrderKey::Ordinal(n) => {
                    debug_assert!(
                        (1..=select.len()).contains(&n),
                        "sort ordinal {} out of range",
                        n
                    );
                    match select.get(n.wrapping_sub(1)) {
                        Some(s) => s.expr.clone(),
                        None => continue,
                    }
                }
                OrderKey::Name(name) => {
                    let found = select
                        .iter()
                        .enumerate()
                        .find(|(i, s)| s.output_name(*i).eq_ignore_ascii_case(&name));
                    debug_assert!(found.is_some(), "unknown sort key {}", name);
                    match found {
                        Some((_, s)) => s.expr.clone(),
                        None => continue,
                    }
                }
                OrderKey::Expr(e) => self.rewrite_expression(e)?,
            };
            let duplicate = out
                .iter()
                .any(|o| matches!(&o.key, OrderKey::Expr(prev) if *prev == expr));
            if !duplicate {
                out.push(OrderByItem {
                    key: OrderKey::Expr(expr),
                    ascending: item.ascending,
                });
            }
        }
        Ok(out)
    }

    /// Row-limited queries without sort keys return different rows across
    /// fetches. When the only source is a plain table with a unique or
    /// primary key, sort by that key ascending.
    fn supply_implicit_order(&self, q: &mut Query) {
        if !q.order_by.is_empty() || q.limit.is_none() || q.distinct || q.is_aggregate() {
            return;
        }
        let [FromClause::Table(t)] = q.from.as_slice() else {
            return;
        };
        let Some(key) = self.metadata.unique_key(&t.name) else {
            return;
        };
        let binding = t.binding_name().to_string();
        debug!(table = %binding, "supplying implicit sort keys from unique key");
        q.order_by = key
            .into_iter()
            .map(|mut c| {
                c.table = binding.clone();
                OrderByItem::asc(OrderKey::Expr(Expression::Column(c)))
            })
            .collect();
    }

    /// Push WHERE conjuncts that only reference one straightforward inline
    /// view down into that view's own WHERE, mapped through its projection.
    fn push_down_predicates(&self, q: &mut Query) -> Result<(), RewriteError> {
        let Some(where_clause) = q.where_clause.take() else {
            return Ok(());
        };
        let mut conjuncts = match where_clause {
            Criteria::Compound {
                op: CompoundOp::And,
                parts,
            } => parts,
            other => vec![other],
        };

        let mut remaining = Vec::with_capacity(conjuncts.len());
        for conjunct in conjuncts.drain(..) {
            match self.try_push_down(&conjunct, &mut q.from)? {
                true => {}
                false => remaining.push(conjunct),
            }
        }

        q.where_clause = match remaining.len() {
            0 => None,
            1 => Some(remaining.into_iter().next().unwrap()),
            _ => Some(Criteria::Compound {
                op: CompoundOp::And,
                parts: remaining,
            }),
        };
        Ok(())
    }

    /// Try to push one conjunct into the single inline view it references.
    /// Returns true when the conjunct was absorbed.
    fn try_push_down(
        &self,
        conjunct: &Criteria,
        from: &mut [FromClause],
    ) -> Result<bool, RewriteError> {
        let mut columns = Vec::new();
        if !criteria_columns(conjunct, &mut columns) || columns.is_empty() {
            return Ok(false);
        }
        let table = columns[0].table.clone();
        if !columns
            .iter()
            .all(|c| c.table.eq_ignore_ascii_case(&table))
        {
            return Ok(false);
        }

        for source in from.iter_mut() {
            let FromClause::InlineView { query, alias } = source else {
                continue;
            };
            if !alias.eq_ignore_ascii_case(&table) {
                continue;
            }
            let Command::Query(view) = query.as_mut() else {
                return Ok(false);
            };
            // Pushing below aggregation, DISTINCT, or LIMIT changes results
            if view.is_aggregate() || view.distinct || view.limit.is_some() {
                return Ok(false);
            }
            let mut mapping: HashMap<String, Expression> = HashMap::new();
            for (i, item) in view.select.iter().enumerate() {
                mapping.insert(item.output_name(i).to_lowercase(), item.expr.clone());
            }
            let Some(pushed) = map_criteria_columns(conjunct, &|c: &ColumnRef| {
                mapping.get(&c.name.to_lowercase()).cloned()
            }) else {
                return Ok(false);
            };
            debug!(view = %alias, conjunct = %conjunct, "pushing predicate into inline view");
            let combined = match view.where_clause.take() {
                Some(existing) => Criteria::and(vec![existing, pushed]),
                None => pushed,
            };
            view.where_clause = self.rewrite_filter(Some(combined))?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Lower `SELECT ... INTO target` to an INSERT with a query source.
    /// When the projection needs conversions or has duplicate names, the
    /// query is wrapped in an inline view with synthetic aliases.
    fn lower_select_into(&self, q: Query, target: String) -> Result<Command, RewriteError> {
        let schema = self
            .metadata
            .table_schema(&target)
            .map_err(|_| RewriteError::UnknownTarget(target.clone()))?;
        debug_assert_eq!(
            schema.len(),
            q.select.len(),
            "INTO projection width mismatch"
        );

        let needs_convert: Vec<Option<DataType>> = q
            .select
            .iter()
            .zip(schema.columns.iter())
            .map(|(item, col)| {
                (item.expr.data_type() != col.data_type).then(|| col.data_type.clone())
            })
            .collect();
        let mut names: Vec<String> = q
            .select
            .iter()
            .enumerate()
            .map(|(i, s)| s.output_name(i).to_lowercase())
            .collect();
        names.sort();
        let has_duplicates = names.windows(2).any(|w| w[0] == w[1]);

        let source = if has_duplicates || needs_convert.iter().any(Option::is_some) {
            let view_alias = self.next_alias("v");
            let inner_items: Vec<SelectItem> = q
                .select
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    SelectItem::aliased(item.expr.clone(), format!("expr_{}", i + 1))
                })
                .collect();
            let mut inner = q.clone();
            inner.select = inner_items;
            let outer_items = q
                .select
                .iter()
                .zip(needs_convert.iter())
                .enumerate()
                .map(|(i, (item, convert))| {
                    let col = Expression::Column(ColumnRef {
                        table: view_alias.clone(),
                        name: format!("expr_{}", i + 1),
                        ty: item.expr.data_type(),
                        nullable: true,
                    });
                    let expr = match convert {
                        Some(ty) => Expression::convert(col, ty.clone()),
                        None => col,
                    };
                    SelectItem::new(expr)
                })
                .collect();
            let mut outer = Query::projection(outer_items);
            outer.from = vec![FromClause::InlineView {
                query: Box::new(Command::Query(inner)),
                alias: view_alias,
            }];
            outer
        } else {
            q
        };

        Ok(Command::Insert {
            table: TableRef::new(target),
            columns: schema
                .column_names()
                .into_iter()
                .map(String::from)
                .collect(),
            source: InsertSource::Query(Box::new(Command::Query(source))),
        })
    }

    fn rewrite_setop(
        &self,
        op: SetOpKind,
        all: bool,
        left: Command,
        right: Command,
        order_by: Vec<OrderByItem>,
    ) -> Result<Command, RewriteError> {
        let left = self.rewrite_command(left)?;
        let right = self.rewrite_command(right)?;

        let left_cols = left.projected_columns();
        let right_cols = right.projected_columns();
        debug_assert_eq!(
            left_cols.len(),
            right_cols.len(),
            "set operation branch width mismatch"
        );

        let widened: Vec<Option<DataType>> = left_cols
            .iter()
            .zip(right_cols.iter())
            .map(|((_, lt), (_, rt))| TypeCoercion::common_supertype(&[lt.clone(), rt.clone()]))
            .collect();
        let left = apply_projection_types(left, &widened);
        let right = apply_projection_types(right, &widened);

        // Sort keys resolve positionally against the left branch's names
        let names: Vec<String> = left.projected_columns().into_iter().map(|(n, _)| n).collect();
        let mut seen = Vec::new();
        let mut resolved = Vec::with_capacity(order_by.len());
        for item in order_by {
            let ordinal = match item.key {
                OrderKey::Ordinal(n) => {
                    debug_assert!((1..=names.len()).contains(&n), "sort ordinal out of range");
                    n
                }
                OrderKey::Name(name) => {
                    let found = names
                        .iter()
                        .position(|n| n.eq_ignore_ascii_case(&name));
                    debug_assert!(found.is_some(), "unknown sort key {}", name);
                    match found {
                        Some(i) => i + 1,
                        None => continue,
                    }
                }
                OrderKey::Expr(_) => {
                    resolved.push(item);
                    continue;
                }
            };
            if !seen.contains(&ordinal) {
                seen.push(ordinal);
                resolved.push(OrderByItem {
                    key: OrderKey::Ordinal(ordinal),
                    ascending: item.ascending,
                });
            }
        }

        Ok(Command::SetOp {
            op,
            all,
            left: Box::new(left),
            right: Box::new(right),
            order_by: resolved,
        })
    }
}

/// Wrap select items in explicit conversions so each branch projects the
/// widened column types
fn apply_projection_types(command: Command, types: &[Option<DataType>]) -> Command {
    match command {
        Command::Query(mut q) => {
            for (i, (item, ty)) in q.select.iter_mut().zip(types.iter()).enumerate() {
                let Some(ty) = ty else { continue };
                if item.expr.data_type() == *ty {
                    continue;
                }
                // Preserve the output name across the wrapping
                if item.alias.is_none() {
                    item.alias = Some(item.output_name(i));
                }
                let expr = std::mem::replace(&mut item.expr, Expression::null(DataType::Null));
                item.expr = Expression::convert(expr, ty.clone());
            }
            Command::Query(q)
        }
        Command::SetOp {
            op,
            all,
            left,
            right,
            order_by,
        } => Command::SetOp {
            op,
            all,
            left: Box::new(apply_projection_types(*left, types)),
            right: Box::new(apply_projection_types(*right, types)),
            order_by,
        },
        other => other,
    }
}

// ----------------------------------------------------------------------
// Tree walkers used by predicate pushdown
// ----------------------------------------------------------------------

/// Collect column references from a criteria tree. Returns false when the
/// tree contains a subquery, which disqualifies it from pushdown.
fn criteria_columns(criteria: &Criteria, out: &mut Vec<ColumnRef>) -> bool {
    match criteria {
        Criteria::Compare { left, right, .. } => {
            expr_columns(left, out) && expr_columns(right, out)
        }
        Criteria::Between {
            expr, low, high, ..
        } => expr_columns(expr, out) && expr_columns(low, out) && expr_columns(high, out),
        Criteria::In { expr, list, .. } => {
            expr_columns(expr, out) && list.iter().all(|e| expr_columns(e, out))
        }
        Criteria::Like { expr, pattern, .. } => {
            expr_columns(expr, out) && expr_columns(pattern, out)
        }
        Criteria::IsNull { expr, .. } => expr_columns(expr, out),
        Criteria::Compound { parts, .. } => parts.iter().all(|p| criteria_columns(p, out)),
        Criteria::Not(inner) => criteria_columns(inner, out),
        Criteria::Boolean(expr) => expr_columns(expr, out),
        Criteria::Exists { .. }
        | Criteria::SubqueryCompare { .. }
        | Criteria::HasCriteria { .. }
        | Criteria::TranslateCriteria { .. } => false,
    }
}

fn expr_columns(expr: &Expression, out: &mut Vec<ColumnRef>) -> bool {
    match expr {
        Expression::Column(c) => {
            out.push(c.clone());
            true
        }
        Expression::Literal { .. } | Expression::Parameter { .. } => true,
        Expression::Function { args, .. } => args.iter().all(|a| expr_columns(a, out)),
        Expression::Convert { expr, .. } => expr_columns(expr, out),
        Expression::Case {
            whens, otherwise, ..
        } => {
            whens
                .iter()
                .all(|(c, e)| criteria_columns(c, out) && expr_columns(e, out))
                && otherwise.as_deref().map_or(true, |e| expr_columns(e, out))
        }
        Expression::ScalarSubquery(_) => false,
        Expression::Aggregate { .. }
        | Expression::InputValue { .. }
        | Expression::Changing { .. } => false,
    }
}

/// Rebuild a criteria with every column reference replaced through `f`.
/// Returns None when any column has no mapping.
pub(crate) fn map_criteria_columns(
    criteria: &Criteria,
    f: &impl Fn(&ColumnRef) -> Option<Expression>,
) -> Option<Criteria> {
    Some(match criteria {
        Criteria::Compare { left, op, right } => Criteria::Compare {
            left: map_expr_columns(left, f)?,
            op: *op,
            right: map_expr_columns(right, f)?,
        },
        Criteria::Between {
            expr,
            low,
            high,
            negated,
        } => Criteria::Between {
            expr: map_expr_columns(expr, f)?,
            low: map_expr_columns(low, f)?,
            high: map_expr_columns(high, f)?,
            negated: *negated,
        },
        Criteria::In {
            expr,
            list,
            negated,
        } => Criteria::In {
            expr: map_expr_columns(expr, f)?,
            list: list
                .iter()
                .map(|e| map_expr_columns(e, f))
                .collect::<Option<_>>()?,
            negated: *negated,
        },
        Criteria::Like {
            expr,
            pattern,
            escape,
            negated,
        } => Criteria::Like {
            expr: map_expr_columns(expr, f)?,
            pattern: map_expr_columns(pattern, f)?,
            escape: *escape,
            negated: *negated,
        },
        Criteria::IsNull { expr, negated } => Criteria::IsNull {
            expr: map_expr_columns(expr, f)?,
            negated: *negated,
        },
        Criteria::Compound { op, parts } => Criteria::Compound {
            op: *op,
            parts: parts
                .iter()
                .map(|p| map_criteria_columns(p, f))
                .collect::<Option<_>>()?,
        },
        Criteria::Not(inner) => Criteria::Not(Box::new(map_criteria_columns(inner, f)?)),
        Criteria::Boolean(expr) => Criteria::Boolean(map_expr_columns(expr, f)?),
        _ => return None,
    })
}

pub(crate) fn map_expr_columns(
    expr: &Expression,
    f: &impl Fn(&ColumnRef) -> Option<Expression>,
) -> Option<Expression> {
    Some(match expr {
        Expression::Column(c) => f(c)?,
        Expression::Literal { .. } | Expression::Parameter { .. } => expr.clone(),
        Expression::Function { name, args, ty } => Expression::Function {
            name: name.clone(),
            args: args
                .iter()
                .map(|a| map_expr_columns(a, f))
                .collect::<Option<_>>()?,
            ty: ty.clone(),
        },
        Expression::Convert { expr, target } => Expression::Convert {
            expr: Box::new(map_expr_columns(expr, f)?),
            target: target.clone(),
        },
        Expression::Case {
            whens,
            otherwise,
            ty,
        } => Expression::Case {
            whens: whens
                .iter()
                .map(|(c, e)| Some((map_criteria_columns(c, f)?, map_expr_columns(e, f)?)))
                .collect::<Option<_>>()?,
            otherwise: match otherwise {
                Some(e) => Some(Box::new(map_expr_columns(e, f)?)),
                None => None,
            },
            ty: ty.clone(),
        },
        _ => return None,
    })
}
