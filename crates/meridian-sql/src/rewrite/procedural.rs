//! Procedural block rewriting
//!
//! A trigger procedure runs against a fixed INSERT, UPDATE, or DELETE. The
//! pass first resolves the procedural pseudo-constructs against that
//! trigger: `InputValue` and `Changing` references become concrete
//! expressions, and HAS CRITERIA / TRANSLATE CRITERIA become ordinary
//! criteria. The resulting block then goes through ordinary statement
//! rewriting: constant IF conditions inline a branch, dead loops disappear,
//! and a provably infinite loop aborts the whole block.

use super::command::map_criteria_columns;
use super::Rewriter;
use crate::ast::{ColumnRef, CompoundOp, Criteria, Expression, Truth};
use crate::command::{Block, Command, InsertSource, Query, Statement};
use meridian_common::error::RewriteError;
use meridian_common::prelude::*;
use std::collections::HashMap;

/// The variable a procedure assigns its affected-row count to. A sole
/// trailing assignment to it becomes the procedure's return value.
const RESULT_COUNT_VARIABLE: &str = "rows_updated";

/// What the triggering statement supplies to the procedure
struct TriggerContext<'t> {
    table: String,
    /// Supplied value per column, lowercased name
    supplied: HashMap<String, Expression>,
    criteria: Option<&'t Criteria>,
}

impl<'t> TriggerContext<'t> {
    fn new(trigger: &'t Command) -> Self {
        match trigger {
            Command::Insert {
                table,
                columns,
                source,
            } => {
                let mut supplied = HashMap::new();
                if let InsertSource::Values(rows) = source {
                    debug_assert_eq!(rows.len(), 1, "trigger INSERT must carry a single row");
                    if let Some(row) = rows.first() {
                        for (col, expr) in columns.iter().zip(row.iter()) {
                            supplied.insert(col.to_lowercase(), expr.clone());
                        }
                    }
                }
                Self {
                    table: table.name.clone(),
                    supplied,
                    criteria: None,
                }
            }
            Command::Update {
                table,
                assignments,
                criteria,
            } => Self {
                table: table.name.clone(),
                supplied: assignments
                    .iter()
                    .map(|(c, e)| (c.to_lowercase(), e.clone()))
                    .collect(),
                criteria: criteria.as_ref(),
            },
            Command::Delete { table, criteria } => Self {
                table: table.name.clone(),
                supplied: HashMap::new(),
                criteria: criteria.as_ref(),
            },
            other => {
                debug_assert!(false, "unsupported trigger command: {}", other);
                Self {
                    table: String::new(),
                    supplied: HashMap::new(),
                    criteria: None,
                }
            }
        }
    }

    fn is_changing(&self, column: &str) -> bool {
        self.supplied.contains_key(&column.to_lowercase())
    }
}

impl Rewriter<'_> {
    pub(crate) fn rewrite_procedure(
        &self,
        block: Block,
        trigger: &Command,
    ) -> Result<Block, RewriteError> {
        let trig = TriggerContext::new(trigger);
        let block = self.resolve_block(block, &trig)?;
        self.rewrite_block(block)
    }

    // ------------------------------------------------------------------
    // Pseudo-construct resolution
    // ------------------------------------------------------------------

    fn resolve_block(&self, block: Block, trig: &TriggerContext) -> Result<Block, RewriteError> {
        let statements = block
            .statements
            .into_iter()
            .map(|s| self.resolve_statement(s, trig))
            .collect::<Result<_, _>>()?;
        Ok(Block { statements })
    }

    fn resolve_statement(
        &self,
        statement: Statement,
        trig: &TriggerContext,
    ) -> Result<Statement, RewriteError> {
        Ok(match statement {
            Statement::Declare { name, ty, init } => Statement::Declare {
                name,
                ty,
                init: init.map(|e| self.resolve_expr(e, trig)).transpose()?,
            },
            Statement::Assign { name, value } => Statement::Assign {
                name,
                value: self.resolve_expr(value, trig)?,
            },
            Statement::If {
                condition,
                then_block,
                else_block,
            } => Statement::If {
                condition: self.resolve_criteria(condition, trig)?,
                then_block: self.resolve_block(then_block, trig)?,
                else_block: else_block.map(|b| self.resolve_block(b, trig)).transpose()?,
            },
            Statement::While { condition, body } => Statement::While {
                condition: self.resolve_criteria(condition, trig)?,
                body: self.resolve_block(body, trig)?,
            },
            Statement::Sql(cmd) => Statement::Sql(self.resolve_command(cmd, trig)?),
            Statement::Return(e) => {
                Statement::Return(e.map(|e| self.resolve_expr(e, trig)).transpose()?)
            }
            s @ (Statement::Break | Statement::Continue) => s,
        })
    }

    fn resolve_command(
        &self,
        command: Command,
        trig: &TriggerContext,
    ) -> Result<Command, RewriteError> {
        Ok(match command {
            Command::Query(q) => Command::Query(self.resolve_query(q, trig)?),
            Command::SetOp {
                op,
                all,
                left,
                right,
                order_by,
            } => Command::SetOp {
                op,
                all,
                left: Box::new(self.resolve_command(*left, trig)?),
                right: Box::new(self.resolve_command(*right, trig)?),
                order_by,
            },
            Command::Insert {
                table,
                columns,
                source,
            } => Command::Insert {
                table,
                columns,
                source: match source {
                    InsertSource::Values(rows) => InsertSource::Values(
                        rows.into_iter()
                            .map(|row| {
                                row.into_iter()
                                    .map(|e| self.resolve_expr(e, trig))
                                    .collect::<Result<_, _>>()
                            })
                            .collect::<Result<_, _>>()?,
                    ),
                    InsertSource::Query(q) => {
                        InsertSource::Query(Box::new(self.resolve_command(*q, trig)?))
                    }
                },
            },
            Command::Update {
                table,
                assignments,
                criteria,
            } => {
                // An assignment fed by an unsupplied input with no default
                // writes nothing and is elided
                let mut resolved = Vec::with_capacity(assignments.len());
                for (col, expr) in assignments {
                    if let Expression::InputValue { column, .. } = &expr {
                        if !trig.is_changing(column)
                            && self.metadata.column_default(&trig.table, column).is_none()
                        {
                            continue;
                        }
                    }
                    resolved.push((col, self.resolve_expr(expr, trig)?));
                }
                Command::Update {
                    table,
                    assignments: resolved,
                    criteria: criteria
                        .map(|c| self.resolve_criteria(c, trig))
                        .transpose()?,
                }
            }
            Command::Delete { table, criteria } => Command::Delete {
                table,
                criteria: criteria
                    .map(|c| self.resolve_criteria(c, trig))
                    .transpose()?,
            },
            Command::Block(b) => Command::Block(self.resolve_block(b, trig)?),
        })
    }

    fn resolve_query(&self, q: Query, trig: &TriggerContext) -> Result<Query, RewriteError> {
        let mut q = q;
        q.select = q
            .select
            .into_iter()
            .map(|mut item| {
                item.expr = self.resolve_expr(item.expr, trig)?;
                Ok(item)
            })
            .collect::<Result<_, RewriteError>>()?;
        q.where_clause = q
            .where_clause
            .map(|c| self.resolve_criteria(c, trig))
            .transpose()?;
        q.having = q
            .having
            .map(|c| self.resolve_criteria(c, trig))
            .transpose()?;
        Ok(q)
    }

    fn resolve_expr(
        &self,
        expr: Expression,
        trig: &TriggerContext,
    ) -> Result<Expression, RewriteError> {
        Ok(match expr {
            Expression::InputValue { column, ty } => {
                if let Some(supplied) = trig.supplied.get(&column.to_lowercase()) {
                    supplied.clone()
                } else {
                    // Unsupplied inputs take the declared column type, which
                    // may differ from the type at the reference site
                    let ty = self
                        .metadata
                        .resolve_type(&trig.table, &column)
                        .unwrap_or(ty);
                    match self.metadata.column_default(&trig.table, &column) {
                        Some(value) => Expression::Literal { value, ty },
                        None => Expression::null(ty),
                    }
                }
            }
            Expression::Changing { column } => Expression::boolean(trig.is_changing(&column)),
            Expression::Function { name, args, ty } => Expression::Function {
                name,
                args: args
                    .into_iter()
                    .map(|a| self.resolve_expr(a, trig))
                    .collect::<Result<_, _>>()?,
                ty,
            },
            Expression::Convert { expr, target } => Expression::Convert {
                expr: Box::new(self.resolve_expr(*expr, trig)?),
                target,
            },
            Expression::Case {
                whens,
                otherwise,
                ty,
            } => Expression::Case {
                whens: whens
                    .into_iter()
                    .map(|(c, e)| {
                        Ok((self.resolve_criteria(c, trig)?, self.resolve_expr(e, trig)?))
                    })
                    .collect::<Result<_, RewriteError>>()?,
                otherwise: otherwise
                    .map(|e| self.resolve_expr(*e, trig))
                    .transpose()?
                    .map(Box::new),
                ty,
            },
            Expression::ScalarSubquery(cmd) => {
                Expression::ScalarSubquery(Box::new(self.resolve_command(*cmd, trig)?))
            }
            other => other,
        })
    }

    fn resolve_criteria(
        &self,
        criteria: Criteria,
        trig: &TriggerContext,
    ) -> Result<Criteria, RewriteError> {
        Ok(match criteria {
            Criteria::HasCriteria { columns } => resolve_has_criteria(&columns, trig),
            Criteria::TranslateCriteria {
                columns,
                translations,
            } => resolve_translate_criteria(&columns, &translations, trig),
            Criteria::Compare { left, op, right } => Criteria::Compare {
                left: self.resolve_expr(left, trig)?,
                op,
                right: self.resolve_expr(right, trig)?,
            },
            Criteria::Between {
                expr,
                low,
                high,
                negated,
            } => Criteria::Between {
                expr: self.resolve_expr(expr, trig)?,
                low: self.resolve_expr(low, trig)?,
                high: self.resolve_expr(high, trig)?,
                negated,
            },
            Criteria::In {
                expr,
                list,
                negated,
            } => Criteria::In {
                expr: self.resolve_expr(expr, trig)?,
                list: list
                    .into_iter()
                    .map(|e| self.resolve_expr(e, trig))
                    .collect::<Result<_, _>>()?,
                negated,
            },
            Criteria::Like {
                expr,
                pattern,
                escape,
                negated,
            } => Criteria::Like {
                expr: self.resolve_expr(expr, trig)?,
                pattern: self.resolve_expr(pattern, trig)?,
                escape,
                negated,
            },
            Criteria::IsNull { expr, negated } => Criteria::IsNull {
                expr: self.resolve_expr(expr, trig)?,
                negated,
            },
            Criteria::Compound { op, parts } => Criteria::Compound {
                op,
                parts: parts
                    .into_iter()
                    .map(|p| self.resolve_criteria(p, trig))
                    .collect::<Result<_, _>>()?,
            },
            Criteria::Not(inner) => Criteria::Not(Box::new(self.resolve_criteria(*inner, trig)?)),
            Criteria::Boolean(e) => Criteria::Boolean(self.resolve_expr(e, trig)?),
            Criteria::Exists { query, negated } => Criteria::Exists {
                query: Box::new(self.resolve_command(*query, trig)?),
                negated,
            },
            Criteria::SubqueryCompare {
                left,
                op,
                quantifier,
                query,
            } => Criteria::SubqueryCompare {
                left: self.resolve_expr(left, trig)?,
                op,
                quantifier,
                query: Box::new(self.resolve_command(*query, trig)?),
            },
        })
    }

    // ------------------------------------------------------------------
    // Statement rewriting
    // ------------------------------------------------------------------

    pub(crate) fn rewrite_block(&self, block: Block) -> Result<Block, RewriteError> {
        let mut scope = Vec::new();
        let mut block = self.rewrite_block_scoped(block, &mut scope)?;
        promote_result_count(&mut block);
        Ok(block)
    }

    fn rewrite_block_scoped(
        &self,
        block: Block,
        scope: &mut Vec<String>,
    ) -> Result<Block, RewriteError> {
        let mut out: Vec<Statement> = Vec::with_capacity(block.statements.len());
        for statement in block.statements {
            match statement {
                Statement::Declare { name, ty, init } => {
                    if scope.iter().any(|v| v.eq_ignore_ascii_case(&name)) {
                        return Err(RewriteError::DuplicateVariable(name));
                    }
                    scope.push(name.clone());
                    let init = init.map(|e| self.rewrite_expression(e)).transpose()?;
                    out.push(Statement::Declare { name, ty, init });
                }
                Statement::Assign { name, value } => {
                    if !scope.iter().any(|v| v.eq_ignore_ascii_case(&name)) {
                        return Err(RewriteError::UnknownVariable(name));
                    }
                    out.push(Statement::Assign {
                        name,
                        value: self.rewrite_expression(value)?,
                    });
                }
                Statement::If {
                    condition,
                    then_block,
                    else_block,
                } => {
                    let condition = self.rewrite_criteria(condition)?;
                    match condition.truth() {
                        Some(Truth::True) => {
                            // The branch inlines into the surrounding block
                            let inlined = self.rewrite_block_scoped(then_block, scope)?;
                            out.extend(inlined.statements);
                        }
                        Some(Truth::False) | Some(Truth::Unknown) => {
                            if let Some(b) = else_block {
                                let inlined = self.rewrite_block_scoped(b, scope)?;
                                out.extend(inlined.statements);
                            }
                        }
                        None => {
                            let then_block =
                                self.rewrite_block_scoped(then_block, &mut scope.clone())?;
                            let else_block = else_block
                                .map(|b| self.rewrite_block_scoped(b, &mut scope.clone()))
                                .transpose()?;
                            out.push(Statement::If {
                                condition,
                                then_block,
                                else_block,
                            });
                        }
                    }
                }
                Statement::While { condition, body } => {
                    let condition = self.rewrite_criteria(condition)?;
                    match condition.truth() {
                        // The body never runs
                        Some(Truth::False) | Some(Truth::Unknown) => {}
                        Some(Truth::True) => {
                            if !body.contains_break() {
                                return Err(RewriteError::InfiniteLoop(format!(
                                    "WHILE ({})",
                                    condition
                                )));
                            }
                            let body = self.rewrite_block_scoped(body, &mut scope.clone())?;
                            out.push(Statement::While { condition, body });
                        }
                        None => {
                            let body = self.rewrite_block_scoped(body, &mut scope.clone())?;
                            out.push(Statement::While { condition, body });
                        }
                    }
                }
                Statement::Sql(cmd) => {
                    let cmd = self.rewrite_command(cmd)?;
                    // All assignments were elided: the write does nothing
                    if matches!(&cmd, Command::Update { assignments, .. } if assignments.is_empty())
                    {
                        continue;
                    }
                    out.push(Statement::Sql(cmd));
                }
                Statement::Return(e) => {
                    out.push(Statement::Return(
                        e.map(|e| self.rewrite_expression(e)).transpose()?,
                    ));
                }
                s @ (Statement::Break | Statement::Continue) => out.push(s),
            }
        }
        Ok(Block { statements: out })
    }
}

/// When the block's sole assignment to the result-count variable is its
/// final statement, the procedure just returns that count
fn promote_result_count(block: &mut Block) {
    let assignments = block
        .statements
        .iter()
        .filter(
            |s| matches!(s, Statement::Assign { name, .. } if name.eq_ignore_ascii_case(RESULT_COUNT_VARIABLE)),
        )
        .count();
    if assignments != 1 {
        return;
    }
    let is_trailing = matches!(
        block.statements.last(),
        Some(Statement::Assign { name, .. }) if name.eq_ignore_ascii_case(RESULT_COUNT_VARIABLE)
    );
    if !is_trailing {
        return;
    }
    let Some(Statement::Assign { value, .. }) = block.statements.pop() else {
        unreachable!();
    };
    block.statements.push(Statement::Return(Some(value)));
}

fn resolve_has_criteria(columns: &[String], trig: &TriggerContext) -> Criteria {
    let Some(criteria) = trig.criteria else {
        return Criteria::always_false();
    };
    if columns.is_empty() {
        return Criteria::always_true();
    }
    let referenced = referenced_column_names(criteria);
    let all_present = columns
        .iter()
        .all(|c| referenced.contains(&c.to_lowercase()));
    Criteria::from_truth(Truth::from(all_present))
}

fn resolve_translate_criteria(
    columns: &[String],
    translations: &[(String, Expression)],
    trig: &TriggerContext,
) -> Criteria {
    let Some(criteria) = trig.criteria else {
        return Criteria::always_true();
    };
    let conjuncts: Vec<&Criteria> = match criteria {
        Criteria::Compound {
            op: CompoundOp::And,
            parts,
        } => parts.iter().collect(),
        other => vec![other],
    };
    let selected: Vec<&Criteria> = if columns.is_empty() {
        conjuncts
    } else {
        let allowed: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
        conjuncts
            .into_iter()
            .filter(|c| {
                referenced_column_names(c)
                    .iter()
                    .all(|n| allowed.contains(n))
            })
            .collect()
    };
    let translate = |col: &ColumnRef| -> Option<Expression> {
        Some(
            translations
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&col.name))
                .map(|(_, e)| e.clone())
                .unwrap_or_else(|| Expression::Column(col.clone())),
        )
    };
    let translated: Vec<Criteria> = selected
        .into_iter()
        .filter_map(|c| map_criteria_columns(c, &translate))
        .collect();
    match translated.len() {
        0 => Criteria::always_true(),
        1 => translated.into_iter().next().unwrap(),
        _ => Criteria::and(translated),
    }
}

/// Lowercased names of the columns a criteria references
fn referenced_column_names(criteria: &Criteria) -> Vec<String> {
    fn walk_expr(e: &Expression, out: &mut Vec<String>) {
        match e {
            Expression::Column(c) => out.push(c.name.to_lowercase()),
            Expression::Function { args, .. } => args.iter().for_each(|a| walk_expr(a, out)),
            Expression::Convert { expr, .. } => walk_expr(expr, out),
            Expression::Case {
                whens, otherwise, ..
            } => {
                for (c, e) in whens {
                    walk(c, out);
                    walk_expr(e, out);
                }
                if let Some(e) = otherwise {
                    walk_expr(e, out);
                }
            }
            _ => {}
        }
    }
    fn walk(c: &Criteria, out: &mut Vec<String>) {
        match c {
            Criteria::Compare { left, right, .. } => {
                walk_expr(left, out);
                walk_expr(right, out);
            }
            Criteria::Between {
                expr, low, high, ..
            } => {
                walk_expr(expr, out);
                walk_expr(low, out);
                walk_expr(high, out);
            }
            Criteria::In { expr, list, .. } => {
                walk_expr(expr, out);
                list.iter().for_each(|e| walk_expr(e, out));
            }
            Criteria::Like { expr, pattern, .. } => {
                walk_expr(expr, out);
                walk_expr(pattern, out);
            }
            Criteria::IsNull { expr, .. } => walk_expr(expr, out),
            Criteria::Compound { parts, .. } => parts.iter().for_each(|p| walk(p, out)),
            Criteria::Not(inner) => walk(inner, out),
            Criteria::Boolean(e) => walk_expr(e, out),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(criteria, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CompareOp;
    use crate::command::{SelectItem, TableRef};
    use crate::functions::FunctionRegistry;
    use crate::metadata::{Catalog, TableInfo};
    use meridian_common::types::{ColumnDef, Schema};

    fn catalog() -> Catalog {
        let catalog = Catalog::new();
        catalog.register_table(TableInfo::new(
            "orders",
            Schema::new(vec![
                ColumnDef::new("id", DataType::Int32).not_null(),
                ColumnDef::new("status", DataType::String).default(Value::String("new".into())),
                ColumnDef::new("note", DataType::String),
            ]),
        ));
        catalog
    }

    fn trigger_insert(columns: &[&str], values: Vec<Expression>) -> Command {
        Command::Insert {
            table: TableRef::new("orders"),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            source: InsertSource::Values(vec![values]),
        }
    }

    fn trigger_update(assignments: Vec<(&str, Expression)>, criteria: Option<Criteria>) -> Command {
        Command::Update {
            table: TableRef::new("orders"),
            assignments: assignments
                .into_iter()
                .map(|(c, e)| (c.to_string(), e))
                .collect(),
            criteria,
        }
    }

    fn run(block: Block, trigger: &Command) -> Result<Block, RewriteError> {
        let catalog = catalog();
        let registry = FunctionRegistry::new();
        Rewriter::new(&catalog, &registry, None).rewrite_procedure(block, trigger)
    }

    fn col(name: &str) -> Expression {
        Expression::column(ColumnRef::new("orders", name, DataType::Int32))
    }

    #[test]
    fn test_input_value_substitution() {
        // INSERT supplies id; status falls back to its default, note to NULL
        let trigger = trigger_insert(&["id"], vec![Expression::integer(7)]);
        let block = Block::new(vec![Statement::Sql(Command::Query(Query::projection(
            vec![
                SelectItem::new(Expression::InputValue {
                    column: "id".to_string(),
                    ty: DataType::Int32,
                }),
                SelectItem::new(Expression::InputValue {
                    column: "status".to_string(),
                    ty: DataType::String,
                }),
                SelectItem::new(Expression::InputValue {
                    column: "note".to_string(),
                    ty: DataType::String,
                }),
            ],
        )))]);
        let out = run(block, &trigger).unwrap();
        match &out.statements[0] {
            Statement::Sql(Command::Query(q)) => {
                assert_eq!(q.select[0].expr, Expression::integer(7));
                assert_eq!(q.select[1].expr, Expression::string("new"));
                assert_eq!(q.select[2].expr, Expression::null(DataType::String));
            }
            other => panic!("expected SQL statement, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupplied_input_takes_declared_type() {
        // The reference site claims the wrong type; the catalog's declared
        // column type wins for the substituted NULL
        let trigger = trigger_update(vec![("status", Expression::string("x"))], None);
        let block = Block::new(vec![Statement::Sql(Command::Query(Query::projection(
            vec![SelectItem::new(Expression::InputValue {
                column: "note".to_string(),
                ty: DataType::Int32,
            })],
        )))]);
        let out = run(block, &trigger).unwrap();
        match &out.statements[0] {
            Statement::Sql(Command::Query(q)) => {
                assert_eq!(q.select[0].expr, Expression::null(DataType::String));
            }
            other => panic!("expected SQL statement, got {:?}", other),
        }
    }

    #[test]
    fn test_changing_prunes_branches() {
        let trigger = trigger_update(vec![("status", Expression::string("done"))], None);
        // IF (CHANGING status) THEN <a> ELSE <b>: only <a> survives, inlined
        let block = Block::new(vec![Statement::If {
            condition: Criteria::Boolean(Expression::Changing {
                column: "status".to_string(),
            }),
            then_block: Block::new(vec![Statement::Sql(Command::Delete {
                table: TableRef::new("orders"),
                criteria: None,
            })]),
            else_block: Some(Block::new(vec![Statement::Break])),
        }]);
        let out = run(block, &trigger).unwrap();
        assert_eq!(out.statements.len(), 1);
        assert!(matches!(
            out.statements[0],
            Statement::Sql(Command::Delete { .. })
        ));
    }

    #[test]
    fn test_has_criteria_resolution() {
        let criteria = Criteria::compare(col("id"), CompareOp::Eq, Expression::integer(1));
        let trigger = trigger_update(vec![("status", Expression::string("x"))], Some(criteria));

        let block = Block::new(vec![Statement::If {
            condition: Criteria::HasCriteria { columns: vec![] },
            then_block: Block::new(vec![Statement::Break]),
            else_block: None,
        }]);
        let out = run(block, &trigger).unwrap();
        assert_eq!(out.statements, vec![Statement::Break]);

        // Listed column not referenced by the trigger criteria
        let block = Block::new(vec![Statement::If {
            condition: Criteria::HasCriteria {
                columns: vec!["note".to_string()],
            },
            then_block: Block::new(vec![Statement::Break]),
            else_block: None,
        }]);
        let out = run(block, &trigger).unwrap();
        assert!(out.statements.is_empty());
    }

    #[test]
    fn test_translate_criteria_substitution() {
        // Trigger: WHERE id = 1 AND status = 'x'; translate only id,
        // mapping it to a physical column
        let criteria = Criteria::and(vec![
            Criteria::compare(col("id"), CompareOp::Eq, Expression::integer(1)),
            Criteria::compare(
                Expression::column(ColumnRef::new("orders", "status", DataType::String)),
                CompareOp::Eq,
                Expression::string("x"),
            ),
        ]);
        let trigger = trigger_update(vec![], Some(criteria));
        let physical = Expression::column(ColumnRef::new("o_phys", "order_id", DataType::Int32));
        let block = Block::new(vec![Statement::Sql(Command::Delete {
            table: TableRef::new("o_phys"),
            criteria: Some(Criteria::TranslateCriteria {
                columns: vec!["id".to_string()],
                translations: vec![("id".to_string(), physical.clone())],
            }),
        })]);
        let out = run(block, &trigger).unwrap();
        match &out.statements[0] {
            Statement::Sql(Command::Delete { criteria, .. }) => {
                assert_eq!(
                    *criteria,
                    Some(Criteria::compare(
                        physical,
                        CompareOp::Eq,
                        Expression::integer(1)
                    ))
                );
            }
            other => panic!("expected DELETE, got {:?}", other),
        }
    }

    #[test]
    fn test_while_true_without_break_is_fatal() {
        let trigger = trigger_insert(&["id"], vec![Expression::integer(1)]);
        let block = Block::new(vec![Statement::While {
            condition: Criteria::always_true(),
            body: Block::new(vec![Statement::Sql(Command::Delete {
                table: TableRef::new("orders"),
                criteria: None,
            })]),
        }]);
        let err = run(block, &trigger).unwrap_err();
        assert!(matches!(err, RewriteError::InfiniteLoop(_)));
    }

    #[test]
    fn test_while_true_with_break_survives() {
        let trigger = trigger_insert(&["id"], vec![Expression::integer(1)]);
        let block = Block::new(vec![Statement::While {
            condition: Criteria::always_true(),
            body: Block::new(vec![Statement::Break]),
        }]);
        let out = run(block, &trigger).unwrap();
        assert_eq!(out.statements.len(), 1);
    }

    #[test]
    fn test_while_false_removed() {
        let trigger = trigger_insert(&["id"], vec![Expression::integer(1)]);
        let block = Block::new(vec![Statement::While {
            condition: Criteria::always_false(),
            body: Block::new(vec![Statement::Break]),
        }]);
        let out = run(block, &trigger).unwrap();
        assert!(out.statements.is_empty());
    }

    #[test]
    fn test_dead_write_elision() {
        // UPDATE SET note = INPUT.note where note is unsupplied and has no
        // default: the whole statement disappears
        let trigger = trigger_update(vec![("status", Expression::string("x"))], None);
        let block = Block::new(vec![Statement::Sql(Command::Update {
            table: TableRef::new("o_phys"),
            assignments: vec![(
                "note".to_string(),
                Expression::InputValue {
                    column: "note".to_string(),
                    ty: DataType::String,
                },
            )],
            criteria: None,
        })]);
        let out = run(block, &trigger).unwrap();
        assert!(out.statements.is_empty());
    }

    #[test]
    fn test_duplicate_and_unknown_variables() {
        let trigger = trigger_insert(&["id"], vec![Expression::integer(1)]);
        let block = Block::new(vec![
            Statement::Declare {
                name: "x".to_string(),
                ty: DataType::Int32,
                init: None,
            },
            Statement::Declare {
                name: "X".to_string(),
                ty: DataType::Int32,
                init: None,
            },
        ]);
        assert!(matches!(
            run(block, &trigger).unwrap_err(),
            RewriteError::DuplicateVariable(_)
        ));

        let block = Block::new(vec![Statement::Assign {
            name: "missing".to_string(),
            value: Expression::integer(1),
        }]);
        assert!(matches!(
            run(block, &trigger).unwrap_err(),
            RewriteError::UnknownVariable(_)
        ));
    }

    #[test]
    fn test_trailing_result_count_becomes_return() {
        let trigger = trigger_update(vec![("status", Expression::string("x"))], None);
        let count = Expression::integer(1);
        let block = Block::new(vec![
            Statement::Declare {
                name: RESULT_COUNT_VARIABLE.to_string(),
                ty: DataType::Int32,
                init: None,
            },
            Statement::Sql(Command::Update {
                table: TableRef::new("o_phys"),
                assignments: vec![("status".to_string(), Expression::string("x"))],
                criteria: None,
            }),
            Statement::Assign {
                name: RESULT_COUNT_VARIABLE.to_string(),
                value: count.clone(),
            },
        ]);
        let out = run(block, &trigger).unwrap();
        assert_eq!(out.statements.last(), Some(&Statement::Return(Some(count))));
    }
}
