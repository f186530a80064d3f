//! Resolved command trees: queries, set operations, DML, procedural blocks
//!
//! Commands arrive from the upstream resolver fully bound: every column
//! reference carries its type and nullability, every select item its
//! resolved expression. The rewriter transforms these trees in place of a
//! mutable visitor by rebuilding them.

use crate::ast::{Criteria, Expression};
use meridian_common::types::DataType;
use std::fmt;

/// A resolved table reference
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// The name this table is known by within the query
    pub fn binding_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Join kinds. `UnionJoin` exists only on input; the rewriter lowers it to
/// a full outer join over a false condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    Cross,
    UnionJoin,
}

/// A FROM-clause source
#[derive(Debug, Clone, PartialEq)]
pub enum FromClause {
    Table(TableRef),
    InlineView { query: Box<Command>, alias: String },
    Join {
        kind: JoinKind,
        left: Box<FromClause>,
        right: Box<FromClause>,
        on: Option<Criteria>,
    },
}

/// One projected column: expression plus optional alias
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expression,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expression) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expression, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// The output column name: the alias when present, the column name for a
    /// bare column reference, or a positional `expr_<n>` fallback.
    pub fn output_name(&self, index: usize) -> String {
        if let Some(a) = &self.alias {
            return a.clone();
        }
        if let Expression::Column(c) = &self.expr {
            return c.name.clone();
        }
        format!("expr_{}", index + 1)
    }
}

/// A sort key: ordinal and name keys are resolved to expressions by the
/// rewriter
#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
    /// 1-based position into the select list
    Ordinal(usize),
    /// Output column name
    Name(String),
    Expr(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub key: OrderKey,
    pub ascending: bool,
}

impl OrderByItem {
    pub fn asc(key: OrderKey) -> Self {
        Self {
            key,
            ascending: true,
        }
    }

    pub fn desc(key: OrderKey) -> Self {
        Self {
            key,
            ascending: false,
        }
    }
}

/// Row limit and offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub count: Option<u64>,
    pub offset: Option<u64>,
}

impl Limit {
    pub fn rows(count: u64) -> Self {
        Self {
            count: Some(count),
            offset: None,
        }
    }
}

/// Set operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Except,
    Intersect,
}

/// The source of inserted rows
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expression>>),
    Query(Box<Command>),
}

/// A resolved SELECT
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub distinct: bool,
    pub select: Vec<SelectItem>,
    pub from: Vec<FromClause>,
    pub where_clause: Option<Criteria>,
    pub group_by: Vec<Expression>,
    pub having: Option<Criteria>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
    /// SELECT INTO target; lowered to INSERT by the rewriter
    pub into: Option<String>,
}

impl Query {
    /// A FROM-less projection of the given items
    pub fn projection(select: Vec<SelectItem>) -> Self {
        Self {
            distinct: false,
            select,
            from: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            into: None,
        }
    }

    pub fn from_table(table: TableRef, select: Vec<SelectItem>) -> Self {
        let mut q = Query::projection(select);
        q.from = vec![FromClause::Table(table)];
        q
    }

    /// Whether this query uses aggregation (GROUP BY, HAVING, or an
    /// aggregate select item)
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self.having.is_some()
            || self
                .select
                .iter()
                .any(|item| matches!(item.expr, Expression::Aggregate { .. }))
    }
}

/// A rewritable command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Query(Query),
    SetOp {
        op: SetOpKind,
        all: bool,
        left: Box<Command>,
        right: Box<Command>,
        order_by: Vec<OrderByItem>,
    },
    Insert {
        table: TableRef,
        columns: Vec<String>,
        source: InsertSource,
    },
    Update {
        table: TableRef,
        assignments: Vec<(String, Expression)>,
        criteria: Option<Criteria>,
    },
    Delete {
        table: TableRef,
        criteria: Option<Criteria>,
    },
    Block(Block),
}

impl Command {
    /// The stable output projection of this command: column names and types.
    /// Set operations take names from the left branch. DML and blocks
    /// project nothing.
    pub fn projected_columns(&self) -> Vec<(String, DataType)> {
        match self {
            Command::Query(q) => q
                .select
                .iter()
                .enumerate()
                .map(|(i, item)| (item.output_name(i), item.expr.data_type()))
                .collect(),
            Command::SetOp { left, .. } => left.projected_columns(),
            _ => Vec::new(),
        }
    }

    pub fn as_query(&self) -> Option<&Query> {
        match self {
            Command::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_query_mut(&mut self) -> Option<&mut Query> {
        match self {
            Command::Query(q) => Some(q),
            _ => None,
        }
    }
}

// ============================================================================
// Procedural blocks
// ============================================================================

/// A procedural block: an ordered statement list. Variable declarations are
/// statements so that scoping follows statement order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    /// Whether any statement in this block, recursively, is `Break`.
    /// Nested loops capture their own breaks.
    pub fn contains_break(&self) -> bool {
        self.statements.iter().any(|s| match s {
            Statement::Break => true,
            Statement::If {
                then_block,
                else_block,
                ..
            } => {
                then_block.contains_break()
                    || else_block.as_ref().is_some_and(|b| b.contains_break())
            }
            // A break inside a nested while exits that loop, not this block
            Statement::While { .. } => false,
            _ => false,
        })
    }
}

/// A procedural statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Declare {
        name: String,
        ty: DataType,
        init: Option<Expression>,
    },
    Assign {
        name: String,
        value: Expression,
    },
    If {
        condition: Criteria,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        condition: Criteria,
        body: Block,
    },
    Break,
    Continue,
    Sql(Command),
    Return(Option<Expression>),
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Query(q) => write!(f, "{}", q),
            Command::SetOp {
                op,
                all,
                left,
                right,
                ..
            } => {
                let name = match op {
                    SetOpKind::Union => "UNION",
                    SetOpKind::Except => "EXCEPT",
                    SetOpKind::Intersect => "INTERSECT",
                };
                write!(
                    f,
                    "{} {}{} {}",
                    left,
                    name,
                    if *all { " ALL" } else { "" },
                    right
                )
            }
            Command::Insert { table, columns, .. } => {
                write!(f, "INSERT INTO {} ({})", table.name, columns.join(", "))
            }
            Command::Update { table, .. } => write!(f, "UPDATE {}", table.name),
            Command::Delete { table, .. } => write!(f, "DELETE FROM {}", table.name),
            Command::Block(_) => write!(f, "BEGIN ... END"),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        for (i, item) in self.select.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item.expr)?;
            if let Some(a) = &item.alias {
                write!(f, " AS {}", a)?;
            }
        }
        if !self.from.is_empty() {
            write!(f, " FROM ")?;
            for (i, src) in self.from.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", src)?;
            }
        }
        if let Some(w) = &self.where_clause {
            write!(f, " WHERE {}", w)?;
        }
        if let Some(limit) = &self.limit {
            if let Some(n) = limit.count {
                write!(f, " LIMIT {}", n)?;
            }
            if let Some(n) = limit.offset {
                write!(f, " OFFSET {}", n)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for FromClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FromClause::Table(t) => match &t.alias {
                Some(a) => write!(f, "{} AS {}", t.name, a),
                None => write!(f, "{}", t.name),
            },
            FromClause::InlineView { query, alias } => write!(f, "({}) AS {}", query, alias),
            FromClause::Join {
                kind,
                left,
                right,
                on,
            } => {
                let kw = match kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::LeftOuter => "LEFT OUTER JOIN",
                    JoinKind::RightOuter => "RIGHT OUTER JOIN",
                    JoinKind::FullOuter => "FULL OUTER JOIN",
                    JoinKind::Cross => "CROSS JOIN",
                    JoinKind::UnionJoin => "UNION JOIN",
                };
                write!(f, "{} {} {}", left, kw, right)?;
                if let Some(c) = on {
                    write!(f, " ON {}", c)?;
                }
                Ok(())
            }
        }
    }
}
