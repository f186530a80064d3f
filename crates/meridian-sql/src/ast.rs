//! Resolved expression and criteria trees
//!
//! These are the immutable value trees the rewriter operates on. Every node
//! carries a resolved type assigned by the upstream resolver; the rewriter
//! preserves well-typedness on output. Structural equality (`PartialEq`) is
//! the identity used for duplicate elimination and fixpoint detection.

use crate::command::Command;
use meridian_common::types::{DataType, Value};
use std::fmt;

// ============================================================================
// Expressions
// ============================================================================

/// A resolved column binding: table, column name, declared type, nullability
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: String,
    pub name: String,
    pub ty: DataType,
    pub nullable: bool,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, name: impl Into<String>, ty: DataType) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Built-in aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// A scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Typed literal; NULL literals carry the type the resolver assigned
    Literal { value: Value, ty: DataType },
    /// Resolved column reference
    Column(ColumnRef),
    /// Scalar function call; arithmetic uses the canonical names
    /// `+ - * /` and concatenation `||`
    Function {
        name: String,
        args: Vec<Expression>,
        ty: DataType,
    },
    /// Explicit type conversion
    Convert {
        expr: Box<Expression>,
        target: DataType,
    },
    /// Searched CASE; simple CASE is resolved to this form upstream
    Case {
        whens: Vec<(Criteria, Expression)>,
        otherwise: Option<Box<Expression>>,
        ty: DataType,
    },
    /// Scalar subquery producing a single value
    ScalarSubquery(Box<Command>),
    /// Positional parameter reference
    Parameter { index: usize, ty: DataType },
    /// Aggregate function reference (rewritten through, never folded)
    Aggregate {
        func: AggregateFunc,
        distinct: bool,
        arg: Option<Box<Expression>>,
        ty: DataType,
    },
    /// Procedural pseudo-variable: the triggering row's value for a column.
    /// Must be resolved away by the procedural rewriter.
    InputValue { column: String, ty: DataType },
    /// Procedural pseudo-variable: whether the triggering statement assigns
    /// a column. Must be resolved away by the procedural rewriter.
    Changing { column: String },
}

impl Expression {
    pub fn literal(value: Value) -> Self {
        let ty = value.data_type();
        Expression::Literal { value, ty }
    }

    /// A typed NULL literal
    pub fn null(ty: DataType) -> Self {
        Expression::Literal {
            value: Value::Null,
            ty,
        }
    }

    pub fn integer(v: i32) -> Self {
        Expression::literal(Value::Int32(v))
    }

    pub fn string(v: impl Into<std::sync::Arc<str>>) -> Self {
        Expression::literal(Value::String(v.into()))
    }

    pub fn boolean(v: bool) -> Self {
        Expression::literal(Value::Boolean(v))
    }

    pub fn column(col: ColumnRef) -> Self {
        Expression::Column(col)
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>, ty: DataType) -> Self {
        Expression::Function {
            name: name.into(),
            args,
            ty,
        }
    }

    pub fn convert(expr: Expression, target: DataType) -> Self {
        Expression::Convert {
            expr: Box::new(expr),
            target,
        }
    }

    /// The resolved type of this expression
    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Literal { ty, .. } => ty.clone(),
            Expression::Column(c) => c.ty.clone(),
            Expression::Function { ty, .. } => ty.clone(),
            Expression::Convert { target, .. } => target.clone(),
            Expression::Case { ty, .. } => ty.clone(),
            Expression::ScalarSubquery(cmd) => cmd
                .projected_columns()
                .first()
                .map(|(_, ty)| ty.clone())
                .unwrap_or(DataType::Null),
            Expression::Parameter { ty, .. } => ty.clone(),
            Expression::Aggregate { ty, .. } => ty.clone(),
            Expression::InputValue { ty, .. } => ty.clone(),
            Expression::Changing { .. } => DataType::Boolean,
        }
    }

    /// Whether this expression is a literal constant
    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal { .. })
    }

    /// Whether this expression is the NULL literal
    pub fn is_null_literal(&self) -> bool {
        matches!(
            self,
            Expression::Literal {
                value: Value::Null,
                ..
            }
        )
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expression::Literal { value, .. } => Some(value),
            _ => None,
        }
    }
}

// ============================================================================
// Criteria
// ============================================================================

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Logical negation: `= ↔ <>`, `< ↔ >=`, `> ↔ <=`
    pub fn negated(self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    /// The operator obtained by swapping the operand sides: `< ↔ >`, `<= ↔ >=`
    pub fn mirrored(self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Le,
        }
    }

    /// Apply the operator to an ordering between two non-null values
    pub fn evaluate(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ord == Equal,
            CompareOp::Ne => ord != Equal,
            CompareOp::Lt => ord == Less,
            CompareOp::Le => ord != Greater,
            CompareOp::Gt => ord == Greater,
            CompareOp::Ge => ord != Less,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Compound criteria operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    And,
    Or,
}

/// Subquery comparison quantifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
}

/// A predicate over rows. Evaluation against any fully-bound row yields
/// exactly one of TRUE, FALSE, or UNKNOWN (three-valued logic).
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Compare {
        left: Expression,
        op: CompareOp,
        right: Expression,
    },
    Between {
        expr: Expression,
        low: Expression,
        high: Expression,
        negated: bool,
    },
    In {
        expr: Expression,
        list: Vec<Expression>,
        negated: bool,
    },
    Like {
        expr: Expression,
        pattern: Expression,
        escape: Option<char>,
        negated: bool,
    },
    IsNull {
        expr: Expression,
        negated: bool,
    },
    Compound {
        op: CompoundOp,
        parts: Vec<Criteria>,
    },
    Not(Box<Criteria>),
    /// A boolean-valued expression used directly as a predicate
    Boolean(Expression),
    Exists {
        query: Box<Command>,
        negated: bool,
    },
    SubqueryCompare {
        left: Expression,
        op: CompareOp,
        quantifier: Quantifier,
        query: Box<Command>,
    },
    /// Procedural pseudo-predicate: does the triggering statement's criteria
    /// reference the listed columns (any criteria at all when empty)?
    HasCriteria { columns: Vec<String> },
    /// Procedural pseudo-predicate: the triggering statement's criteria with
    /// column references substituted per the translation map
    TranslateCriteria {
        columns: Vec<String>,
        translations: Vec<(String, Expression)>,
    },
}

impl Criteria {
    pub fn compare(left: Expression, op: CompareOp, right: Expression) -> Self {
        Criteria::Compare { left, op, right }
    }

    pub fn and(parts: Vec<Criteria>) -> Self {
        Criteria::Compound {
            op: CompoundOp::And,
            parts,
        }
    }

    pub fn or(parts: Vec<Criteria>) -> Self {
        Criteria::Compound {
            op: CompoundOp::Or,
            parts,
        }
    }

    pub fn not(inner: Criteria) -> Self {
        Criteria::Not(Box::new(inner))
    }

    pub fn is_null(expr: Expression) -> Self {
        Criteria::IsNull {
            expr,
            negated: false,
        }
    }

    pub fn is_not_null(expr: Expression) -> Self {
        Criteria::IsNull {
            expr,
            negated: true,
        }
    }

    /// Canonical TRUE marker: `1 = 1`
    pub fn always_true() -> Self {
        Criteria::compare(Expression::integer(1), CompareOp::Eq, Expression::integer(1))
    }

    /// Canonical FALSE marker: `1 = 0`
    pub fn always_false() -> Self {
        Criteria::compare(Expression::integer(1), CompareOp::Eq, Expression::integer(0))
    }

    /// Canonical UNKNOWN marker: `NULL <> NULL`. Distinct from FALSE so that
    /// surrounding AND/OR absorb it per three-valued-logic rules.
    pub fn unknown() -> Self {
        Criteria::compare(
            Expression::null(DataType::Null),
            CompareOp::Ne,
            Expression::null(DataType::Null),
        )
    }

    /// Classify a criteria that is a constant truth value. Returns `None`
    /// for anything data-dependent.
    pub fn truth(&self) -> Option<Truth> {
        match self {
            Criteria::Compare { left, op, right } => {
                let (l, r) = (left.as_literal()?, right.as_literal()?);
                if l.is_null() || r.is_null() {
                    return Some(Truth::Unknown);
                }
                let ord = l.compare(r)?;
                Some(Truth::from(op.evaluate(ord)))
            }
            Criteria::Boolean(expr) => match expr.as_literal()? {
                Value::Null => Some(Truth::Unknown),
                Value::Boolean(b) => Some(Truth::from(*b)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Build the canonical marker for a truth value
    pub fn from_truth(truth: Truth) -> Self {
        match truth {
            Truth::True => Criteria::always_true(),
            Truth::False => Criteria::always_false(),
            Truth::Unknown => Criteria::unknown(),
        }
    }
}

// ============================================================================
// Three-valued logic
// ============================================================================

/// A three-valued-logic truth value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl From<bool> for Truth {
    fn from(b: bool) -> Self {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }
}

impl Truth {
    pub fn and(self, other: Truth) -> Truth {
        use Truth::*;
        match (self, other) {
            (False, _) | (_, False) => False,
            (True, True) => True,
            _ => Unknown,
        }
    }

    pub fn or(self, other: Truth) -> Truth {
        use Truth::*;
        match (self, other) {
            (True, _) | (_, True) => True,
            (False, False) => False,
            _ => Unknown,
        }
    }

    pub fn not(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    /// Filter semantics: a WHERE clause keeps a row only on TRUE
    pub fn accepts(self) -> bool {
        self == Truth::True
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value, .. } => write!(f, "{}", value),
            Expression::Column(c) => {
                if c.table.is_empty() {
                    write!(f, "{}", c.name)
                } else {
                    write!(f, "{}.{}", c.table, c.name)
                }
            }
            Expression::Function { name, args, .. } => {
                if args.len() == 2 && matches!(name.as_str(), "+" | "-" | "*" | "/" | "||") {
                    write!(f, "({} {} {})", args[0], name, args[1])
                } else {
                    write!(f, "{}(", name)?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ")")
                }
            }
            Expression::Convert { expr, target } => write!(f, "convert({}, {})", expr, target),
            Expression::Case {
                whens, otherwise, ..
            } => {
                write!(f, "CASE")?;
                for (when, then) in whens {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(e) = otherwise {
                    write!(f, " ELSE {}", e)?;
                }
                write!(f, " END")
            }
            Expression::ScalarSubquery(cmd) => write!(f, "({})", cmd),
            Expression::Parameter { index, .. } => write!(f, "?{}", index),
            Expression::Aggregate {
                func,
                distinct,
                arg,
                ..
            } => {
                let name = match func {
                    AggregateFunc::Count => "COUNT",
                    AggregateFunc::Sum => "SUM",
                    AggregateFunc::Avg => "AVG",
                    AggregateFunc::Min => "MIN",
                    AggregateFunc::Max => "MAX",
                };
                match arg {
                    Some(a) if *distinct => write!(f, "{}(DISTINCT {})", name, a),
                    Some(a) => write!(f, "{}({})", name, a),
                    None => write!(f, "{}(*)", name),
                }
            }
            Expression::InputValue { column, .. } => write!(f, "INPUT.{}", column),
            Expression::Changing { column } => write!(f, "CHANGING.{}", column),
        }
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criteria::Compare { left, op, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Criteria::Between {
                expr,
                low,
                high,
                negated,
            } => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                expr,
                if *negated { "NOT " } else { "" },
                low,
                high
            ),
            Criteria::In {
                expr,
                list,
                negated,
            } => {
                write!(f, "{} {}IN (", expr, if *negated { "NOT " } else { "" })?;
                for (i, e) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Criteria::Like {
                expr,
                pattern,
                escape,
                negated,
            } => {
                write!(
                    f,
                    "{} {}LIKE {}",
                    expr,
                    if *negated { "NOT " } else { "" },
                    pattern
                )?;
                if let Some(c) = escape {
                    write!(f, " ESCAPE '{}'", c)?;
                }
                Ok(())
            }
            Criteria::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Criteria::Compound { op, parts } => {
                let sep = match op {
                    CompoundOp::And => " AND ",
                    CompoundOp::Or => " OR ",
                };
                write!(f, "(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", sep)?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            Criteria::Not(inner) => write!(f, "NOT ({})", inner),
            Criteria::Boolean(expr) => write!(f, "{}", expr),
            Criteria::Exists { query, negated } => write!(
                f,
                "{}EXISTS ({})",
                if *negated { "NOT " } else { "" },
                query
            ),
            Criteria::SubqueryCompare {
                left,
                op,
                quantifier,
                query,
            } => write!(
                f,
                "{} {} {} ({})",
                left,
                op.symbol(),
                match quantifier {
                    Quantifier::Any => "ANY",
                    Quantifier::All => "ALL",
                },
                query
            ),
            Criteria::HasCriteria { columns } => {
                if columns.is_empty() {
                    write!(f, "HAS CRITERIA")
                } else {
                    write!(f, "HAS CRITERIA ON ({})", columns.join(", "))
                }
            }
            Criteria::TranslateCriteria { columns, .. } => {
                if columns.is_empty() {
                    write!(f, "TRANSLATE CRITERIA")
                } else {
                    write!(f, "TRANSLATE CRITERIA ON ({})", columns.join(", "))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_negation() {
        assert_eq!(CompareOp::Eq.negated(), CompareOp::Ne);
        assert_eq!(CompareOp::Lt.negated(), CompareOp::Ge);
        assert_eq!(CompareOp::Gt.negated(), CompareOp::Le);
        // Negation is an involution
        for op in [
            CompareOp::Eq,
            CompareOp::Ne,
            CompareOp::Lt,
            CompareOp::Le,
            CompareOp::Gt,
            CompareOp::Ge,
        ] {
            assert_eq!(op.negated().negated(), op);
            assert_eq!(op.mirrored().mirrored(), op);
        }
    }

    #[test]
    fn test_truth_markers_classify() {
        assert_eq!(Criteria::always_true().truth(), Some(Truth::True));
        assert_eq!(Criteria::always_false().truth(), Some(Truth::False));
        assert_eq!(Criteria::unknown().truth(), Some(Truth::Unknown));
    }

    #[test]
    fn test_three_valued_logic_absorption() {
        use Truth::*;
        assert_eq!(Unknown.and(False), False);
        assert_eq!(Unknown.or(True), True);
        assert_eq!(Unknown.and(True), Unknown);
        assert_eq!(Unknown.or(False), Unknown);
        assert_eq!(Unknown.not(), Unknown);
    }

    #[test]
    fn test_typed_null_literal() {
        let e = Expression::null(DataType::Int32);
        assert!(e.is_null_literal());
        assert_eq!(e.data_type(), DataType::Int32);
    }

    #[test]
    fn test_display() {
        let c = Criteria::compare(
            Expression::column(ColumnRef::new("t", "x", DataType::Int32)),
            CompareOp::Le,
            Expression::integer(5),
        );
        assert_eq!(c.to_string(), "t.x <= 5");
        assert_eq!(Criteria::unknown().to_string(), "NULL <> NULL");
    }
}
