//! # Meridian SQL
//!
//! SQL layer for Meridian providing:
//! - Resolved command trees (expressions, criteria, commands, procedural blocks)
//! - Metadata catalog and lookup interface
//! - Scalar function registry with determinism levels
//! - Type coercion rules
//! - The statement rewriter: canonicalization, simplification, and bounded
//!   constant pre-evaluation of resolved statements before planning
//!
//! The rewriter is a pure, synchronous library: it performs local,
//! deterministic tree-to-tree transformation and never touches a data
//! source. Parsing and name/type resolution happen upstream; planning and
//! execution happen downstream.

pub mod ast;
pub mod coercion;
pub mod command;
pub mod functions;
pub mod metadata;
pub mod rewrite;

pub use ast::{
    AggregateFunc, ColumnRef, CompareOp, CompoundOp, Criteria, Expression, Quantifier, Truth,
};
pub use command::{
    Block, Command, FromClause, InsertSource, JoinKind, Limit, OrderByItem, OrderKey, Query,
    SelectItem, SetOpKind, Statement, TableRef,
};
pub use coercion::TypeCoercion;
pub use functions::{Determinism, FunctionRegistry, ScalarFunction};
pub use metadata::{Catalog, MetadataLookup};
pub use rewrite::{
    rewrite, rewrite_criteria, rewrite_expression, rewrite_procedure, RewriteContext,
};
