//! Statement rewriting
//!
//! A semantics-preserving canonicalization and simplification pass that runs
//! after resolution and before planning. The rewriter normalizes equivalent
//! formulations into canonical shapes, simplifies what can be decided
//! statically, and pre-evaluates constant sub-expressions, so that later
//! stages match against far fewer tree shapes.
//!
//! Unsupported shapes are left unchanged; an evaluation failure inside a
//! constant sub-expression fails the whole rewrite, since the statement
//! could never have executed successfully.

mod command;
mod criteria;
mod evaluator;
mod expression;
mod procedural;

use crate::ast::{Criteria, Expression};
use crate::command::{Block, Command};
use crate::functions::{Determinism, FunctionRegistry};
use crate::metadata::MetadataLookup;
use meridian_common::config::RewriteConfig;
use meridian_common::error::RewriteError;
use meridian_common::prelude::*;
use std::cell::Cell;
use std::collections::HashMap;

/// Session- and command-scoped state consulted during a rewrite
#[derive(Debug, Clone, Default)]
pub struct RewriteContext {
    /// Lowest determinism level that may be folded in this rewrite
    pub phase: Option<Determinism>,
    /// Values for zero-argument session/command functions
    /// (`current_user`, `session_id`, `now`)
    pub bindings: HashMap<String, Value>,
    /// Bound parameter values; empty when parameters are late-bound
    pub parameters: Vec<Value>,
    pub config: RewriteConfig,
}

impl RewriteContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, function: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(function.into().to_lowercase(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Rewrite a resolved command to its canonical simplified form
pub fn rewrite(
    command: Command,
    metadata: &dyn MetadataLookup,
    registry: &FunctionRegistry,
    context: Option<&RewriteContext>,
) -> Result<Command, RewriteError> {
    let rewriter = Rewriter::new(metadata, registry, context);
    debug!(command = %command, "rewriting command");
    let out = rewriter.rewrite_command(command)?;
    debug!(command = %out, "rewrite complete");
    Ok(out)
}

/// Rewrite a criteria in isolation
pub fn rewrite_criteria(
    criteria: Criteria,
    metadata: &dyn MetadataLookup,
    registry: &FunctionRegistry,
    context: Option<&RewriteContext>,
) -> Result<Criteria, RewriteError> {
    Rewriter::new(metadata, registry, context).rewrite_criteria(criteria)
}

/// Rewrite an expression in isolation
pub fn rewrite_expression(
    expression: Expression,
    metadata: &dyn MetadataLookup,
    registry: &FunctionRegistry,
    context: Option<&RewriteContext>,
) -> Result<Expression, RewriteError> {
    Rewriter::new(metadata, registry, context).rewrite_expression(expression)
}

/// Rewrite a procedural block against the INSERT, UPDATE, or DELETE that
/// triggers it. Pseudo-variables and pseudo-predicates are resolved against
/// the trigger before ordinary rewriting.
pub fn rewrite_procedure(
    block: Block,
    trigger: &Command,
    metadata: &dyn MetadataLookup,
    registry: &FunctionRegistry,
    context: Option<&RewriteContext>,
) -> Result<Block, RewriteError> {
    Rewriter::new(metadata, registry, context).rewrite_procedure(block, trigger)
}

/// One rewrite invocation. Holds the read-only collaborators plus the
/// rewrite-local synthetic alias counter, so concurrent rewrites never
/// contend.
pub(crate) struct Rewriter<'a> {
    pub(crate) metadata: &'a dyn MetadataLookup,
    pub(crate) registry: &'a FunctionRegistry,
    pub(crate) context: Option<&'a RewriteContext>,
    pub(crate) config: RewriteConfig,
    alias_counter: Cell<usize>,
}

impl<'a> Rewriter<'a> {
    pub(crate) fn new(
        metadata: &'a dyn MetadataLookup,
        registry: &'a FunctionRegistry,
        context: Option<&'a RewriteContext>,
    ) -> Self {
        let config = context.map(|c| c.config.clone()).unwrap_or_default();
        Self {
            metadata,
            registry,
            context,
            config,
            alias_counter: Cell::new(0),
        }
    }

    /// The lowest determinism level foldable in this rewrite
    pub(crate) fn phase(&self) -> Determinism {
        self.context
            .and_then(|c| c.phase)
            .unwrap_or(Determinism::Deterministic)
    }

    /// Next synthetic alias with the given prefix, unique within this rewrite
    pub(crate) fn next_alias(&self, prefix: &str) -> String {
        let n = self.alias_counter.get() + 1;
        self.alias_counter.set(n);
        format!("{}_{}", prefix, n)
    }

    /// Whether an expression can evaluate to NULL. Columns defer to the
    /// catalog when it knows the table, otherwise to the resolver's flag.
    /// Conservative: anything unrecognized is assumed nullable.
    pub(crate) fn is_nullable(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Literal { value, .. } => value.is_null(),
            Expression::Column(c) => self
                .metadata
                .is_nullable(&c.table, &c.name)
                .unwrap_or(c.nullable),
            Expression::Convert { expr, .. } => self.is_nullable(expr),
            Expression::Function { name, args, .. } => {
                if self.registry.preserves_null(name) {
                    args.iter().any(|a| self.is_nullable(a))
                } else {
                    true
                }
            }
            _ => true,
        }
    }
}
