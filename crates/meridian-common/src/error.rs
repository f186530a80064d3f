//! Error types for Meridian

use thiserror::Error;

/// Result type alias defaulting to Meridian's Error type
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for Meridian
#[derive(Error, Debug)]
pub enum Error {
    // Rewrite errors
    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    // Constant evaluation errors
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    // Metadata resolution errors
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    // Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors raised while evaluating a constant sub-expression at rewrite time.
///
/// These are hard failures: a constant sub-expression that cannot evaluate
/// means the original statement can never execute, so the whole rewrite
/// fails with the cause.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Numeric overflow")]
    NumericOverflow,

    #[error("Cannot convert value of type {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("Cannot parse '{value}' as {target}")]
    BadParse { value: String, target: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function '{name}' failed: {reason}")]
    FunctionFailed { name: String, reason: String },

    #[error("Parameter {0} is not bound to a value")]
    UnboundParameter(usize),
}

/// Errors raised by the statement rewriter.
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// A procedural WHILE loop whose condition is provably always true and
    /// whose body contains no exit. Aborts rewriting of the whole block.
    #[error("Infinite loop detected: {0}")]
    InfiniteLoop(String),

    #[error("Duplicate variable declaration: {0}")]
    DuplicateVariable(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown INTO target: {0}")]
    UnknownTarget(String),
}

/// Errors raised during metadata lookup.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Ambiguous column: {0}")]
    AmbiguousColumn(String),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Return a PostgreSQL-compatible SQLSTATE code for this error.
    ///
    /// Codes follow the PostgreSQL convention:
    /// <https://www.postgresql.org/docs/current/errcodes-appendix.html>
    pub fn sqlstate(&self) -> &'static str {
        match self {
            Error::Rewrite(re) => match re {
                RewriteError::Eval(ee) => eval_sqlstate(ee),
                RewriteError::InfiniteLoop(_) => "54001", // statement_too_complex
                RewriteError::DuplicateVariable(_) => "42710", // duplicate_object
                RewriteError::UnknownVariable(_) => "42704",   // undefined_object
                RewriteError::UnknownTarget(_) => "42P01",     // undefined_table
            },
            Error::Eval(ee) => eval_sqlstate(ee),
            Error::Metadata(me) => match me {
                MetadataError::TableNotFound(_) => "42P01", // undefined_table
                MetadataError::ColumnNotFound(_) => "42703", // undefined_column
                MetadataError::AmbiguousColumn(_) => "42702", // ambiguous_column
            },
            Error::Config(_) => "F0000",          // config_file_error
            Error::Internal(_) => "XX000",        // internal_error
            Error::InvalidArgument(_) => "22023", // invalid_parameter_value
        }
    }

    /// Return the PostgreSQL-compatible error severity.
    pub fn severity(&self) -> &'static str {
        match self {
            Error::Rewrite(RewriteError::InfiniteLoop(_)) => "FATAL",
            Error::Internal(_) => "ERROR",
            _ => "ERROR",
        }
    }
}

fn eval_sqlstate(err: &EvalError) -> &'static str {
    match err {
        EvalError::DivisionByZero => "22012",     // division_by_zero
        EvalError::NumericOverflow => "22003",    // numeric_value_out_of_range
        EvalError::InvalidCast { .. } => "42846", // cannot_coerce
        EvalError::BadParse { .. } => "22P02",    // invalid_text_representation
        EvalError::UnknownFunction(_) => "42883", // undefined_function
        EvalError::FunctionFailed { .. } => "39000", // external_routine_invocation
        EvalError::UnboundParameter(_) => "22023", // invalid_parameter_value
    }
}
