//! # Meridian Common
//!
//! Common types, errors, and utilities shared across all Meridian crates.

pub mod config;
pub mod error;
pub mod testing;
pub mod types;

pub use config::*;
pub use error::{Error, Result};
pub use types::*;

/// Re-export commonly used external types
pub mod prelude {
    pub use super::config::*;
    pub use super::error::{Error, EvalError, Result, RewriteError};
    pub use super::types::*;
    pub use tracing::{debug, error, info, trace, warn};
}
