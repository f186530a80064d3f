//! Configuration types for Meridian

use serde::{Deserialize, Serialize};

/// Configuration for the statement rewriter.
///
/// The rewriter is stateless; this struct only bounds the work a single
/// rewrite invocation may perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Maximum number of rows a constant scalar-subquery pre-evaluation may
    /// materialize before the subquery is left unrewritten and deferred to
    /// execution time.
    #[serde(default = "default_max_preevaluation_rows")]
    pub max_preevaluation_rows: usize,

    /// Upper bound on simplification passes at a single criteria node. The
    /// fixpoint loop is already bounded by tree size; this is a hard cap.
    #[serde(default = "default_max_fixpoint_passes")]
    pub max_fixpoint_passes: usize,

    /// Whether session-deterministic functions (e.g. session_id) may be
    /// folded using values from the rewrite context.
    #[serde(default = "default_fold_session_functions")]
    pub fold_session_functions: bool,
}

fn default_max_preevaluation_rows() -> usize {
    1024
}

fn default_max_fixpoint_passes() -> usize {
    64
}

fn default_fold_session_functions() -> bool {
    true
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_preevaluation_rows: default_max_preevaluation_rows(),
            max_fixpoint_passes: default_max_fixpoint_passes(),
            fold_session_functions: default_fold_session_functions(),
        }
    }
}
