//! Typed errors callers may want to branch on via `anyhow::Error::downcast_ref`.
//!
//! Everything else in the crate propagates plain `anyhow::Error` with context.

use thiserror::Error;

use crate::core::types::ExecutionState;

/// Rejected engine or config-file budgets. Raised before any step runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iterations must be > 0")]
    ZeroMaxIterations,
    #[error("max_tokens must be > 0")]
    ZeroMaxTokens,
    #[error("max_execution_time_ms must be > 0 when set")]
    ZeroExecutionTime,
    #[error("store.base_path must not be empty")]
    EmptyStorePath,
}

/// A plan that cannot be executed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan id must not be empty")]
    MissingId,
    #[error("plan '{plan_id}' has no steps")]
    NoSteps { plan_id: String },
    #[error("plan '{plan_id}' has a step with an empty id")]
    EmptyStepId { plan_id: String },
    #[error("plan '{plan_id}' has duplicate step id '{step_id}'")]
    DuplicateStepId { plan_id: String, step_id: String },
}

/// An engine-level fault (snapshot write failure, inconsistent state) finalized the run as `failed`.
///
/// Carries the failed state so the caller can still report what happened.
#[derive(Debug, Error)]
#[error("run '{run_id}' failed: {reason}")]
pub struct RunFailedError {
    pub run_id: String,
    pub reason: String,
    pub state: Box<ExecutionState>,
}

/// Run ids double as directory names in the file store.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid run id '{run_id}': {reason}")]
pub struct InvalidRunIdError {
    pub run_id: String,
    pub reason: &'static str,
}

/// Validate that `run_id` is safe to use as a single path component.
pub fn validate_run_id(run_id: &str) -> Result<(), InvalidRunIdError> {
    let reject = |reason| {
        Err(InvalidRunIdError {
            run_id: run_id.to_string(),
            reason,
        })
    };
    if run_id.is_empty() {
        return reject("must not be empty");
    }
    if run_id == "." || run_id == ".." {
        return reject("must not be a relative directory name");
    }
    if !run_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return reject("allowed characters are [A-Za-z0-9._-]");
    }
    Ok(())
}
