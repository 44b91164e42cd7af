//! Run state types shared by the engine, the stores and the CLI.
//!
//! `ExecutionState` is the snapshot unit: it serializes with the camelCase
//! field names consumers poll for, and `stopReason`/`endTime` are written as
//! `null` rather than omitted so every snapshot has the same shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of one run. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::Failed => "failed",
        }
    }
}

/// Why a run halted before natural completion.
///
/// Wall-clock timeouts surface as `Error`; there is no dedicated timeout reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIterations,
    BudgetExhausted,
    Error,
    Cancelled,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::MaxIterations => "max_iterations",
            StopReason::BudgetExhausted => "budget_exhausted",
            StopReason::Error => "error",
            StopReason::Cancelled => "cancelled",
        }
    }
}

/// Cumulative token accounting. `total` is always `input + output`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input.saturating_add(output),
        }
    }

    /// Usage after adding one step's report.
    pub fn add(self, input: u64, output: u64) -> Self {
        Self::new(
            self.input.saturating_add(input),
            self.output.saturating_add(output),
        )
    }
}

/// One recorded failure. Errors are appended and never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub step_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// `true` for isolated step failures the run continues past.
    pub recoverable: bool,
}

/// Complete state of one run, persisted after every iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub run_id: String,
    pub plan_id: String,
    pub status: RunStatus,
    pub stop_reason: Option<StopReason>,
    pub current_step_index: usize,
    pub iteration_count: u32,
    pub token_usage: TokenUsage,
    pub errors: Vec<ExecutionError>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ExecutionState {
    /// Fresh running state for `run_id`, before any iteration.
    pub fn start(run_id: &str, plan_id: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.to_string(),
            plan_id: plan_id.to_string(),
            status: RunStatus::Running,
            stop_reason: None,
            current_step_index: 0,
            iteration_count: 0,
            token_usage: TokenUsage::default(),
            errors: Vec::new(),
            start_time,
            end_time: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
