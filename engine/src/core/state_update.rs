//! Pure state transitions for one run.
//!
//! Each function consumes the previous state and returns the next one, so the
//! engine holds exactly one value per run and every snapshot it writes is a
//! complete state. Transitions on a terminal state are no-ops.

use chrono::{DateTime, Utc};

use crate::core::budget::StopDecision;
use crate::core::types::{ExecutionError, ExecutionState, RunStatus};

/// Outcome of one provider call, reduced to what the state machine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step produced content; its usage is committed and the index advances.
    Succeeded { input_tokens: u64, output_tokens: u64 },
    /// The step failed; the error is isolated and the same step runs again next iteration.
    Failed { message: String },
    /// The step succeeded but its usage would overrun the token budget.
    OverBudget { input_tokens: u64, output_tokens: u64 },
}

/// Apply one iteration's outcome for the step at `state.current_step_index`.
pub fn apply_step_outcome(
    mut state: ExecutionState,
    step_id: &str,
    outcome: StepOutcome,
    now: DateTime<Utc>,
) -> ExecutionState {
    if state.is_terminal() {
        return state;
    }
    state.iteration_count = state.iteration_count.saturating_add(1);
    match outcome {
        StepOutcome::Succeeded {
            input_tokens,
            output_tokens,
        } => {
            state.token_usage = state.token_usage.add(input_tokens, output_tokens);
            state.current_step_index += 1;
        }
        StepOutcome::Failed { message } => {
            state.errors.push(ExecutionError {
                step_id: Some(step_id.to_string()),
                message,
                timestamp: now,
                recoverable: true,
            });
        }
        StepOutcome::OverBudget {
            input_tokens,
            output_tokens,
        } => {
            state.errors.push(ExecutionError {
                step_id: Some(step_id.to_string()),
                message: format!(
                    "step usage rejected: {} tokens ({} input, {} output) would exceed the token budget",
                    input_tokens.saturating_add(output_tokens),
                    input_tokens,
                    output_tokens
                ),
                timestamp: now,
                recoverable: false,
            });
        }
    }
    state
}

/// Finalize a run that reached the end of its plan.
pub fn complete(state: ExecutionState, now: DateTime<Utc>) -> ExecutionState {
    finalize(state, RunStatus::Completed, None, now)
}

/// Finalize a run halted by a stop condition.
pub fn stop(state: ExecutionState, decision: StopDecision, now: DateTime<Utc>) -> ExecutionState {
    if state.is_terminal() {
        return state;
    }
    let mut state = state;
    if let Some(detail) = decision.detail {
        state.errors.push(ExecutionError {
            step_id: None,
            message: detail,
            timestamp: now,
            recoverable: false,
        });
    }
    state.stop_reason = Some(decision.reason);
    finalize(state, RunStatus::Stopped, None, now)
}

/// Finalize a run after an engine-level fault.
pub fn fail(state: ExecutionState, message: String, now: DateTime<Utc>) -> ExecutionState {
    finalize(state, RunStatus::Failed, Some(message), now)
}

fn finalize(
    mut state: ExecutionState,
    status: RunStatus,
    fault: Option<String>,
    now: DateTime<Utc>,
) -> ExecutionState {
    if state.is_terminal() {
        return state;
    }
    if let Some(message) = fault {
        state.errors.push(ExecutionError {
            step_id: None,
            message,
            timestamp: now,
            recoverable: false,
        });
    }
    state.status = status;
    state.end_time = Some(now);
    state
}
