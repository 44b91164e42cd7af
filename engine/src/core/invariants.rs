//! Consistency checks for run state that the type system does not enforce.

use crate::core::budget::Budgets;
use crate::core::types::{ExecutionState, RunStatus, StopReason};

/// Check invariants that hold for any snapshot, without knowing the plan:
/// - `token_usage.total == input + output`
/// - `stop_reason` is set iff `status == stopped`
/// - `end_time` is set iff the status is terminal, and never precedes `start_time`
/// - `run_id` and `plan_id` are non-empty
pub fn validate_snapshot(state: &ExecutionState) -> Vec<String> {
    let mut errors = Vec::new();

    if state.run_id.is_empty() {
        errors.push("runId must not be empty".to_string());
    }
    if state.plan_id.is_empty() {
        errors.push("planId must not be empty".to_string());
    }

    let usage = state.token_usage;
    if usage.input.checked_add(usage.output) != Some(usage.total) {
        errors.push(format!(
            "tokenUsage.total {} != input {} + output {}",
            usage.total, usage.input, usage.output
        ));
    }

    match (state.status, state.stop_reason) {
        (RunStatus::Stopped, None) => errors.push("stopped run is missing stopReason".to_string()),
        (RunStatus::Stopped, Some(_)) | (_, None) => {}
        (status, Some(reason)) => errors.push(format!(
            "{} run must not carry stopReason {}",
            status.as_str(),
            reason.as_str()
        )),
    }

    match (state.status.is_terminal(), state.end_time) {
        (true, None) => errors.push(format!(
            "{} run is missing endTime",
            state.status.as_str()
        )),
        (false, Some(_)) => errors.push("running run must not have endTime".to_string()),
        (true, Some(end)) if end < state.start_time => {
            errors.push("endTime precedes startTime".to_string());
        }
        _ => {}
    }

    errors
}

/// Check the snapshot invariants plus the ones tied to a plan and its budgets:
/// - `current_step_index <= step_count`
/// - `iteration_count <= max_iterations`
/// - a `budget_exhausted` stop stays within `max_tokens`
/// - a completed run consumed every step
pub fn validate_progress(state: &ExecutionState, step_count: usize, budgets: &Budgets) -> Vec<String> {
    let mut errors = validate_snapshot(state);

    if state.current_step_index > step_count {
        errors.push(format!(
            "currentStepIndex {} exceeds step count {}",
            state.current_step_index, step_count
        ));
    }
    if state.iteration_count > budgets.max_iterations() {
        errors.push(format!(
            "iterationCount {} exceeds maxIterations {}",
            state.iteration_count,
            budgets.max_iterations()
        ));
    }
    if state.stop_reason == Some(StopReason::BudgetExhausted)
        && state.token_usage.total > budgets.max_tokens()
    {
        errors.push(format!(
            "budget_exhausted run reports {} tokens over maxTokens {}",
            state.token_usage.total,
            budgets.max_tokens()
        ));
    }
    if state.status == RunStatus::Completed && state.current_step_index != step_count {
        errors.push(format!(
            "completed run stopped at step {} of {}",
            state.current_step_index, step_count
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TokenUsage;
    use chrono::{Duration, Utc};

    fn running() -> ExecutionState {
        ExecutionState::start("run-1", "plan-1", Utc::now())
    }

    #[test]
    fn fresh_state_is_consistent() {
        assert!(validate_snapshot(&running()).is_empty());
    }

    #[test]
    fn reports_each_snapshot_violation() {
        let mut state = running();
        state.status = RunStatus::Stopped;
        state.token_usage = TokenUsage {
            input: 1,
            output: 1,
            total: 5,
        };

        let errors = validate_snapshot(&state);
        assert!(errors.iter().any(|e| e.contains("tokenUsage.total")));
        assert!(errors.iter().any(|e| e.contains("missing stopReason")));
        assert!(errors.iter().any(|e| e.contains("missing endTime")));
    }

    #[test]
    fn rejects_stop_reason_on_completed_run() {
        let mut state = running();
        state.status = RunStatus::Completed;
        state.stop_reason = Some(StopReason::Error);
        state.end_time = Some(state.start_time + Duration::milliseconds(5));

        let errors = validate_snapshot(&state);
        assert_eq!(errors, vec!["completed run must not carry stopReason error"]);
    }

    #[test]
    fn progress_checks_plan_bounds_and_budgets() {
        let budgets = Budgets::new(2, 100, None).expect("budgets");
        let mut state = running();
        state.current_step_index = 4;
        state.iteration_count = 3;
        state.status = RunStatus::Stopped;
        state.stop_reason = Some(StopReason::BudgetExhausted);
        state.token_usage = TokenUsage::new(100, 50);
        state.end_time = Some(state.start_time);

        let errors = validate_progress(&state, 3, &budgets);
        assert!(errors.iter().any(|e| e.contains("exceeds step count")));
        assert!(errors.iter().any(|e| e.contains("exceeds maxIterations")));
        assert!(errors.iter().any(|e| e.contains("over maxTokens")));
    }
}
