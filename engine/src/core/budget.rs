//! Stop-condition evaluation at iteration boundaries.

use std::time::Duration;

use crate::core::types::{ExecutionState, StopReason};
use crate::error::ConfigError;

/// Hard limits for one run. Construct through [`Budgets::new`] so zero budgets are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    max_iterations: u32,
    max_tokens: u64,
    max_execution_time: Option<Duration>,
}

impl Budgets {
    pub fn new(
        max_iterations: u32,
        max_tokens: u64,
        max_execution_time_ms: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if max_iterations == 0 {
            return Err(ConfigError::ZeroMaxIterations);
        }
        if max_tokens == 0 {
            return Err(ConfigError::ZeroMaxTokens);
        }
        if max_execution_time_ms == Some(0) {
            return Err(ConfigError::ZeroExecutionTime);
        }
        Ok(Self {
            max_iterations,
            max_tokens,
            max_execution_time: max_execution_time_ms.map(Duration::from_millis),
        })
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn max_tokens(&self) -> u64 {
        self.max_tokens
    }

    pub fn max_execution_time(&self) -> Option<Duration> {
        self.max_execution_time
    }

    /// Whether committing `additional` tokens would take the run past `max_tokens`.
    pub fn would_exceed_tokens(&self, state: &ExecutionState, additional: u64) -> bool {
        state.token_usage.total.saturating_add(additional) > self.max_tokens
    }
}

/// Why the loop must halt before calling the provider again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopDecision {
    pub reason: StopReason,
    /// Extra context recorded as a non-recoverable error, when the reason needs one.
    pub detail: Option<String>,
}

/// Evaluate stop conditions in fixed order: iterations, tokens, wall clock, cancellation.
///
/// Returns `None` when another iteration may run.
pub fn check_stop(
    state: &ExecutionState,
    budgets: &Budgets,
    elapsed: Duration,
    cancelled: bool,
) -> Option<StopDecision> {
    if state.iteration_count >= budgets.max_iterations {
        return Some(StopDecision {
            reason: StopReason::MaxIterations,
            detail: None,
        });
    }
    if state.token_usage.total >= budgets.max_tokens {
        return Some(StopDecision {
            reason: StopReason::BudgetExhausted,
            detail: None,
        });
    }
    let timed_out = budgets
        .max_execution_time
        .filter(|limit| elapsed > *limit);
    if let Some(limit) = timed_out {
        return Some(StopDecision {
            reason: StopReason::Error,
            detail: Some(format!(
                "execution time limit exceeded: {}ms elapsed, limit {}ms",
                elapsed.as_millis(),
                limit.as_millis()
            )),
        });
    }
    if cancelled {
        return Some(StopDecision {
            reason: StopReason::Cancelled,
            detail: Some("run cancelled".to_string()),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TokenUsage;
    use chrono::Utc;

    fn state() -> ExecutionState {
        ExecutionState::start("run-1", "plan-1", Utc::now())
    }

    #[test]
    fn zero_budgets_are_rejected() {
        assert_eq!(Budgets::new(0, 10, None), Err(ConfigError::ZeroMaxIterations));
        assert_eq!(Budgets::new(1, 0, None), Err(ConfigError::ZeroMaxTokens));
        assert_eq!(
            Budgets::new(1, 1, Some(0)),
            Err(ConfigError::ZeroExecutionTime)
        );
    }

    #[test]
    fn fresh_state_may_continue() {
        let budgets = Budgets::new(3, 100, Some(1_000)).expect("budgets");
        assert_eq!(
            check_stop(&state(), &budgets, Duration::from_millis(5), false),
            None
        );
    }

    #[test]
    fn iteration_cap_wins_over_other_reasons() {
        let budgets = Budgets::new(1, 10, Some(1)).expect("budgets");
        let mut s = state();
        s.iteration_count = 1;
        s.token_usage = TokenUsage::new(10, 0);
        let decision = check_stop(&s, &budgets, Duration::from_secs(5), true).expect("stop");
        assert_eq!(decision.reason, StopReason::MaxIterations);
    }

    #[test]
    fn token_budget_is_inclusive() {
        let budgets = Budgets::new(10, 150, None).expect("budgets");
        let mut s = state();
        s.token_usage = TokenUsage::new(100, 50);
        let decision = check_stop(&s, &budgets, Duration::ZERO, false).expect("stop");
        assert_eq!(decision.reason, StopReason::BudgetExhausted);
        assert!(decision.detail.is_none());
    }

    #[test]
    fn timeout_maps_to_error_reason() {
        let budgets = Budgets::new(10, 150, Some(10)).expect("budgets");
        let decision =
            check_stop(&state(), &budgets, Duration::from_millis(11), false).expect("stop");
        assert_eq!(decision.reason, StopReason::Error);
        assert!(
            decision
                .detail
                .expect("detail")
                .contains("execution time limit exceeded")
        );
    }

    #[test]
    fn elapsed_equal_to_limit_does_not_stop() {
        let budgets = Budgets::new(10, 150, Some(10)).expect("budgets");
        assert_eq!(
            check_stop(&state(), &budgets, Duration::from_millis(10), false),
            None
        );
    }

    #[test]
    fn cancellation_is_checked_last() {
        let budgets = Budgets::new(10, 150, None).expect("budgets");
        let decision = check_stop(&state(), &budgets, Duration::ZERO, true).expect("stop");
        assert_eq!(decision.reason, StopReason::Cancelled);
    }

    #[test]
    fn would_exceed_tokens_compares_against_total() {
        let budgets = Budgets::new(10, 150, None).expect("budgets");
        let mut s = state();
        s.token_usage = TokenUsage::new(100, 0);
        assert!(!budgets.would_exceed_tokens(&s, 50));
        assert!(budgets.would_exceed_tokens(&s, 51));
    }
}
