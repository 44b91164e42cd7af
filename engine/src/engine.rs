//! Plan execution: drives one plan to a terminal state under hard budgets.
//!
//! Each iteration checks stop conditions, calls the provider for the current
//! step, folds the outcome into a new [`ExecutionState`] and persists it. Step
//! failures are recorded and retried on the next iteration; only engine-level
//! faults (a snapshot that cannot be written, a state that breaks its
//! invariants) end a run as `failed`.
//!
//! The engine holds no per-run mutable state. Everything scoped to a run lives
//! in the [`RunContext`] passed to [`PlanExecutionEngine::execute_in`] and in
//! the state value owned by that call, so one engine can serve many runs
//! concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::core::budget::{Budgets, StopDecision, check_stop};
use crate::core::invariants::validate_progress;
use crate::core::state_update::{self, StepOutcome, apply_step_outcome};
use crate::core::types::{ExecutionState, StopReason};
use crate::error::RunFailedError;
use crate::io::artifact_store::ArtifactStore;
use crate::io::config::EngineConfig;
use crate::io::execution_log::ExecutionLogger;
use crate::io::prompt::PromptRenderer;
use crate::io::provider::{ModelProvider, ProviderRequest};
use crate::plan::Plan;

const DOMAIN: &str = "engine";

/// How the loop ended. Applied to the last running state when the run is recorded.
enum Finish {
    Complete,
    Stop(StopDecision),
}

/// Construction parameters for [`PlanExecutionEngine`].
pub struct EngineOptions {
    pub max_iterations: u32,
    pub max_tokens: u64,
    pub max_execution_time_ms: Option<u64>,
    pub model_provider: Arc<dyn ModelProvider>,
    pub artifact_store: Arc<dyn ArtifactStore>,
}

/// Cooperative cancellation flag, checked at iteration boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything scoped to one run, threaded explicitly through execution.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    repo_path: PathBuf,
    logger: Arc<ExecutionLogger>,
    cancel: CancelHandle,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, repo_path: impl Into<PathBuf>) -> Self {
        let run_id = run_id.into();
        Self {
            logger: Arc::new(ExecutionLogger::new(run_id.clone())),
            run_id,
            repo_path: repo_path.into(),
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn logger(&self) -> &Arc<ExecutionLogger> {
        &self.logger
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }
}

pub struct PlanExecutionEngine {
    budgets: Budgets,
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn ArtifactStore>,
    prompts: PromptRenderer,
}

impl PlanExecutionEngine {
    /// Build an engine, rejecting non-positive budgets before any run starts.
    pub fn new(options: EngineOptions) -> Result<Self> {
        let budgets = Budgets::new(
            options.max_iterations,
            options.max_tokens,
            options.max_execution_time_ms,
        )?;
        Ok(Self {
            budgets,
            provider: options.model_provider,
            store: options.artifact_store,
            prompts: PromptRenderer::new()?,
        })
    }

    /// Build an engine from the budgets in `cfg`.
    pub fn from_config(
        cfg: &EngineConfig,
        model_provider: Arc<dyn ModelProvider>,
        artifact_store: Arc<dyn ArtifactStore>,
    ) -> Result<Self> {
        cfg.validate()?;
        Self::new(EngineOptions {
            max_iterations: cfg.max_iterations,
            max_tokens: cfg.max_tokens,
            max_execution_time_ms: cfg.max_execution_time_ms,
            model_provider,
            artifact_store,
        })
    }

    /// Execute `plan` as run `run_id` with a fresh run context.
    pub async fn execute(
        &self,
        plan: &Plan,
        repo_path: impl AsRef<Path>,
        run_id: &str,
    ) -> Result<ExecutionState> {
        let ctx = RunContext::new(run_id, repo_path.as_ref());
        self.execute_in(plan, &ctx).await
    }

    /// Execute `plan` within `ctx` and return the finalized state.
    ///
    /// Step failures never surface as `Err`. Errors are returned for an invalid
    /// plan (before anything is persisted) and for engine-level faults, which
    /// come back as [`RunFailedError`] carrying the `failed` state.
    #[instrument(skip_all, fields(run_id = %ctx.run_id(), plan_id = %plan.id))]
    pub async fn execute_in(&self, plan: &Plan, ctx: &RunContext) -> Result<ExecutionState> {
        plan.validate()?;
        let logger = ctx.logger();
        let started = Instant::now();

        let mut state = ExecutionState::start(ctx.run_id(), &plan.id, Utc::now());
        logger.info(
            DOMAIN,
            "start",
            format!(
                "starting plan '{}' with {} steps in {}",
                plan.id,
                plan.steps.len(),
                ctx.repo_path().display()
            ),
        );
        state = self.checkpoint(state, plan, ctx).await?;

        let (last, finish) = loop {
            if state.current_step_index >= plan.steps.len() {
                break (state, Finish::Complete);
            }
            let cancelled = ctx.cancel_handle().is_cancelled();
            if let Some(decision) = check_stop(&state, &self.budgets, started.elapsed(), cancelled)
            {
                logger.warn(
                    DOMAIN,
                    "stop",
                    format!(
                        "stopping after {} iterations: {}",
                        state.iteration_count,
                        decision.reason.as_str()
                    ),
                );
                break (state, Finish::Stop(decision));
            }

            let index = state.current_step_index;
            let step_id = plan.steps[index].id.clone();
            let outcome = self.run_step(plan, index, &state, ctx).await;
            let over_budget = matches!(outcome, StepOutcome::OverBudget { .. });
            state = apply_step_outcome(state, &step_id, outcome, Utc::now());

            if over_budget {
                logger.warn(
                    DOMAIN,
                    "stop",
                    format!("step '{step_id}' would exceed the token budget"),
                );
                break (
                    state,
                    Finish::Stop(StopDecision {
                        reason: StopReason::BudgetExhausted,
                        detail: None,
                    }),
                );
            }
            state = self.checkpoint(state, plan, ctx).await?;
        };

        let finished = match finish {
            Finish::Complete => state_update::complete(last.clone(), Utc::now()),
            Finish::Stop(decision) => state_update::stop(last.clone(), decision, Utc::now()),
        };
        let finished = self.record_final(last, finished, plan, ctx).await?;
        logger.info(
            DOMAIN,
            "finish",
            format!(
                "run {} after {} iterations, step {}/{}, {} tokens",
                finished.status.as_str(),
                finished.iteration_count,
                finished.current_step_index,
                plan.steps.len(),
                finished.token_usage.total
            ),
        );
        Ok(finished)
    }

    /// Call the provider for `plan.steps[index]` and classify the result.
    async fn run_step(
        &self,
        plan: &Plan,
        index: usize,
        state: &ExecutionState,
        ctx: &RunContext,
    ) -> StepOutcome {
        let step = &plan.steps[index];
        let logger = ctx.logger();
        debug!(step_id = %step.id, iteration = state.iteration_count + 1, "running step");

        let prompt = match self.prompts.render_step(plan, index, ctx.repo_path()) {
            Ok(prompt) => prompt,
            Err(err) => {
                let message = format!("{err:#}");
                logger.warn(DOMAIN, "step", format!("step '{}' failed: {message}", step.id));
                return StepOutcome::Failed { message };
            }
        };
        let request = ProviderRequest {
            run_id: ctx.run_id().to_string(),
            plan_id: plan.id.clone(),
            step_id: step.id.clone(),
            kind: step.kind,
            prompt,
            repo_path: ctx.repo_path().to_path_buf(),
        };

        match self.provider.execute_step(&request).await {
            Ok(response) => {
                let used = response.input_tokens.saturating_add(response.output_tokens);
                if self.budgets.would_exceed_tokens(state, used) {
                    return StepOutcome::OverBudget {
                        input_tokens: response.input_tokens,
                        output_tokens: response.output_tokens,
                    };
                }
                logger.info(
                    DOMAIN,
                    "step",
                    format!(
                        "step '{}' completed ({} input, {} output tokens)",
                        step.id, response.input_tokens, response.output_tokens
                    ),
                );
                StepOutcome::Succeeded {
                    input_tokens: response.input_tokens,
                    output_tokens: response.output_tokens,
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                logger.warn(DOMAIN, "step", format!("step '{}' failed: {message}", step.id));
                StepOutcome::Failed { message }
            }
        }
    }

    /// Verify and persist a running `state`. Any fault finalizes the run as `failed`.
    async fn checkpoint(
        &self,
        state: ExecutionState,
        plan: &Plan,
        ctx: &RunContext,
    ) -> Result<ExecutionState> {
        match self.persist(&state, plan).await {
            Ok(()) => Ok(state),
            Err(reason) => Err(self.fail_run(state, reason, ctx).await.into()),
        }
    }

    /// Verify and persist the terminal state built from `last`.
    ///
    /// The terminal status only counts once it is stored. On a fault the run
    /// fails from `last`, the latest running state.
    async fn record_final(
        &self,
        last: ExecutionState,
        finished: ExecutionState,
        plan: &Plan,
        ctx: &RunContext,
    ) -> Result<ExecutionState> {
        match self.persist(&finished, plan).await {
            Ok(()) => Ok(finished),
            Err(reason) => Err(self.fail_run(last, reason, ctx).await.into()),
        }
    }

    async fn persist(&self, state: &ExecutionState, plan: &Plan) -> Result<(), String> {
        let violations = validate_progress(state, plan.steps.len(), &self.budgets);
        if !violations.is_empty() {
            return Err(format!("state invariant violated: {}", violations.join("; ")));
        }
        self.store
            .save_snapshot(state)
            .await
            .map_err(|err| format!("snapshot write failed: {err:#}"))
    }

    async fn fail_run(
        &self,
        state: ExecutionState,
        reason: String,
        ctx: &RunContext,
    ) -> RunFailedError {
        let logger = ctx.logger();
        logger.error("store", "save", reason.clone());
        let failed = state_update::fail(state, reason.clone(), Utc::now());
        // The store already failed once for this run; one more attempt records the
        // terminal status when the fault was transient.
        if let Err(err) = self.store.save_snapshot(&failed).await {
            logger.error(
                "store",
                "save",
                format!("could not record failed state: {err:#}"),
            );
        }
        RunFailedError {
            run_id: ctx.run_id().to_string(),
            reason,
            state: Box::new(failed),
        }
    }
}
