//! Model provider abstraction for step execution.
//!
//! The [`ModelProvider`] trait decouples the engine from whatever backend
//! actually produces step results (an LLM, a tool runner). The engine depends
//! only on the request/response contract below. [`LocalMockAdapter`] is the
//! deterministic in-process implementation used by the CLI and tests.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::io::config::MockProviderConfig;
use crate::plan::StepKind;

/// Everything a provider gets to see about one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub run_id: String,
    pub plan_id: String,
    pub step_id: String,
    pub kind: StepKind,
    /// Rendered prompt (plan goal, step, repository).
    pub prompt: String,
    pub repo_path: PathBuf,
}

/// Produced content plus token accounting for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Abstraction over step execution backends.
///
/// An `Err` is treated as a step-scoped failure: the engine records it and
/// keeps the run going.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn execute_step(&self, request: &ProviderRequest) -> Result<ProviderResponse>;
}

/// Deterministic provider: fixed content and token counts, optional latency,
/// and a set of step ids that always fail.
#[derive(Debug, Clone)]
pub struct LocalMockAdapter {
    content: String,
    input_tokens: u64,
    output_tokens: u64,
    latency: Duration,
    failing_steps: BTreeSet<String>,
}

impl LocalMockAdapter {
    pub fn new(content: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            content: content.into(),
            input_tokens,
            output_tokens,
            latency: Duration::ZERO,
            failing_steps: BTreeSet::new(),
        }
    }

    pub fn from_config(cfg: &MockProviderConfig) -> Self {
        Self::new(cfg.content.clone(), cfg.input_tokens, cfg.output_tokens)
            .with_latency(Duration::from_millis(cfg.latency_ms))
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every call for `step_id` fail.
    pub fn failing_on(mut self, step_id: impl Into<String>) -> Self {
        self.failing_steps.insert(step_id.into());
        self
    }
}

impl Default for LocalMockAdapter {
    fn default() -> Self {
        Self::from_config(&MockProviderConfig::default())
    }
}

#[async_trait]
impl ModelProvider for LocalMockAdapter {
    #[instrument(skip_all, fields(step_id = %request.step_id, kind = request.kind.as_str()))]
    async fn execute_step(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing_steps.contains(&request.step_id) {
            debug!("mock provider configured to fail");
            return Err(anyhow!("mock provider failure for step '{}'", request.step_id));
        }
        Ok(ProviderResponse {
            content: format!("{} [{}:{}]", self.content, request.plan_id, request.step_id),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        })
    }
}
