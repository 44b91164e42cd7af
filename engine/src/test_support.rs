//! Test-only helpers: deterministic plans, scripted providers and faulty stores.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::core::types::ExecutionState;
use crate::io::artifact_store::{ArtifactStore, InMemoryArtifactStore};
use crate::io::file_store::FileArtifactStore;
use crate::io::provider::{ModelProvider, ProviderRequest, ProviderResponse};
use crate::plan::{Plan, Step, StepInput, StepKind};

/// Create a deterministic step with derived title and prompt.
pub fn step(id: &str, kind: StepKind) -> Step {
    Step {
        id: id.to_string(),
        kind,
        title: format!("{} title", id),
        description: String::new(),
        input: StepInput {
            prompt: format!("{} prompt", id),
            ..StepInput::default()
        },
    }
}

/// Create a plan with `count` analysis steps named `step-1..=step-count`.
pub fn plan_with_steps(id: &str, count: usize) -> Plan {
    Plan {
        id: id.to_string(),
        goal: format!("{} goal", id),
        description: String::new(),
        steps: (1..=count)
            .map(|n| step(&format!("step-{n}"), StepKind::Analysis))
            .collect(),
    }
}

/// File store rooted in a fresh temp directory. Keep the `TempDir` alive for the test.
pub fn temp_file_store() -> Result<(tempfile::TempDir, FileArtifactStore)> {
    let dir = tempfile::tempdir()?;
    let store = FileArtifactStore::new(dir.path());
    Ok((dir, store))
}

/// Provider that replays a fixed queue of results, one per call.
///
/// `Ok((input, output))` yields a response with those token counts; `Err(msg)`
/// fails the call. Calls past the end of the script fail.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<(u64, u64), String>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<(u64, u64), String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn execute_step(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .map_err(|_| anyhow!("script lock poisoned"))?
            .pop_front();
        match next {
            Some(Ok((input_tokens, output_tokens))) => Ok(ProviderResponse {
                content: format!("scripted output for {}", request.step_id),
                input_tokens,
                output_tokens,
            }),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted provider exhausted")),
        }
    }
}

/// Store whose writes fail for a range of zero-based write indices.
pub struct FailingStore {
    inner: InMemoryArtifactStore,
    failing: Range<usize>,
    writes: AtomicUsize,
}

impl FailingStore {
    /// Accept `limit` writes and fail every write after that.
    pub fn after(limit: usize) -> Self {
        Self::failing(limit..usize::MAX)
    }

    /// Fail only the write at `index`.
    pub fn at(index: usize) -> Self {
        Self::failing(index..index + 1)
    }

    fn failing(failing: Range<usize>) -> Self {
        Self {
            inner: InMemoryArtifactStore::new(),
            failing,
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ArtifactStore for FailingStore {
    async fn save_snapshot(&self, state: &ExecutionState) -> Result<()> {
        if self.failing.contains(&self.writes.fetch_add(1, Ordering::SeqCst)) {
            return Err(anyhow!("disk full"));
        }
        self.inner.save_snapshot(state).await
    }

    async fn load_snapshot(&self, run_id: &str) -> Result<Option<ExecutionState>> {
        self.inner.load_snapshot(run_id).await
    }

    async fn list_runs(&self) -> Result<Vec<String>> {
        self.inner.list_runs().await
    }
}
