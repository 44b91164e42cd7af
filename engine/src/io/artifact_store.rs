//! Snapshot persistence abstraction.
//!
//! The [`ArtifactStore`] trait decouples the engine from where run state lives.
//! [`InMemoryArtifactStore`] keeps snapshots for the process lifetime; the
//! durable implementation is [`crate::io::file_store::FileArtifactStore`].

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::types::ExecutionState;

/// Keyed storage for run snapshots. Implementations must tolerate concurrent
/// writes to distinct run ids.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `state`, replacing any previous snapshot for `state.run_id`.
    async fn save_snapshot(&self, state: &ExecutionState) -> Result<()>;

    /// Return the last saved snapshot for `run_id`, or `None` if there is none.
    async fn load_snapshot(&self, run_id: &str) -> Result<Option<ExecutionState>>;

    /// Run ids that currently have a snapshot, sorted.
    async fn list_runs(&self) -> Result<Vec<String>>;
}

/// Process-lifetime store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    snapshots: RwLock<HashMap<String, ExecutionState>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save_snapshot(&self, state: &ExecutionState) -> Result<()> {
        debug!(run_id = %state.run_id, iteration = state.iteration_count, "storing snapshot in memory");
        self.snapshots
            .write()
            .await
            .insert(state.run_id.clone(), state.clone());
        Ok(())
    }

    async fn load_snapshot(&self, run_id: &str) -> Result<Option<ExecutionState>> {
        Ok(self.snapshots.read().await.get(run_id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.snapshots.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
