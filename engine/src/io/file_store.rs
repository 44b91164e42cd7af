//! Filesystem-backed artifact store: one JSON snapshot per run.
//!
//! Layout under `base_path`:
//!
//! ```text
//! runs/<run-id>/snapshot.json
//! runs/<run-id>/log.jsonl      (written by the CLI, see `execution_log`)
//! ```
//!
//! Writes go to a uniquely named temp file in the run directory and are then
//! renamed over `snapshot.json`, so a reader sees either the previous snapshot
//! or the new one, never a partial file. Distinct run ids never share a file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument};

use crate::core::invariants::validate_snapshot;
use crate::core::types::ExecutionState;
use crate::error::validate_run_id;
use crate::io::artifact_store::ArtifactStore;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Paths for one run's artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub log_path: PathBuf,
}

impl RunPaths {
    pub fn new(base_path: &Path, run_id: &str) -> Self {
        let dir = base_path.join("runs").join(run_id);
        Self {
            snapshot_path: dir.join("snapshot.json"),
            log_path: dir.join("log.jsonl"),
            dir,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    base_path: PathBuf,
}

impl FileArtifactStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Paths for `run_id`, after checking it is a safe directory name.
    pub fn run_paths(&self, run_id: &str) -> Result<RunPaths> {
        validate_run_id(run_id)?;
        Ok(RunPaths::new(&self.base_path, run_id))
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    #[instrument(skip_all, fields(run_id = %state.run_id, iteration = state.iteration_count))]
    async fn save_snapshot(&self, state: &ExecutionState) -> Result<()> {
        let paths = self.run_paths(&state.run_id)?;
        let mut buf = serde_json::to_string_pretty(state).context("serialize snapshot")?;
        buf.push('\n');
        write_atomic(&paths.snapshot_path, &buf).await?;
        debug!(path = %paths.snapshot_path.display(), "snapshot written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_snapshot(&self, run_id: &str) -> Result<Option<ExecutionState>> {
        let paths = self.run_paths(run_id)?;
        let contents = match fs::read_to_string(&paths.snapshot_path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("read snapshot {}", paths.snapshot_path.display())
                });
            }
        };
        let state: ExecutionState = serde_json::from_str(&contents)
            .with_context(|| format!("parse snapshot {}", paths.snapshot_path.display()))?;
        if state.run_id != run_id {
            return Err(anyhow!(
                "snapshot {} belongs to run '{}'",
                paths.snapshot_path.display(),
                state.run_id
            ));
        }
        let errors = validate_snapshot(&state);
        if !errors.is_empty() {
            return Err(anyhow!(
                "inconsistent snapshot {}: {}",
                paths.snapshot_path.display(),
                errors.join("; ")
            ));
        }
        Ok(Some(state))
    }

    async fn list_runs(&self) -> Result<Vec<String>> {
        let runs_dir = self.base_path.join("runs");
        let mut entries = match fs::read_dir(&runs_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", runs_dir.display()));
            }
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("read {}", runs_dir.display()))?
        {
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_run_id(&id).is_err() {
                continue;
            }
            if fs::try_exists(RunPaths::new(&self.base_path, &id).snapshot_path)
                .await
                .unwrap_or(false)
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("snapshot path missing parent {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create directory {}", parent.display()))?;
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
    fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("write temp snapshot {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err).with_context(|| format!("replace snapshot {}", path.display()));
    }
    Ok(())
}
