//! Side-effecting collaborators of the engine: storage, providers, logs, config.

pub mod artifact_store;
pub mod config;
pub mod execution_log;
pub mod file_store;
pub mod plan_store;
pub mod prompt;
pub mod provider;
