//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! run state and return deterministic outputs suitable for tests.

pub mod budget;
pub mod invariants;
pub mod state_update;
pub mod types;
