//! Budgeted plan execution engine.
//!
//! Drives an ordered plan of steps to a terminal state under hard limits on
//! iterations, token spend and wall-clock time, persisting a complete snapshot
//! of run state after every iteration. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (stop conditions, state
//!   transitions, invariants). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (artifact stores, model
//!   providers, execution logs, config and plan files). Traits at the seams so
//!   tests can substitute scripted implementations.
//!
//! [`engine`] coordinates core logic with I/O; the `plan-engine` binary wraps
//! it in a CLI.

pub mod core;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
