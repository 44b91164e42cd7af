//! Stable exit codes for `plan-engine` commands.

use crate::core::types::RunStatus;

/// Command succeeded or the run completed.
pub const OK: i32 = 0;
/// Invalid plan/config/run id, storage errors, or other command failures.
pub const INVALID: i32 = 1;
/// The run stopped on a budget, timeout or cancellation.
pub const STOPPED: i32 = 2;
/// The run ended `failed` (engine-level fault).
pub const FAILED: i32 = 3;

/// Exit code reported for a finished run.
pub fn for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Completed => OK,
        RunStatus::Stopped => STOPPED,
        RunStatus::Failed => FAILED,
        RunStatus::Running => INVALID,
    }
}
