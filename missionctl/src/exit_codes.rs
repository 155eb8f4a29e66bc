//! Stable exit codes for missionctl commands.

/// Mission completed (every step done or skipped), or the command succeeded.
pub const OK: i32 = 0;
/// Invalid usage, config, mission id, or target mismatch.
pub const INVALID: i32 = 1;
/// A step failed and the mission was aborted.
pub const STEP_FAILED: i32 = 2;
/// Mission state could not be read or written.
pub const STORAGE: i32 = 3;
