//! Process exit codes.
//! Row failures are reported in the run report and do not change the exit code.

pub const SUCCESS: i32 = 0;
pub const RUN_FAILED: i32 = 1; // Fatal error during the batch
pub const CONFIG_ERROR: i32 = 2; // Missing or invalid configuration
