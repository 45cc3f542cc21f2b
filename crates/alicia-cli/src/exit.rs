//! Process exit codes.

pub const CLEAN_SHUTDOWN: i32 = 0;
pub const CONFIG_ERROR: i32 = 1;
pub const BROKER_UNREACHABLE: i32 = 2;
pub const AUTH_FAILURE: i32 = 3;

pub const STARTUP_GRACE: std::time::Duration = std::time::Duration::from_secs(30);
