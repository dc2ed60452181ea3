//! Default configuration values shared by the watcher and its binary

/// Long-poll wait for each ReceiveMessage call, in seconds
pub const RECEIVE_WAIT_TIME_SECS: i32 = 20;

/// Messages fetched per ReceiveMessage call
pub const RECEIVE_BATCH_SIZE: i32 = 1;

/// Seconds before lease expiry at which the visibility timeout is renewed
pub const RENEWAL_MARGIN_SECS: u64 = 10;

/// Visibility timeouts below this use half the timeout as renewal interval
pub const SHORT_VISIBILITY_TIMEOUT_SECS: u64 = 10;

/// Exit code a hook command uses to request ABANDON
pub const DEFAULT_ABANDON_EXIT_CODE: i32 = 100;

/// Environment variable prefix for event fields passed to hook commands
pub const HOOK_ENV_PREFIX: &str = "LIFECYCLE_";

