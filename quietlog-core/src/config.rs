use std::sync::LazyLock;

use derive_from_env::FromEnv;

#[derive(FromEnv)]
#[from_env(prefix = "QUIETLOG")]
#[allow(non_snake_case)]
pub struct QuietLogConfig {
    /// Messages the work queue holds before new ones are dropped.
    #[from_env(default = "1000")]
    pub QUEUE_LIMIT: usize,
    /// Number of leading message bytes hashed to detect repeats.
    #[from_env(default = "36")]
    pub MESSAGE_PREFIX_LENGTH: usize,
    #[from_env(default = "40")]
    pub RECENT_MESSAGE_COUNT: usize,
    #[from_env(default = "8")]
    pub PRINTED_REPEAT_COUNT: u32,
    #[from_env(default = "1000")]
    pub MAX_DEFERRABLE_DETECTION_TIME_MS: u64,
    #[from_env(default = "20")]
    pub MAX_DEFERRED_MESSAGES: u32,
}

pub static QUIETLOG_CONFIG: LazyLock<QuietLogConfig> =
    LazyLock::new(|| QuietLogConfig::from_env().unwrap());
