//! Monitor configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default JSON-RPC endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.steemit.com";

/// Key of the single persisted record.
pub const DEFAULT_STATE_KEY: &str = "optally_state";

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// HTTP JSON-RPC endpoint (condenser_api). Can be replaced at runtime via `setApi`.
    pub endpoint: String,
    /// Interval between poll ticks.
    pub poll_interval: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Backoff for block fetches.
    pub retry: RetryConfig,
    /// What a reset does with the cursor.
    pub reset_policy: ResetPolicy,
    /// Directory holding the persisted record.
    pub state_dir: PathBuf,
    /// File stem of the persisted record inside `state_dir`.
    pub state_key: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            reset_policy: ResetPolicy::default(),
            state_dir: PathBuf::from("data"),
            state_key: DEFAULT_STATE_KEY.to_string(),
        }
    }
}

/// Exponential backoff for block fetches.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts before giving up on a block (first try included).
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Upper bound for a single delay. `None` keeps doubling.
    pub max_delay: Option<Duration>,
    /// Random extra delay in `0..=jitter` added to every wait.
    pub jitter: Duration,
    pub empty_block_policy: EmptyBlockPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            initial_delay: Duration::from_millis(500),
            max_delay: None,
            jitter: Duration::ZERO,
            empty_block_policy: EmptyBlockPolicy::default(),
        }
    }
}

/// How an empty operation list from `get_ops_in_block` is treated.
///
/// Nodes answer with an empty list both for blocks they have not served yet and
/// for blocks that really are empty; the two cannot be told apart on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyBlockPolicy {
    /// Treat as a failed attempt and back off.
    #[default]
    Retry,
    /// Accept as a block with zero operations.
    Accept,
}

/// Whether a reset also rewinds the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Counters clear, polling continues from the current cursor.
    #[default]
    KeepCursor,
    /// Counters and cursor clear; the next cycle re-reads the chain head.
    ClearCursor,
}
