//! Bounded exponential backoff around block fetches.

use crate::config::{EmptyBlockPolicy, RetryConfig};
use crate::rpc::{BlockSource, Operation};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Every attempt for `block` failed; the caller must not advance past it this cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("gave up on block {block} after {attempts} attempts: {last_error}")]
pub struct GaveUp {
    pub block: u64,
    pub attempts: u32,
    pub last_error: String,
}

/// Fetch the operations of `block`, backing off between failed attempts.
///
/// An attempt fails on any [crate::RpcError], and on an empty list unless
/// `config.empty_block_policy` is [EmptyBlockPolicy::Accept]. The delay starts at
/// `initial_delay` and doubles after every wait; there is no wait after the last attempt.
pub async fn fetch_block_with_retry<S>(
    source: &S,
    block: u64,
    config: &RetryConfig,
) -> Result<Vec<Operation>, GaveUp>
where
    S: BlockSource + ?Sized,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match source.fetch_block_operations(block).await {
            Ok(ops) if !ops.is_empty() => return Ok(ops),
            Ok(ops) if config.empty_block_policy == EmptyBlockPolicy::Accept => return Ok(ops),
            Ok(_) => last_error = "empty operation list".to_string(),
            Err(e) => last_error = e.to_string(),
        }
        tracing::debug!(block, attempt, reason = %last_error, "block fetch attempt failed");
        if attempt < max_attempts {
            sleep(delay + jitter(config.jitter)).await;
            delay = next_delay(delay, config.max_delay);
        }
    }

    Err(GaveUp {
        block,
        attempts: max_attempts,
        last_error,
    })
}

fn next_delay(delay: Duration, max_delay: Option<Duration>) -> Duration {
    let doubled = delay.saturating_mul(2);
    match max_delay {
        Some(max) => doubled.min(max),
        None => doubled,
    }
}

fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
