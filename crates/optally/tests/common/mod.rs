//! Common helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use optally::{BlockSource, Operation, RpcError, PRODUCER_REWARD};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("optally=debug".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

/// Block with one producer_reward plus the given operation types.
pub fn block(producer: &str, timestamp: &str, types: &[&str]) -> Vec<Operation> {
    let mut ops = vec![Operation::new(
        PRODUCER_REWARD,
        json!({"producer": producer, "vesting_shares": "1.000000 VESTS"}),
        timestamp,
    )];
    ops.extend(
        types
            .iter()
            .map(|t| Operation::new(*t, json!({}), timestamp)),
    );
    ops
}

/// In-memory chain for driving a Monitor.
///
/// Heads are served from a script (the last value repeats). Blocks without explicit
/// content hold `producer_reward` + two `vote`s. Failures can be queued per block, and
/// block fetches can be gated behind a semaphore to hold a cycle in flight.
pub struct ScriptedChain {
    heads: Mutex<VecDeque<u64>>,
    last_head: AtomicU64,
    head_error: Mutex<bool>,
    blocks: Mutex<HashMap<u64, Vec<Operation>>>,
    failures: Mutex<HashMap<u64, u32>>,
    fetched: Mutex<Vec<u64>>,
    gate: Semaphore,
    endpoint: Mutex<String>,
    pub head_calls: AtomicU64,
    pub block_calls: AtomicU64,
}

impl ScriptedChain {
    pub fn new(head: u64) -> Self {
        Self {
            heads: Mutex::new(VecDeque::new()),
            last_head: AtomicU64::new(head),
            head_error: Mutex::new(false),
            blocks: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
            endpoint: Mutex::new("http://scripted.invalid".to_string()),
            head_calls: AtomicU64::new(0),
            block_calls: AtomicU64::new(0),
        }
    }

    /// Block fetches wait until [ScriptedChain::release] hands out permits.
    pub fn gated(head: u64) -> Self {
        let chain = Self::new(head);
        chain.gate.forget_permits(Semaphore::MAX_PERMITS);
        chain
    }

    pub fn release(&self, fetches: usize) {
        self.gate.add_permits(fetches);
    }

    /// Heads returned by the next head fetches, in order.
    pub fn script_heads(&self, heads: &[u64]) {
        self.heads.lock().unwrap().extend(heads.iter().copied());
    }

    pub fn set_head(&self, head: u64) {
        self.heads.lock().unwrap().clear();
        self.last_head.store(head, Ordering::SeqCst);
    }

    pub fn fail_head(&self, fail: bool) {
        *self.head_error.lock().unwrap() = fail;
    }

    pub fn set_block(&self, number: u64, ops: Vec<Operation>) {
        self.blocks.lock().unwrap().insert(number, ops);
    }

    /// The next `times` fetches of `number` fail.
    pub fn fail_block(&self, number: u64, times: u32) {
        self.failures.lock().unwrap().insert(number, times);
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, number: u64) -> usize {
        self.fetched().iter().filter(|b| **b == number).count()
    }
}

#[async_trait]
impl BlockSource for ScriptedChain {
    async fn fetch_chain_head(&self) -> Result<u64, RpcError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if *self.head_error.lock().unwrap() {
            return Err(RpcError::Rpc("head unavailable".into()));
        }
        if let Some(h) = self.heads.lock().unwrap().pop_front() {
            self.last_head.store(h, Ordering::SeqCst);
        }
        Ok(self.last_head.load(Ordering::SeqCst))
    }

    async fn fetch_block_operations(&self, number: u64) -> Result<Vec<Operation>, RpcError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        self.fetched.lock().unwrap().push(number);
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&number) {
                if *left > 0 {
                    *left -= 1;
                    return Err(RpcError::Rpc(format!("block {} not available", number)));
                }
            }
        }
        let ops = self.blocks.lock().unwrap().get(&number).cloned();
        Ok(ops.unwrap_or_else(|| {
            block(
                &format!("witness-{}", number % 21),
                "2024-01-01T00:00:00",
                &["vote", "vote"],
            )
        }))
    }

    fn endpoint(&self) -> String {
        self.endpoint.lock().unwrap().clone()
    }

    fn set_endpoint(&self, endpoint: String) {
        *self.endpoint.lock().unwrap() = endpoint;
    }
}
