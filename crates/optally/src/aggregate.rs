//! Folding block operations into running tallies.
//!
//! [Snapshot::apply] is pure: it takes one block's operations and returns the next
//! snapshot. The cursor is carried through untouched; advancing it is the poll loop's job.

use crate::cursor::Cursor;
use crate::rpc::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operation type that carries the block timestamp and producer.
pub const PRODUCER_REWARD: &str = "producer_reward";

/// Payload field of [PRODUCER_REWARD] naming the block producer.
pub const PRODUCER_FIELD: &str = "producer";

/// Assumed block interval used for the throughput estimate.
pub const SECONDS_PER_BLOCK: u64 = 3;

/// Operation type name -> occurrences.
pub type OperationCounts = BTreeMap<String, u64>;

/// Timestamp and producer of the last processed block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub timestamp: Option<String>,
    pub producer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub total_operations: u64,
    /// Rounded to two decimals.
    pub operations_per_second: f64,
}

/// Complete aggregate state; the unit of persistence and broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cursor: Cursor,
    pub current_block_counts: OperationCounts,
    pub cumulative_counts: OperationCounts,
    pub block_metadata: BlockMetadata,
    pub blocks_processed: u64,
    pub throughput: Throughput,
    /// Most recent non-empty producer seen; survives blocks without a reward, cleared on reset.
    #[serde(default)]
    pub last_known_producer: Option<String>,
}

impl Snapshot {
    /// Fold one block's operations into a new snapshot.
    pub fn apply(&self, operations: &[Operation]) -> Snapshot {
        let mut next = self.clone();

        next.current_block_counts = count_operations(operations);
        for op in operations {
            *next.cumulative_counts.entry(op.op_type.clone()).or_insert(0) += 1;
        }

        next.block_metadata = BlockMetadata::default();
        if let Some(reward) = operations.iter().find(|op| op.op_type == PRODUCER_REWARD) {
            next.block_metadata.timestamp = Some(reward.timestamp.clone());
            next.block_metadata.producer = reward
                .payload
                .get(PRODUCER_FIELD)
                .and_then(|p| p.as_str())
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .or_else(|| self.last_known_producer.clone());
            if next.block_metadata.producer.is_some() {
                next.last_known_producer = next.block_metadata.producer.clone();
            }
        }

        next.throughput.total_operations += operations.len() as u64;
        next.blocks_processed += 1;
        next.throughput.operations_per_second =
            operations_per_second(next.throughput.total_operations, next.blocks_processed);
        next
    }

    /// Cleared counters. With `keep_cursor` the cursor survives, otherwise it goes back to uninitialized.
    pub fn cleared(&self, keep_cursor: bool) -> Snapshot {
        Snapshot {
            cursor: if keep_cursor { self.cursor } else { Cursor::default() },
            ..Snapshot::default()
        }
    }
}

pub fn count_operations(operations: &[Operation]) -> OperationCounts {
    let mut counts = OperationCounts::new();
    for op in operations {
        *counts.entry(op.op_type.clone()).or_insert(0) += 1;
    }
    counts
}

/// `total / (blocks * SECONDS_PER_BLOCK)`, rounded to two decimals; 0 before any block.
pub fn operations_per_second(total_operations: u64, blocks_processed: u64) -> f64 {
    if blocks_processed == 0 {
        return 0.0;
    }
    let raw = total_operations as f64 / (blocks_processed * SECONDS_PER_BLOCK) as f64;
    (raw * 100.0).round() / 100.0
}
