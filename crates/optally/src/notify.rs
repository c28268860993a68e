//! Fan-out of state changes to observers.
//!
//! Delivery is fire-and-forget over a broadcast channel: receivers that are not
//! subscribed, or that lag behind the channel capacity, miss events.

use crate::aggregate::{OperationCounts, Snapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Info block shared by `getData` replies and `update` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub last_processed_block: u64,
    pub blocks_processed: u64,
    pub timestamp: Option<String>,
    pub producer_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_operations_ever: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations_per_second: Option<f64>,
}

/// Counters plus info, as seen by the display surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPayload {
    pub current_block_counts: OperationCounts,
    pub cumulative_counts: OperationCounts,
    pub info: BlockInfo,
}

impl DataPayload {
    /// Payload for `getData`: no throughput fields.
    pub fn data(snapshot: &Snapshot) -> Self {
        Self::build(snapshot, false)
    }

    /// Payload for `update` events: includes throughput.
    pub fn update(snapshot: &Snapshot) -> Self {
        Self::build(snapshot, true)
    }

    fn build(snapshot: &Snapshot, with_throughput: bool) -> Self {
        Self {
            current_block_counts: snapshot.current_block_counts.clone(),
            cumulative_counts: snapshot.cumulative_counts.clone(),
            info: BlockInfo {
                last_processed_block: snapshot.cursor.last_processed_block,
                blocks_processed: snapshot.blocks_processed,
                timestamp: snapshot.block_metadata.timestamp.clone(),
                producer_identity: snapshot.block_metadata.producer.clone(),
                total_operations_ever: with_throughput
                    .then_some(snapshot.throughput.total_operations),
                operations_per_second: with_throughput
                    .then_some(snapshot.throughput.operations_per_second),
            },
        }
    }
}

/// Broadcast event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    /// A block was processed, or counters were reset.
    Update(DataPayload),
    /// Stored data changed outside the poll loop; observers should re-query.
    DataUpdated,
}

/// Broadcast sender for [MonitorEvent]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<MonitorEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Send to whoever is listening. Returns the number of receivers reached.
    pub fn publish(&self, event: MonitorEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn publish_update(&self, snapshot: &Snapshot) -> usize {
        self.publish(MonitorEvent::Update(DataPayload::update(snapshot)))
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}
