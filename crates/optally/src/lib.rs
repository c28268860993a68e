//! Irreversible-block follower for condenser_api nodes: per-block and cumulative
//! operation-type tallies.
//!
//! - **Monitor**: the poll loop. Follows `last_irreversible_block_num` one block at a
//!   time, fetching with bounded exponential backoff ([fetch_block_with_retry]), folding
//!   each block into a [Snapshot], broadcasting it, and persisting it through a
//!   [SnapshotStore].
//! - **Control**: operator messages (`getData`, `reset`, `setApi`, `togglePauseState`)
//!   applied to a running [Monitor].

pub mod aggregate;
pub mod config;
pub mod control;
pub mod cursor;
pub mod monitor;
pub mod notify;
pub mod retry;
pub mod rpc;
pub mod store;

pub use aggregate::{BlockMetadata, OperationCounts, Snapshot, Throughput, PRODUCER_REWARD};
pub use config::{EmptyBlockPolicy, MonitorConfig, ResetPolicy, RetryConfig};
pub use control::{ControlError, ControlHandle, ControlMessage, ControlResponse, StatusPayload};
pub use cursor::Cursor;
pub use monitor::{CycleOutcome, Monitor, MonitorState, ResetOutcome};
pub use notify::{BlockInfo, DataPayload, MonitorEvent, Notifier};
pub use retry::{fetch_block_with_retry, GaveUp};
pub use rpc::{BlockSource, HttpRpcClient, Operation, RpcError};
pub use store::{FileSnapshotStore, MemorySnapshotStore, PersistedState, SnapshotStore, StoreError};
