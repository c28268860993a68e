//! Integration tests: HttpRpcClient against a mock JSON-RPC server.

mod common;

use mockito::{Matcher, Server};
use optally::rpc::{GET_DYNAMIC_GLOBAL_PROPERTIES, GET_OPS_IN_BLOCK};
use optally::{
    BlockSource, Cursor, CycleOutcome, HttpRpcClient, MemorySnapshotStore, Monitor, MonitorConfig,
    PersistedState, RpcError, Snapshot,
};
use serde_json::json;
use std::time::Duration;

fn client(url: &str) -> HttpRpcClient {
    HttpRpcClient::new(url, Duration::from_secs(5)).expect("client")
}

fn ops_in_block(block: u64) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": [
            {
                "trx_id": "0000000000000000000000000000000000000000",
                "block": block,
                "trx_in_block": 4294967295u64,
                "op_in_trx": 0,
                "virtual_op": 1,
                "timestamp": "2024-01-01T00:00:00",
                "op": ["producer_reward", {"producer": "alice", "vesting_shares": "476.123456 VESTS"}]
            },
            {
                "trx_id": "1111111111111111111111111111111111111111",
                "block": block,
                "trx_in_block": 0,
                "op_in_trx": 0,
                "virtual_op": 0,
                "timestamp": "2024-01-01T00:00:00",
                "op": ["vote", {"voter": "bob", "author": "carol", "permlink": "post", "weight": 10000}]
            }
        ]
    })
}

#[tokio::test]
async fn fetches_irreversible_head() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "jsonrpc": "2.0",
            "method": GET_DYNAMIC_GLOBAL_PROPERTIES,
            "params": []
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"head_block_number": 120, "last_irreversible_block_num": 100}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let head = client(&server.url()).fetch_chain_head().await.unwrap();
    assert_eq!(head, 100);
    mock.assert_async().await;
}

#[tokio::test]
async fn fetches_block_operations_with_virtual_ops() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "method": GET_OPS_IN_BLOCK,
            "params": [100, false]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ops_in_block(100).to_string())
        .create_async()
        .await;

    let ops = client(&server.url()).fetch_block_operations(100).await.unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].op_type, "producer_reward");
    assert_eq!(ops[0].payload["producer"], "alice");
    assert_eq!(ops[1].op_type, "vote");
    mock.assert_async().await;
}

#[tokio::test]
async fn null_result_is_an_empty_block() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
        .create_async()
        .await;

    let ops = client(&server.url()).fetch_block_operations(5).await.unwrap();
    assert!(ops.is_empty());
}

#[tokio::test]
async fn failures_are_typed() {
    let mut server = Server::new_async().await;
    let _status = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": GET_DYNAMIC_GLOBAL_PROPERTIES})))
        .with_status(503)
        .create_async()
        .await;
    let _rpc_error = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": GET_OPS_IN_BLOCK, "params": [1, false]})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"Unable to acquire database lock"}}"#)
        .create_async()
        .await;
    let _garbage = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": GET_OPS_IN_BLOCK, "params": [2, false]})))
        .with_status(200)
        .with_body("<html>bad gateway</html>")
        .create_async()
        .await;
    let _wrong_shape = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": GET_OPS_IN_BLOCK, "params": [3, false]})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"unexpected":true}}"#)
        .create_async()
        .await;

    let c = client(&server.url());
    assert!(matches!(c.fetch_chain_head().await, Err(RpcError::Http(_))));
    match c.fetch_block_operations(1).await {
        Err(RpcError::Rpc(msg)) => assert!(msg.contains("database lock")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(c.fetch_block_operations(2).await, Err(RpcError::Http(_))));
    assert!(matches!(c.fetch_block_operations(3).await, Err(RpcError::Decode(_))));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_failure() {
    // Port 9 (discard) on localhost is not expected to speak HTTP.
    let c = client("http://127.0.0.1:9");
    assert!(matches!(c.fetch_chain_head().await, Err(RpcError::Http(_))));
}

#[tokio::test]
async fn set_endpoint_redirects_requests() {
    let mut old = Server::new_async().await;
    let mut new = Server::new_async().await;
    let old_mock = old.mock("POST", "/").expect(0).create_async().await;
    let new_mock = new
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"last_irreversible_block_num":7}}"#)
        .expect(1)
        .create_async()
        .await;

    let c = client(&old.url());
    c.set_endpoint(new.url());
    assert_eq!(c.fetch_chain_head().await.unwrap(), 7);
    old_mock.assert_async().await;
    new_mock.assert_async().await;
}

#[tokio::test]
async fn monitor_over_http_processes_a_block() {
    common::init_tracing();
    let mut server = Server::new_async().await;
    let _head = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": GET_DYNAMIC_GLOBAL_PROPERTIES})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"last_irreversible_block_num":100}}"#)
        .create_async()
        .await;
    let block = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": GET_OPS_IN_BLOCK, "params": [100, false]})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ops_in_block(100).to_string())
        .expect(1)
        .create_async()
        .await;

    let monitor = Monitor::with_state(
        client(&server.url()),
        MemorySnapshotStore::new(),
        &MonitorConfig::default(),
        PersistedState {
            snapshot: Snapshot {
                cursor: Cursor::new(99),
                ..Default::default()
            },
            paused: false,
        },
    );
    assert_eq!(
        monitor.run_cycle().await,
        CycleOutcome::Processed {
            blocks: 1,
            head: 100,
            gave_up: None
        }
    );
    block.assert_async().await;

    let snapshot = monitor.snapshot().await;
    assert_eq!(snapshot.cursor.next_block_to_check, 101);
    assert_eq!(snapshot.block_metadata.producer.as_deref(), Some("alice"));
    assert_eq!(snapshot.cumulative_counts["vote"], 1);
    assert_eq!(snapshot.throughput.operations_per_second, 0.67);
}
