//! JSON-RPC access to a condenser_api node.
//!
//! Only two calls are needed: the irreversible head and the operations of one block.
//! Every failure comes back as an [RpcError] value so the retry layer can branch on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

pub const GET_DYNAMIC_GLOBAL_PROPERTIES: &str = "condenser_api.get_dynamic_global_properties";
pub const GET_OPS_IN_BLOCK: &str = "condenser_api.get_ops_in_block";

/// One operation as returned by `get_ops_in_block`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op_type: String,
    pub payload: Value,
    pub timestamp: String,
}

impl Operation {
    pub fn new(op_type: impl Into<String>, payload: Value, timestamp: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            payload,
            timestamp: timestamp.into(),
        }
    }
}

/// Transport-level failure of a single RPC call.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Source of chain heads and block operations.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Last irreversible block number.
    async fn fetch_chain_head(&self) -> Result<u64, RpcError>;

    /// Operations in `block`. An empty list is a valid answer.
    async fn fetch_block_operations(&self, block: u64) -> Result<Vec<Operation>, RpcError>;

    fn endpoint(&self) -> String;

    fn set_endpoint(&self, endpoint: String);
}

/// reqwest-backed [BlockSource] with a switchable endpoint.
pub struct HttpRpcClient {
    client: reqwest::Client,
    endpoint: RwLock<String>,
}

impl HttpRpcClient {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: RwLock::new(endpoint.into()),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let url = self.endpoint();
        http_json_rpc(&self.client, &url, method, params, 1).await
    }
}

async fn http_json_rpc(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
    id: u64,
) -> Result<Value, RpcError> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    });
    let resp = client.post(url).json(&body).send().await?.error_for_status()?;
    let json: Value = resp.json().await?;
    if let Some(err) = json.get("error") {
        return Err(RpcError::Rpc(err.to_string()));
    }
    json.get("result")
        .cloned()
        .ok_or_else(|| RpcError::Decode("Missing result".into()))
}

#[async_trait]
impl BlockSource for HttpRpcClient {
    async fn fetch_chain_head(&self) -> Result<u64, RpcError> {
        let result = self.call(GET_DYNAMIC_GLOBAL_PROPERTIES, json!([])).await?;
        decode_chain_head(&result)
    }

    async fn fetch_block_operations(&self, block: u64) -> Result<Vec<Operation>, RpcError> {
        let result = self.call(GET_OPS_IN_BLOCK, json!([block, false])).await?;
        decode_operations(&result)
    }

    fn endpoint(&self) -> String {
        self.endpoint
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_endpoint(&self, endpoint: String) {
        let mut guard = self
            .endpoint
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let old = std::mem::replace(&mut *guard, endpoint);
        tracing::info!(%old, new = %guard.as_str(), "RPC endpoint changed");
    }
}

/// Read `last_irreversible_block_num` from a dynamic global properties object.
pub fn decode_chain_head(props: &Value) -> Result<u64, RpcError> {
    props
        .get("last_irreversible_block_num")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::Decode("last_irreversible_block_num missing or not a number".into()))
}

/// Decode a `get_ops_in_block` result. `null` decodes to no operations.
pub fn decode_operations(result: &Value) -> Result<Vec<Operation>, RpcError> {
    if result.is_null() {
        return Ok(Vec::new());
    }
    let records = result
        .as_array()
        .ok_or_else(|| RpcError::Decode("get_ops_in_block result not array".into()))?;
    records.iter().map(decode_operation).collect()
}

fn decode_operation(record: &Value) -> Result<Operation, RpcError> {
    let op = record
        .get("op")
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::Decode("op not array".into()))?;
    let op_type = op
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::Decode("op type not string".into()))?;
    let payload = op.get(1).cloned().unwrap_or(Value::Null);
    let timestamp = record
        .get("timestamp")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::Decode("timestamp missing".into()))?;
    Ok(Operation::new(op_type, payload, timestamp))
}
