//! Blocking JSON-RPC client for the chain a request targets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::debug;

use dapp_bridge_core::domain::FeeData;
use dapp_bridge_core::{ChainConfig, ChainRpcPort, PortError, TransactionPayload};

use crate::config::BridgeConfig;

#[derive(Debug)]
pub struct JsonRpcAdapter {
    client: reqwest::blocking::Client,
    priority_fee_wei: u128,
    next_id: AtomicU64,
}

impl JsonRpcAdapter {
    pub fn with_config(config: &BridgeConfig) -> Result<Self, PortError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.rpc_timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("rpc client init failed: {e}")))?;
        Ok(Self {
            client,
            priority_fee_wei: config.priority_fee_wei,
            next_id: AtomicU64::new(1),
        })
    }

    fn request(&self, chain: &ChainConfig, method: &str, params: Value) -> Result<Value, PortError> {
        let url = chain.primary_rpc_url().ok_or_else(|| {
            PortError::Validation(format!("chain {} has no rpc url", chain.chain_id_hex()))
        })?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, chain_id = %chain.chain_id_hex(), "rpc request");

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .map_err(|e| PortError::Transport(format!("{method} request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|e| PortError::Transport(format!("{method} json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(PortError::Transport(format!(
                "{method} status {status}: {body}"
            )));
        }
        if let Some(err) = body.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| err.to_string());
            return Err(PortError::Transport(message));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport(format!("{method} missing result")))
    }

    fn request_as<T: DeserializeOwned>(
        &self,
        chain: &ChainConfig,
        method: &str,
        params: Value,
    ) -> Result<T, PortError> {
        let result = self.request(chain, method, params)?;
        serde_json::from_value(result)
            .map_err(|e| PortError::Validation(format!("{method} result malformed: {e}")))
    }

    fn request_u64(&self, chain: &ChainConfig, method: &str, params: Value) -> Result<u64, PortError> {
        let value: U256 = self.request_as(chain, method, params)?;
        u64::try_from(value)
            .map_err(|_| PortError::Validation(format!("{method} result out of range: {value}")))
    }
}

/// Call object for `eth_estimateGas`/`eth_call`. Fee fields are left out so
/// the node estimates against the sender's balance only.
fn call_object(tx: &TransactionPayload) -> Value {
    let mut obj = Map::new();
    if let Some(from) = tx.from {
        obj.insert("from".to_owned(), json!(from));
    }
    if let Some(to) = tx.to {
        obj.insert("to".to_owned(), json!(to));
    }
    if let Some(value) = tx.value {
        obj.insert("value".to_owned(), json!(value));
    }
    if let Some(data) = &tx.data {
        obj.insert("data".to_owned(), json!(data));
    }
    Value::Object(obj)
}

impl ChainRpcPort for JsonRpcAdapter {
    fn estimate_gas(&self, chain: &ChainConfig, tx: &TransactionPayload) -> Result<u64, PortError> {
        self.request_u64(chain, "eth_estimateGas", json!([call_object(tx)]))
    }

    fn fee_data(&self, chain: &ChainConfig) -> Result<FeeData, PortError> {
        let gas_price: U256 = self.request_as(chain, "eth_gasPrice", json!([]))?;
        let block = self.request(chain, "eth_getBlockByNumber", json!(["latest", false]))?;
        let base_fee = block
            .get("baseFeePerGas")
            .filter(|v| !v.is_null())
            .map(|v| serde_json::from_value::<U256>(v.clone()))
            .transpose()
            .map_err(|e| PortError::Validation(format!("baseFeePerGas malformed: {e}")))?;

        let Some(base_fee) = base_fee else {
            return Ok(FeeData {
                gas_price: Some(gas_price),
                ..FeeData::default()
            });
        };
        let priority = U256::from(self.priority_fee_wei);
        Ok(FeeData {
            gas_price: Some(gas_price),
            max_fee_per_gas: Some(base_fee * U256::from(2u8) + priority),
            max_priority_fee_per_gas: Some(priority),
        })
    }

    fn transaction_count(&self, chain: &ChainConfig, address: Address) -> Result<u64, PortError> {
        self.request_u64(
            chain,
            "eth_getTransactionCount",
            json!([address, "pending"]),
        )
    }

    fn balance(&self, chain: &ChainConfig, address: Address) -> Result<U256, PortError> {
        self.request_as(chain, "eth_getBalance", json!([address, "latest"]))
    }

    fn call(&self, chain: &ChainConfig, to: Address, data: Bytes) -> Result<Bytes, PortError> {
        self.request_as(
            chain,
            "eth_call",
            json!([{"to": to, "data": data}, "latest"]),
        )
    }

    fn send_raw_transaction(&self, chain: &ChainConfig, raw: Bytes) -> Result<B256, PortError> {
        self.request_as(chain, "eth_sendRawTransaction", json!([raw]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_object_omits_missing_and_fee_fields() {
        let tx = TransactionPayload {
            to: Some(Address::repeat_byte(0x22)),
            value: Some(U256::from(10u64)),
            gas_price: Some(U256::from(1u64)),
            nonce: Some(4),
            ..TransactionPayload::default()
        };
        let obj = call_object(&tx);
        assert_eq!(obj["value"], "0xa");
        assert!(obj.get("from").is_none());
        assert!(obj.get("gasPrice").is_none());
        assert!(obj.get("nonce").is_none());
    }
}
