#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde_json::{json, Value};
use tiny_http::{Response, Server, StatusCode};

use dapp_bridge_adapters::crypto::KdfParams;
use dapp_bridge_adapters::{BridgeConfig, JsonRpcAdapter};
use dapp_bridge_core::domain::FeeData;
use dapp_bridge_core::{ChainConfig, ChainRpcPort, PortError, TransactionPayload};

pub const PASSWORD: &str = "correct horse battery staple";
pub const PHRASE: &str = "test test test test test test test test test test test junk";

/// First account of [`PHRASE`] on `m/44'/60'/0'/0/0`.
pub fn phrase_address() -> Address {
    "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        .parse()
        .expect("valid address")
}

pub fn fast_kdf() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
        pbkdf2_rounds: 1_000,
    }
}

pub fn chain_at(url: &str, chain_id: u64) -> ChainConfig {
    serde_json::from_value(json!({
        "chainId": format!("0x{chain_id:x}"),
        "chainName": "Mock Net",
        "rpcUrls": [url],
        "nativeCurrency": {"decimals": 18, "name": "Mock", "symbol": "MCK"}
    }))
    .expect("valid chain config")
}

/// Recorded JSON-RPC call: method plus params.
pub type RpcCall = (String, Value);

/// Result to send back, or `Err((code, message))` for a JSON-RPC error.
pub type RpcReply = Result<Value, (i64, String)>;

/// Starts a JSON-RPC server answering through `handler`. Returns its URL and
/// the log of received calls.
pub fn spawn_rpc_server<F>(handler: F) -> (String, Arc<Mutex<Vec<RpcCall>>>)
where
    F: Fn(&str, &Value) -> RpcReply + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").expect("start server");
    let url = format!("http://{}", server.server_addr());
    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);

    thread::spawn(move || {
        for _ in 0..64 {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let mut body = String::new();
            if req.as_reader().read_to_string(&mut body).is_err() {
                let response = Response::from_string("bad body").with_status_code(StatusCode(400));
                let _ = req.respond(response);
                continue;
            }
            let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            let method = payload["method"].as_str().unwrap_or_default().to_owned();
            let params = payload["params"].clone();
            if let Ok(mut g) = log.lock() {
                g.push((method.clone(), params.clone()));
            }

            let reply = match handler(&method, &params) {
                Ok(result) => json!({"jsonrpc": "2.0", "id": payload["id"], "result": result}),
                Err((code, message)) => json!({
                    "jsonrpc": "2.0",
                    "id": payload["id"],
                    "error": {"code": code, "message": message}
                }),
            };
            let _ = req.respond(Response::from_string(reply.to_string()));
        }
    });

    (url, calls)
}

pub fn rpc_adapter() -> JsonRpcAdapter {
    JsonRpcAdapter::with_config(&BridgeConfig {
        rpc_timeout_ms: 5_000,
        ..BridgeConfig::default()
    })
    .expect("rpc adapter")
}

pub fn methods(calls: &Arc<Mutex<Vec<RpcCall>>>) -> Vec<String> {
    calls
        .lock()
        .expect("calls lock")
        .iter()
        .map(|(m, _)| m.clone())
        .collect()
}

/// In-process RPC for signer tests; records broadcast payloads.
#[derive(Debug)]
pub struct CapturingRpc {
    pub tx_count: u64,
    pub gas_price: Option<U256>,
    pub raw: Mutex<Vec<Bytes>>,
}

impl Default for CapturingRpc {
    fn default() -> Self {
        Self {
            tx_count: 9,
            gas_price: Some(U256::from(20_000_000_000u64)),
            raw: Mutex::new(Vec::new()),
        }
    }
}

impl CapturingRpc {
    pub fn broadcasts(&self) -> Vec<Bytes> {
        self.raw.lock().expect("raw lock").clone()
    }
}

impl ChainRpcPort for CapturingRpc {
    fn estimate_gas(&self, _chain: &ChainConfig, _tx: &TransactionPayload) -> Result<u64, PortError> {
        Ok(21_000)
    }

    fn fee_data(&self, _chain: &ChainConfig) -> Result<FeeData, PortError> {
        Ok(FeeData {
            gas_price: self.gas_price,
            ..FeeData::default()
        })
    }

    fn transaction_count(&self, _chain: &ChainConfig, _address: Address) -> Result<u64, PortError> {
        Ok(self.tx_count)
    }

    fn balance(&self, _chain: &ChainConfig, _address: Address) -> Result<U256, PortError> {
        Ok(U256::ZERO)
    }

    fn call(&self, _chain: &ChainConfig, _to: Address, _data: Bytes) -> Result<Bytes, PortError> {
        Err(PortError::NotImplemented("eth_call"))
    }

    fn send_raw_transaction(&self, _chain: &ChainConfig, raw: Bytes) -> Result<B256, PortError> {
        self.raw.lock().expect("raw lock").push(raw);
        Ok(B256::repeat_byte(0xcd))
    }
}
