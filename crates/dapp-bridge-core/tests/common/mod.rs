#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::{sol_data, SolCall, SolType, SolValue};
use serde_json::{json, Value};

use dapp_bridge_core::domain::{
    ChainApproval, ConfirmationSummary, FeeData, FinishOutcome, PasswordPrompt,
    WatchAssetPayload,
};
use dapp_bridge_core::enrichment::IERC20;
use dapp_bridge_core::{
    ApprovalCoordinator, ApprovalUiPort, BridgeContext, ChainConfig, ChainRpcPort, ClockPort,
    Credential, CredentialStorePort, MessageChannel, PageCommand, PagePort, PortError,
    SigningPort, TransactionPayload, WalletIdentity, DAPP_CHANNEL,
};

pub const PASSWORD: &str = "correct horse battery staple";
pub const PHRASE: &str = "test test test test test test test test test test test junk";
pub const CREDENTIAL_TTL_MS: u64 = 60_000;

pub fn wallet_address() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid wallet address")
}

pub fn recipient() -> Address {
    "0x2000000000000000000000000000000000000002"
        .parse()
        .expect("valid recipient address")
}

pub fn token_contract() -> Address {
    "0x3000000000000000000000000000000000000003"
        .parse()
        .expect("valid token address")
}

pub fn spender() -> Address {
    "0x4000000000000000000000000000000000000004"
        .parse()
        .expect("valid spender address")
}

pub fn wallet() -> WalletIdentity {
    WalletIdentity {
        wallet_id: "wallet-1".to_owned(),
        address: wallet_address(),
    }
}

pub fn tx_hash() -> B256 {
    B256::repeat_byte(0xab)
}

pub fn custom_chain(chain_id: u64) -> ChainConfig {
    serde_json::from_value(json!({
        "chainId": format!("0x{chain_id:X}"),
        "chainName": "Custom Net",
        "rpcUrls": ["https://rpc.custom.example"],
        "blockExplorerUrls": ["https://scan.custom.example"],
        "nativeCurrency": {"decimals": 18, "name": "Custom", "symbol": "CST"}
    }))
    .expect("valid chain config")
}

pub fn frame(id: u64, name: &str, object: Value) -> Value {
    json!({"id": id, "name": name, "object": object})
}

/// Chain RPC with canned answers. `None` makes the call fail.
#[derive(Debug)]
pub struct ScriptedRpc {
    pub gas: Option<u64>,
    pub fees: Option<FeeData>,
    pub balance: Option<U256>,
    pub tx_count: AtomicU64,
    pub calls: HashMap<[u8; 4], Bytes>,
    pub gas_requests: Mutex<Vec<TransactionPayload>>,
}

impl Default for ScriptedRpc {
    fn default() -> Self {
        Self {
            gas: Some(21_000),
            fees: Some(FeeData {
                gas_price: Some(U256::from(20_000_000_000u64)),
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
            }),
            balance: Some(U256::from(10u64).pow(U256::from(18u64))),
            tx_count: AtomicU64::new(0),
            calls: HashMap::new(),
            gas_requests: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedRpc {
    pub fn failing() -> Self {
        Self {
            gas: None,
            fees: None,
            balance: None,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, symbol: &str, decimals: u8, total_supply: U256) -> Self {
        self.calls.insert(
            IERC20::symbolCall::SELECTOR,
            Bytes::from(symbol.to_owned().abi_encode()),
        );
        self.calls
            .insert(IERC20::decimalsCall::SELECTOR, Bytes::from(<sol_data::Uint<8> as SolType>::abi_encode(&decimals)));
        self.calls.insert(
            IERC20::totalSupplyCall::SELECTOR,
            Bytes::from(total_supply.abi_encode()),
        );
        self
    }

    pub fn set_tx_count(&self, count: u64) {
        self.tx_count.store(count, Ordering::SeqCst);
    }
}

impl ChainRpcPort for ScriptedRpc {
    fn estimate_gas(&self, _chain: &ChainConfig, tx: &TransactionPayload) -> Result<u64, PortError> {
        self.gas_requests
            .lock()
            .expect("gas requests lock")
            .push(tx.clone());
        self.gas
            .ok_or_else(|| PortError::Transport("eth_estimateGas unavailable".to_owned()))
    }

    fn fee_data(&self, _chain: &ChainConfig) -> Result<FeeData, PortError> {
        self.fees
            .clone()
            .ok_or_else(|| PortError::Transport("eth_gasPrice unavailable".to_owned()))
    }

    fn transaction_count(&self, _chain: &ChainConfig, _address: Address) -> Result<u64, PortError> {
        Ok(self.tx_count.load(Ordering::SeqCst))
    }

    fn balance(&self, _chain: &ChainConfig, _address: Address) -> Result<U256, PortError> {
        self.balance
            .ok_or_else(|| PortError::Transport("eth_getBalance unavailable".to_owned()))
    }

    fn call(&self, _chain: &ChainConfig, _to: Address, data: Bytes) -> Result<Bytes, PortError> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| PortError::Validation("short call data".to_owned()))?;
        self.calls
            .get(&selector)
            .cloned()
            .ok_or_else(|| PortError::Transport("execution reverted".to_owned()))
    }

    fn send_raw_transaction(&self, _chain: &ChainConfig, _raw: Bytes) -> Result<B256, PortError> {
        Ok(tx_hash())
    }
}

#[derive(Debug, Default)]
pub struct StubSigner {
    pub fail_broadcast: bool,
    pub transactions: Mutex<Vec<(u64, TransactionPayload)>>,
    pub messages: Mutex<Vec<Vec<u8>>>,
    pub typed: Mutex<Vec<String>>,
}

impl StubSigner {
    pub fn sent(&self) -> Vec<(u64, TransactionPayload)> {
        self.transactions.lock().expect("signer lock").clone()
    }
}

impl SigningPort for StubSigner {
    fn sign_personal_message(&self, data: &[u8], _credential: &Credential) -> Result<Bytes, PortError> {
        self.messages.lock().expect("signer lock").push(data.to_vec());
        Ok(Bytes::from(vec![0x11; 65]))
    }

    fn sign_typed_data_v4(&self, raw: &str, _credential: &Credential) -> Result<Bytes, PortError> {
        self.typed.lock().expect("signer lock").push(raw.to_owned());
        Ok(Bytes::from(vec![0x22; 65]))
    }

    fn send_contract_call_transaction(
        &self,
        chain: &ChainConfig,
        tx: &TransactionPayload,
        credential: &Credential,
    ) -> Result<B256, PortError> {
        assert_eq!(credential.expose(), PHRASE);
        if self.fail_broadcast {
            return Err(PortError::Transport("nonce too low".to_owned()));
        }
        self.transactions
            .lock()
            .expect("signer lock")
            .push((chain.chain_id, tx.clone()));
        Ok(tx_hash())
    }
}

#[derive(Debug, Default)]
pub struct StubKeystore;

impl CredentialStorePort for StubKeystore {
    fn check_password_valid(&self, password: &str) -> Result<bool, PortError> {
        Ok(password == PASSWORD)
    }

    fn decrypt(&self, password: &str, wallet_id: &str) -> Result<Credential, PortError> {
        if password != PASSWORD {
            return Err(PortError::Validation("wrong password".to_owned()));
        }
        if wallet_id != "wallet-1" && wallet_id != "wallet-2" {
            return Err(PortError::NotFound(wallet_id.to_owned()));
        }
        Ok(Credential::new(PHRASE))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Password(PasswordPrompt),
    Confirmation(ConfirmationSummary),
    ChainApproval(ChainApproval),
    OpenExternal(String),
    WatchAsset(WatchAssetPayload),
    Finished(FinishOutcome),
}

#[derive(Debug, Default)]
pub struct RecordingUi {
    pub events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().expect("ui lock").clone()
    }

    pub fn take(&self) -> Vec<UiEvent> {
        std::mem::take(&mut *self.events.lock().expect("ui lock"))
    }

    fn push(&self, event: UiEvent) {
        self.events.lock().expect("ui lock").push(event);
    }
}

impl ApprovalUiPort for RecordingUi {
    fn request_password(&self, prompt: &PasswordPrompt) -> Result<(), PortError> {
        self.push(UiEvent::Password(prompt.clone()));
        Ok(())
    }

    fn request_confirmation(&self, summary: &ConfirmationSummary) -> Result<(), PortError> {
        self.push(UiEvent::Confirmation(summary.clone()));
        Ok(())
    }

    fn request_chain_approval(&self, approval: &ChainApproval) -> Result<(), PortError> {
        self.push(UiEvent::ChainApproval(approval.clone()));
        Ok(())
    }

    fn open_external(&self, url: &str) -> Result<(), PortError> {
        self.push(UiEvent::OpenExternal(url.to_owned()));
        Ok(())
    }

    fn watch_asset(&self, asset: &WatchAssetPayload) -> Result<(), PortError> {
        self.push(UiEvent::WatchAsset(asset.clone()));
        Ok(())
    }

    fn on_finish_transaction(&self, outcome: &FinishOutcome) {
        self.push(UiEvent::Finished(outcome.clone()));
    }
}

#[derive(Debug, Default)]
pub struct RecordingPage {
    pub scripts: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    /// 1-based attempt that fails once without recording its script.
    fail_on_attempt: Option<usize>,
}

impl RecordingPage {
    pub fn failing_once_at(attempt: usize) -> Self {
        Self {
            fail_on_attempt: Some(attempt),
            ..Self::default()
        }
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().expect("page lock").clone()
    }

    /// Decodes every executed script back into the command it carries.
    pub fn commands(&self) -> Vec<PageCommand> {
        self.scripts().iter().map(|s| decode_script(s)).collect()
    }

    /// Responses and errors only, in delivery order.
    pub fn replies(&self) -> Vec<PageCommand> {
        self.commands()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    PageCommand::SendResponse { .. }
                        | PageCommand::SendResponses { .. }
                        | PageCommand::SendError { .. }
                )
            })
            .collect()
    }
}

impl PagePort for RecordingPage {
    fn execute_script(&self, script: &str) -> Result<(), PortError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_attempt == Some(attempt) {
            return Err(PortError::Transport("webview busy".to_owned()));
        }
        self.scripts
            .lock()
            .expect("page lock")
            .push(script.to_owned());
        Ok(())
    }
}

pub fn decode_script(script: &str) -> PageCommand {
    let literal = script
        .strip_prefix("window.__dappBridge.dispatch(JSON.parse(")
        .and_then(|s| s.strip_suffix("));"))
        .expect("script uses the fixed dispatcher");
    let json: String = serde_json::from_str(literal).expect("script argument is a JSON string");
    serde_json::from_str(&json).expect("page command")
}

#[derive(Debug)]
pub struct TestClock {
    pub now: AtomicU64,
}

impl Default for TestClock {
    fn default() -> Self {
        Self {
            now: AtomicU64::new(1_739_750_400_000),
        }
    }
}

impl TestClock {
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.now.load(Ordering::SeqCst))
    }
}

pub type TestCoordinator = ApprovalCoordinator<
    ScriptedRpc,
    StubSigner,
    StubKeystore,
    RecordingUi,
    RecordingPage,
    TestClock,
>;

pub fn new_coordinator(rpc: ScriptedRpc) -> TestCoordinator {
    coordinator_with(rpc, BridgeContext::new(wallet(), CREDENTIAL_TTL_MS))
}

pub fn coordinator_with(rpc: ScriptedRpc, context: BridgeContext) -> TestCoordinator {
    ApprovalCoordinator::new(
        rpc,
        StubSigner::default(),
        StubKeystore,
        RecordingUi::default(),
        TestClock::default(),
        MessageChannel::new(RecordingPage::default()),
        context,
    )
}

/// Coordinator whose page has finished loading.
pub fn ready_coordinator(rpc: ScriptedRpc) -> TestCoordinator {
    let mut coordinator = new_coordinator(rpc);
    coordinator.page_ready().expect("page ready");
    coordinator
}

pub fn send(coordinator: &mut TestCoordinator, frame: Value) {
    coordinator
        .handle_message(DAPP_CHANNEL, &[frame])
        .expect("handle provider message");
}

pub fn page(coordinator: &TestCoordinator) -> &RecordingPage {
    coordinator.channel().page()
}
