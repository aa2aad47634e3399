use alloy::primitives::{Address, Bytes, B256, U256};
use thiserror::Error;

use crate::credential::Credential;
use crate::domain::{
    ChainApproval, ChainConfig, ConfirmationSummary, FeeData, FinishOutcome, PasswordPrompt,
    TransactionPayload, WatchAssetPayload,
};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// JSON-RPC endpoints of the chain a request targets.
pub trait ChainRpcPort {
    fn estimate_gas(&self, chain: &ChainConfig, tx: &TransactionPayload) -> Result<u64, PortError>;
    fn fee_data(&self, chain: &ChainConfig) -> Result<FeeData, PortError>;
    fn transaction_count(&self, chain: &ChainConfig, address: Address) -> Result<u64, PortError>;
    fn balance(&self, chain: &ChainConfig, address: Address) -> Result<U256, PortError>;
    fn call(&self, chain: &ChainConfig, to: Address, data: Bytes) -> Result<Bytes, PortError>;
    fn send_raw_transaction(&self, chain: &ChainConfig, raw: Bytes) -> Result<B256, PortError>;
}

pub trait CredentialStorePort {
    fn check_password_valid(&self, password: &str) -> Result<bool, PortError>;
    fn decrypt(&self, password: &str, wallet_id: &str) -> Result<Credential, PortError>;
}

pub trait SigningPort {
    fn sign_personal_message(
        &self,
        data: &[u8],
        credential: &Credential,
    ) -> Result<Bytes, PortError>;
    fn sign_typed_data_v4(&self, raw: &str, credential: &Credential) -> Result<Bytes, PortError>;
    /// Signs and broadcasts; returns the transaction hash.
    fn send_contract_call_transaction(
        &self,
        chain: &ChainConfig,
        tx: &TransactionPayload,
        credential: &Credential,
    ) -> Result<B256, PortError>;
}

/// Screens the host shows on behalf of the coordinator. Each call only
/// surfaces a prompt; the answer comes back through the coordinator's methods.
pub trait ApprovalUiPort {
    fn request_password(&self, prompt: &PasswordPrompt) -> Result<(), PortError>;
    fn request_confirmation(&self, summary: &ConfirmationSummary) -> Result<(), PortError>;
    fn request_chain_approval(&self, approval: &ChainApproval) -> Result<(), PortError>;
    fn open_external(&self, url: &str) -> Result<(), PortError>;
    fn watch_asset(&self, asset: &WatchAssetPayload) -> Result<(), PortError>;
    fn on_finish_transaction(&self, outcome: &FinishOutcome);
}

/// Script execution inside the embedded page.
pub trait PagePort {
    fn execute_script(&self, script: &str) -> Result<(), PortError>;
}

pub trait ClockPort {
    fn now_ms(&self) -> Result<u64, PortError>;
}
