use alloy::primitives::{hex, Address, Bytes, U256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Request id assigned by the page script. Only unique within one page load.
pub type RequestId = u64;

/// Gas limit used when estimation is unavailable.
pub const DEFAULT_GAS_LIMIT: u64 = 21_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub decimals: u8,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    #[serde(with = "hex_chain_id")]
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
    pub native_currency: NativeCurrency,
}

impl ChainConfig {
    pub fn chain_id_hex(&self) -> String {
        format_chain_id(self.chain_id)
    }

    pub fn primary_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }
}

/// Canonical chain id rendering: lowercase hex, `0x` prefix, no leading zeros.
pub fn format_chain_id(chain_id: u64) -> String {
    format!("0x{chain_id:x}")
}

pub fn parse_chain_id(raw: &str) -> Result<u64, String> {
    parse_quantity(raw).map_err(|e| format!("invalid chain id {raw:?}: {e}"))
}

fn parse_quantity(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    if let Some(digits) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        if digits.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(digits, 16).map_err(|e| e.to_string())
    } else {
        raw.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuantityRepr {
    Text(String),
    Number(u64),
}

impl QuantityRepr {
    fn into_u64(self) -> Result<u64, String> {
        match self {
            Self::Number(n) => Ok(n),
            Self::Text(s) => parse_quantity(&s),
        }
    }
}

pub(crate) mod hex_chain_id {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_chain_id, QuantityRepr};

    pub fn serialize<S: Serializer>(chain_id: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_chain_id(*chain_id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        QuantityRepr::deserialize(d)?
            .into_u64()
            .map_err(D::Error::custom)
    }
}

pub(crate) mod quantity_opt {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::QuantityRepr;

    pub fn serialize<S: Serializer>(value: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_str(&format!("0x{v:x}")),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Option::<QuantityRepr>::deserialize(d)?
            .map(|raw| raw.into_u64().map_err(D::Error::custom))
            .transpose()
    }
}

/// Transaction as requested by the page, plus the fields enrichment fills in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(
        default,
        alias = "gasLimit",
        with = "quantity_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default, with = "quantity_opt", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_config: Option<ChainConfig>,
}

impl TransactionPayload {
    pub fn call_data(&self) -> &[u8] {
        self.data.as_ref().map(|d| d.as_ref()).unwrap_or_default()
    }

    pub fn has_fee_fields(&self) -> bool {
        self.gas_price.is_some() || self.max_fee_per_gas.is_some()
    }

    /// Per-gas price used for cost display: EIP-1559 cap first, legacy price otherwise.
    pub fn effective_gas_price(&self) -> U256 {
        self.max_fee_per_gas.or(self.gas_price).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeData {
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub contract: Address,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenApproval {
    pub transaction: TransactionPayload,
    pub spender: Address,
    pub amount: U256,
    pub token_data: TokenData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub data: String,
}

impl MessagePayload {
    /// `0x`-prefixed hex is signed as raw bytes, anything else as UTF-8 text.
    pub fn message_bytes(&self) -> Vec<u8> {
        message_bytes(&self.data)
    }
}

pub(crate) fn message_bytes(data: &str) -> Vec<u8> {
    if data.starts_with("0x") {
        if let Ok(bytes) = hex::decode(data) {
            return bytes;
        }
    }
    data.as_bytes().to_vec()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedMessagePayload {
    #[serde(default)]
    pub data: Option<String>,
    /// EIP-712 v4 typed data as a JSON string.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcRecoverPayload {
    pub signature: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchAssetPayload {
    #[serde(rename = "type")]
    pub asset_type: String,
    pub contract: Address,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchChainPayload {
    #[serde(with = "hex_chain_id")]
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLinkPayload {
    pub url: String,
}

/// Every request kind the in-page provider can raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRequest {
    RequestAccounts,
    SendTransaction(TransactionPayload),
    /// Produced by classification, never accepted from the page.
    TokenApproval(TokenApproval),
    SignMessage(MessagePayload),
    SignPersonalMessage(MessagePayload),
    SignTypedMessage(TypedMessagePayload),
    EcRecover(EcRecoverPayload),
    WatchAsset(WatchAssetPayload),
    AddEthereumChain(ChainConfig),
    SwitchEthereumChain(SwitchChainPayload),
    OpenLinkInDefaultBrowser(OpenLinkPayload),
}

impl ProviderRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestAccounts => "requestAccounts",
            Self::SendTransaction(_) => "signTransaction",
            Self::TokenApproval(_) => "tokenApproval",
            Self::SignMessage(_) => "signMessage",
            Self::SignPersonalMessage(_) => "signPersonalMessage",
            Self::SignTypedMessage(_) => "signTypedMessage",
            Self::EcRecover(_) => "ecRecover",
            Self::WatchAsset(_) => "watchAsset",
            Self::AddEthereumChain(_) => "addEthereumChain",
            Self::SwitchEthereumChain(_) => "switchEthereumChain",
            Self::OpenLinkInDefaultBrowser(_) => "openLinkInDefaultBrowser",
        }
    }

    pub fn decode(name: &str, object: Value) -> Result<Self, RequestDecodeError> {
        match name {
            "requestAccounts" => Ok(Self::RequestAccounts),
            "signTransaction" | "sendTransaction" => Ok(Self::SendTransaction(payload(object)?)),
            "signMessage" => Ok(Self::SignMessage(payload(object)?)),
            "signPersonalMessage" => Ok(Self::SignPersonalMessage(payload(object)?)),
            "signTypedMessage" => Ok(Self::SignTypedMessage(payload(object)?)),
            "ecRecover" => Ok(Self::EcRecover(payload(object)?)),
            "watchAsset" => Ok(Self::WatchAsset(payload(object)?)),
            "addEthereumChain" => Ok(Self::AddEthereumChain(payload(object)?)),
            "switchEthereumChain" => Ok(Self::SwitchEthereumChain(payload(object)?)),
            "openLinkInDefaultBrowser" => Ok(Self::OpenLinkInDefaultBrowser(payload(object)?)),
            other => Err(RequestDecodeError::UnsupportedMethod(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestDecodeError {
    #[error("unsupported provider method: {0}")]
    UnsupportedMethod(String),
    #[error("missing method name")]
    MissingName,
    #[error("invalid request object: {0}")]
    InvalidObject(String),
}

impl RequestDecodeError {
    pub fn to_provider_error(&self) -> ProviderError {
        match self {
            Self::UnsupportedMethod(_) => ProviderError::unsupported(self.to_string()),
            Self::MissingName | Self::InvalidObject(_) => {
                ProviderError::invalid_params(self.to_string())
            }
        }
    }
}

fn payload<T: DeserializeOwned>(object: Value) -> Result<T, RequestDecodeError> {
    serde_json::from_value(object).map_err(|e| RequestDecodeError::InvalidObject(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub id: RequestId,
    pub request: ProviderRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    #[error("provider event has no numeric id")]
    MissingId,
    #[error("provider event {id} is malformed: {reason}")]
    Malformed {
        id: RequestId,
        reason: RequestDecodeError,
    },
}

impl ProviderEvent {
    pub fn new(id: RequestId, request: ProviderRequest) -> Self {
        Self { id, request }
    }

    /// Decodes the `{ id, name, object }` frame sent by the page script.
    pub fn from_value(value: &Value) -> Result<Self, EventDecodeError> {
        let id = value
            .get("id")
            .and_then(Value::as_u64)
            .ok_or(EventDecodeError::MissingId)?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or(EventDecodeError::Malformed {
                id,
                reason: RequestDecodeError::MissingName,
            })?;
        let object = value.get("object").cloned().unwrap_or(Value::Null);
        let request = ProviderRequest::decode(name, object)
            .map_err(|reason| EventDecodeError::Malformed { id, reason })?;
        Ok(Self { id, request })
    }
}

/// EIP-1193 style error delivered back to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub const CANCELED: &'static str = "Canceled";

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(4001, Self::CANCELED)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(4100, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(4200, message)
    }

    pub fn unrecognized_chain(chain_id: u64) -> Self {
        Self::new(
            4902,
            format!("Unrecognized chain ID \"{}\"", format_chain_id(chain_id)),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(-32602, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(-32603, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalKind {
    Transfer,
    ContractCall,
    TokenApproval,
    SignMessage,
    SignPersonalMessage,
    SignTypedMessage,
}

/// Everything the confirmation screen needs for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationSummary {
    pub id: RequestId,
    pub kind: ApprovalKind,
    pub chain_id: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub network_fee: U256,
    pub total: U256,
    pub balance: Option<U256>,
    pub sufficient_balance: bool,
    pub token_data: Option<TokenData>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordPrompt {
    pub id: RequestId,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ChainApproval {
    Add {
        id: RequestId,
        chain: ChainConfig,
    },
    Switch {
        id: RequestId,
        from: ChainConfig,
        to: ChainConfig,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishOutcome {
    pub id: RequestId,
    pub result: Result<Value, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletIdentity {
    pub wallet_id: String,
    pub address: Address,
}
