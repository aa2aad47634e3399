//! Gas/fee filling and call classification for page-originated transactions.

use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{
    ChainConfig, TokenApproval, TokenData, TransactionPayload, DEFAULT_GAS_LIMIT,
};
use crate::nonce::NonceSequencer;
use crate::ports::{ChainRpcPort, PortError};

alloy::sol! {
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
    }
}

/// `approve(address,uint256)`
pub const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichError {
    #[error("call data decode failed: {0}")]
    Decode(String),
    #[error("token metadata unavailable: {0}")]
    TokenMetadata(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Transfer(TransactionPayload),
    ContractCall(TransactionPayload),
    TokenApproval(TokenApproval),
}

#[derive(Debug)]
pub struct TransactionEnricher {
    default_gas_limit: u64,
    nonces: NonceSequencer,
}

impl Default for TransactionEnricher {
    fn default() -> Self {
        Self::new(DEFAULT_GAS_LIMIT)
    }
}

impl TransactionEnricher {
    pub fn new(default_gas_limit: u64) -> Self {
        Self {
            default_gas_limit,
            nonces: NonceSequencer::new(),
        }
    }

    pub fn default_gas_limit(&self) -> u64 {
        self.default_gas_limit
    }

    pub fn nonces(&self) -> &NonceSequencer {
        &self.nonces
    }

    /// Fills missing gas and fee fields. RPC failures degrade to the default
    /// gas limit and empty fee fields; this never fails.
    pub fn enrich<R: ChainRpcPort>(
        &self,
        rpc: &R,
        mut tx: TransactionPayload,
        chain: &ChainConfig,
    ) -> TransactionPayload {
        if !tx.has_fee_fields() {
            match rpc.fee_data(chain) {
                Ok(fees) => {
                    tx.gas_price = fees.gas_price;
                    tx.max_fee_per_gas = fees.max_fee_per_gas;
                    tx.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;
                }
                Err(e) => {
                    warn!(chain_id = %chain.chain_id_hex(), error = %e, "fee data unavailable");
                    tx.gas_price = None;
                    tx.max_fee_per_gas = None;
                    tx.max_priority_fee_per_gas = None;
                }
            }
        }

        if tx.gas.is_none() {
            let gas = rpc.estimate_gas(chain, &tx).unwrap_or_else(|e| {
                warn!(
                    chain_id = %chain.chain_id_hex(),
                    error = %e,
                    fallback = self.default_gas_limit,
                    "gas estimation failed"
                );
                self.default_gas_limit
            });
            tx.gas = Some(gas);
        }

        tx.chain_config = Some(chain.clone());
        tx
    }

    /// Sets the nonce right before signing unless the page pinned one.
    /// Returns the reserved nonce so a failed broadcast can give it back.
    pub fn assign_nonce<R: ChainRpcPort>(
        &self,
        rpc: &R,
        tx: &mut TransactionPayload,
        chain: &ChainConfig,
    ) -> Result<Option<u64>, PortError> {
        if tx.nonce.is_some() {
            return Ok(None);
        }
        let from = tx
            .from
            .ok_or_else(|| PortError::Validation("transaction has no sender".to_owned()))?;
        let nonce = self.nonces.reserve(rpc, chain, from)?;
        tx.nonce = Some(nonce);
        Ok(Some(nonce))
    }

    /// Splits plain transfers, ERC-20 approvals and other contract calls.
    pub fn classify<R: ChainRpcPort>(
        &self,
        rpc: &R,
        tx: TransactionPayload,
        chain: &ChainConfig,
    ) -> Result<Classification, EnrichError> {
        let data = tx.call_data();
        if data.is_empty() {
            return Ok(Classification::Transfer(tx));
        }
        if !has_approve_selector(data) {
            return Ok(Classification::ContractCall(tx));
        }

        let contract = tx
            .to
            .ok_or_else(|| EnrichError::Decode("approval has no token contract".to_owned()))?;
        let (spender, amount) = decode_approve(data)?;
        let token_data = fetch_token_data(rpc, chain, contract)?;
        debug!(%contract, %spender, symbol = %token_data.symbol, "token approval classified");
        Ok(Classification::TokenApproval(TokenApproval {
            transaction: tx,
            spender,
            amount,
            token_data,
        }))
    }
}

pub fn has_approve_selector(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == APPROVE_SELECTOR
}

pub fn decode_approve(data: &[u8]) -> Result<(Address, alloy::primitives::U256), EnrichError> {
    let call = IERC20::approveCall::abi_decode(data, true)
        .map_err(|e| EnrichError::Decode(format!("approve(address,uint256): {e}")))?;
    Ok((call.spender, call.amount))
}

pub fn fetch_token_data<R: ChainRpcPort>(
    rpc: &R,
    chain: &ChainConfig,
    contract: Address,
) -> Result<TokenData, EnrichError> {
    let symbol = view_call(rpc, chain, contract, IERC20::symbolCall {})?._0;
    let decimals = view_call(rpc, chain, contract, IERC20::decimalsCall {})?._0;
    let total_supply = view_call(rpc, chain, contract, IERC20::totalSupplyCall {})?._0;
    Ok(TokenData {
        contract,
        symbol,
        decimals,
        total_supply,
    })
}

fn view_call<R: ChainRpcPort, C: SolCall>(
    rpc: &R,
    chain: &ChainConfig,
    contract: Address,
    call: C,
) -> Result<C::Return, EnrichError> {
    let out = rpc
        .call(chain, contract, Bytes::from(call.abi_encode()))
        .map_err(|e| EnrichError::TokenMetadata(format!("{}: {e}", C::SIGNATURE)))?;
    C::abi_decode_returns(&out, true)
        .map_err(|e| EnrichError::TokenMetadata(format!("{}: {e}", C::SIGNATURE)))
}
