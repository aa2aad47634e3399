use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::dyn_abi::TypedData;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::local::coins_bip39::English;
use alloy::signers::local::{MnemonicBuilder, PrivateKeySigner};
use alloy::signers::SignerSync;
use tracing::{debug, info};

use dapp_bridge_core::{
    ChainConfig, ChainRpcPort, Credential, PortError, SigningPort, TransactionPayload,
};

/// Derives the account at `index` on the standard Ethereum path.
pub fn derive_signer(phrase: &str, index: u32) -> Result<PrivateKeySigner, PortError> {
    MnemonicBuilder::<English>::default()
        .phrase(phrase)
        .index(index)
        .map_err(|e| PortError::Validation(format!("invalid derivation index: {e}")))?
        .build()
        .map_err(|e| PortError::Validation(format!("invalid mnemonic: {e}")))
}

/// Signs with a key derived from the unlocked mnemonic and broadcasts
/// through `rpc`.
#[derive(Debug)]
pub struct LocalSignerAdapter<R> {
    rpc: R,
    derivation_index: u32,
}

impl<R: ChainRpcPort> LocalSignerAdapter<R> {
    pub fn new(rpc: R, derivation_index: u32) -> Self {
        Self {
            rpc,
            derivation_index,
        }
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub fn address(&self, credential: &Credential) -> Result<Address, PortError> {
        Ok(self.signer(credential)?.address())
    }

    fn signer(&self, credential: &Credential) -> Result<PrivateKeySigner, PortError> {
        derive_signer(credential.expose(), self.derivation_index)
    }

    /// Builds and signs the transaction, returning the EIP-2718 encoding.
    pub fn sign_transaction(
        &self,
        chain: &ChainConfig,
        tx: &TransactionPayload,
        credential: &Credential,
    ) -> Result<Bytes, PortError> {
        let signer = self.signer(credential)?;
        if let Some(from) = tx.from {
            if from != signer.address() {
                return Err(PortError::Validation(format!(
                    "sender {from} does not match unlocked account {}",
                    signer.address()
                )));
            }
        }
        let nonce = match tx.nonce {
            Some(nonce) => nonce,
            None => self.rpc.transaction_count(chain, signer.address())?,
        };
        let gas_limit = tx
            .gas
            .ok_or_else(|| PortError::Validation("transaction has no gas limit".to_owned()))?;
        let to = tx.to.map(TxKind::Call).unwrap_or(TxKind::Create);
        let value = tx.value.unwrap_or_default();
        let input = tx.data.clone().unwrap_or_default();

        let envelope: TxEnvelope = if let Some(max_fee) = tx.max_fee_per_gas {
            let mut unsigned = TxEip1559 {
                chain_id: chain.chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas: to_u128(max_fee, "maxFeePerGas")?,
                max_priority_fee_per_gas: to_u128(
                    tx.max_priority_fee_per_gas.unwrap_or_default(),
                    "maxPriorityFeePerGas",
                )?,
                to,
                value,
                input,
                ..TxEip1559::default()
            };
            let signature = signer
                .sign_transaction_sync(&mut unsigned)
                .map_err(|e| PortError::Transport(format!("transaction signing failed: {e}")))?;
            unsigned.into_signed(signature).into()
        } else {
            let gas_price = match tx.gas_price {
                Some(price) => price,
                None => self.rpc.fee_data(chain)?.gas_price.ok_or_else(|| {
                    PortError::Validation("no gas price available".to_owned())
                })?,
            };
            let mut unsigned = TxLegacy {
                chain_id: Some(chain.chain_id),
                nonce,
                gas_price: to_u128(gas_price, "gasPrice")?,
                gas_limit,
                to,
                value,
                input,
            };
            let signature = signer
                .sign_transaction_sync(&mut unsigned)
                .map_err(|e| PortError::Transport(format!("transaction signing failed: {e}")))?;
            unsigned.into_signed(signature).into()
        };

        debug!(
            chain_id = %chain.chain_id_hex(),
            nonce,
            tx_hash = %envelope.tx_hash(),
            "transaction signed"
        );
        Ok(Bytes::from(envelope.encoded_2718()))
    }
}

fn to_u128(value: U256, field: &str) -> Result<u128, PortError> {
    u128::try_from(value).map_err(|_| PortError::Validation(format!("{field} out of range")))
}

impl<R: ChainRpcPort> SigningPort for LocalSignerAdapter<R> {
    fn sign_personal_message(
        &self,
        data: &[u8],
        credential: &Credential,
    ) -> Result<Bytes, PortError> {
        let signature = self
            .signer(credential)?
            .sign_message_sync(data)
            .map_err(|e| PortError::Transport(format!("message signing failed: {e}")))?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    fn sign_typed_data_v4(&self, raw: &str, credential: &Credential) -> Result<Bytes, PortError> {
        let typed: TypedData = serde_json::from_str(raw)
            .map_err(|e| PortError::Validation(format!("typed data malformed: {e}")))?;
        let hash: B256 = typed
            .eip712_signing_hash()
            .map_err(|e| PortError::Validation(format!("typed data hashing failed: {e}")))?;
        let signature = self
            .signer(credential)?
            .sign_hash_sync(&hash)
            .map_err(|e| PortError::Transport(format!("typed data signing failed: {e}")))?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    fn send_contract_call_transaction(
        &self,
        chain: &ChainConfig,
        tx: &TransactionPayload,
        credential: &Credential,
    ) -> Result<B256, PortError> {
        let raw = self.sign_transaction(chain, tx, credential)?;
        let hash = self.rpc.send_raw_transaction(chain, raw)?;
        info!(chain_id = %chain.chain_id_hex(), tx_hash = %hash, "transaction broadcast");
        Ok(hash)
    }
}
