use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::Address;
use tracing::debug;

use crate::domain::ChainConfig;
use crate::ports::{ChainRpcPort, PortError};

/// Hands out nonces per `(chain, address)` so two transactions prepared
/// back to back never reuse the node's pending count.
#[derive(Debug, Default)]
pub struct NonceSequencer {
    next: Mutex<HashMap<(u64, Address), u64>>,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `max(node pending count, last reserved + 1)`.
    pub fn reserve<R: ChainRpcPort>(
        &self,
        rpc: &R,
        chain: &ChainConfig,
        address: Address,
    ) -> Result<u64, PortError> {
        let mut g = self
            .next
            .lock()
            .map_err(|e| PortError::Transport(format!("nonce lock poisoned: {e}")))?;
        let remote = rpc.transaction_count(chain, address)?;
        let key = (chain.chain_id, address);
        let nonce = g.get(&key).map_or(remote, |local| (*local).max(remote));
        g.insert(key, nonce.saturating_add(1));
        debug!(chain_id = %chain.chain_id_hex(), %address, nonce, remote, "nonce reserved");
        Ok(nonce)
    }

    /// Gives back the most recent reservation after a failed broadcast.
    pub fn release(&self, chain_id: u64, address: Address, nonce: u64) -> Result<(), PortError> {
        let mut g = self
            .next
            .lock()
            .map_err(|e| PortError::Transport(format!("nonce lock poisoned: {e}")))?;
        let key = (chain_id, address);
        if g.get(&key) == Some(&nonce.saturating_add(1)) {
            g.insert(key, nonce);
        }
        Ok(())
    }
}
