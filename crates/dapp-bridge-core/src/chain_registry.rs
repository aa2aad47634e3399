//! Known EVM chains and the single selected chain.

use thiserror::Error;
use tracing::info;

use crate::domain::{format_chain_id, parse_chain_id, ChainConfig, NativeCurrency};

pub const CRONOS_MAINNET_CHAIN_ID: u64 = 25;
pub const CRONOS_TESTNET_CHAIN_ID: u64 = 338;
pub const ETHEREUM_MAINNET_CHAIN_ID: u64 = 1;

const DEFAULT_CHAIN_IDS: [u64; 3] = [
    CRONOS_MAINNET_CHAIN_ID,
    CRONOS_TESTNET_CHAIN_ID,
    ETHEREUM_MAINNET_CHAIN_ID,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("chain {0} is already registered")]
    DuplicateChain(String),
    #[error("chain {0} is not registered")]
    UnknownChain(String),
    #[error("chain {0} is a built-in network and cannot be changed")]
    ImmutableDefault(String),
    #[error("chain {0} is currently selected")]
    SelectedChain(String),
    #[error("invalid chain config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<ChainConfig>,
    selected: usize,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ChainRegistry {
    /// Seeds the built-in networks and selects Cronos mainnet.
    pub fn with_defaults() -> Self {
        Self {
            chains: default_chains(),
            selected: 0,
        }
    }

    pub fn is_default(chain_id: u64) -> bool {
        DEFAULT_CHAIN_IDS.contains(&chain_id)
    }

    pub fn list(&self) -> &[ChainConfig] {
        &self.chains
    }

    pub fn get(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.get(chain_id).is_some()
    }

    pub fn selected(&self) -> &ChainConfig {
        &self.chains[self.selected]
    }

    /// True iff no registered chain already uses `chain_id`.
    pub fn validate(&self, chain_id: u64) -> bool {
        !self.contains(chain_id)
    }

    /// Form-facing variant of [`Self::validate`]; unparsable ids never validate.
    pub fn validate_hex(&self, raw: &str) -> bool {
        parse_chain_id(raw).is_ok_and(|id| self.validate(id))
    }

    pub fn add(&mut self, config: ChainConfig) -> Result<(), RegistryError> {
        validate_config(&config)?;
        if self.contains(config.chain_id) {
            return Err(RegistryError::DuplicateChain(config.chain_id_hex()));
        }
        info!(chain_id = %config.chain_id_hex(), name = %config.chain_name, "chain added");
        self.chains.push(config);
        Ok(())
    }

    pub fn update(&mut self, config: ChainConfig) -> Result<(), RegistryError> {
        validate_config(&config)?;
        if Self::is_default(config.chain_id) {
            return Err(RegistryError::ImmutableDefault(config.chain_id_hex()));
        }
        let slot = self
            .chains
            .iter_mut()
            .find(|c| c.chain_id == config.chain_id)
            .ok_or_else(|| RegistryError::UnknownChain(config.chain_id_hex()))?;
        *slot = config;
        Ok(())
    }

    pub fn remove(&mut self, chain_id: u64) -> Result<ChainConfig, RegistryError> {
        let hex = format_chain_id(chain_id);
        if Self::is_default(chain_id) {
            return Err(RegistryError::ImmutableDefault(hex));
        }
        let idx = self
            .position(chain_id)
            .ok_or_else(|| RegistryError::UnknownChain(hex.clone()))?;
        if idx == self.selected {
            return Err(RegistryError::SelectedChain(hex));
        }
        if idx < self.selected {
            self.selected -= 1;
        }
        info!(chain_id = %hex, "chain removed");
        Ok(self.chains.remove(idx))
    }

    pub fn set_selected(&mut self, chain_id: u64) -> Result<&ChainConfig, RegistryError> {
        let idx = self
            .position(chain_id)
            .ok_or_else(|| RegistryError::UnknownChain(format_chain_id(chain_id)))?;
        if idx != self.selected {
            info!(chain_id = %format_chain_id(chain_id), "selected chain changed");
        }
        self.selected = idx;
        Ok(&self.chains[idx])
    }

    fn position(&self, chain_id: u64) -> Option<usize> {
        self.chains.iter().position(|c| c.chain_id == chain_id)
    }
}

pub fn validate_config(config: &ChainConfig) -> Result<(), RegistryError> {
    if config.chain_name.trim().is_empty() {
        return Err(RegistryError::InvalidConfig("chainName is empty".to_owned()));
    }
    let Some(rpc) = config.primary_rpc_url() else {
        return Err(RegistryError::InvalidConfig("rpcUrls is empty".to_owned()));
    };
    if !(rpc.starts_with("https://") || rpc.starts_with("http://")) {
        return Err(RegistryError::InvalidConfig(format!(
            "rpc url must be http(s): {rpc}"
        )));
    }
    Ok(())
}

pub fn default_chains() -> Vec<ChainConfig> {
    vec![
        ChainConfig {
            chain_id: CRONOS_MAINNET_CHAIN_ID,
            chain_name: "Cronos Mainnet".to_owned(),
            rpc_urls: vec!["https://evm.cronos.org".to_owned()],
            block_explorer_urls: vec!["https://explorer.cronos.org".to_owned()],
            native_currency: NativeCurrency {
                decimals: 18,
                name: "Cronos".to_owned(),
                symbol: "CRO".to_owned(),
            },
        },
        ChainConfig {
            chain_id: CRONOS_TESTNET_CHAIN_ID,
            chain_name: "Cronos Testnet".to_owned(),
            rpc_urls: vec!["https://evm-t3.cronos.org".to_owned()],
            block_explorer_urls: vec!["https://explorer.cronos.org/testnet".to_owned()],
            native_currency: NativeCurrency {
                decimals: 18,
                name: "Test Cronos".to_owned(),
                symbol: "TCRO".to_owned(),
            },
        },
        ChainConfig {
            chain_id: ETHEREUM_MAINNET_CHAIN_ID,
            chain_name: "Ethereum Mainnet".to_owned(),
            rpc_urls: vec!["https://cloudflare-eth.com".to_owned()],
            block_explorer_urls: vec!["https://etherscan.io".to_owned()],
            native_currency: NativeCurrency {
                decimals: 18,
                name: "Ether".to_owned(),
                symbol: "ETH".to_owned(),
            },
        },
    ]
}
