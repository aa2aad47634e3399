use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use dapp_bridge_core::domain::DEFAULT_GAS_LIMIT;
use dapp_bridge_core::DAPP_CHANNEL;

use crate::crypto::KdfParams;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "compact" => Ok(Self::Compact),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub channel_name: String,
    pub rpc_timeout_ms: u64,
    pub credential_ttl_ms: u64,
    pub default_gas_limit: u64,
    pub priority_fee_wei: u128,
    pub keystore_path: Option<PathBuf>,
    pub wallet_id: String,
    pub derivation_index: u32,
    pub log_format: LogFormat,
    pub kdf: KdfParams,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_name: DAPP_CHANNEL.to_owned(),
            rpc_timeout_ms: 15_000,
            credential_ttl_ms: 5 * 60 * 1000,
            default_gas_limit: DEFAULT_GAS_LIMIT,
            priority_fee_wei: 1_500_000_000,
            keystore_path: None,
            wallet_id: "default".to_owned(),
            derivation_index: 0,
            log_format: LogFormat::Full,
            kdf: KdfParams::default(),
        }
    }
}

impl BridgeConfig {
    pub const ENV_PREFIX: &'static str = "DAPP_BRIDGE_";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `DAPP_BRIDGE_*` keys resolved through `lookup`.
    /// Unset keys keep their defaults; unparsable values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{}{key}", Self::ENV_PREFIX)).filter(|v| !v.trim().is_empty())
        };
        let mut cfg = Self::default();

        if let Some(v) = get("CHANNEL") {
            cfg.channel_name = v;
        }
        parse_into(get("RPC_TIMEOUT_MS"), "RPC_TIMEOUT_MS", &mut cfg.rpc_timeout_ms)?;
        parse_into(
            get("CREDENTIAL_TTL_MS"),
            "CREDENTIAL_TTL_MS",
            &mut cfg.credential_ttl_ms,
        )?;
        parse_into(
            get("DEFAULT_GAS_LIMIT"),
            "DEFAULT_GAS_LIMIT",
            &mut cfg.default_gas_limit,
        )?;
        parse_into(
            get("PRIORITY_FEE_WEI"),
            "PRIORITY_FEE_WEI",
            &mut cfg.priority_fee_wei,
        )?;
        if let Some(v) = get("KEYSTORE") {
            cfg.keystore_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("WALLET_ID") {
            cfg.wallet_id = v;
        }
        parse_into(
            get("DERIVATION_INDEX"),
            "DERIVATION_INDEX",
            &mut cfg.derivation_index,
        )?;
        parse_into(get("LOG_FORMAT"), "LOG_FORMAT", &mut cfg.log_format)?;
        parse_into(get("KDF_MEMORY_KIB"), "KDF_MEMORY_KIB", &mut cfg.kdf.memory_kib)?;
        parse_into(get("KDF_ITERATIONS"), "KDF_ITERATIONS", &mut cfg.kdf.iterations)?;

        if cfg.rpc_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RPC_TIMEOUT_MS",
                value: "0".to_owned(),
            });
        }
        Ok(cfg)
    }
}

fn parse_into<T: FromStr>(
    raw: Option<String>,
    key: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    let Some(raw) = raw else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value: raw })?;
    Ok(())
}
