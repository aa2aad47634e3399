pub mod clock;
pub mod config;
pub mod crypto;
pub mod keystore;
pub mod page;
pub mod rpc;
pub mod signer;

pub use clock::SystemClockAdapter;
pub use config::{BridgeConfig, ConfigError, LogFormat};
pub use keystore::KeystoreAdapter;
pub use page::ScriptSinkAdapter;
pub use rpc::JsonRpcAdapter;
pub use signer::LocalSignerAdapter;
