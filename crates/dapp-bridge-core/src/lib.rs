pub mod chain_registry;
pub mod channel;
pub mod coordinator;
pub mod credential;
pub mod domain;
pub mod enrichment;
pub mod event_queue;
pub mod navigation;
pub mod nonce;
pub mod ports;
pub mod state_machine;

pub use chain_registry::{ChainRegistry, RegistryError};
pub use channel::{Inbound, MessageChannel, PageCommand, DAPP_CHANNEL};
pub use coordinator::{ApprovalCoordinator, BridgeContext, CoordinatorError};
pub use credential::{Credential, CredentialCache};
pub use domain::{
    ChainConfig, ProviderError, ProviderEvent, ProviderRequest, TimestampMs, TransactionPayload,
    WalletIdentity,
};
pub use enrichment::{Classification, TransactionEnricher};
pub use event_queue::ScriptQueue;
pub use navigation::{NavigationAction, NavigationPolicy};
pub use ports::{
    ApprovalUiPort, ChainRpcPort, ClockPort, CredentialStorePort, PagePort, PortError,
    SigningPort,
};
pub use state_machine::{ApprovalAction, ApprovalState, StateTransition};
