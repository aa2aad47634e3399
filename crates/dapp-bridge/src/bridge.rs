//! Wires the concrete adapters into the approval coordinator and maps host
//! commands onto it.

use std::sync::mpsc::{self, Receiver};

use tracing::{info, warn};

use dapp_bridge_adapters::{
    BridgeConfig, JsonRpcAdapter, KeystoreAdapter, LocalSignerAdapter, ScriptSinkAdapter,
    SystemClockAdapter,
};
use dapp_bridge_core::domain::parse_chain_id;
use dapp_bridge_core::{
    ApprovalCoordinator, BridgeContext, CoordinatorError, MessageChannel, NavigationAction,
    NavigationPolicy, PortError, TransactionEnricher,
};

use crate::host::{HostCommand, HostEvent, HostUi};

pub type BridgeCoordinator = ApprovalCoordinator<
    JsonRpcAdapter,
    LocalSignerAdapter<JsonRpcAdapter>,
    KeystoreAdapter,
    HostUi,
    ScriptSinkAdapter,
    SystemClockAdapter,
>;

pub struct DappBridge {
    coordinator: BridgeCoordinator,
    navigation: NavigationPolicy,
    page_url: Option<String>,
    scripts: Receiver<String>,
    events: Receiver<HostEvent>,
}

impl DappBridge {
    pub fn from_config(config: &BridgeConfig) -> Result<Self, PortError> {
        let keystore = match &config.keystore_path {
            Some(path) => KeystoreAdapter::open(path, config.kdf)?,
            None => {
                warn!("no keystore path configured; wallets live in memory only");
                KeystoreAdapter::in_memory(config.kdf)
            }
        }
        .with_derivation_index(config.derivation_index);
        Self::with_keystore(config, keystore)
    }

    pub fn with_keystore(
        config: &BridgeConfig,
        keystore: KeystoreAdapter,
    ) -> Result<Self, PortError> {
        let context = match keystore.wallet(&config.wallet_id) {
            Ok(wallet) => BridgeContext::new(wallet, config.credential_ttl_ms),
            Err(PortError::NotFound(_)) => {
                warn!(
                    wallet_id = %config.wallet_id,
                    "wallet not in keystore; no account until one is imported"
                );
                BridgeContext::without_wallet(config.credential_ttl_ms)
            }
            Err(e) => return Err(e),
        };

        let (page, scripts) = ScriptSinkAdapter::channel();
        let (events_tx, events) = mpsc::channel();
        let coordinator = ApprovalCoordinator::new(
            JsonRpcAdapter::with_config(config)?,
            LocalSignerAdapter::new(
                JsonRpcAdapter::with_config(config)?,
                config.derivation_index,
            ),
            keystore,
            HostUi::new(events_tx),
            SystemClockAdapter,
            MessageChannel::with_channel_name(page, config.channel_name.clone()),
            context,
        )
        .with_enricher(TransactionEnricher::new(config.default_gas_limit));

        Ok(Self {
            coordinator,
            navigation: NavigationPolicy,
            page_url: None,
            scripts,
            events,
        })
    }

    pub fn coordinator(&self) -> &BridgeCoordinator {
        &self.coordinator
    }

    /// Runs one command and returns everything it produced, scripts first.
    /// Command failures are reported as an `error` event, never propagated.
    pub fn handle(&mut self, command: HostCommand) -> Vec<HostEvent> {
        let mut out = Vec::new();
        if let Err(e) = self.apply(command, &mut out) {
            warn!(error = %e, "host command failed");
            out.push(HostEvent::Error {
                message: e.to_string(),
            });
        }
        let mut drained: Vec<HostEvent> = self
            .scripts
            .try_iter()
            .map(|script| HostEvent::Script { script })
            .collect();
        drained.extend(self.events.try_iter());
        drained.extend(out);
        drained
    }

    fn apply(
        &mut self,
        command: HostCommand,
        out: &mut Vec<HostEvent>,
    ) -> Result<(), CoordinatorError> {
        match command {
            HostCommand::Ipc { channel, args } => {
                self.coordinator.handle_message(&channel, &args)
            }
            HostCommand::Password { password } => self.coordinator.password_entered(&password),
            HostCommand::Confirm => self.coordinator.confirm(),
            HostCommand::Cancel => self.coordinator.cancel(),
            HostCommand::ApproveChain => self.coordinator.approve_chain(),
            HostCommand::PageLoading { url } => {
                self.page_url = url;
                self.coordinator.page_loading();
                Ok(())
            }
            HostCommand::PageReady => {
                let flushed = self.coordinator.page_ready()?;
                info!(flushed, "page ready");
                Ok(())
            }
            HostCommand::Lock => {
                self.coordinator.lock();
                Ok(())
            }
            HostCommand::Navigate { url } => {
                let action = self.navigation.decide(&url, self.page_url.as_deref());
                if action == NavigationAction::NavigateInPlace {
                    self.page_url = Some(url.clone());
                }
                out.push(HostEvent::Navigation { url, action });
                Ok(())
            }
            HostCommand::ImportWallet {
                wallet_id,
                password,
                phrase,
            } => {
                let keystore = &self.coordinator.keystore;
                if !keystore.has_password()? {
                    keystore.set_password(&password)?;
                }
                let wallet = keystore.import_mnemonic(&password, &wallet_id, &phrase)?;
                self.coordinator.switch_wallet(wallet);
                Ok(())
            }
            HostCommand::SwitchWallet { wallet_id } => {
                let wallet = self.coordinator.keystore.wallet(&wallet_id)?;
                self.coordinator.switch_wallet(wallet);
                Ok(())
            }
            HostCommand::AddChain { chain } => self.coordinator.add_chain(chain),
            HostCommand::UpdateChain { chain } => self.coordinator.update_chain(chain),
            HostCommand::SelectChain { chain_id } => {
                let chain_id = parse_chain_id(&chain_id).map_err(PortError::Validation)?;
                self.coordinator.select_chain(chain_id)
            }
            HostCommand::RemoveChain { chain_id } => {
                let chain_id = parse_chain_id(&chain_id).map_err(PortError::Validation)?;
                self.coordinator.remove_chain(chain_id).map(|_| ())
            }
        }
    }
}
