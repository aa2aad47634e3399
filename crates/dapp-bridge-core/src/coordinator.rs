use std::collections::VecDeque;

use alloy::primitives::{Address, Bytes, PrimitiveSignature, U256};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::chain_registry::{validate_config, ChainRegistry, RegistryError};
use crate::channel::{Inbound, MessageChannel};
use crate::credential::{Credential, CredentialCache};
use crate::domain::{
    message_bytes, ApprovalKind, ChainApproval, ChainConfig, ConfirmationSummary,
    EcRecoverPayload, FinishOutcome, PasswordPrompt, ProviderError, ProviderEvent,
    ProviderRequest, RequestId, SwitchChainPayload, TimestampMs, TransactionPayload,
    WalletIdentity, DEFAULT_GAS_LIMIT,
};
use crate::enrichment::{Classification, TransactionEnricher};
use crate::navigation::is_web_scheme;
use crate::ports::{
    ApprovalUiPort, ChainRpcPort, ClockPort, CredentialStorePort, PagePort, PortError,
    SigningPort,
};
use crate::state_machine::{
    approval_transition, ApprovalAction, ApprovalState, StateTransition, TransitionError,
};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("password rejected")]
    InvalidPassword,
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: U256, available: U256 },
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("no active request")]
    NoActiveRequest,
    #[error("no wallet loaded")]
    NoWallet,
}

/// Session state shared by every request: known chains, the active wallet
/// and its cached credential.
#[derive(Debug)]
pub struct BridgeContext {
    chains: ChainRegistry,
    wallet: Option<WalletIdentity>,
    credentials: CredentialCache,
}

impl BridgeContext {
    pub fn new(wallet: WalletIdentity, credential_ttl_ms: u64) -> Self {
        Self {
            wallet: Some(wallet),
            ..Self::without_wallet(credential_ttl_ms)
        }
    }

    /// No account is exposed to the page until a wallet is switched in.
    pub fn without_wallet(credential_ttl_ms: u64) -> Self {
        Self {
            chains: ChainRegistry::with_defaults(),
            wallet: None,
            credentials: CredentialCache::new(credential_ttl_ms),
        }
    }

    pub fn with_chains(mut self, chains: ChainRegistry) -> Self {
        self.chains = chains;
        self
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    pub fn wallet(&self) -> Option<&WalletIdentity> {
        self.wallet.as_ref()
    }

    pub fn address(&self) -> Option<Address> {
        self.wallet.as_ref().map(|w| w.address)
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }
}

struct ActiveRequest {
    event: ProviderEvent,
    /// Chain selected when the request was accepted; signing targets it even
    /// if the selection changes afterwards.
    chain: ChainConfig,
    kind: Option<ApprovalKind>,
    summary: Option<ConfirmationSummary>,
    /// Set when the password was entered for this request.
    credential: Option<Credential>,
}

impl ActiveRequest {
    fn new(event: ProviderEvent, chain: ChainConfig, kind: Option<ApprovalKind>) -> Self {
        Self {
            event,
            chain,
            kind,
            summary: None,
            credential: None,
        }
    }
}

/// Drives provider requests from the page through approval and signing.
///
/// Requests needing approval are served strictly one at a time in arrival
/// order; everything else is answered immediately. Every request accepted
/// from the page is answered exactly once.
pub struct ApprovalCoordinator<R, S, K, U, P, C>
where
    R: ChainRpcPort,
    S: SigningPort,
    K: CredentialStorePort,
    U: ApprovalUiPort,
    P: PagePort,
    C: ClockPort,
{
    pub rpc: R,
    pub signer: S,
    pub keystore: K,
    pub ui: U,
    pub clock: C,
    channel: MessageChannel<P>,
    context: BridgeContext,
    enricher: TransactionEnricher,
    state: ApprovalState,
    active: Option<ActiveRequest>,
    pending: VecDeque<ProviderEvent>,
}

impl<R, S, K, U, P, C> ApprovalCoordinator<R, S, K, U, P, C>
where
    R: ChainRpcPort,
    S: SigningPort,
    K: CredentialStorePort,
    U: ApprovalUiPort,
    P: PagePort,
    C: ClockPort,
{
    pub fn new(
        rpc: R,
        signer: S,
        keystore: K,
        ui: U,
        clock: C,
        channel: MessageChannel<P>,
        context: BridgeContext,
    ) -> Self {
        Self {
            rpc,
            signer,
            keystore,
            ui,
            clock,
            channel,
            context,
            enricher: TransactionEnricher::default(),
            state: ApprovalState::Idle,
            active: None,
            pending: VecDeque::new(),
        }
    }

    pub fn with_enricher(mut self, enricher: TransactionEnricher) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn state(&self) -> ApprovalState {
        self.state
    }

    pub fn active_request(&self) -> Option<&ProviderEvent> {
        self.active.as_ref().map(|a| &a.event)
    }

    pub fn active_summary(&self) -> Option<&ConfirmationSummary> {
        self.active.as_ref().and_then(|a| a.summary.as_ref())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn context(&self) -> &BridgeContext {
        &self.context
    }

    pub fn channel(&self) -> &MessageChannel<P> {
        &self.channel
    }

    /// Entry point for raw channel traffic from the page.
    pub fn handle_message(&mut self, channel: &str, args: &[Value]) -> Result<(), CoordinatorError> {
        match self.channel.receive(channel, args) {
            Inbound::Ignored => Ok(()),
            Inbound::Malformed { id, error } => {
                self.channel.send_error(id, &error);
                Ok(())
            }
            Inbound::Event(event) => self.dispatch(event),
        }
    }

    pub fn dispatch(&mut self, event: ProviderEvent) -> Result<(), CoordinatorError> {
        let id = event.id;
        info!(id, method = event.request.name(), "provider request");
        match event.request {
            ProviderRequest::RequestAccounts => match self.context.address() {
                Some(address) => self.channel.send_responses(id, vec![json!(address)]),
                None => self.channel.send_error(id, &no_wallet()),
            },
            ProviderRequest::EcRecover(payload) => match recover_signer(&payload) {
                Ok(address) => self.channel.send_response(id, Some(json!(address))),
                Err(e) => self.channel.send_error(id, &e),
            },
            ProviderRequest::WatchAsset(asset) => {
                let outcome = if asset.asset_type.eq_ignore_ascii_case("ERC20") {
                    self.ui
                        .watch_asset(&asset)
                        .map_err(|e| ProviderError::internal(e.to_string()))
                } else {
                    Err(ProviderError::invalid_params(format!(
                        "unsupported asset type: {}",
                        asset.asset_type
                    )))
                };
                self.respond_flag(id, outcome);
            }
            ProviderRequest::OpenLinkInDefaultBrowser(link) => {
                let outcome = match Url::parse(&link.url) {
                    Ok(url) if is_web_scheme(&url) => self
                        .ui
                        .open_external(&link.url)
                        .map_err(|e| ProviderError::internal(e.to_string())),
                    _ => Err(ProviderError::invalid_params(format!(
                        "refusing to open {}",
                        link.url
                    ))),
                };
                self.respond_flag(id, outcome);
            }
            ProviderRequest::TokenApproval(_) => {
                self.channel.send_error(
                    id,
                    &ProviderError::unsupported("tokenApproval is not a provider method"),
                );
            }
            request @ (ProviderRequest::SendTransaction(_)
            | ProviderRequest::SignMessage(_)
            | ProviderRequest::SignPersonalMessage(_)
            | ProviderRequest::SignTypedMessage(_)) => {
                if self.context.wallet.is_none() {
                    self.channel.send_error(id, &no_wallet());
                } else {
                    self.enqueue(ProviderEvent::new(id, request))?;
                }
            }
            request @ (ProviderRequest::AddEthereumChain(_)
            | ProviderRequest::SwitchEthereumChain(_)) => {
                self.enqueue(ProviderEvent::new(id, request))?;
            }
        }
        Ok(())
    }

    pub fn password_entered(&mut self, password: &str) -> Result<(), CoordinatorError> {
        approval_transition(self.state, ApprovalAction::PasswordAccepted)?;
        if self.active.is_none() {
            return Err(CoordinatorError::NoActiveRequest);
        }
        if !self.keystore.check_password_valid(password)? {
            warn!("password rejected");
            return Err(CoordinatorError::InvalidPassword);
        }
        let wallet_id = self
            .context
            .wallet
            .as_ref()
            .ok_or(CoordinatorError::NoWallet)?
            .wallet_id
            .clone();
        let credential = self.keystore.decrypt(password, &wallet_id)?;
        let now = TimestampMs(self.clock.now_ms()?);
        self.context
            .credentials
            .store(&wallet_id, credential.clone(), now);
        if let Some(active) = self.active.as_mut() {
            active.credential = Some(credential);
        }
        self.apply(ApprovalAction::PasswordAccepted)?;
        self.surface_or_fail(Self::surface_confirmation)
    }

    pub fn confirm(&mut self) -> Result<(), CoordinatorError> {
        approval_transition(self.state, ApprovalAction::Confirm)?;
        let active = self.active.as_ref().ok_or(CoordinatorError::NoActiveRequest)?;
        if let Some(summary) = active.summary.as_ref().filter(|s| !s.sufficient_balance) {
            return Err(CoordinatorError::InsufficientBalance {
                needed: summary.total,
                available: summary.balance.unwrap_or_default(),
            });
        }

        let now = TimestampMs(self.clock.now_ms()?);
        let credential = match active.credential.clone() {
            Some(credential) => Some(credential),
            None => match self.context.wallet.as_ref() {
                Some(wallet) => self.context.credentials.get(&wallet.wallet_id, now),
                None => None,
            },
        };
        let Some(credential) = credential else {
            info!("cached credential expired before confirmation");
            self.apply(ApprovalAction::CredentialExpired)?;
            return self.surface_or_fail(Self::surface_password);
        };

        self.apply(ApprovalAction::Confirm)?;
        let active = self.active.take().ok_or(CoordinatorError::NoActiveRequest)?;
        let id = active.event.id;
        let result = self.sign(&active, &credential);
        match &result {
            Ok(value) => {
                info!(id, kind = ?active.kind, "request signed");
                self.channel.send_response(id, Some(value.clone()));
            }
            Err(reason) => {
                warn!(id, kind = ?active.kind, %reason, "signing failed");
                self.channel
                    .send_error(id, &ProviderError::internal(reason.clone()));
            }
        }
        self.ui.on_finish_transaction(&FinishOutcome { id, result });
        self.apply(ApprovalAction::SigningFinished)?;
        self.advance()
    }

    /// Accepts the pending add/switch chain request.
    pub fn approve_chain(&mut self) -> Result<(), CoordinatorError> {
        approval_transition(self.state, ApprovalAction::ChainResolved)?;
        let active = self.active.take().ok_or(CoordinatorError::NoActiveRequest)?;
        let id = active.event.id;
        let outcome = match active.event.request {
            ProviderRequest::AddEthereumChain(config) => {
                let chain_id = config.chain_id;
                self.context
                    .chains
                    .add(config)
                    .and_then(|()| self.context.chains.set_selected(chain_id).map(|_| ()))
                    .map_err(|e| ProviderError::invalid_params(e.to_string()))
            }
            ProviderRequest::SwitchEthereumChain(payload) => self
                .context
                .chains
                .set_selected(payload.chain_id)
                .map(|_| ())
                .map_err(|_| ProviderError::unrecognized_chain(payload.chain_id)),
            other @ (ProviderRequest::RequestAccounts
            | ProviderRequest::SendTransaction(_)
            | ProviderRequest::TokenApproval(_)
            | ProviderRequest::SignMessage(_)
            | ProviderRequest::SignPersonalMessage(_)
            | ProviderRequest::SignTypedMessage(_)
            | ProviderRequest::EcRecover(_)
            | ProviderRequest::WatchAsset(_)
            | ProviderRequest::OpenLinkInDefaultBrowser(_)) => Err(ProviderError::internal(
                format!("{} is not a chain request", other.name()),
            )),
        };
        match outcome {
            Ok(()) => {
                self.inject_selected_config();
                self.channel.send_response(id, None);
            }
            Err(e) => self.channel.send_error(id, &e),
        }
        self.apply(ApprovalAction::ChainResolved)?;
        self.advance()
    }

    /// User dismissed the prompt. The page gets exactly one "Canceled" error.
    pub fn cancel(&mut self) -> Result<(), CoordinatorError> {
        approval_transition(self.state, ApprovalAction::Cancel)?;
        let active = self.active.take().ok_or(CoordinatorError::NoActiveRequest)?;
        self.apply(ApprovalAction::Cancel)?;
        info!(id = active.event.id, "request canceled");
        self.channel
            .send_error(active.event.id, &ProviderError::user_rejected());
        self.advance()
    }

    pub fn select_chain(&mut self, chain_id: u64) -> Result<(), CoordinatorError> {
        self.context.chains.set_selected(chain_id)?;
        self.inject_selected_config();
        Ok(())
    }

    pub fn add_chain(&mut self, config: ChainConfig) -> Result<(), CoordinatorError> {
        Ok(self.context.chains.add(config)?)
    }

    pub fn update_chain(&mut self, config: ChainConfig) -> Result<(), CoordinatorError> {
        let selected = self.context.chains.selected().chain_id == config.chain_id;
        self.context.chains.update(config)?;
        if selected {
            self.inject_selected_config();
        }
        Ok(())
    }

    pub fn remove_chain(&mut self, chain_id: u64) -> Result<ChainConfig, CoordinatorError> {
        Ok(self.context.chains.remove(chain_id)?)
    }

    /// Navigation started. Requests from the old document can no longer be
    /// answered, so they are dropped along with any undelivered commands.
    pub fn page_loading(&mut self) {
        let abandoned = self.pending.len() + usize::from(self.active.is_some());
        if abandoned > 0 {
            warn!(abandoned, "page navigated with unresolved requests");
        }
        self.pending.clear();
        self.abandon_active();
        self.channel.page_loading();
    }

    pub fn page_ready(&mut self) -> Result<usize, CoordinatorError> {
        let chain = self.context.chains.selected();
        Ok(self.channel.page_ready(chain, self.context.address())?)
    }

    /// Forgets the decrypted credential; the next signature needs the password.
    pub fn lock(&mut self) {
        self.context.credentials.clear();
        if let Some(active) = self.active.as_mut() {
            active.credential = None;
        }
        info!("wallet locked");
    }

    /// Rejects everything in flight, then points the page at the new account.
    pub fn switch_wallet(&mut self, wallet: WalletIdentity) {
        let rejection = ProviderError::unauthorized("Wallet changed");
        if let Some(active) = self.abandon_active() {
            self.channel.send_error(active.event.id, &rejection);
        }
        while let Some(event) = self.pending.pop_front() {
            self.channel.send_error(event.id, &rejection);
        }
        self.context.credentials.clear();
        info!(wallet_id = %wallet.wallet_id, address = %wallet.address, "wallet switched");
        let address = wallet.address;
        self.context.wallet = Some(wallet);
        self.channel.inject_address(address);
    }

    fn enqueue(&mut self, event: ProviderEvent) -> Result<(), CoordinatorError> {
        debug!(id = event.id, queued = self.pending.len() + 1, "approval request queued");
        self.pending.push_back(event);
        self.advance()
    }

    fn advance(&mut self) -> Result<(), CoordinatorError> {
        while self.state == ApprovalState::Idle && self.active.is_none() {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            let id = event.id;
            if let Err(e) = self.begin(event) {
                warn!(id, error = %e, "request aborted");
                let error = ProviderError::internal(e.to_string());
                if !self.fail_active(&error) {
                    self.channel.send_error(id, &error);
                }
            }
        }
        Ok(())
    }

    fn begin(&mut self, event: ProviderEvent) -> Result<(), CoordinatorError> {
        let id = event.id;
        let chain = self.context.chains.selected().clone();
        match event.request {
            ProviderRequest::SendTransaction(tx) => self.begin_transaction(id, tx, chain),
            ProviderRequest::AddEthereumChain(config) => self.begin_add_chain(id, config, chain),
            ProviderRequest::SwitchEthereumChain(payload) => {
                self.begin_switch_chain(id, payload.chain_id, chain)
            }
            request @ ProviderRequest::SignMessage(_) => {
                self.activate(ProviderEvent::new(id, request), ApprovalKind::SignMessage, chain)
            }
            request @ ProviderRequest::SignPersonalMessage(_) => self.activate(
                ProviderEvent::new(id, request),
                ApprovalKind::SignPersonalMessage,
                chain,
            ),
            request @ ProviderRequest::SignTypedMessage(_) => self.activate(
                ProviderEvent::new(id, request),
                ApprovalKind::SignTypedMessage,
                chain,
            ),
            // Answered by `dispatch` without entering the queue.
            request @ (ProviderRequest::RequestAccounts
            | ProviderRequest::TokenApproval(_)
            | ProviderRequest::EcRecover(_)
            | ProviderRequest::WatchAsset(_)
            | ProviderRequest::OpenLinkInDefaultBrowser(_)) => {
                self.channel.send_error(
                    id,
                    &ProviderError::internal(format!("{} does not need approval", request.name())),
                );
                Ok(())
            }
        }
    }

    fn begin_transaction(
        &mut self,
        id: RequestId,
        tx: TransactionPayload,
        chain: ChainConfig,
    ) -> Result<(), CoordinatorError> {
        let tx = match self.prepare_transaction(tx) {
            Ok(tx) => tx,
            Err(e) => {
                self.channel.send_error(id, &e);
                return Ok(());
            }
        };
        let tx = self.enricher.enrich(&self.rpc, tx, &chain);
        let (request, kind) = match self.enricher.classify(&self.rpc, tx, &chain) {
            Ok(Classification::Transfer(tx)) => {
                (ProviderRequest::SendTransaction(tx), ApprovalKind::Transfer)
            }
            Ok(Classification::ContractCall(tx)) => {
                (ProviderRequest::SendTransaction(tx), ApprovalKind::ContractCall)
            }
            Ok(Classification::TokenApproval(approval)) => (
                ProviderRequest::TokenApproval(approval),
                ApprovalKind::TokenApproval,
            ),
            Err(e) => {
                warn!(id, error = %e, "transaction classification failed");
                self.channel
                    .send_error(id, &ProviderError::invalid_params(e.to_string()));
                return Ok(());
            }
        };
        self.activate(ProviderEvent::new(id, request), kind, chain)
    }

    fn prepare_transaction(
        &self,
        mut tx: TransactionPayload,
    ) -> Result<TransactionPayload, ProviderError> {
        let wallet = self.context.address().ok_or_else(no_wallet)?;
        match tx.from {
            Some(from) if from != wallet => Err(ProviderError::unauthorized(format!(
                "sender {from} is not the active account"
            ))),
            _ => {
                tx.from = Some(wallet);
                Ok(tx)
            }
        }
    }

    fn begin_add_chain(
        &mut self,
        id: RequestId,
        config: ChainConfig,
        current: ChainConfig,
    ) -> Result<(), CoordinatorError> {
        if self.context.chains.contains(config.chain_id) {
            self.context.chains.set_selected(config.chain_id)?;
            self.inject_selected_config();
            self.channel
                .send_response(id, Some(json!(config.chain_id_hex())));
            return Ok(());
        }
        if let Err(e) = validate_config(&config) {
            self.channel
                .send_error(id, &ProviderError::invalid_params(e.to_string()));
            return Ok(());
        }
        let approval = ChainApproval::Add {
            id,
            chain: config.clone(),
        };
        self.apply(ApprovalAction::BeginChainApproval)?;
        self.active = Some(ActiveRequest::new(
            ProviderEvent::new(id, ProviderRequest::AddEthereumChain(config)),
            current,
            None,
        ));
        self.ui.request_chain_approval(&approval)?;
        Ok(())
    }

    fn begin_switch_chain(
        &mut self,
        id: RequestId,
        chain_id: u64,
        current: ChainConfig,
    ) -> Result<(), CoordinatorError> {
        let Some(target) = self.context.chains.get(chain_id).cloned() else {
            self.channel
                .send_error(id, &ProviderError::unrecognized_chain(chain_id));
            return Ok(());
        };
        if current.chain_id == chain_id {
            self.channel.send_response(id, None);
            return Ok(());
        }
        let approval = ChainApproval::Switch {
            id,
            from: current.clone(),
            to: target,
        };
        self.apply(ApprovalAction::BeginChainApproval)?;
        self.active = Some(ActiveRequest::new(
            ProviderEvent::new(
                id,
                ProviderRequest::SwitchEthereumChain(SwitchChainPayload { chain_id }),
            ),
            current,
            None,
        ));
        self.ui.request_chain_approval(&approval)?;
        Ok(())
    }

    fn activate(
        &mut self,
        event: ProviderEvent,
        kind: ApprovalKind,
        chain: ChainConfig,
    ) -> Result<(), CoordinatorError> {
        let now = TimestampMs(self.clock.now_ms()?);
        let cached = match self.context.wallet.as_ref() {
            Some(wallet) => self.context.credentials.get(&wallet.wallet_id, now).is_some(),
            None => false,
        };
        self.active = Some(ActiveRequest::new(event, chain, Some(kind)));
        if cached {
            self.apply(ApprovalAction::BeginWithCredential)?;
            self.surface_confirmation()
        } else {
            self.apply(ApprovalAction::BeginWithoutCredential)?;
            self.surface_password()
        }
    }

    fn surface_password(&mut self) -> Result<(), CoordinatorError> {
        let active = self.active.as_ref().ok_or(CoordinatorError::NoActiveRequest)?;
        let prompt = PasswordPrompt {
            id: active.event.id,
            method: active.event.request.name().to_owned(),
        };
        self.ui.request_password(&prompt)?;
        Ok(())
    }

    fn surface_confirmation(&mut self) -> Result<(), CoordinatorError> {
        let wallet = self.context.address().ok_or(CoordinatorError::NoWallet)?;
        let active = self.active.as_mut().ok_or(CoordinatorError::NoActiveRequest)?;
        let kind = active.kind.ok_or(CoordinatorError::NoActiveRequest)?;
        let summary = build_summary(&self.rpc, wallet, &active.event, &active.chain, kind);
        debug!(
            id = summary.id,
            kind = ?summary.kind,
            sufficient_balance = summary.sufficient_balance,
            "confirmation summary built"
        );
        self.ui.request_confirmation(&summary)?;
        active.summary = Some(summary);
        Ok(())
    }

    /// Runs a UI step for the active request; if the host cannot show it the
    /// request is answered with an internal error so the page is not left hanging.
    fn surface_or_fail(
        &mut self,
        surface: fn(&mut Self) -> Result<(), CoordinatorError>,
    ) -> Result<(), CoordinatorError> {
        if let Err(e) = surface(self) {
            self.fail_active(&ProviderError::internal(e.to_string()));
            self.advance()?;
            return Err(e);
        }
        Ok(())
    }

    fn sign(&self, active: &ActiveRequest, credential: &Credential) -> Result<Value, String> {
        let chain = &active.chain;
        match &active.event.request {
            ProviderRequest::SendTransaction(tx) => self.broadcast(chain, tx, credential),
            ProviderRequest::TokenApproval(approval) => {
                self.broadcast(chain, &approval.transaction, credential)
            }
            ProviderRequest::SignMessage(message) | ProviderRequest::SignPersonalMessage(message) => {
                self.signer
                    .sign_personal_message(&message.message_bytes(), credential)
                    .map(|signature| json!(signature))
                    .map_err(|e| e.to_string())
            }
            ProviderRequest::SignTypedMessage(typed) => self
                .signer
                .sign_typed_data_v4(&typed.raw, credential)
                .map(|signature| json!(signature))
                .map_err(|e| e.to_string()),
            other @ (ProviderRequest::RequestAccounts
            | ProviderRequest::EcRecover(_)
            | ProviderRequest::WatchAsset(_)
            | ProviderRequest::AddEthereumChain(_)
            | ProviderRequest::SwitchEthereumChain(_)
            | ProviderRequest::OpenLinkInDefaultBrowser(_)) => {
                Err(format!("{} is not signable", other.name()))
            }
        }
    }

    fn broadcast(
        &self,
        chain: &ChainConfig,
        tx: &TransactionPayload,
        credential: &Credential,
    ) -> Result<Value, String> {
        let mut tx = tx.clone();
        let reserved = self
            .enricher
            .assign_nonce(&self.rpc, &mut tx, chain)
            .map_err(|e| e.to_string())?;
        match self.signer.send_contract_call_transaction(chain, &tx, credential) {
            Ok(hash) => Ok(json!(hash)),
            Err(e) => {
                if let (Some(nonce), Some(from)) = (reserved, tx.from) {
                    if let Err(release) = self.enricher.nonces().release(chain.chain_id, from, nonce) {
                        warn!(error = %release, "nonce release failed");
                    }
                }
                Err(e.to_string())
            }
        }
    }

    fn respond_flag(&mut self, id: RequestId, outcome: Result<(), ProviderError>) {
        match outcome {
            Ok(()) => self.channel.send_response(id, Some(Value::Bool(true))),
            Err(e) => self.channel.send_error(id, &e),
        }
    }

    fn inject_selected_config(&mut self) {
        let chain = self.context.chains.selected();
        self.channel
            .inject_provider_config(chain, self.context.address());
    }

    fn apply(&mut self, action: ApprovalAction) -> Result<StateTransition, CoordinatorError> {
        let (next, transition) = approval_transition(self.state, action)?;
        debug!(
            from = ?transition.from,
            to = ?transition.to,
            reason = transition.reason,
            "approval transition"
        );
        self.state = next;
        Ok(transition)
    }

    /// Drops the active request without answering it; returns it to the caller.
    fn abandon_active(&mut self) -> Option<ActiveRequest> {
        if self.state != ApprovalState::Idle {
            if let Err(e) = self.apply(ApprovalAction::Cancel) {
                warn!(error = %e, "could not unwind approval state");
            }
        }
        self.active.take()
    }

    fn fail_active(&mut self, error: &ProviderError) -> bool {
        match self.abandon_active() {
            Some(active) => {
                self.channel.send_error(active.event.id, error);
                true
            }
            None => false,
        }
    }
}

fn no_wallet() -> ProviderError {
    ProviderError::unauthorized("No wallet loaded")
}

fn build_summary<R: ChainRpcPort>(
    rpc: &R,
    wallet: Address,
    event: &ProviderEvent,
    chain: &ChainConfig,
    kind: ApprovalKind,
) -> ConfirmationSummary {
    let (tx, token_data) = match &event.request {
        ProviderRequest::SendTransaction(tx) => (Some(tx), None),
        ProviderRequest::TokenApproval(approval) => {
            (Some(&approval.transaction), Some(approval.token_data.clone()))
        }
        _ => (None, None),
    };

    let Some(tx) = tx else {
        return ConfirmationSummary {
            id: event.id,
            kind,
            chain_id: chain.chain_id,
            from: wallet,
            to: None,
            value: U256::ZERO,
            network_fee: U256::ZERO,
            total: U256::ZERO,
            balance: None,
            sufficient_balance: true,
            token_data: None,
            message: message_preview(&event.request),
        };
    };

    let from = tx.from.unwrap_or(wallet);
    let value = tx.value.unwrap_or_default();
    let gas = U256::from(tx.gas.unwrap_or(DEFAULT_GAS_LIMIT));
    let network_fee = gas.saturating_mul(tx.effective_gas_price());
    let total = value.saturating_add(network_fee);
    let balance = match rpc.balance(chain, from) {
        Ok(balance) => Some(balance),
        Err(e) => {
            warn!(%from, error = %e, "balance unavailable");
            None
        }
    };
    ConfirmationSummary {
        id: event.id,
        kind,
        chain_id: chain.chain_id,
        from,
        to: tx.to,
        value,
        network_fee,
        total,
        balance,
        // Unknown balance does not block; the node rejects underfunded sends.
        sufficient_balance: balance.map_or(true, |b| b >= total),
        token_data,
        message: None,
    }
}

fn message_preview(request: &ProviderRequest) -> Option<String> {
    match request {
        ProviderRequest::SignMessage(message) | ProviderRequest::SignPersonalMessage(message) => {
            Some(String::from_utf8(message.message_bytes()).unwrap_or_else(|_| message.data.clone()))
        }
        ProviderRequest::SignTypedMessage(typed) => Some(typed.raw.clone()),
        _ => None,
    }
}

/// `personal_ecRecover`: signer of an EIP-191 personal message.
pub fn recover_signer(payload: &EcRecoverPayload) -> Result<Address, ProviderError> {
    let raw: Bytes = payload
        .signature
        .parse()
        .map_err(|e| ProviderError::invalid_params(format!("invalid signature hex: {e}")))?;
    let signature = PrimitiveSignature::from_raw(raw.as_ref())
        .map_err(|e| ProviderError::invalid_params(format!("invalid signature: {e}")))?;
    signature
        .recover_address_from_msg(message_bytes(&payload.message))
        .map_err(|e| ProviderError::invalid_params(format!("signature recovery failed: {e}")))
}
