//! Transport between the isolated page script and the host.
//!
//! Inbound frames arrive as JSON values on a named channel. Outbound traffic
//! is always a [`PageCommand`] serialized to JSON and handed to a fixed
//! dispatcher as an escaped string literal, so nothing the page sent is ever
//! spliced into script text.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{
    ChainConfig, EventDecodeError, ProviderError, ProviderEvent, RequestId,
};
use crate::event_queue::ScriptQueue;
use crate::ports::{PagePort, PortError};

pub const DAPP_CHANNEL: &str = "dapp";

/// Global installed by the in-page provider script.
pub const PAGE_DISPATCHER: &str = "window.__dappBridge.dispatch";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "method",
    content = "params",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum PageCommand {
    SetAddress {
        address: Address,
    },
    /// `address` is null while no wallet is loaded.
    SetConfig {
        chain_id: String,
        rpc_url: String,
        address: Option<Address>,
    },
    SendResponse {
        id: RequestId,
        value: Option<Value>,
    },
    SendResponses {
        id: RequestId,
        values: Vec<Value>,
    },
    SendError {
        id: RequestId,
        code: i64,
        message: String,
    },
    InstallNavigationGuards,
}

impl PageCommand {
    pub fn set_config(chain: &ChainConfig, address: Option<Address>) -> Self {
        Self::SetConfig {
            chain_id: chain.chain_id_hex(),
            rpc_url: chain.primary_rpc_url().unwrap_or_default().to_owned(),
            address,
        }
    }

    pub fn send_error(id: RequestId, error: &ProviderError) -> Self {
        Self::SendError {
            id,
            code: error.code,
            message: error.message.clone(),
        }
    }

    /// Renders `dispatch(JSON.parse("<escaped json>"));`.
    pub fn render(&self) -> Result<String, PortError> {
        let json = serde_json::to_string(self)
            .map_err(|e| PortError::Validation(format!("page command serialization: {e}")))?;
        let literal = serde_json::to_string(&json)
            .map_err(|e| PortError::Validation(format!("page command escaping: {e}")))?
            .replace('\u{2028}', "\\u2028")
            .replace('\u{2029}', "\\u2029");
        Ok(format!("{PAGE_DISPATCHER}(JSON.parse({literal}));"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Ignored,
    Event(ProviderEvent),
    /// Had a usable id, so the page can still be answered with an error.
    Malformed { id: RequestId, error: ProviderError },
}

pub struct MessageChannel<P: PagePort> {
    page: P,
    channel_name: String,
    queue: ScriptQueue<PageCommand>,
    ready: bool,
    guards_installed: bool,
}

impl<P: PagePort> MessageChannel<P> {
    pub fn new(page: P) -> Self {
        Self::with_channel_name(page, DAPP_CHANNEL)
    }

    pub fn with_channel_name(page: P, channel_name: impl Into<String>) -> Self {
        Self {
            page,
            channel_name: channel_name.into(),
            queue: ScriptQueue::new(),
            ready: false,
            guards_installed: false,
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn receive(&self, channel: &str, args: &[Value]) -> Inbound {
        if channel != self.channel_name {
            return Inbound::Ignored;
        }
        let Some(frame) = args.first() else {
            return Inbound::Ignored;
        };
        match ProviderEvent::from_value(frame) {
            Ok(event) => {
                debug!(id = event.id, method = event.request.name(), "provider event received");
                Inbound::Event(event)
            }
            Err(EventDecodeError::MissingId) => {
                warn!("dropping provider frame without id");
                Inbound::Ignored
            }
            Err(EventDecodeError::Malformed { id, reason }) => {
                warn!(id, %reason, "malformed provider frame");
                Inbound::Malformed {
                    id,
                    error: reason.to_provider_error(),
                }
            }
        }
    }

    pub fn send_response(&mut self, id: RequestId, value: Option<Value>) {
        self.deliver(PageCommand::SendResponse { id, value });
    }

    pub fn send_responses(&mut self, id: RequestId, values: Vec<Value>) {
        self.deliver(PageCommand::SendResponses { id, values });
    }

    pub fn send_error(&mut self, id: RequestId, error: &ProviderError) {
        debug!(id, code = error.code, message = %error.message, "provider error sent");
        self.deliver(PageCommand::send_error(id, error));
    }

    pub fn inject_provider_config(&mut self, chain: &ChainConfig, address: Option<Address>) {
        self.deliver(PageCommand::set_config(chain, address));
    }

    pub fn inject_address(&mut self, address: Address) {
        self.deliver(PageCommand::SetAddress { address });
    }

    /// Navigation started; later commands wait for [`Self::page_ready`].
    /// Commands still queued for the previous document are discarded, since
    /// request ids restart with every page load.
    pub fn page_loading(&mut self) {
        if !self.queue.is_empty() {
            warn!(discarded = self.queue.len(), "page navigated with undelivered commands");
            self.queue.clear();
        }
        self.ready = false;
    }

    /// Re-injects provider config, then flushes commands queued while the
    /// page was not ready. The channel only counts as ready once the queue
    /// has drained; a failed flush leaves the rest queued for the next call.
    pub fn page_ready(
        &mut self,
        chain: &ChainConfig,
        address: Option<Address>,
    ) -> Result<usize, PortError> {
        self.execute(&PageCommand::set_config(chain, address))?;
        if !self.guards_installed {
            self.execute(&PageCommand::InstallNavigationGuards)?;
            self.guards_installed = true;
        }
        if self.ready {
            return Ok(0);
        }
        let page = &self.page;
        let flushed = self.queue.flush(|command| {
            let script = command.render()?;
            page.execute_script(&script)
        })?;
        self.ready = true;
        Ok(flushed)
    }

    // Invariant: the queue is empty whenever `ready` is set.
    fn deliver(&mut self, command: PageCommand) {
        if !self.ready {
            self.queue.enqueue(command);
            return;
        }
        let script = match command.render() {
            Ok(script) => script,
            Err(e) => {
                warn!(error = %e, "page command could not be rendered");
                return;
            }
        };
        if let Err(e) = self.page.execute_script(&script) {
            warn!(error = %e, "page command held until the page is ready again");
            self.ready = false;
            self.queue.enqueue(command);
        }
    }

    fn execute(&self, command: &PageCommand) -> Result<(), PortError> {
        let script = command.render()?;
        self.page.execute_script(&script)
    }
}
