//! JSON-lines protocol between the webview shell and the bridge.
//!
//! The shell writes one [`HostCommand`] per line on stdin and reads
//! [`HostEvent`]s, one per line, from stdout.

use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dapp_bridge_core::domain::{
    ChainApproval, ConfirmationSummary, FinishOutcome, PasswordPrompt, RequestId,
    WatchAssetPayload,
};
use dapp_bridge_core::{ApprovalUiPort, ChainConfig, NavigationAction, PortError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostCommand {
    /// Raw IPC message posted by the page script.
    Ipc {
        channel: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Password {
        password: String,
    },
    Confirm,
    Cancel,
    ApproveChain,
    PageLoading {
        #[serde(default)]
        url: Option<String>,
    },
    PageReady,
    Lock,
    Navigate {
        url: String,
    },
    ImportWallet {
        wallet_id: String,
        password: String,
        phrase: String,
    },
    SwitchWallet {
        wallet_id: String,
    },
    AddChain {
        chain: ChainConfig,
    },
    UpdateChain {
        chain: ChainConfig,
    },
    SelectChain {
        chain_id: String,
    },
    RemoveChain {
        chain_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    /// Script to evaluate in the page.
    Script {
        script: String,
    },
    PasswordPrompt {
        prompt: PasswordPrompt,
    },
    Confirmation {
        summary: ConfirmationSummary,
    },
    ChainApproval {
        approval: ChainApproval,
    },
    OpenExternal {
        url: String,
    },
    WatchAsset {
        asset: WatchAssetPayload,
    },
    Finished {
        id: RequestId,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Navigation {
        url: String,
        action: NavigationAction,
    },
    Error {
        message: String,
    },
}

impl From<&FinishOutcome> for HostEvent {
    fn from(outcome: &FinishOutcome) -> Self {
        let (result, error) = match &outcome.result {
            Ok(value) => (Some(value.clone()), None),
            Err(message) => (None, Some(message.clone())),
        };
        Self::Finished {
            id: outcome.id,
            result,
            error,
        }
    }
}

/// Approval screens live in the shell; each prompt becomes an event line.
#[derive(Debug, Clone)]
pub struct HostUi {
    events: Sender<HostEvent>,
}

impl HostUi {
    pub fn new(events: Sender<HostEvent>) -> Self {
        Self { events }
    }

    fn emit(&self, event: HostEvent) -> Result<(), PortError> {
        self.events
            .send(event)
            .map_err(|_| PortError::Transport("host event sink closed".to_owned()))
    }
}

impl ApprovalUiPort for HostUi {
    fn request_password(&self, prompt: &PasswordPrompt) -> Result<(), PortError> {
        self.emit(HostEvent::PasswordPrompt {
            prompt: prompt.clone(),
        })
    }

    fn request_confirmation(&self, summary: &ConfirmationSummary) -> Result<(), PortError> {
        self.emit(HostEvent::Confirmation {
            summary: summary.clone(),
        })
    }

    fn request_chain_approval(&self, approval: &ChainApproval) -> Result<(), PortError> {
        self.emit(HostEvent::ChainApproval {
            approval: approval.clone(),
        })
    }

    fn open_external(&self, url: &str) -> Result<(), PortError> {
        self.emit(HostEvent::OpenExternal {
            url: url.to_owned(),
        })
    }

    fn watch_asset(&self, asset: &WatchAssetPayload) -> Result<(), PortError> {
        self.emit(HostEvent::WatchAsset {
            asset: asset.clone(),
        })
    }

    fn on_finish_transaction(&self, outcome: &FinishOutcome) {
        let _ = self.emit(outcome.into());
    }
}
