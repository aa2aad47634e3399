use std::sync::mpsc::{self, Receiver, Sender};

use dapp_bridge_core::{PagePort, PortError};

/// Forwards scripts to whoever owns the webview. Execution fails once the
/// receiving side is gone.
#[derive(Debug, Clone)]
pub struct ScriptSinkAdapter {
    tx: Sender<String>,
}

impl ScriptSinkAdapter {
    pub fn channel() -> (Self, Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl PagePort for ScriptSinkAdapter {
    fn execute_script(&self, script: &str) -> Result<(), PortError> {
        self.tx
            .send(script.to_owned())
            .map_err(|_| PortError::Transport("page script sink closed".to_owned()))
    }
}
