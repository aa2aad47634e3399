//! dapp-bridge: headless host for the embedded dApp provider bridge

use std::io::{self, BufRead, Write};

use dapp_bridge_adapters::{BridgeConfig, LogFormat};

mod bridge;
mod host;

use bridge::DappBridge;
use host::{HostCommand, HostEvent};

fn main() -> eyre::Result<()> {
    let config = BridgeConfig::from_env()?;

    // Initialize logging; stdout carries the protocol, so logs go to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        );
    match config.log_format {
        LogFormat::Full => subscriber.init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    tracing::info!(channel = %config.channel_name, "Starting dapp-bridge");

    let mut bridge = DappBridge::from_config(&config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let events = match serde_json::from_str::<HostCommand>(&line) {
            Ok(command) => bridge.handle(command),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable host command");
                vec![HostEvent::Error {
                    message: format!("unreadable command: {e}"),
                }]
            }
        };
        for event in events {
            serde_json::to_writer(&mut stdout, &event)?;
            stdout.write_all(b"\n")?;
        }
        stdout.flush()?;
    }

    tracing::info!("host closed stdin; shutting down");
    Ok(())
}
