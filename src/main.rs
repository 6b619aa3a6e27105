//! Chat echo client
//!
//! Finds the chat service on a connected BLE peer through BlueZ and echoes
//! every notified value back to it until the service goes away.
//!
//! Usage:
//!   chat-echo
//!   chat-echo --device AA:BB:CC:DD:EE:FF --power-on
//!
//! Exit status: 0 when the session ends, 1 when no chat service is found,
//! 2 when the chat service lacks a required characteristic, 3 on bus errors.

use clap::Parser;
use gatt_chat_echo::{ensure_adapter_powered, BluezBus, Result, SessionLoop, Termination};
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "chat-echo")]
#[command(about = "Bind the BLE chat service and echo every notified value back")]
struct Args {
    /// Only use the chat service of this device (format: AA:BB:CC:DD:EE:FF)
    #[arg(long, value_name = "MAC_ADDRESS")]
    device: Option<String>,

    /// Power the default adapter on if it is off
    #[arg(long)]
    power_on: bool,

    /// Skip the adapter power check
    #[arg(long, conflicts_with = "power_on")]
    skip_preflight: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("zbus::connection::socket_reader", log::LevelFilter::Warn)
        .init();

    let args = Args::parse();

    match run(&args).await {
        Ok(termination) => {
            info!("Session terminated: {}", termination);
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.exit_code() {
                1 => warn!("{}", e),
                _ => error!("{}", e),
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: &Args) -> Result<Termination> {
    if !args.skip_preflight {
        ensure_adapter_powered(args.power_on).await?;
    }

    let bus = Arc::new(BluezBus::system().await?);
    let mut session_loop = SessionLoop::new(bus).with_device_filter(args.device.clone());
    session_loop.run().await
}
