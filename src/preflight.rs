//! Adapter preflight
//!
//! Before discovery, make sure the default Bluetooth adapter is powered.
//! Nothing here is required for the echo protocol itself; a stack whose
//! power state cannot be read is reported and otherwise left alone.

use crate::types::Result;
use bluer::Session;
use log::{debug, info, warn};

/// What to do about the adapter given its power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Adapter is up
    Proceed,
    /// Adapter is off and we were asked to switch it on
    PowerOn,
    /// Adapter is off and we leave it that way
    WarnOff,
    /// Power state could not be read
    Unknown,
}

pub fn power_action(powered: Option<bool>, power_on: bool) -> PowerAction {
    match powered {
        Some(true) => PowerAction::Proceed,
        Some(false) if power_on => PowerAction::PowerOn,
        Some(false) => PowerAction::WarnOff,
        None => PowerAction::Unknown,
    }
}

/// Check the default adapter, powering it on when `power_on` is set
pub async fn ensure_adapter_powered(power_on: bool) -> Result<()> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    debug!("Using adapter: {}", adapter.name());

    let powered = match adapter.is_powered().await {
        Ok(powered) => Some(powered),
        Err(e) => {
            warn!("Could not check Bluetooth power state: {}", e);
            None
        }
    };

    match power_action(powered, power_on) {
        PowerAction::Proceed => debug!("Bluetooth adapter is powered on"),
        PowerAction::PowerOn => {
            info!("Bluetooth adapter {} is off, powering on", adapter.name());
            adapter.set_powered(true).await?;
            info!("Bluetooth adapter powered on");
        }
        PowerAction::WarnOff => warn!(
            "Bluetooth adapter {} is off; discovery will find nothing (try --power-on)",
            adapter.name()
        ),
        PowerAction::Unknown => {
            info!("Continuing anyway - if discovery fails, ensure Bluetooth is enabled")
        }
    }

    Ok(())
}
