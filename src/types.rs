//! Common types, protocol constants, and error definitions for the chat client

use std::fmt;
use thiserror::Error;

/// Result type alias for chat client operations
pub type Result<T> = std::result::Result<T, ChatError>;

pub const BLUEZ_SERVICE_NAME: &str = "org.bluez";
pub const DBUS_OM_IFACE: &str = "org.freedesktop.DBus.ObjectManager";
pub const DBUS_PROP_IFACE: &str = "org.freedesktop.DBus.Properties";

pub const DEVICE_IFACE: &str = "org.bluez.Device1";
pub const GATT_SERVICE_IFACE: &str = "org.bluez.GattService1";
pub const GATT_CHRC_IFACE: &str = "org.bluez.GattCharacteristic1";

/// UUID of the chat service
pub const CHAT_SVC_UUID: &str = "0000180d-0000-1000-8000-00805f9b34fb";
/// Characteristic the peer notifies chat values on
pub const CHAT_NOTIFY_UUID: &str = "00002a37-0000-1000-8000-00805f9b34fb";
/// Characteristic values are echoed back to
pub const CHAT_WRITE_UUID: &str = "00002a39-0000-1000-8000-00805f9b34fb";
/// Protocol version characteristic
pub const CHAT_VRS_UUID: &str = "00002a38-0000-1000-8000-00805f9b34fb";

/// Error types for the chat client
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("D-Bus call failed: {0}")]
    DBus(#[from] zbus::Error),

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("No Chat Service found")]
    ServiceNotFound,

    #[error("No device with address {0} in the object catalog")]
    DeviceNotFound(String),

    #[error("Chat Service {service} has no {role} characteristic")]
    MissingEndpoint { service: String, role: Role },

    #[error("Invalid session transition: {0}")]
    InvalidState(String),
}

impl ChatError {
    /// Process exit status reported for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            ChatError::ServiceNotFound | ChatError::DeviceNotFound(_) => 1,
            ChatError::MissingEndpoint { .. } => 2,
            _ => 3,
        }
    }
}

/// Role of a characteristic inside the chat service, inferred from its UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Notify,
    Write,
    Version,
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Notify => write!(f, "notify"),
            Role::Write => write!(f, "write"),
            Role::Version => write!(f, "version"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}

/// Lifecycle of a chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Discovering,
    Bound,
    Subscribed,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Discovering => write!(f, "Discovering"),
            SessionState::Bound => write!(f, "Bound"),
            SessionState::Subscribed => write!(f, "Subscribed"),
            SessionState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Format bytes as hex for debug logging
pub fn hex_dump(data: &[u8], max_len: usize) -> String {
    let len = data.len().min(max_len);
    let hex: String = data[..len]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > max_len {
        format!("{} ... ({} bytes total)", hex, data.len())
    } else {
        format!("{} ({} bytes)", hex, data.len())
    }
}
