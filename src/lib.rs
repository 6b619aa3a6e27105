//! BLE GATT chat echo client
//!
//! This library locates the chat service among the GATT objects BlueZ
//! exposes over D-Bus, binds its notify and write characteristics, and
//! echoes every value the peer notifies back to it.
//!
//! # Modules
//!
//! - `catalog`: Snapshot of the remote object graph
//! - `classifier`: Characteristic role inference from UUIDs
//! - `matcher`: Chat service discovery and endpoint binding
//! - `session`: Chat session state machine and echo protocol
//! - `event_loop`: Dispatcher driving the session until it terminates
//! - `bus`: Bus abstraction the core talks through
//! - `bluez`: `zbus` implementation of the bus for `org.bluez`
//! - `preflight`: Adapter power check using `bluer`
//! - `types`: Protocol constants, errors and shared enums

pub mod bluez;
pub mod bus;
pub mod catalog;
pub mod classifier;
pub mod event_loop;
pub mod matcher;
pub mod preflight;
pub mod session;
pub mod types;

pub use bluez::BluezBus;
pub use bus::{GattBus, PropertiesChanged};
pub use catalog::{read_catalog, Catalog, Properties, PropertyValue, RemoteObject};
pub use classifier::{classify, role_for_uuid, Characteristic};
pub use event_loop::SessionLoop;
pub use matcher::{find_chat_service, match_service, Binding};
pub use preflight::ensure_adapter_powered;
pub use session::{ChatSession, Command, Event, Termination};
pub use types::{ChatError, Result, Role, SessionState};
