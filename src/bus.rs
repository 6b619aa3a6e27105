//! Remote object bus abstraction
//!
//! The chat client never talks to D-Bus directly. Everything it needs from
//! the Bluetooth stack goes through [`GattBus`]; the production
//! implementation lives in [`crate::bluez`].

use crate::catalog::{Catalog, Properties, PropertyValue};
use crate::types::{Result, GATT_CHRC_IFACE};
use futures::stream::BoxStream;

/// A `PropertiesChanged` signal emitted for one object
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesChanged {
    pub interface: String,
    pub changed: Properties,
}

impl PropertiesChanged {
    /// The new characteristic value carried by this change, if any
    pub fn value(&self) -> Option<&[u8]> {
        if self.interface != GATT_CHRC_IFACE {
            return None;
        }
        self.changed.get("Value").and_then(PropertyValue::as_bytes)
    }
}

/// Operations the chat client needs from the remote object bus
#[async_trait::async_trait]
pub trait GattBus: Send + Sync {
    /// Enumerate every managed object
    async fn managed_objects(&self) -> Result<Catalog>;

    /// Fetch all properties of `interface` on the object at `path`
    async fn properties(&self, path: &str, interface: &str) -> Result<Properties>;

    /// Read the current value of a characteristic
    async fn read_value(&self, path: &str) -> Result<Vec<u8>>;

    /// Write a value to a characteristic
    async fn write_value(&self, path: &str, value: &[u8]) -> Result<()>;

    /// Ask the stack to start notifications on a characteristic
    async fn start_notify(&self, path: &str) -> Result<()>;

    /// Subscribe to `PropertiesChanged` for the object at `path`
    async fn property_changes(&self, path: &str)
        -> Result<BoxStream<'static, PropertiesChanged>>;

    /// Subscribe to `InterfacesRemoved`; yields the removed object path
    async fn interfaces_removed(&self) -> Result<BoxStream<'static, String>>;
}
