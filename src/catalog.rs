//! Remote object catalog
//!
//! A snapshot of the objects BlueZ exposes through the ObjectManager, read
//! once at startup. Every object is a path plus a set of interfaces, each
//! interface carrying its own property map. Property values are converted to
//! [`PropertyValue`] at the bus boundary so nothing downstream handles raw
//! D-Bus variants.

use crate::bus::GattBus;
use crate::types::{Result, DEVICE_IFACE, GATT_CHRC_IFACE, GATT_SERVICE_IFACE};
use log::{debug, info};
use std::collections::HashMap;

/// A property value the client knows how to interpret
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
    Path(String),
    /// Any shape the client never inspects
    Unsupported,
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Property name to value
pub type Properties = HashMap<String, PropertyValue>;

/// One object of the remote graph
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub path: String,
    pub interfaces: HashMap<String, Properties>,
}

impl RemoteObject {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            interfaces: HashMap::new(),
        }
    }

    pub fn with_interface(mut self, interface: impl Into<String>, properties: Properties) -> Self {
        self.interfaces.insert(interface.into(), properties);
        self
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.contains_key(interface)
    }

    pub fn properties(&self, interface: &str) -> Option<&Properties> {
        self.interfaces.get(interface)
    }
}

/// Snapshot of all remote objects, kept in enumeration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    objects: Vec<RemoteObject>,
}

impl Catalog {
    pub fn new(objects: Vec<RemoteObject>) -> Self {
        Self { objects }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[RemoteObject] {
        &self.objects
    }

    /// Paths of all objects implementing `interface`, in enumeration order
    pub fn paths_implementing(&self, interface: &str) -> Vec<String> {
        self.objects
            .iter()
            .filter(|object| object.implements(interface))
            .map(|object| object.path.clone())
            .collect()
    }

    pub fn characteristic_paths(&self) -> Vec<String> {
        self.paths_implementing(GATT_CHRC_IFACE)
    }

    pub fn service_paths(&self) -> Vec<String> {
        self.paths_implementing(GATT_SERVICE_IFACE)
    }

    /// Path of the device object whose `Address` matches, ignoring case
    pub fn device_path(&self, address: &str) -> Option<&str> {
        self.objects
            .iter()
            .find(|object| {
                object
                    .properties(DEVICE_IFACE)
                    .and_then(|props| props.get("Address"))
                    .and_then(PropertyValue::as_str)
                    .is_some_and(|found| found.eq_ignore_ascii_case(address))
            })
            .map(|object| object.path.as_str())
    }
}

/// Whether `path` sits strictly below `parent` in the object tree
pub fn is_descendant(parent: &str, path: &str) -> bool {
    path.strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// The entries of `paths` nested under `parent`, order preserved
pub fn children_of<'a>(parent: &str, paths: &'a [String]) -> Vec<&'a str> {
    paths
        .iter()
        .filter(|path| is_descendant(parent, path))
        .map(String::as_str)
        .collect()
}

/// Fetch the full object graph from the bus. Failure is not retried.
pub async fn read_catalog(bus: &dyn GattBus) -> Result<Catalog> {
    info!("Getting objects...");
    let catalog = bus.managed_objects().await?;
    debug!(
        "Catalog holds {} objects ({} services, {} characteristics)",
        catalog.len(),
        catalog.service_paths().len(),
        catalog.characteristic_paths().len()
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(entries: &[(&str, PropertyValue)]) -> Properties {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn sample_catalog() -> Catalog {
        Catalog::new(vec![
            RemoteObject::new("/org/bluez/hci0"),
            RemoteObject::new("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF").with_interface(
                DEVICE_IFACE,
                props(&[(
                    "Address",
                    PropertyValue::Str("AA:BB:CC:DD:EE:FF".to_string()),
                )]),
            ),
            RemoteObject::new("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000c")
                .with_interface(GATT_SERVICE_IFACE, Properties::new()),
            RemoteObject::new("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000c/char000d")
                .with_interface(GATT_CHRC_IFACE, Properties::new()),
            RemoteObject::new("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000c/char000f")
                .with_interface(GATT_CHRC_IFACE, Properties::new()),
        ])
    }

    #[test]
    fn test_paths_by_interface_keep_order() {
        let catalog = sample_catalog();
        assert_eq!(catalog.len(), 5);
        assert_eq!(
            catalog.service_paths(),
            vec!["/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000c".to_string()]
        );
        assert_eq!(
            catalog.characteristic_paths(),
            vec![
                "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000c/char000d".to_string(),
                "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000c/char000f".to_string(),
            ]
        );
    }

    #[test]
    fn test_device_path_ignores_case() {
        let catalog = sample_catalog();
        assert_eq!(
            catalog.device_path("aa:bb:cc:dd:ee:ff"),
            Some("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF")
        );
        assert_eq!(catalog.device_path("11:22:33:44:55:66"), None);
    }

    #[test]
    fn test_children_need_separator() {
        let paths = vec![
            "/svc0001/char0002".to_string(),
            "/svc00010/char0011".to_string(),
            "/svc0001".to_string(),
        ];
        assert_eq!(children_of("/svc0001", &paths), vec!["/svc0001/char0002"]);
        assert!(!is_descendant("/svc0001", "/svc0001"));
    }

    #[test]
    fn test_property_value_accessors() {
        assert_eq!(PropertyValue::Str("x".into()).as_str(), Some("x"));
        assert_eq!(PropertyValue::Bytes(vec![1, 2]).as_bytes(), Some(&[1u8, 2][..]));
        assert_eq!(PropertyValue::Bool(true).as_str(), None);
        assert_eq!(PropertyValue::Unsupported.as_bytes(), None);
    }
}
