//! Characteristic role classification
//!
//! Roles are never stored on the remote object; they are inferred from the
//! characteristic UUID alone. Classification is pure.

use crate::catalog::{Properties, PropertyValue};
use crate::types::{Role, CHAT_NOTIFY_UUID, CHAT_VRS_UUID, CHAT_WRITE_UUID};

/// A characteristic of the chat service, tagged with its role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub path: String,
    pub uuid: String,
    pub role: Role,
}

impl Characteristic {
    /// Build the typed view from a `GattCharacteristic1` property snapshot
    pub fn from_properties(path: &str, properties: &Properties) -> Self {
        let uuid = uuid_of(properties).unwrap_or_default().to_string();
        Self {
            path: path.to_string(),
            role: role_for_uuid(&uuid),
            uuid,
        }
    }
}

/// The `UUID` property, when present and a string
pub fn uuid_of(properties: &Properties) -> Option<&str> {
    properties.get("UUID").and_then(PropertyValue::as_str)
}

/// Map a characteristic UUID to its role
pub fn role_for_uuid(uuid: &str) -> Role {
    if uuid.eq_ignore_ascii_case(CHAT_NOTIFY_UUID) {
        Role::Notify
    } else if uuid.eq_ignore_ascii_case(CHAT_WRITE_UUID) {
        Role::Write
    } else if uuid.eq_ignore_ascii_case(CHAT_VRS_UUID) {
        Role::Version
    } else {
        Role::Unknown
    }
}

/// Classify a characteristic from its properties
pub fn classify(properties: &Properties) -> Role {
    uuid_of(properties).map_or(Role::Unknown, role_for_uuid)
}
