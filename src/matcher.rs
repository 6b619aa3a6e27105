//! Chat service discovery
//!
//! Walks the services of the catalog in enumeration order and binds the
//! first one whose UUID is the chat service UUID. Services sharing that UUID
//! later in the catalog are never looked at.

use crate::bus::GattBus;
use crate::catalog::{children_of, is_descendant, Catalog};
use crate::classifier::{uuid_of, Characteristic};
use crate::types::{
    ChatError, Result, Role, CHAT_SVC_UUID, GATT_CHRC_IFACE, GATT_SERVICE_IFACE,
};
use log::{debug, info, warn};

/// The chat service and the endpoints bound for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub service_path: String,
    pub notify: Characteristic,
    pub write: Characteristic,
    pub version: Option<Characteristic>,
}

/// Inspect one service; `Ok(None)` when it is not the chat service
pub async fn match_service(
    bus: &dyn GattBus,
    service_path: &str,
    chrc_paths: &[String],
) -> Result<Option<Binding>> {
    let props = bus.properties(service_path, GATT_SERVICE_IFACE).await?;
    let uuid = uuid_of(&props).unwrap_or_default();

    if !uuid.eq_ignore_ascii_case(CHAT_SVC_UUID) {
        debug!("Skipping service {} ({})", service_path, uuid);
        return Ok(None);
    }

    info!("Chat Service found: {}", service_path);

    let mut notify = None;
    let mut write = None;
    let mut version = None;

    for chrc_path in children_of(service_path, chrc_paths) {
        let props = bus.properties(chrc_path, GATT_CHRC_IFACE).await?;
        let chrc = Characteristic::from_properties(chrc_path, &props);

        let slot = match chrc.role {
            Role::Notify => &mut notify,
            Role::Write => &mut write,
            Role::Version => &mut version,
            Role::Unknown => {
                warn!("Unrecognized characteristic: {} ({})", chrc.uuid, chrc.path);
                continue;
            }
        };

        if slot.is_some() {
            warn!(
                "Ignoring duplicate {} characteristic {}",
                chrc.role, chrc.path
            );
            continue;
        }
        debug!("Bound {} characteristic {}", chrc.role, chrc.path);
        *slot = Some(chrc);
    }

    let missing = |role| ChatError::MissingEndpoint {
        service: service_path.to_string(),
        role,
    };
    let notify = notify.ok_or_else(|| missing(Role::Notify))?;
    let write = write.ok_or_else(|| missing(Role::Write))?;

    Ok(Some(Binding {
        service_path: service_path.to_string(),
        notify,
        write,
        version,
    }))
}

/// Scan the catalog for the chat service.
///
/// When `scope` is set only services beneath that object path are
/// candidates. Returns [`ChatError::ServiceNotFound`] when nothing matches.
pub async fn find_chat_service(
    bus: &dyn GattBus,
    catalog: &Catalog,
    scope: Option<&str>,
) -> Result<Binding> {
    let chrc_paths = catalog.characteristic_paths();

    for service_path in catalog.service_paths() {
        if let Some(scope) = scope {
            if !is_descendant(scope, &service_path) {
                continue;
            }
        }

        debug!("Found in path: {}", service_path);
        if let Some(binding) = match_service(bus, &service_path, &chrc_paths).await? {
            return Ok(binding);
        }
    }

    Err(ChatError::ServiceNotFound)
}
