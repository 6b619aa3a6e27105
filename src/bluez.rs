//! BlueZ implementation of [`GattBus`] over the D-Bus system bus
//!
//! Method calls go straight through `Connection::call_method`; signals are
//! received through match-rule filtered `MessageStream`s. Variants are
//! converted to [`PropertyValue`] before anything leaves this module.

use crate::bus::{GattBus, PropertiesChanged};
use crate::catalog::{Catalog, Properties, PropertyValue, RemoteObject};
use crate::types::{
    Result, BLUEZ_SERVICE_NAME, DBUS_OM_IFACE, DBUS_PROP_IFACE, GATT_CHRC_IFACE,
};
use futures::stream::{BoxStream, StreamExt};
use log::{debug, warn};
use std::collections::HashMap;
use zbus::message::{Message, Type as MessageType};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};
use zbus::{Connection, MatchRule, MessageStream};

type ManagedObjects = HashMap<OwnedObjectPath, HashMap<String, HashMap<String, OwnedValue>>>;

/// Remote object bus backed by `org.bluez` on the system bus
pub struct BluezBus {
    connection: Connection,
}

impl BluezBus {
    /// Connect to the D-Bus system bus
    pub async fn system() -> Result<Self> {
        let connection = Connection::system().await?;
        debug!("Connected to system bus as {:?}", connection.unique_name());
        Ok(Self { connection })
    }

    async fn call<B>(&self, path: &str, interface: &str, method: &str, body: &B) -> Result<Message>
    where
        B: serde::ser::Serialize + zbus::zvariant::DynamicType,
    {
        let reply = self
            .connection
            .call_method(Some(BLUEZ_SERVICE_NAME), path, Some(interface), method, body)
            .await?;
        Ok(reply)
    }

    async fn signal_stream(
        &self,
        path: Option<&str>,
        interface: &str,
        member: &str,
    ) -> Result<MessageStream> {
        let mut builder = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(BLUEZ_SERVICE_NAME)?
            .interface(interface)?
            .member(member)?;
        if let Some(path) = path {
            builder = builder.path(path)?;
        }
        let stream = MessageStream::for_match_rule(builder.build(), &self.connection, None).await?;
        Ok(stream)
    }
}

/// Empty `a{sv}` options dictionary for GATT calls
fn no_options() -> HashMap<&'static str, Value<'static>> {
    HashMap::new()
}

pub(crate) fn convert_value(value: &Value<'_>) -> PropertyValue {
    match value {
        Value::Str(s) => PropertyValue::Str(s.to_string()),
        Value::Bool(b) => PropertyValue::Bool(*b),
        Value::ObjectPath(p) => PropertyValue::Path(p.to_string()),
        Value::Value(inner) => convert_value(inner),
        Value::Array(array) => array
            .iter()
            .map(|item| match item {
                Value::U8(byte) => Some(*byte),
                _ => None,
            })
            .collect::<Option<Vec<u8>>>()
            .map_or(PropertyValue::Unsupported, PropertyValue::Bytes),
        _ => PropertyValue::Unsupported,
    }
}

pub(crate) fn convert_properties(properties: HashMap<String, OwnedValue>) -> Properties {
    properties
        .into_iter()
        .map(|(name, value)| {
            let converted = convert_value(&value);
            (name, converted)
        })
        .collect()
}

#[async_trait::async_trait]
impl GattBus for BluezBus {
    async fn managed_objects(&self) -> Result<Catalog> {
        let reply = self.call("/", DBUS_OM_IFACE, "GetManagedObjects", &()).await?;
        let objects: ManagedObjects = reply.body().deserialize()?;

        let mut objects: Vec<RemoteObject> = objects
            .into_iter()
            .map(|(path, interfaces)| RemoteObject {
                path: path.as_str().to_string(),
                interfaces: interfaces
                    .into_iter()
                    .map(|(name, props)| (name, convert_properties(props)))
                    .collect(),
            })
            .collect();
        // D-Bus dictionaries carry no order; enumerate by path
        objects.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Catalog::new(objects))
    }

    async fn properties(&self, path: &str, interface: &str) -> Result<Properties> {
        let reply = self.call(path, DBUS_PROP_IFACE, "GetAll", &(interface,)).await?;
        let properties: HashMap<String, OwnedValue> = reply.body().deserialize()?;
        Ok(convert_properties(properties))
    }

    async fn read_value(&self, path: &str) -> Result<Vec<u8>> {
        let reply = self
            .call(path, GATT_CHRC_IFACE, "ReadValue", &(no_options(),))
            .await?;
        let value: Vec<u8> = reply.body().deserialize()?;
        Ok(value)
    }

    async fn write_value(&self, path: &str, value: &[u8]) -> Result<()> {
        self.call(path, GATT_CHRC_IFACE, "WriteValue", &(value, no_options()))
            .await?;
        Ok(())
    }

    async fn start_notify(&self, path: &str) -> Result<()> {
        self.call(path, GATT_CHRC_IFACE, "StartNotify", &()).await?;
        Ok(())
    }

    async fn property_changes(
        &self,
        path: &str,
    ) -> Result<BoxStream<'static, PropertiesChanged>> {
        let stream = self
            .signal_stream(Some(path), DBUS_PROP_IFACE, "PropertiesChanged")
            .await?;

        Ok(stream
            .filter_map(|msg| async move {
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("Dropping malformed PropertiesChanged: {}", e);
                        return None;
                    }
                };
                // Signature "sa{sv}as"
                let parsed: zbus::Result<(String, HashMap<String, OwnedValue>, Vec<String>)> =
                    msg.body().deserialize();
                match parsed {
                    Ok((interface, changed, _invalidated)) => Some(PropertiesChanged {
                        interface,
                        changed: convert_properties(changed),
                    }),
                    Err(e) => {
                        warn!("Could not parse PropertiesChanged: {}", e);
                        None
                    }
                }
            })
            .boxed())
    }

    async fn interfaces_removed(&self) -> Result<BoxStream<'static, String>> {
        let stream = self
            .signal_stream(None, DBUS_OM_IFACE, "InterfacesRemoved")
            .await?;

        Ok(stream
            .filter_map(|msg| async move {
                let msg = msg.ok()?;
                // Signature "oas"
                let parsed: zbus::Result<(OwnedObjectPath, Vec<String>)> = msg.body().deserialize();
                match parsed {
                    Ok((path, interfaces)) => {
                        debug!("InterfacesRemoved {} {:?}", path.as_str(), interfaces);
                        Some(path.as_str().to_string())
                    }
                    Err(e) => {
                        warn!("Could not parse InterfacesRemoved: {}", e);
                        None
                    }
                }
            })
            .boxed())
    }
}
