//! Chat session state machine
//!
//! The session owns the bound endpoints and decides, for every event the
//! dispatcher hands it, which bus requests to issue next. It performs no I/O
//! itself: [`ChatSession::handle`] returns [`Command`]s and the session loop
//! executes them.
//!
//! ```text
//! Idle -> Discovering -> Bound -> Subscribed -> Terminated
//!              |                                   ^
//!              +---------- (nothing found) --------+
//! ```
//!
//! Every value delivered for the notify characteristic, whether by the
//! initial read or by a later `PropertiesChanged`, is written back verbatim
//! to the write characteristic. Once terminated, every event is a no-op.

use crate::bus::PropertiesChanged;
use crate::matcher::Binding;
use crate::types::{hex_dump, ChatError, Result, SessionState};
use log::{debug, error, info, warn};
use std::fmt;

/// Something the dispatcher delivers to the session
#[derive(Debug)]
pub enum Event {
    /// Reply to the initial `ReadValue` on the notify characteristic
    ReadCompleted(Result<Vec<u8>>),
    /// Reply to an echo `WriteValue`
    WriteCompleted(Result<()>),
    /// Reply to `StartNotify`
    NotifyStarted(Result<()>),
    /// Registering the `PropertiesChanged` watcher failed
    WatchFailed(ChatError),
    /// `PropertiesChanged` observed on `path`
    PropertiesChanged {
        path: String,
        change: PropertiesChanged,
    },
    /// `InterfacesRemoved` observed for `path`
    InterfacesRemoved { path: String },
}

/// A bus request the session wants issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read { path: String },
    WatchProperties { path: String },
    StartNotify { path: String },
    Write { path: String, value: Vec<u8> },
}

/// Why a subscribed session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The bound service disappeared from the bus
    ServiceRemoved { service: String },
    /// A bus call failed; nothing is retried
    TransportFailure { call: &'static str, reason: String },
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::ServiceRemoved { service } => {
                write!(f, "Service {} was removed", service)
            }
            Termination::TransportFailure { call, reason } => {
                write!(f, "{} failed: {}", call, reason)
            }
        }
    }
}

/// State of the single chat session of this process
#[derive(Debug)]
pub struct ChatSession {
    state: SessionState,
    binding: Option<Binding>,
    termination: Option<Termination>,
    echoed: u64,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            binding: None,
            termination: None,
            echoed: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    /// Number of echo writes issued so far
    pub fn echoed(&self) -> u64 {
        self.echoed
    }

    pub fn begin_discovery(&mut self) -> Result<()> {
        self.transition(SessionState::Idle, SessionState::Discovering)
    }

    /// Discovery ended without a usable service
    pub fn abandon(&mut self) {
        debug!("Session abandoned in state {}", self.state);
        self.state = SessionState::Terminated;
    }

    pub fn bind(&mut self, binding: Binding) -> Result<()> {
        self.transition(SessionState::Discovering, SessionState::Bound)?;
        info!(
            "Bound {} (notify {}, write {})",
            binding.service_path, binding.notify.path, binding.write.path
        );
        if let Some(version) = &binding.version {
            debug!("Version characteristic present at {}", version.path);
        }
        self.binding = Some(binding);
        Ok(())
    }

    /// Requests that take a bound session to Subscribed, in issue order
    pub fn subscribe(&mut self) -> Result<Vec<Command>> {
        self.transition(SessionState::Bound, SessionState::Subscribed)?;
        let notify = self.notify_path().unwrap_or_default().to_string();
        Ok(vec![
            Command::Read {
                path: notify.clone(),
            },
            Command::WatchProperties {
                path: notify.clone(),
            },
            Command::StartNotify { path: notify },
        ])
    }

    /// Apply one event; returns the requests to issue in response
    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        if self.is_terminated() {
            debug!("Ignoring event after termination: {:?}", event);
            return Vec::new();
        }

        match event {
            Event::InterfacesRemoved { path } => {
                self.on_removed(&path);
                Vec::new()
            }
            _ if self.state != SessionState::Subscribed => {
                warn!("Ignoring event in state {}: {:?}", self.state, event);
                Vec::new()
            }
            Event::ReadCompleted(Ok(value)) => self.echo(value),
            Event::ReadCompleted(Err(e)) => self.fail("ReadValue", e),
            Event::WriteCompleted(Ok(())) => {
                debug!("Echo write completed");
                Vec::new()
            }
            Event::WriteCompleted(Err(e)) => self.fail("WriteValue", e),
            Event::NotifyStarted(Ok(())) => {
                info!("Notifications started");
                Vec::new()
            }
            Event::NotifyStarted(Err(e)) => self.fail("StartNotify", e),
            Event::WatchFailed(e) => self.fail("PropertiesChanged watch", e),
            Event::PropertiesChanged { path, change } => {
                if self.notify_path() != Some(path.as_str()) {
                    debug!("Ignoring property change on {}", path);
                    return Vec::new();
                }
                match change.value() {
                    Some(value) => self.echo(value.to_vec()),
                    None => {
                        debug!("Property change without a value: {:?}", change.changed.keys());
                        Vec::new()
                    }
                }
            }
        }
    }

    fn notify_path(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.notify.path.as_str())
    }

    fn echo(&mut self, value: Vec<u8>) -> Vec<Command> {
        let Some(binding) = &self.binding else {
            return Vec::new();
        };
        info!("Received {} bytes, echoing", value.len());
        debug!("   Hex: {}", hex_dump(&value, 32));
        self.echoed += 1;
        vec![Command::Write {
            path: binding.write.path.clone(),
            value,
        }]
    }

    fn on_removed(&mut self, path: &str) {
        let Some(binding) = &self.binding else {
            return;
        };
        if binding.service_path == path {
            info!("Service was removed");
            let termination = Termination::ServiceRemoved {
                service: path.to_string(),
            };
            self.terminate(termination);
        }
    }

    fn fail(&mut self, call: &'static str, e: ChatError) -> Vec<Command> {
        error!("D-Bus call failed: {}: {}", call, e);
        self.terminate(Termination::TransportFailure {
            call,
            reason: e.to_string(),
        });
        Vec::new()
    }

    fn terminate(&mut self, termination: Termination) {
        self.state = SessionState::Terminated;
        self.termination = Some(termination);
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<()> {
        if self.state != from {
            return Err(ChatError::InvalidState(format!(
                "cannot move to {} from {}",
                to, self.state
            )));
        }
        debug!("Session {} -> {}", from, to);
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{value_changed, CHAT_SERVICE, NOTIFY_CHRC, WRITE_CHRC};
    use crate::catalog::{Properties, PropertyValue};
    use crate::classifier::Characteristic;
    use crate::types::{Role, CHAT_NOTIFY_UUID, CHAT_WRITE_UUID, GATT_CHRC_IFACE};

    fn binding() -> Binding {
        Binding {
            service_path: CHAT_SERVICE.to_string(),
            notify: Characteristic {
                path: NOTIFY_CHRC.to_string(),
                uuid: CHAT_NOTIFY_UUID.to_string(),
                role: Role::Notify,
            },
            write: Characteristic {
                path: WRITE_CHRC.to_string(),
                uuid: CHAT_WRITE_UUID.to_string(),
                role: Role::Write,
            },
            version: None,
        }
    }

    fn subscribed() -> ChatSession {
        let mut session = ChatSession::new();
        session.begin_discovery().unwrap();
        session.bind(binding()).unwrap();
        session.subscribe().unwrap();
        session
    }

    fn write_of(value: &[u8]) -> Command {
        Command::Write {
            path: WRITE_CHRC.to_string(),
            value: value.to_vec(),
        }
    }

    fn changed(value: &[u8]) -> Event {
        Event::PropertiesChanged {
            path: NOTIFY_CHRC.to_string(),
            change: value_changed(value),
        }
    }

    #[test]
    fn test_lifecycle_and_subscribe_order() {
        let mut session = ChatSession::new();
        assert_eq!(session.state(), SessionState::Idle);
        session.begin_discovery().unwrap();
        assert_eq!(session.state(), SessionState::Discovering);
        session.bind(binding()).unwrap();
        assert_eq!(session.state(), SessionState::Bound);

        let commands = session.subscribe().unwrap();
        assert_eq!(session.state(), SessionState::Subscribed);
        assert_eq!(
            commands,
            vec![
                Command::Read {
                    path: NOTIFY_CHRC.to_string()
                },
                Command::WatchProperties {
                    path: NOTIFY_CHRC.to_string()
                },
                Command::StartNotify {
                    path: NOTIFY_CHRC.to_string()
                },
            ]
        );
    }

    #[test]
    fn test_second_binding_rejected() {
        let mut session = subscribed();
        assert!(matches!(
            session.bind(binding()),
            Err(ChatError::InvalidState(_))
        ));
        assert!(session.subscribe().is_err());
    }

    #[test]
    fn test_read_reply_is_echoed() {
        let mut session = subscribed();
        let commands = session.handle(Event::ReadCompleted(Ok(vec![0x68, 0x69])));
        assert_eq!(commands, vec![write_of(&[0x68, 0x69])]);
    }

    #[test]
    fn test_every_notification_echoed_verbatim() {
        let mut session = subscribed();
        let values: [&[u8]; 4] = [b"a", b"a", &[], &[0x00, 0xFF, 0x10]];
        for value in values {
            assert_eq!(session.handle(changed(value)), vec![write_of(value)]);
        }
        assert_eq!(session.echoed(), 4);
    }

    #[test]
    fn test_read_and_notification_both_echo() {
        let mut session = subscribed();
        assert_eq!(
            session.handle(Event::ReadCompleted(Ok(b"v".to_vec()))),
            vec![write_of(b"v")]
        );
        assert_eq!(session.handle(changed(b"v")), vec![write_of(b"v")]);
        assert_eq!(session.echoed(), 2);
    }

    #[test]
    fn test_changes_without_value_or_elsewhere_ignored() {
        let mut session = subscribed();

        let mut props = Properties::new();
        props.insert("Notifying".to_string(), PropertyValue::Bool(true));
        let notifying = Event::PropertiesChanged {
            path: NOTIFY_CHRC.to_string(),
            change: PropertiesChanged {
                interface: GATT_CHRC_IFACE.to_string(),
                changed: props,
            },
        };
        assert!(session.handle(notifying).is_empty());

        let on_write_chrc = Event::PropertiesChanged {
            path: WRITE_CHRC.to_string(),
            change: value_changed(b"x"),
        };
        assert!(session.handle(on_write_chrc).is_empty());
        assert_eq!(session.echoed(), 0);
    }

    #[test]
    fn test_removal_terminates_once() {
        let mut session = subscribed();

        assert!(session
            .handle(Event::InterfacesRemoved {
                path: NOTIFY_CHRC.to_string()
            })
            .is_empty());
        assert_eq!(session.state(), SessionState::Subscribed);

        session.handle(Event::InterfacesRemoved {
            path: CHAT_SERVICE.to_string(),
        });
        assert!(session.is_terminated());
        let first = session.termination().cloned();
        assert_eq!(
            first,
            Some(Termination::ServiceRemoved {
                service: CHAT_SERVICE.to_string()
            })
        );

        // Stray events after termination change nothing and write nothing
        assert!(session.handle(changed(b"late")).is_empty());
        assert!(session
            .handle(Event::ReadCompleted(Ok(b"late".to_vec())))
            .is_empty());
        session.handle(Event::WriteCompleted(Err(ChatError::Bus("late".into()))));
        session.handle(Event::InterfacesRemoved {
            path: CHAT_SERVICE.to_string(),
        });
        assert_eq!(session.termination().cloned(), first);
        assert_eq!(session.echoed(), 0);
    }

    #[test]
    fn test_removal_before_binding_is_noop() {
        let mut session = ChatSession::new();
        session.begin_discovery().unwrap();
        session.handle(Event::InterfacesRemoved {
            path: CHAT_SERVICE.to_string(),
        });
        assert_eq!(session.state(), SessionState::Discovering);
    }

    #[test]
    fn test_transport_failures_terminate() {
        let failures = [
            Event::ReadCompleted(Err(ChatError::Bus("read".into()))),
            Event::WriteCompleted(Err(ChatError::Bus("write".into()))),
            Event::NotifyStarted(Err(ChatError::Bus("notify".into()))),
            Event::WatchFailed(ChatError::Bus("watch".into())),
        ];
        let calls = ["ReadValue", "WriteValue", "StartNotify", "PropertiesChanged watch"];

        for (event, expected) in failures.into_iter().zip(calls) {
            let mut session = subscribed();
            assert!(session.handle(event).is_empty());
            assert!(session.is_terminated());
            match session.termination() {
                Some(Termination::TransportFailure { call, .. }) => assert_eq!(*call, expected),
                other => panic!("unexpected termination: {:?}", other),
            }
        }
    }

    #[test]
    fn test_successful_replies_keep_session() {
        let mut session = subscribed();
        assert!(session.handle(Event::NotifyStarted(Ok(()))).is_empty());
        assert!(session.handle(Event::WriteCompleted(Ok(()))).is_empty());
        assert_eq!(session.state(), SessionState::Subscribed);
    }

    #[test]
    fn test_abandon_terminates_without_reason() {
        let mut session = ChatSession::new();
        session.begin_discovery().unwrap();
        session.abandon();
        assert!(session.is_terminated());
        assert!(session.termination().is_none());
    }

    #[test]
    fn test_termination_display() {
        let removed = Termination::ServiceRemoved {
            service: "/svc".to_string(),
        };
        assert_eq!(removed.to_string(), "Service /svc was removed");
        let failed = Termination::TransportFailure {
            call: "WriteValue",
            reason: "Bus error: gone".to_string(),
        };
        assert_eq!(failed.to_string(), "WriteValue failed: Bus error: gone");
    }
}
