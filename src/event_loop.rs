//! Session loop
//!
//! Sequences catalog read, discovery and subscription, then dispatches
//! events until the session terminates. Reads and StartNotify run as their
//! own tasks and post exactly one outcome event; echo writes go through a
//! single writer task so they reach the peer in the order values arrived.
//! Signal streams are forwarded into the same channel. Only this loop
//! touches the [`ChatSession`].

use crate::bus::GattBus;
use crate::catalog::read_catalog;
use crate::matcher::{find_chat_service, Binding};
use crate::session::{ChatSession, Command, Event, Termination};
use crate::types::{ChatError, Result};
use futures::stream::StreamExt;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// A queued echo write: characteristic path and value
type Write = (String, Vec<u8>);

/// Owns the bus handle, the event channel and the single chat session
pub struct SessionLoop {
    bus: Arc<dyn GattBus>,
    session: ChatSession,
    device: Option<String>,
    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
    writes_tx: UnboundedSender<Write>,
    writes_rx: Option<UnboundedReceiver<Write>>,
    stopped: Arc<AtomicBool>,
}

impl SessionLoop {
    pub fn new(bus: Arc<dyn GattBus>) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let (writes_tx, writes_rx) = unbounded_channel();
        Self {
            bus,
            session: ChatSession::new(),
            device: None,
            events_tx,
            events_rx,
            writes_tx,
            writes_rx: Some(writes_rx),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Only consider services of the device with this Bluetooth address
    pub fn with_device_filter(mut self, address: Option<String>) -> Self {
        self.device = address;
        self
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Run discovery and the echo protocol until the session ends.
    ///
    /// Discovery failures (no service, missing endpoint, bus errors while
    /// reading the catalog) are returned as errors; a session that got as
    /// far as Subscribed always ends with a [`Termination`].
    pub async fn run(&mut self) -> Result<Termination> {
        // Watch removals before reading the catalog so none are missed
        let removals = self.bus.interfaces_removed().await?;
        self.forward(removals.map(|path| Event::InterfacesRemoved { path }));

        self.session.begin_discovery()?;
        let binding = match self.discover().await {
            Ok(binding) => binding,
            Err(e) => {
                self.session.abandon();
                return Err(e);
            }
        };
        self.session.bind(binding)?;
        self.spawn_writer();

        // In order: the change watcher is registered before StartNotify goes out
        for command in self.session.subscribe()? {
            self.execute(command).await;
        }
        info!("Subscribed, echoing notifications");

        while let Some(event) = self.events_rx.recv().await {
            for command in self.session.handle(event) {
                self.execute(command).await;
            }
            if let Some(termination) = self.session.termination() {
                self.stopped.store(true, Ordering::SeqCst);
                return Ok(termination.clone());
            }
        }

        Err(ChatError::Bus("event channel closed".to_string()))
    }

    async fn discover(&self) -> Result<Binding> {
        let catalog = read_catalog(self.bus.as_ref()).await?;

        let scope = match &self.device {
            Some(address) => {
                let path = catalog
                    .device_path(address)
                    .ok_or_else(|| ChatError::DeviceNotFound(address.clone()))?;
                debug!("Restricting discovery to {}", path);
                Some(path.to_string())
            }
            None => None,
        };

        find_chat_service(self.bus.as_ref(), &catalog, scope.as_deref()).await
    }

    /// Issue one bus request; its outcome comes back as an event
    async fn execute(&self, command: Command) {
        match command {
            Command::Read { path } => {
                debug!("ReadValue {}", path);
                let bus = self.bus.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(Event::ReadCompleted(bus.read_value(&path).await));
                });
            }
            Command::Write { path, value } => {
                debug!("WriteValue {} ({} bytes) queued", path, value.len());
                let _ = self.writes_tx.send((path, value));
            }
            Command::StartNotify { path } => {
                debug!("StartNotify {}", path);
                let bus = self.bus.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(Event::NotifyStarted(bus.start_notify(&path).await));
                });
            }
            Command::WatchProperties { path } => {
                debug!("Watching PropertiesChanged on {}", path);
                match self.bus.property_changes(&path).await {
                    Ok(changes) => self.forward(changes.map(move |change| {
                        Event::PropertiesChanged {
                            path: path.clone(),
                            change,
                        }
                    })),
                    Err(e) => {
                        let _ = self.events_tx.send(Event::WatchFailed(e));
                    }
                }
            }
        }
    }

    /// Drain queued echo writes one at a time, in queue order
    fn spawn_writer(&mut self) {
        let Some(mut writes) = self.writes_rx.take() else {
            return;
        };
        let bus = self.bus.clone();
        let tx = self.events_tx.clone();
        let stopped = self.stopped.clone();

        tokio::spawn(async move {
            while let Some((path, value)) = writes.recv().await {
                if stopped.load(Ordering::SeqCst) {
                    debug!("Session over, dropping queued write to {}", path);
                    continue;
                }
                let result = bus.write_value(&path, &value).await;
                let failed = result.is_err();
                if tx.send(Event::WriteCompleted(result)).is_err() || failed {
                    break;
                }
            }
        });
    }

    /// Pump a signal stream into the event channel until the loop goes away
    fn forward<S>(&self, mut events: S)
    where
        S: futures::Stream<Item = Event> + Send + Unpin + 'static,
    {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
    }
}
