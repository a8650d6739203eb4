//! Bridge between WAMP topics and the host event bus.
//!
//! Local events use slash-separated topics (`stock/quotes`) and a property
//! map. A local topic `X` maps to the WAMP topic `<base>/X`, and only WAMP
//! topics under the base map back.
//!
//! Events the bridge posts for a WAMP publication carry the reserved
//! properties below. Events that already carry [`WAMP_TOPIC_PROPERTY`] are
//! never relayed back to WAMP clients.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Sessions that must not receive the event
pub const WAMP_EXCLUSIONS_PROPERTY: &str = "wamp.exclusions";
/// Sessions allowed to receive the event
pub const WAMP_ELIGIBLE_PROPERTY: &str = "wamp.eligible";
/// WAMP topic a bridged publication was sent to
pub const WAMP_TOPIC_PROPERTY: &str = "wamp.topic";
/// Raw payload of a bridged publication
pub const WAMP_EVENT_PROPERTY: &str = "wamp.event";
/// Local topic, added to payloads relayed to WAMP clients
pub const EVENT_TOPIC_PROPERTY: &str = "event.topics";

/// An event on the host bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Slash-separated local topic
    pub topic: String,
    /// Event properties
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Event {
    /// Event without properties.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            properties: Map::new(),
        }
    }

    /// Add or replace a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Property by key.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Whether the bridge itself produced this event.
    pub fn is_from_wamp(&self) -> bool {
        self.properties.contains_key(WAMP_TOPIC_PROPERTY)
    }
}

/// Posting side of the host event bus.
pub trait EventAdmin: Send + Sync {
    /// Deliver `event` asynchronously to the bus listeners.
    fn post_event(&self, event: Event);
}

/// Listening side of the host event bus.
pub trait EventHandler: Send + Sync {
    /// Called for every event the handler is subscribed to.
    fn handle_event(&self, event: &Event);
}

impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn handle_event(&self, event: &Event) {
        (**self).handle_event(event);
    }
}

/// WAMP topic of a local topic.
pub fn wamp_topic(base_url: &str, local_topic: &str) -> String {
    format!("{base_url}/{local_topic}")
}

/// Local topic of a WAMP topic, or `None` when it is not under the base.
pub fn event_admin_topic(base_url: &str, wamp_topic: &str) -> Option<String> {
    wamp_topic
        .strip_prefix(base_url)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
}

/// In-process event bus for hosts without their own.
#[derive(Debug, Clone)]
pub struct LocalEventAdmin {
    tx: broadcast::Sender<Event>,
}

impl LocalEventAdmin {
    /// Default number of buffered events per listener.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Bus buffering up to `capacity` events per listener.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every event posted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Spawn a task feeding every posted event to `handler`.
    ///
    /// Must be called from within a tokio runtime. The task ends when the
    /// bus is dropped.
    pub fn forward_to<H>(&self, handler: H) -> JoinHandle<()>
    where
        H: EventHandler + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler.handle_event(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Event listener lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("Event bus closed");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for LocalEventAdmin {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl EventAdmin for LocalEventAdmin {
    fn post_event(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event posted with no listener");
        }
    }
}
