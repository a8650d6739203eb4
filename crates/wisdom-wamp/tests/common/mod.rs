//! Shared fixtures for the controller integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use wisdom_wamp::{Event, EventAdmin, Publisher, WampConfig, WampController};

pub const BASE: &str = "http://example.com:9001/wamp";
pub const ERROR_PREFIX: &str = "http://example.com:9001/wamp/error";

/// One frame handed to the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub channel: String,
    pub client_id: String,
    pub message: Value,
}

/// Publisher keeping every frame in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingPublisher {
    /// Drain everything sent so far.
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Drain and keep only the messages.
    pub fn take_messages(&self) -> Vec<Value> {
        self.take().into_iter().map(|s| s.message).collect()
    }

    /// Drain and keep the recipients in send order.
    pub fn take_recipients(&self) -> Vec<String> {
        self.take().into_iter().map(|s| s.client_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Publisher for RecordingPublisher {
    fn send(&self, channel: &str, client_id: &str, message: String) {
        let message = serde_json::from_str(&message).expect("controller sent invalid JSON");
        self.sent.lock().push(Sent {
            channel: channel.to_string(),
            client_id: client_id.to_string(),
            message,
        });
    }
}

/// EventAdmin keeping every posted event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventAdmin {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventAdmin {
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventAdmin for RecordingEventAdmin {
    fn post_event(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// Controller answering on `http://example.com:9001/wamp`.
pub fn controller() -> (WampController, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let config = WampConfig::builder()
        .hostname("example.com")
        .http_port(9001)
        .build();
    let controller = WampController::new(config, Arc::clone(&publisher));
    (controller, publisher)
}

/// Open `client_id`, swallow its WELCOME, and return its session.
pub fn connect(controller: &WampController, publisher: &RecordingPublisher, client_id: &str) -> String {
    controller.open(client_id);
    publisher.take();
    controller
        .client(client_id)
        .expect("client was just opened")
        .session()
        .to_string()
}
