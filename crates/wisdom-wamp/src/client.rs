//! Connected clients and their per-client state.
//!
//! A [`WampClient`] owns the CURIE prefix table and the subscription set of
//! one channel. The [`ClientRegistry`] keeps every open client in insertion
//! order so that event fan-out is reproducible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use uuid::Uuid;

/// State of one open WAMP channel.
#[derive(Debug)]
pub struct WampClient {
    client_id: String,
    session: String,
    prefixes: RwLock<HashMap<String, String>>,
    subscriptions: RwLock<HashSet<String>>,
}

impl WampClient {
    /// Create a client with a freshly generated session id.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_session(client_id, Uuid::new_v4().to_string())
    }

    /// Create a client with a known session id.
    pub fn with_session(client_id: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            session: session.into(),
            prefixes: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashSet::new()),
        }
    }

    /// Identifier assigned by the transport.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// WAMP session id, as announced in WELCOME.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Register or overwrite a CURIE prefix.
    pub fn register_prefix(&self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.prefixes.write().insert(prefix.into(), uri.into());
    }

    /// Expand a CURIE using this client's prefix table.
    ///
    /// `calc:add` with `calc` bound to `http://example.com/calc#` resolves to
    /// `http://example.com/calc#add`. Anything else, including full URIs and
    /// CURIEs with an unknown prefix, is returned unchanged.
    pub fn resolve(&self, candidate: &str) -> String {
        if let Some((prefix, rest)) = candidate.split_once(':') {
            if let Some(base) = self.prefixes.read().get(prefix) {
                return format!("{base}{rest}");
            }
        }
        candidate.to_string()
    }

    /// Subscribe to a (resolved) topic. Subscribing twice is a no-op.
    pub fn subscribe(&self, topic: impl Into<String>) {
        self.subscriptions.write().insert(topic.into());
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        self.subscriptions.write().remove(topic)
    }

    /// Whether this client receives events for `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.read().contains(topic)
    }

    /// Snapshot of the subscribed topics.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.read().iter().cloned().collect()
    }
}

/// Open clients keyed by transport id, in connection order.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<IndexMap<String, Arc<WampClient>>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client unless one with the same id is already open.
    ///
    /// Returns the new client, or `None` when the id was already known.
    pub fn add(&self, client_id: &str) -> Option<Arc<WampClient>> {
        let mut clients = self.clients.write();
        if clients.contains_key(client_id) {
            return None;
        }
        let client = Arc::new(WampClient::new(client_id));
        clients.insert(client_id.to_string(), Arc::clone(&client));
        Some(client)
    }

    /// Remove a client, dropping its prefixes and subscriptions.
    pub fn remove(&self, client_id: &str) -> Option<Arc<WampClient>> {
        self.clients.write().shift_remove(client_id)
    }

    /// Look up an open client.
    pub fn get(&self, client_id: &str) -> Option<Arc<WampClient>> {
        self.clients.read().get(client_id).cloned()
    }

    /// Snapshot of the clients subscribed to `topic`, in connection order.
    pub fn subscribers(&self, topic: &str) -> Vec<Arc<WampClient>> {
        self.clients
            .read()
            .values()
            .filter(|client| client.is_subscribed(topic))
            .cloned()
            .collect()
    }

    /// Number of open clients.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether no client is open.
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Drop every client.
    pub fn clear(&self) {
        self.clients.write().clear();
    }
}
