//! The WAMP protocol state machine.
//!
//! [`WampController`] owns the client registry and the exported services.
//! The host transport calls [`open`](WampController::open),
//! [`on_message`](WampController::on_message) and
//! [`close`](WampController::close) for every socket; everything the
//! controller has to say goes out through the [`Publisher`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};

use crate::client::{ClientRegistry, WampClient};
use crate::config::WampConfig;
use crate::error::{CallError, RegistryError};
use crate::event_admin::{
    self, EVENT_TOPIC_PROPERTY, Event, EventAdmin, EventHandler, WAMP_ELIGIBLE_PROPERTY,
    WAMP_EVENT_PROPERTY, WAMP_EXCLUSIONS_PROPERTY, WAMP_TOPIC_PROPERTY,
};
use crate::message::{Inbound, Outbound};
use crate::publisher::Publisher;
use crate::pubsub::{self, PublishOptions};
use crate::rpc;
use crate::service::{ExportedService, ServiceDefinition, ServiceRegistry, normalize_url};

/// WAMP v1 controller serving every client of one endpoint.
pub struct WampController {
    config: WampConfig,
    base_url: String,
    error_url: String,
    publisher: Arc<dyn Publisher>,
    clients: ClientRegistry,
    services: ServiceRegistry,
    event_admin: RwLock<Option<Arc<dyn EventAdmin>>>,
}

impl WampController {
    /// Create a controller sending through `publisher`.
    pub fn new<P>(config: WampConfig, publisher: P) -> Self
    where
        P: Publisher + 'static,
    {
        let base_url = config.base_url();
        let error_url = config.error_url();
        info!(base_url = %base_url, "WAMP controller started");
        Self {
            config,
            base_url,
            error_url,
            publisher: Arc::new(publisher),
            clients: ClientRegistry::new(),
            services: ServiceRegistry::new(),
            event_admin: RwLock::new(None),
        }
    }

    /// Create a controller with default settings and an explicit base url.
    pub fn with_base_url<P>(base_url: impl Into<String>, publisher: P) -> Self
    where
        P: Publisher + 'static,
    {
        Self::new(WampConfig::builder().base_url(base_url).build(), publisher)
    }

    /// Active configuration.
    pub fn config(&self) -> &WampConfig {
        &self.config
    }

    /// Base url of the endpoint, without trailing slash.
    pub fn wamp_base_url(&self) -> &str {
        &self.base_url
    }

    /// Prefix of the error URIs sent in CALLERROR.
    pub fn error_url(&self) -> &str {
        &self.error_url
    }

    // ----- EventAdmin binding -----

    /// Bind the host event bus, replacing any previous one.
    pub fn bind_event_admin(&self, event_admin: Arc<dyn EventAdmin>) {
        *self.event_admin.write() = Some(event_admin);
        debug!("EventAdmin bound");
    }

    /// Unbind the host event bus.
    pub fn unbind_event_admin(&self) -> Option<Arc<dyn EventAdmin>> {
        let previous = self.event_admin.write().take();
        if previous.is_some() {
            debug!("EventAdmin unbound");
        }
        previous
    }

    /// Whether an event bus is bound.
    pub fn has_event_admin(&self) -> bool {
        self.event_admin.read().is_some()
    }

    // ----- Client lifecycle -----

    /// A socket opened. Sends WELCOME unless the client is already known.
    pub fn open(&self, client_id: &str) {
        let Some(client) = self.clients.add(client_id) else {
            debug!(client_id, "Client already open, ignoring");
            return;
        };
        debug!(client_id, session = client.session(), "Client opened");
        self.send(
            client_id,
            &Outbound::Welcome {
                session: client.session().to_string(),
                protocol_version: crate::PROTOCOL_VERSION,
                server_ident: self.config.server_ident.clone(),
            },
        );
    }

    /// A socket closed. Drops the client's prefixes and subscriptions.
    pub fn close(&self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            debug!(client_id, "Client closed");
        }
    }

    /// Look up an open client.
    pub fn client(&self, client_id: &str) -> Option<Arc<WampClient>> {
        self.clients.get(client_id)
    }

    /// Number of open clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Drop every client and every exported service.
    pub fn stop(&self) {
        self.clients.clear();
        self.services.clear();
        info!("WAMP controller stopped");
    }

    // ----- Dispatch -----

    /// Handle one text frame received from `client_id`.
    pub fn on_message(&self, client_id: &str, text: &str) {
        match Inbound::decode(text) {
            Ok(message) => self.dispatch(client_id, message),
            Err(e) => warn!(client_id, error = %e, "Dropping invalid WAMP message"),
        }
    }

    /// Handle one already parsed frame received from `client_id`.
    pub fn handle_message(&self, client_id: &str, message: Value) {
        match Inbound::from_value(message) {
            Ok(message) => self.dispatch(client_id, message),
            Err(e) => warn!(client_id, error = %e, "Dropping invalid WAMP message"),
        }
    }

    fn dispatch(&self, client_id: &str, message: Inbound) {
        let Some(client) = self.clients.get(client_id) else {
            warn!(
                client_id,
                message_type = ?message.message_type(),
                "Message from unknown client dropped"
            );
            return;
        };
        trace!(client_id, message_type = ?message.message_type(), "Dispatching");

        match message {
            Inbound::Prefix { prefix, uri } => match (prefix, uri) {
                (Some(prefix), Some(uri)) => {
                    debug!(client_id, prefix = %prefix, uri = %uri, "Prefix registered");
                    client.register_prefix(prefix, uri);
                }
                _ => warn!(client_id, "PREFIX without prefix or uri ignored"),
            },
            Inbound::Call {
                call_id,
                proc_id,
                args,
            } => self.handle_call(&client, call_id, proc_id, args),
            Inbound::Subscribe { topic } => match non_empty(topic) {
                Some(topic) => {
                    let topic = client.resolve(&topic);
                    debug!(client_id, topic = %topic, "Subscribed");
                    client.subscribe(topic);
                }
                None => warn!(client_id, "SUBSCRIBE without topic ignored"),
            },
            Inbound::Unsubscribe { topic } => match non_empty(topic) {
                Some(topic) => {
                    let topic = client.resolve(&topic);
                    if client.unsubscribe(&topic) {
                        debug!(client_id, topic = %topic, "Unsubscribed");
                    }
                }
                None => warn!(client_id, "UNSUBSCRIBE without topic ignored"),
            },
            Inbound::Publish {
                topic,
                event,
                exclude,
                eligible,
            } => self.handle_publish(&client, topic, event, exclude, eligible),
        }
    }

    fn handle_call(
        &self,
        client: &WampClient,
        call_id: Option<String>,
        proc_id: Option<String>,
        args: Vec<Value>,
    ) {
        let Some(call_id) = call_id else {
            self.send_call_error(
                client,
                "0",
                CallError::illegal_argument("callId not defined in CALL message"),
            );
            return;
        };
        let Some(proc_id) = proc_id else {
            self.send_call_error(
                client,
                &call_id,
                CallError::illegal_argument("procId not defined in CALL message"),
            );
            return;
        };

        let requested = proc_id;
        let proc_id = client.resolve(&requested);
        match rpc::invoke(&self.services, &proc_id, &requested, args) {
            Ok(result) => {
                trace!(client_id = client.client_id(), proc_id = %proc_id, "Call succeeded");
                self.send(client.client_id(), &Outbound::CallResult { call_id, result });
            }
            Err(err) => {
                debug!(
                    client_id = client.client_id(),
                    proc_id = %proc_id,
                    error = %err,
                    "Call failed"
                );
                self.send_call_error(client, &call_id, err);
            }
        }
    }

    fn send_call_error(&self, client: &WampClient, call_id: &str, err: CallError) {
        self.send(
            client.client_id(),
            &Outbound::CallError {
                call_id: call_id.to_string(),
                error_uri: rpc::error_uri(&self.error_url, &err.kind),
                description: err.message,
                details: err.details,
            },
        );
    }

    fn handle_publish(
        &self,
        client: &WampClient,
        topic: Option<String>,
        event: Option<Value>,
        exclude: Option<Value>,
        eligible: Option<Value>,
    ) {
        let client_id = client.client_id();
        let Some(topic) = non_empty(topic) else {
            warn!(client_id, "PUBLISH without topic ignored");
            return;
        };
        let Some(event) = event else {
            warn!(client_id, topic = %topic, "PUBLISH without event ignored");
            return;
        };
        let Some(options) =
            PublishOptions::from_publish(exclude.as_ref(), eligible.as_ref(), client.session())
        else {
            warn!(client_id, topic = %topic, "PUBLISH with invalid exclusions dropped");
            return;
        };

        let topic = client.resolve(&topic);
        let delivered = self.publish_event(&topic, &event, &options);
        debug!(client_id, topic = %topic, delivered, "Published");

        self.forward_to_event_admin(&topic, event, &options);
    }

    /// Send `[8, topic, event]` to every subscriber admitted by `options`.
    ///
    /// Returns the number of clients the event was sent to.
    pub fn publish_event(&self, topic: &str, event: &Value, options: &PublishOptions) -> usize {
        let recipients = pubsub::select_recipients(self.clients.subscribers(topic), options);
        if recipients.is_empty() {
            return 0;
        }
        let message = Outbound::Event {
            topic: topic.to_string(),
            event: event.clone(),
        }
        .encode();
        for client in &recipients {
            self.publisher
                .send(&self.config.route, client.client_id(), message.clone());
        }
        recipients.len()
    }

    fn forward_to_event_admin(&self, topic: &str, event: Value, options: &PublishOptions) {
        let Some(event_admin) = self.event_admin.read().clone() else {
            return;
        };
        let Some(local_topic) = self.event_admin_topic_from_wamp_topic(topic) else {
            trace!(topic, "Topic outside the base url, not forwarded");
            return;
        };

        let mut bridged = Event::new(local_topic)
            .with_property(WAMP_EVENT_PROPERTY, event)
            .with_property(WAMP_TOPIC_PROPERTY, topic)
            .with_property(WAMP_EXCLUSIONS_PROPERTY, options.exclusions_value());
        if let Some(eligible) = options.eligible_value() {
            bridged = bridged.with_property(WAMP_ELIGIBLE_PROPERTY, eligible);
        }
        event_admin.post_event(bridged);
    }

    fn send(&self, client_id: &str, message: &Outbound) {
        self.publisher
            .send(&self.config.route, client_id, message.encode());
    }

    // ----- Services -----

    /// Export `definition` at `url`.
    ///
    /// Relative urls are resolved against the base url.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyRegistered` if the url is taken.
    pub fn register(
        &self,
        definition: impl Into<ServiceDefinition>,
        url: &str,
    ) -> Result<Arc<ExportedService>, RegistryError> {
        self.register_with_properties(definition, Map::new(), url)
    }

    /// Export `definition` at `url` with registration properties.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyRegistered` if the url is taken.
    pub fn register_with_properties(
        &self,
        definition: impl Into<ServiceDefinition>,
        properties: Map<String, Value>,
        url: &str,
    ) -> Result<Arc<ExportedService>, RegistryError> {
        let url = normalize_url(&self.base_url, url);
        let service = self.services.insert(ExportedService {
            url,
            definition: definition.into(),
            properties,
        })?;
        info!(
            url = %service.url,
            type_name = service.definition.type_name(),
            "Service registered"
        );
        Ok(service)
    }

    /// Withdraw the service exported at `url`.
    pub fn unregister(&self, url: &str) -> Option<Arc<ExportedService>> {
        let removed = self.services.remove(&normalize_url(&self.base_url, url));
        if let Some(service) = &removed {
            info!(url = %service.url, "Service unregistered");
        }
        removed
    }

    /// Withdraw a service by the handle returned from registration.
    ///
    /// Returns `false` when the handle's url is now bound to another service.
    pub fn unregister_service(&self, service: &Arc<ExportedService>) -> bool {
        let removed = self.services.remove_if_same(service);
        if removed {
            info!(url = %service.url, "Service unregistered");
        }
        removed
    }

    /// Snapshot of the exported services.
    pub fn services(&self) -> Vec<Arc<ExportedService>> {
        self.services.snapshot()
    }

    // ----- Topic translation -----

    /// WAMP topic of a local event topic.
    pub fn wamp_topic_from_event_admin_topic(&self, topic: &str) -> String {
        event_admin::wamp_topic(&self.base_url, topic)
    }

    /// Local event topic of a WAMP topic under the base url.
    pub fn event_admin_topic_from_wamp_topic(&self, topic: &str) -> Option<String> {
        event_admin::event_admin_topic(&self.base_url, topic)
    }
}

impl EventHandler for WampController {
    /// Relay a local event to the subscribers of its WAMP topic.
    fn handle_event(&self, event: &Event) {
        if event.is_from_wamp() {
            trace!(topic = %event.topic, "Event originated from WAMP, not relayed");
            return;
        }

        let topic = self.wamp_topic_from_event_admin_topic(&event.topic);
        let options = PublishOptions::from_lists(
            event.property(WAMP_EXCLUSIONS_PROPERTY),
            event.property(WAMP_ELIGIBLE_PROPERTY),
        );

        let mut payload: Map<String, Value> = event
            .properties
            .iter()
            .filter(|(key, _)| {
                key.as_str() != WAMP_EXCLUSIONS_PROPERTY && key.as_str() != WAMP_ELIGIBLE_PROPERTY
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        payload.insert(
            EVENT_TOPIC_PROPERTY.to_string(),
            Value::String(event.topic.clone()),
        );

        let delivered = self.publish_event(&topic, &Value::Object(payload), &options);
        debug!(topic = %topic, delivered, "Local event relayed");
    }
}

// Manual Debug implementation since the capabilities are trait objects
impl fmt::Debug for WampController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WampController")
            .field("base_url", &self.base_url)
            .field("route", &self.config.route)
            .field("clients", &self.clients.len())
            .field("services", &self.services.len())
            .field("event_admin", &self.has_event_admin())
            .finish()
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty())
}
