//! # Wisdom WAMP
//!
//! WAMP v1 controller for the Wisdom web framework. It multiplexes remote
//! procedure calls, topic subscriptions and publish/subscribe fan-out over
//! per-client WebSocket channels carrying JSON arrays, and bridges
//! publications to and from the host event bus.
//!
//! The transport stays outside this crate. The controller only needs a
//! [`Publisher`] to send frames, and optionally an [`EventAdmin`] to post
//! host events.
//!
//! ## Quick Start
//!
//! ```rust
//! use wisdom_wamp::{CallResult, ChannelPublisher, ServiceDefinition, WampConfig, WampController};
//! use std::sync::Arc;
//!
//! let publisher = Arc::new(ChannelPublisher::new());
//! let mut frames = publisher.connect("socket-1");
//!
//! let config = WampConfig::builder().hostname("example.com").http_port(9001).build();
//! let controller = WampController::new(config, Arc::clone(&publisher));
//!
//! controller
//!     .register(
//!         ServiceDefinition::builder("Calc")
//!             .method("add", |a: i64, b: i64| -> CallResult<i64> { Ok(a + b) }),
//!         "calc",
//!     )
//!     .unwrap();
//!
//! controller.open("socket-1");
//! controller.on_message("socket-1", r#"[1, "calc", "http://example.com:9001/wamp/calc#"]"#);
//! controller.on_message("socket-1", r#"[2, "call-1", "calc:add", 1, 2]"#);
//!
//! let welcome = frames.try_recv().unwrap();
//! assert!(welcome.message.starts_with("[0,"));
//! let result = frames.try_recv().unwrap();
//! assert_eq!(result.message, r#"[3,"call-1",3]"#);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! WampController
//! ├── ClientRegistry        open clients, prefix tables, subscriptions
//! ├── ServiceRegistry       exported services (url → method table)
//! ├── rpc::invoke           CALL validation and invocation
//! ├── pubsub                exclusion / eligibility filtering
//! ├── Publisher             outbound frames (host transport)
//! └── EventAdmin            host event bus (optional)
//! ```

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod event_admin;
pub mod logging;
pub mod message;
pub mod publisher;
pub mod pubsub;
pub mod rpc;
pub mod service;

pub use client::{ClientRegistry, WampClient};
pub use config::{LoggingConfig, WampConfig, WampConfigBuilder};
pub use controller::WampController;
pub use error::{CallError, CallResult, ConfigError, ErrorKind, RegistryError};
pub use event_admin::{Event, EventAdmin, EventHandler, LocalEventAdmin};
pub use message::{Inbound, MessageType, Outbound};
pub use publisher::{ChannelPublisher, Frame, Publisher};
pub use pubsub::PublishOptions;
pub use service::{ExportedService, Handler, ServiceBuilder, ServiceDefinition};

/// WAMP protocol version announced in WELCOME
pub const PROTOCOL_VERSION: u8 = 1;

/// Default route of the WAMP endpoint
pub const WAMP_ROUTE: &str = "/wamp";

/// Default path of error URIs below the base url
pub const WAMP_ERROR_ROUTE: &str = "/error";

/// Default server identification sent in WELCOME
pub const SERVER_IDENT: &str = concat!("wisdom-wamp/", env!("CARGO_PKG_VERSION"));
