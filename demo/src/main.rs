//! Stdio harness for the WAMP controller.
//!
//! Reads one command per line and prints every frame the controller sends as
//! `<client-id> <json>` on stdout. Logs go to stderr.
//!
//! ```text
//! open c1
//! c1 [1, "calc", "http://localhost:9000/wamp/calc#"]
//! c1 [2, "call-1", "calc:add", 1, 2]
//! c1 [5, "http://localhost:9000/wamp/ticks"]
//! event ticks {"n": 1}
//! close c1
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use wisdom_wamp::{
    CallError, CallResult, ChannelPublisher, Event, EventAdmin, LocalEventAdmin,
    ServiceDefinition, WampConfig, WampController,
};

/// Drive a WAMP v1 controller from stdin
#[derive(Parser, Debug)]
#[command(name = "wisdom-wamp-demo", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short = 'c', env = "WISDOM_WAMP_CONFIG")]
    config: Option<PathBuf>,

    /// Host name used in the base url
    #[arg(long)]
    hostname: Option<String>,

    /// HTTP port used in the base url
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Log level, RUST_LOG takes precedence
    #[arg(long, short = 'l')]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn load_config(&self) -> Result<WampConfig> {
        let mut config = match &self.config {
            Some(path) => WampConfig::from_file(path)
                .with_context(|| format!("cannot load {}", path.display()))?,
            None => WampConfig::default(),
        };
        if let Some(hostname) = &self.hostname {
            config.hostname.clone_from(hostname);
        }
        if let Some(port) = self.port {
            config.http_port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        config.logging.structured |= self.json_logs;
        Ok(config)
    }
}

fn calc() -> ServiceDefinition {
    ServiceDefinition::builder("Calc")
        .method("add", |a: f64, b: f64| -> CallResult<f64> { Ok(a + b) })
        .method("sub", |a: f64, b: f64| -> CallResult<f64> { Ok(a - b) })
        .method("div", |a: i64, b: i64| -> CallResult<i64> {
            a.checked_div(b)
                .ok_or_else(|| CallError::new("ArithmeticException", "/ by zero"))
        })
        .method("sum", |values: Vec<f64>| -> CallResult<f64> {
            Ok(values.iter().sum())
        })
        .build()
}

struct Harness {
    controller: Arc<WampController>,
    publisher: Arc<ChannelPublisher>,
    bus: LocalEventAdmin,
    printers: HashMap<String, JoinHandle<()>>,
}

impl Harness {
    async fn handle(&mut self, line: &str) -> Result<()> {
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        match command {
            "open" => self.open(rest),
            "close" => self.close(rest).await,
            "event" => {
                let (topic, payload) = rest
                    .split_once(char::is_whitespace)
                    .unwrap_or((rest, "{}"));
                let Value::Object(properties) =
                    serde_json::from_str::<Value>(payload).context("event payload is not JSON")?
                else {
                    bail!("event payload must be a JSON object");
                };
                self.bus.post_event(Event {
                    topic: topic.to_string(),
                    properties,
                });
                Ok(())
            }
            client_id => {
                if rest.is_empty() {
                    bail!("expected `<client-id> <json>`, `open <id>`, `close <id>` or `event <topic> <json>`");
                }
                self.controller.on_message(client_id, rest);
                Ok(())
            }
        }
    }

    fn open(&mut self, client_id: &str) -> Result<()> {
        if client_id.is_empty() {
            bail!("open needs a client id");
        }
        if !self.printers.contains_key(client_id) {
            let mut frames = self.publisher.connect(client_id);
            let id = client_id.to_string();
            let printer = tokio::spawn(async move {
                while let Some(frame) = frames.recv().await {
                    println!("{id} {}", frame.message);
                }
            });
            self.printers.insert(client_id.to_string(), printer);
        }
        self.controller.open(client_id);
        Ok(())
    }

    async fn close(&mut self, client_id: &str) -> Result<()> {
        self.controller.close(client_id);
        self.publisher.disconnect(client_id);
        if let Some(printer) = self.printers.remove(client_id) {
            printer.await.context("printer task failed")?;
        }
        Ok(())
    }

    async fn shutdown(mut self) -> Result<()> {
        let ids: Vec<_> = self.printers.keys().cloned().collect();
        for id in ids {
            self.close(&id).await?;
        }
        self.controller.stop();
        self.controller.unbind_event_admin();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    config
        .logging
        .init()
        .context("cannot initialize logging")?;

    let publisher = Arc::new(ChannelPublisher::new());
    let controller = Arc::new(WampController::new(config, Arc::clone(&publisher)));
    let bus = LocalEventAdmin::default();
    controller.bind_event_admin(Arc::new(bus.clone()));
    let forwarder = bus.forward_to(Arc::clone(&controller));

    let service = controller.register(calc(), "calc")?;
    tracing::info!(url = %service.url, "Demo service ready");

    let mut harness = Harness {
        controller,
        publisher,
        bus,
        printers: HashMap::new(),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Err(e) = harness.handle(line).await {
            tracing::warn!("{e:#}");
        }
    }

    harness.shutdown().await?;
    forwarder.await?;
    Ok(())
}
