//! Logging initialization.
//!
//! Logs always go to stderr: hosts that speak on stdout (such as the demo
//! harness) must keep that stream clean.
//!
//! ```rust,no_run
//! use wisdom_wamp::LoggingConfig;
//!
//! LoggingConfig::default().init()?;
//! # Ok::<(), std::io::Error>(())
//! ```

use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

impl LoggingConfig {
    /// Quiet stderr logging, useful for tests and tools.
    pub fn stderr_minimal() -> Self {
        Self {
            level: "warn".to_string(),
            structured: false,
        }
    }

    /// Install the global tracing subscriber.
    ///
    /// `RUST_LOG` overrides the configured level when set.
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init(&self) -> io::Result<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let subscriber = tracing_subscriber::registry().with(filter);

        if self.structured {
            subscriber
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .map_err(|e| io::Error::other(e.to_string()))
        } else {
            subscriber
                .with(fmt::layer().with_writer(io::stderr))
                .try_init()
                .map_err(|e| io::Error::other(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails() {
        // The first call may or may not win depending on test ordering.
        let _ = LoggingConfig::stderr_minimal().init();
        assert!(LoggingConfig::stderr_minimal().init().is_err());
    }
}
