//! Error types for the WAMP controller.
//!
//! Two families of failures exist:
//!
//! - [`CallError`] is the tagged failure of an RPC invocation. It never leaves
//!   the controller as a Rust error: the dispatcher turns it into a CALLERROR
//!   frame for the calling client.
//! - [`RegistryError`] and [`ConfigError`] are local failures returned to the
//!   code embedding the controller.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

/// Result type returned by RPC callables.
pub type CallResult<T> = Result<T, CallError>;

/// Classification of an RPC failure.
///
/// The [`name`](ErrorKind::name) of the kind becomes the fragment of the
/// error URI sent to the client (`<base>/error#<name>`). The built-in names
/// match what existing Wisdom browser clients expect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The CALL frame itself was malformed or named an unknown service.
    IllegalArgument,
    /// The service exists but cannot serve the requested method.
    UnsupportedOperation,
    /// The callable failed unexpectedly (e.g. it panicked).
    Runtime,
    /// Service-defined failure kind.
    Custom(String),
}

impl ErrorKind {
    /// Name used as the error URI fragment.
    pub fn name(&self) -> &str {
        match self {
            Self::IllegalArgument => "IllegalArgumentException",
            Self::UnsupportedOperation => "UnsupportedOperationException",
            Self::Runtime => "RuntimeException",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure of an RPC call, reported to the caller as a CALLERROR frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable description (the `errorDesc` element)
    pub message: String,
    /// Optional extra details (the `errorDetails` element)
    pub details: Option<String>,
}

impl CallError {
    /// Create an error with a service-defined kind.
    ///
    /// ```rust
    /// use wisdom_wamp::CallError;
    ///
    /// let err = CallError::new("NullPointerException", "I'm a bug");
    /// assert_eq!(err.kind.name(), "NullPointerException");
    /// ```
    pub fn new(kind: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        let kind = match kind.into().as_ref() {
            "IllegalArgumentException" => ErrorKind::IllegalArgument,
            "UnsupportedOperationException" => ErrorKind::UnsupportedOperation,
            "RuntimeException" => ErrorKind::Runtime,
            other => ErrorKind::Custom(other.to_string()),
        };
        Self::with_kind(kind, message)
    }

    /// Create an error from an explicit kind.
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Malformed request or unknown service.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::IllegalArgument, message)
    }

    /// Unknown method or arity mismatch.
    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::UnsupportedOperation, message)
    }

    /// Unexpected failure inside a callable.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Runtime, message)
    }

    /// Attach error details, keeping details already present.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        if self.details.is_none() {
            self.details = Some(details.into());
        }
        self
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CallError {}

/// Errors raised by the exported-service registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The url is already bound to another service
    #[error("Cannot register service on url {0} - url already taken")]
    AlreadyRegistered(String),
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_kind_names() {
        assert_eq!(ErrorKind::IllegalArgument.name(), "IllegalArgumentException");
        assert_eq!(
            ErrorKind::UnsupportedOperation.name(),
            "UnsupportedOperationException"
        );
        assert_eq!(ErrorKind::Runtime.name(), "RuntimeException");
        assert_eq!(ErrorKind::Custom("Boom".into()).name(), "Boom");
    }

    #[test]
    fn new_recognizes_builtin_kinds() {
        let err = CallError::new("IllegalArgumentException", "bad");
        assert_eq!(err.kind, ErrorKind::IllegalArgument);

        let err = CallError::new("ArithmeticException", "/ by zero");
        assert_eq!(err.kind, ErrorKind::Custom("ArithmeticException".into()));
        assert_eq!(err.to_string(), "ArithmeticException: / by zero");
    }

    #[test]
    fn details_are_not_overwritten() {
        let err = CallError::runtime("boom")
            .with_details("first")
            .with_details("second");
        assert_eq!(err.details.as_deref(), Some("first"));
    }

    #[test]
    fn registry_error_message() {
        let err = RegistryError::AlreadyRegistered("http://example.com/calc".into());
        assert!(err.to_string().contains("url already taken"));
        assert!(err.to_string().contains("http://example.com/calc"));
    }
}
