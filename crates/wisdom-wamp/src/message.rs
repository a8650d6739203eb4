//! WAMP v1 wire messages.
//!
//! Every frame is a JSON array whose first element is the integer type code:
//!
//! | Code | Type        | Shape                                         | Direction     |
//! |------|-------------|-----------------------------------------------|---------------|
//! | 0    | WELCOME     | `[0, sessionId, protocolVersion, serverIdent]` | server→client |
//! | 1    | PREFIX      | `[1, prefix, uri]`                            | client→server |
//! | 2    | CALL        | `[2, callId, procId, arg...]`                 | client→server |
//! | 3    | CALLRESULT  | `[3, callId, result]`                         | server→client |
//! | 4    | CALLERROR   | `[4, callId, errorUri, errorDesc, details?]`  | server→client |
//! | 5    | SUBSCRIBE   | `[5, topic]`                                  | client→server |
//! | 6    | UNSUBSCRIBE | `[6, topic]`                                  | client→server |
//! | 7    | PUBLISH     | `[7, topic, event, exclude?, eligible?]`      | client→server |
//! | 8    | EVENT       | `[8, topic, event]`                           | server→client |
//!
//! Decoding is structural only: positional elements that are missing or of
//! the wrong shape come out as `None`, and the controller decides whether
//! that deserves a CALLERROR or a silent drop.

use serde_json::{Value, json};

/// Message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Session greeting sent on open
    Welcome = 0,
    /// CURIE prefix registration
    Prefix = 1,
    /// RPC request
    Call = 2,
    /// RPC success
    CallResult = 3,
    /// RPC failure
    CallError = 4,
    /// Topic subscription
    Subscribe = 5,
    /// Topic unsubscription
    Unsubscribe = 6,
    /// Event publication
    Publish = 7,
    /// Event delivery
    Event = 8,
}

impl MessageType {
    /// Integer code as sent on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up a type from its wire code.
    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0 => Self::Welcome,
            1 => Self::Prefix,
            2 => Self::Call,
            3 => Self::CallResult,
            4 => Self::CallError,
            5 => Self::Subscribe,
            6 => Self::Unsubscribe,
            7 => Self::Publish,
            8 => Self::Event,
            _ => return None,
        })
    }

    /// Whether clients are allowed to send this type.
    pub const fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::Prefix | Self::Call | Self::Subscribe | Self::Unsubscribe | Self::Publish
        )
    }
}

/// Why a frame could not be decoded into an [`Inbound`] message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Valid JSON, but not an array
    #[error("WAMP messages must be JSON arrays")]
    NotAnArray,

    /// Element 0 is absent or not an unsigned integer
    #[error("missing or non-integer message type code")]
    MissingType,

    /// Element 0 is not a known code
    #[error("unknown WAMP message type code {0}")]
    UnknownType(u64),

    /// Element 0 names a server-to-client message
    #[error("{0:?} messages are never accepted from clients")]
    NotInbound(MessageType),
}

/// A decoded client-to-server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `[1, prefix, uri]`
    Prefix {
        /// Short name
        prefix: Option<String>,
        /// Base URI the short name expands to
        uri: Option<String>,
    },
    /// `[2, callId, procId, arg...]`
    Call {
        /// Correlation id chosen by the client
        call_id: Option<String>,
        /// Procedure URI or CURIE
        proc_id: Option<String>,
        /// Positional arguments
        args: Vec<Value>,
    },
    /// `[5, topic]`
    Subscribe {
        /// Topic URI or CURIE
        topic: Option<String>,
    },
    /// `[6, topic]`
    Unsubscribe {
        /// Topic URI or CURIE
        topic: Option<String>,
    },
    /// `[7, topic, event, exclude?, eligible?]`
    Publish {
        /// Topic URI or CURIE
        topic: Option<String>,
        /// Payload; an explicit JSON `null` is `Some(Value::Null)`
        event: Option<Value>,
        /// Raw third argument: `excludeMe` flag or exclusion list
        exclude: Option<Value>,
        /// Raw fourth argument: eligible list
        eligible: Option<Value>,
    },
}

impl Inbound {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Decode an already parsed frame.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Array(items) = value else {
            return Err(DecodeError::NotAnArray);
        };
        let mut items = items.into_iter();
        let code = items
            .next()
            .as_ref()
            .and_then(Value::as_u64)
            .ok_or(DecodeError::MissingType)?;
        let kind = MessageType::from_code(code).ok_or(DecodeError::UnknownType(code))?;

        let message = match kind {
            MessageType::Prefix => Self::Prefix {
                prefix: items.next().as_ref().and_then(as_text),
                uri: items.next().as_ref().and_then(as_text),
            },
            MessageType::Call => Self::Call {
                call_id: items.next().as_ref().and_then(as_text),
                proc_id: items.next().as_ref().and_then(as_text),
                args: items.collect(),
            },
            MessageType::Subscribe => Self::Subscribe {
                topic: items.next().as_ref().and_then(as_text),
            },
            MessageType::Unsubscribe => Self::Unsubscribe {
                topic: items.next().as_ref().and_then(as_text),
            },
            MessageType::Publish => Self::Publish {
                topic: items.next().as_ref().and_then(as_text),
                event: items.next(),
                exclude: items.next(),
                eligible: items.next(),
            },
            other => return Err(DecodeError::NotInbound(other)),
        };
        Ok(message)
    }

    /// Type of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Prefix { .. } => MessageType::Prefix,
            Self::Call { .. } => MessageType::Call,
            Self::Subscribe { .. } => MessageType::Subscribe,
            Self::Unsubscribe { .. } => MessageType::Unsubscribe,
            Self::Publish { .. } => MessageType::Publish,
        }
    }
}

/// Textual reading of a positional element.
///
/// Strings are taken as is, numbers and booleans as their JSON text. `null`,
/// arrays and objects have no textual form.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// A server-to-client message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// `[0, sessionId, protocolVersion, serverIdent]`
    Welcome {
        /// WAMP session id of the client
        session: String,
        /// Protocol version (always 1)
        protocol_version: u8,
        /// Server identification string
        server_ident: String,
    },
    /// `[3, callId, result]`
    CallResult {
        /// Correlation id from the CALL
        call_id: String,
        /// Serialized return value
        result: Value,
    },
    /// `[4, callId, errorUri, errorDesc, errorDetails?]`
    CallError {
        /// Correlation id from the CALL
        call_id: String,
        /// `<base>/error#<Kind>`
        error_uri: String,
        /// Human-readable description
        description: String,
        /// Optional details
        details: Option<String>,
    },
    /// `[8, topic, event]`
    Event {
        /// Full topic URI
        topic: String,
        /// Payload
        event: Value,
    },
}

impl Outbound {
    /// Type of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Welcome { .. } => MessageType::Welcome,
            Self::CallResult { .. } => MessageType::CallResult,
            Self::CallError { .. } => MessageType::CallError,
            Self::Event { .. } => MessageType::Event,
        }
    }

    /// JSON array form of the message.
    pub fn to_value(&self) -> Value {
        let code = self.message_type().code();
        match self {
            Self::Welcome {
                session,
                protocol_version,
                server_ident,
            } => json!([code, session, protocol_version, server_ident]),
            Self::CallResult { call_id, result } => json!([code, call_id, result]),
            Self::CallError {
                call_id,
                error_uri,
                description,
                details,
            } => match details {
                Some(details) => json!([code, call_id, error_uri, description, details]),
                None => json!([code, call_id, error_uri, description]),
            },
            Self::Event { topic, event } => json!([code, topic, event]),
        }
    }

    /// Serialized text frame.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_wire_table() {
        for code in 0..=8u64 {
            let kind = MessageType::from_code(code).unwrap();
            assert_eq!(u64::from(kind.code()), code);
        }
        assert_eq!(MessageType::from_code(9), None);
    }

    #[test]
    fn only_client_types_are_inbound() {
        let inbound: Vec<_> = (0..=8)
            .filter_map(MessageType::from_code)
            .filter(|t| t.is_inbound())
            .map(MessageType::code)
            .collect();
        assert_eq!(inbound, vec![1, 2, 5, 6, 7]);
    }

    #[test]
    fn decode_call_collects_arguments() {
        let msg = Inbound::decode(r#"[2, "abc", "calc:add", 1, {"x": 2}, null]"#).unwrap();
        assert_eq!(
            msg,
            Inbound::Call {
                call_id: Some("abc".into()),
                proc_id: Some("calc:add".into()),
                args: vec![json!(1), json!({"x": 2}), Value::Null],
            }
        );
    }

    #[test]
    fn decode_call_with_numeric_call_id() {
        let msg = Inbound::decode("[2, 42]").unwrap();
        assert_eq!(
            msg,
            Inbound::Call {
                call_id: Some("42".into()),
                proc_id: None,
                args: vec![],
            }
        );
    }

    #[test]
    fn decode_publish_keeps_null_payload() {
        let msg = Inbound::decode(r#"[7, "http://t", null]"#).unwrap();
        let Inbound::Publish { event, exclude, .. } = msg else {
            panic!("expected a publish");
        };
        assert_eq!(event, Some(Value::Null));
        assert_eq!(exclude, None);
    }

    #[test]
    fn decode_rejects_bad_frames() {
        assert!(matches!(
            Inbound::decode("not json"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"a": 1}"#),
            Err(DecodeError::NotAnArray)
        ));
        assert!(matches!(Inbound::decode("[]"), Err(DecodeError::MissingType)));
        assert!(matches!(
            Inbound::decode(r#"["2"]"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(
            Inbound::decode("[42]"),
            Err(DecodeError::UnknownType(42))
        ));
        assert!(matches!(
            Inbound::decode(r#"[8, "t", "e"]"#),
            Err(DecodeError::NotInbound(MessageType::Event))
        ));
    }

    #[test]
    fn call_error_details_are_optional() {
        let short = Outbound::CallError {
            call_id: "1".into(),
            error_uri: "http://h/wamp/error#IllegalArgumentException".into(),
            description: "bad".into(),
            details: None,
        };
        assert_eq!(short.to_value().as_array().map(Vec::len), Some(4));

        let long = Outbound::CallError {
            call_id: "1".into(),
            error_uri: "http://h/wamp/error#IllegalArgumentException".into(),
            description: "bad".into(),
            details: Some("more".into()),
        };
        assert_eq!(long.to_value()[4], "more");
    }

    #[test]
    fn welcome_encoding() {
        let welcome = Outbound::Welcome {
            session: "s1".into(),
            protocol_version: 1,
            server_ident: "wisdom-wamp/0.1.0".into(),
        };
        assert_eq!(welcome.encode(), r#"[0,"s1",1,"wisdom-wamp/0.1.0"]"#);
    }
}
