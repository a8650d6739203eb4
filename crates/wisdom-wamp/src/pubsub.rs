//! Publication options and recipient selection.

use std::sync::Arc;

use indexmap::IndexSet;
use serde_json::Value;

use crate::client::WampClient;
use crate::message::as_text;

/// Who may receive one publication.
///
/// Both sets hold WAMP session ids. A session that appears in `eligible`
/// and in `exclude` does not receive the event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    exclude: IndexSet<String>,
    eligible: Option<IndexSet<String>>,
}

impl PublishOptions {
    /// Every subscriber receives the event.
    pub fn everyone() -> Self {
        Self::default()
    }

    /// Read the optional third and fourth elements of a PUBLISH frame.
    ///
    /// `exclude` may be `true` (skip the publisher), `false` or a list of
    /// sessions. Any other shape invalidates the publication and yields
    /// `None`. A non-array `eligible` is ignored.
    pub fn from_publish(
        exclude: Option<&Value>,
        eligible: Option<&Value>,
        publisher_session: &str,
    ) -> Option<Self> {
        let exclude = match exclude {
            None | Some(Value::Bool(false)) => IndexSet::new(),
            Some(Value::Bool(true)) => IndexSet::from([publisher_session.to_string()]),
            Some(Value::Array(sessions)) => collect_sessions(sessions),
            Some(_) => return None,
        };
        Some(Self {
            exclude,
            eligible: session_list(eligible),
        })
    }

    /// Read exclusion and eligibility lists carried as event properties.
    ///
    /// Values that are not arrays are treated as absent.
    pub fn from_lists(exclude: Option<&Value>, eligible: Option<&Value>) -> Self {
        Self {
            exclude: session_list(exclude).unwrap_or_default(),
            eligible: session_list(eligible),
        }
    }

    /// Exclude `session` in addition to the current exclusions.
    pub fn exclude(mut self, session: impl Into<String>) -> Self {
        self.exclude.insert(session.into());
        self
    }

    /// Restrict delivery to `sessions`.
    pub fn eligible<I, S>(mut self, sessions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eligible = Some(sessions.into_iter().map(Into::into).collect());
        self
    }

    /// Whether a client with this session receives the event.
    pub fn admits(&self, session: &str) -> bool {
        let eligible = self
            .eligible
            .as_ref()
            .is_none_or(|sessions| sessions.contains(session));
        eligible && !self.exclude.contains(session)
    }

    /// Exclusion list as a JSON array, empty when nobody is excluded.
    pub fn exclusions_value(&self) -> Value {
        Value::from_iter(self.exclude.iter().cloned())
    }

    /// Eligibility list as a JSON array, `None` when unrestricted.
    pub fn eligible_value(&self) -> Option<Value> {
        self.eligible
            .as_ref()
            .map(|sessions| Value::from_iter(sessions.iter().cloned()))
    }
}

fn session_list(value: Option<&Value>) -> Option<IndexSet<String>> {
    match value {
        Some(Value::Array(sessions)) => Some(collect_sessions(sessions)),
        _ => None,
    }
}

fn collect_sessions(values: &[Value]) -> IndexSet<String> {
    values.iter().filter_map(as_text).collect()
}

/// Filter a subscriber snapshot down to the clients admitted by `options`.
///
/// The input order is kept.
pub fn select_recipients(
    subscribers: Vec<Arc<WampClient>>,
    options: &PublishOptions,
) -> Vec<Arc<WampClient>> {
    subscribers
        .into_iter()
        .filter(|client| options.admits(client.session()))
        .collect()
}
