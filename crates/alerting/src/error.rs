//! Error types for webhook dispatch and integration building.

use std::fmt;

use thiserror::Error;

use crate::receivers::{Capability, ChannelType, Metadata};

/// Boxed error crossing a caller-owned boundary (sender factories,
/// response validators, email senders).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Maximum number of response body bytes kept in an [`WebhookError::UnsuccessfulStatus`].
const MAX_ERROR_BODY_BYTES: usize = 512;

/// Errors returned by [`crate::WebhookClient::send`].
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Requested method is neither POST nor PUT. Detected before any I/O.
    #[error("Invalid HTTP method {0:?}: only POST and PUT are supported")]
    InvalidMethod(String),

    /// Body could not be serialized to the wire format
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL or header could not be turned into a request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// TLS material could not be loaded
    #[error("Invalid TLS configuration: {0}")]
    Tls(String),

    /// Connection, TLS handshake or timeout failure
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The caller's cancellation token fired before the response was read
    #[error("Request cancelled")]
    Cancelled,

    /// The caller-supplied response validator rejected the response
    #[error("{0}")]
    ValidationRejected(#[source] BoxError),

    /// Response status outside 200-299
    #[error("Webhook returned status {status}: {body}")]
    UnsuccessfulStatus {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },
}

impl WebhookError {
    pub(crate) fn unsuccessful_status(status: u16, body: &[u8]) -> Self {
        let body = String::from_utf8_lossy(body);
        Self::UnsuccessfulStatus {
            status,
            body: truncate(&body, MAX_ERROR_BODY_BYTES),
        }
    }

    /// HTTP status code, when the failure came from the response status.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::UnsuccessfulStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors a notifier can return at dispatch time.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Webhook delivery failed
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// Email delivery failed
    #[error("Failed to send email: {0}")]
    Email(#[source] BoxError),

    /// Payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One channel that could not be turned into an integration.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The injected sender factory failed for this channel
    #[error("unable to build {capability} client for {channel_type} notifier {name} (UID: {uid}): {source}")]
    SenderConstruction {
        /// Capability that was requested
        capability: Capability,
        /// Channel type tag
        channel_type: ChannelType,
        /// Channel display name
        name: String,
        /// Channel UID
        uid: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// The channel constructor rejected its settings
    #[error("invalid settings for {channel_type} notifier {name} (UID: {uid}): {source}")]
    InvalidSettings {
        /// Channel type tag
        channel_type: ChannelType,
        /// Channel display name
        name: String,
        /// Channel UID
        uid: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// No constructor is registered for the channel type
    #[error("no notifier registered for {channel_type} notifier {name} (UID: {uid})")]
    UnsupportedChannel {
        /// Channel type tag
        channel_type: ChannelType,
        /// Channel display name
        name: String,
        /// Channel UID
        uid: String,
    },
}

impl BuildError {
    pub(crate) fn sender_construction(
        capability: Capability,
        meta: &Metadata,
        source: BoxError,
    ) -> Self {
        Self::SenderConstruction {
            capability,
            channel_type: meta.channel_type,
            name: meta.name.clone(),
            uid: meta.uid.clone(),
            source,
        }
    }

    pub(crate) fn invalid_settings(meta: &Metadata, source: BoxError) -> Self {
        Self::InvalidSettings {
            channel_type: meta.channel_type,
            name: meta.name.clone(),
            uid: meta.uid.clone(),
            source,
        }
    }

    pub(crate) fn unsupported(meta: &Metadata) -> Self {
        Self::UnsupportedChannel {
            channel_type: meta.channel_type,
            name: meta.name.clone(),
            uid: meta.uid.clone(),
        }
    }

    /// UID of the channel that failed.
    #[must_use]
    pub fn uid(&self) -> &str {
        match self {
            Self::SenderConstruction { uid, .. }
            | Self::InvalidSettings { uid, .. }
            | Self::UnsupportedChannel { uid, .. } => uid,
        }
    }

    /// Type of the channel that failed.
    #[must_use]
    pub const fn channel_type(&self) -> ChannelType {
        match self {
            Self::SenderConstruction { channel_type, .. }
            | Self::InvalidSettings { channel_type, .. }
            | Self::UnsupportedChannel { channel_type, .. } => *channel_type,
        }
    }
}

/// Ordered collection of build failures.
///
/// An empty aggregate means "no error". A non-empty one means the whole
/// operation failed, even if some channels were built.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<BuildError>,
}

impl AggregateError {
    /// Create an empty aggregate.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Record one more failure.
    pub fn push(&mut self, error: BuildError) {
        self.errors.push(error);
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate recorded failures in the order they happened.
    pub fn iter(&self) -> std::slice::Iter<'_, BuildError> {
        self.errors.iter()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl IntoIterator for AggregateError {
    type Item = BuildError;
    type IntoIter = std::vec::IntoIter<BuildError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a AggregateError {
    type Item = &'a BuildError;
    type IntoIter = std::slice::Iter<'a, BuildError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl FromIterator<BuildError> for AggregateError {
    fn from_iter<I: IntoIterator<Item = BuildError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

/// Truncate to at most `max` bytes on a char boundary.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, uid: &str) -> Metadata {
        Metadata {
            uid: uid.to_string(),
            name: name.to_string(),
            channel_type: ChannelType::Email,
            disable_resolve_message: false,
        }
    }

    #[test]
    fn test_aggregate_empty() {
        let errors = AggregateError::new();
        assert!(errors.is_empty());
        assert_eq!(errors.len(), 0);
        assert_eq!(errors.to_string(), "");
    }

    #[test]
    fn test_aggregate_joins_messages() {
        let mut errors = AggregateError::new();
        errors.push(BuildError::sender_construction(
            Capability::Email,
            &meta("ops mail", "abc"),
            "smtp not configured".into(),
        ));
        errors.push(BuildError::unsupported(&meta("other", "def")));

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.to_string(),
            "unable to build email client for email notifier ops mail (UID: abc): smtp not configured; \
             no notifier registered for email notifier other (UID: def)"
        );

        let uids: Vec<&str> = errors.iter().map(BuildError::uid).collect();
        assert_eq!(uids, vec!["abc", "def"]);
    }

    #[test]
    fn test_unsuccessful_status_truncates_body() {
        let body = "é".repeat(400);
        let err = WebhookError::unsuccessful_status(500, body.as_bytes());
        assert_eq!(err.status(), Some(500));

        let WebhookError::UnsuccessfulStatus { body, .. } = err else {
            panic!("expected UnsuccessfulStatus");
        };
        assert!(body.ends_with("..."));
        assert!(body.len() <= MAX_ERROR_BODY_BYTES + 3);
    }

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate("short", 10), "short");
    }
}
