//! Client defaults and receiver configuration.

use std::env;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::receivers::{ChannelType, Metadata};

/// Environment variable overriding the `User-Agent`.
const ENV_USER_AGENT: &str = "ALERTING_USER_AGENT";

/// Environment variable overriding the request timeout, in seconds.
const ENV_HTTP_TIMEOUT_SECS: &str = "ALERTING_HTTP_TIMEOUT_SECS";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Defaults applied to every request sent by one [`crate::WebhookClient`].
///
/// Immutable once the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `User-Agent` sent on every request; callers cannot override it
    pub user_agent: String,
    /// Total timeout for one request, including reading the body
    pub timeout: Duration,
    /// Timeout for establishing the connection
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("alerting/{}", env!("CARGO_PKG_VERSION")),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults, overridden by `ALERTING_USER_AGENT` and
    /// `ALERTING_HTTP_TIMEOUT_SECS` when set and valid.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_agent: env::var(ENV_USER_AGENT)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            timeout: env::var(ENV_HTTP_TIMEOUT_SECS)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map_or(defaults.timeout, Duration::from_secs),
            connect_timeout: defaults.connect_timeout,
        }
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Client builder carrying these defaults.
    pub(crate) fn client_builder(&self) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
    }
}

/// A named receiver and the channels it notifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Receiver name
    pub name: String,
    /// Configured channels, in any order
    #[serde(default)]
    pub integrations: Vec<ChannelConfig>,
}

impl ReceiverConfig {
    /// Parse a receiver from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// One configured channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Stable UID
    pub uid: String,
    /// Display name
    pub name: String,
    /// Channel type tag
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    /// Suppress resolved notifications
    #[serde(default)]
    pub disable_resolve_message: bool,
    /// Channel-specific settings, parsed by the channel's constructor
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl ChannelConfig {
    /// Channel config with empty settings.
    #[must_use]
    pub fn new(channel_type: ChannelType, uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            channel_type,
            disable_resolve_message: false,
            settings: serde_json::Value::Null,
        }
    }

    /// Set the settings object.
    #[must_use]
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    /// Identity of this channel.
    #[must_use]
    pub fn metadata(&self) -> Metadata {
        Metadata {
            uid: self.uid.clone(),
            name: self.name.clone(),
            channel_type: self.channel_type,
            disable_resolve_message: self.disable_resolve_message,
        }
    }

    /// Deserialize the settings. Missing settings parse as an empty object.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        if self.settings.is_null() {
            serde_json::from_value(serde_json::Value::Object(serde_json::Map::new()))
        } else {
            T::deserialize(&self.settings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_client_config_from_env_defaults() {
        env::remove_var(ENV_USER_AGENT);
        env::remove_var(ENV_HTTP_TIMEOUT_SECS);

        let config = ClientConfig::from_env();
        assert!(config.user_agent.starts_with("alerting/"));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    #[serial]
    fn test_client_config_from_env_overrides() {
        env::set_var(ENV_USER_AGENT, "custom-agent");
        env::set_var(ENV_HTTP_TIMEOUT_SECS, "5");

        let config = ClientConfig::from_env();
        assert_eq!(config.user_agent, "custom-agent");
        assert_eq!(config.timeout, Duration::from_secs(5));

        env::set_var(ENV_HTTP_TIMEOUT_SECS, "soon");
        assert_eq!(ClientConfig::from_env().timeout, DEFAULT_TIMEOUT);

        env::remove_var(ENV_USER_AGENT);
        env::remove_var(ENV_HTTP_TIMEOUT_SECS);
    }

    #[test]
    fn test_receiver_config_parsing() {
        let receiver = ReceiverConfig::from_json(
            r#"{
                "name": "ops",
                "integrations": [
                    {"uid": "a1", "name": "hook", "type": "webhook", "settings": {"url": "http://x"}},
                    {"uid": "b2", "name": "mail", "type": "email", "disableResolveMessage": true}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(receiver.name, "ops");
        assert_eq!(receiver.integrations.len(), 2);

        let meta = receiver.integrations[1].metadata();
        assert_eq!(meta.channel_type, ChannelType::Email);
        assert_eq!(meta.uid, "b2");
        assert!(meta.disable_resolve_message);
        assert!(receiver.integrations[1].settings.is_null());
    }

    #[test]
    fn test_unknown_channel_type_rejected() {
        let result = ReceiverConfig::from_json(
            r#"{"name": "ops", "integrations": [{"uid": "a", "name": "b", "type": "carrier-pigeon"}]}"#,
        );
        assert!(result.is_err());
    }
}
