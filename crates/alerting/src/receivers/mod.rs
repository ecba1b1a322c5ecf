//! Channel identity, sender capabilities, and the built-in notifiers.
//!
//! A notifier turns a group of [`Alert`]s into one channel-specific payload and
//! hands it to the sender it was constructed with. Senders are owned by the
//! hosting application and injected through [`crate::SenderFactory`]:
//!
//! - [`WebhookSender`] - anything that can dispatch an [`OutboundRequest`]
//!   (normally a shared [`crate::WebhookClient`])
//! - [`EmailSender`] - anything that can deliver an [`EmailMessage`]
//!
//! ## Built-in notifiers
//!
//! - **Webhook** - generic JSON webhook with auth, HMAC signing and TLS
//! - **Email** - plain-text summary through the email sender
//! - **ntfy** - topic push notifications
//! - **Slack** - incoming webhooks with Block Kit
//! - **Discord** - webhook embeds
//! - **`PagerDuty`** - Events API v2 trigger/resolve

pub mod discord;
pub mod email;
pub mod ntfy;
pub mod pagerduty;
pub mod slack;
pub mod webhook;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::error::{BoxError, NotifyError, WebhookError};
use crate::http::OutboundRequest;

pub use discord::DiscordNotifier;
pub use email::{EmailMessage, EmailNotifier};
pub use ntfy::NtfyNotifier;
pub use pagerduty::PagerDutyNotifier;
pub use slack::SlackNotifier;
pub use webhook::WebhookNotifier;

/// Channel kinds a receiver can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelType {
    /// Prometheus Alertmanager
    #[serde(rename = "prometheus-alertmanager")]
    Alertmanager,
    /// DingDing
    #[serde(rename = "dingding")]
    Dingding,
    /// Discord
    #[serde(rename = "discord")]
    Discord,
    /// ntfy
    #[serde(rename = "ntfy")]
    Ntfy,
    /// Email
    #[serde(rename = "email")]
    Email,
    /// Google Chat
    #[serde(rename = "googlechat")]
    GoogleChat,
    /// Kafka REST proxy
    #[serde(rename = "kafka")]
    Kafka,
    /// LINE
    #[serde(rename = "LINE")]
    Line,
    /// Grafana `OnCall`
    #[serde(rename = "oncall")]
    OnCall,
    /// Opsgenie
    #[serde(rename = "opsgenie")]
    Opsgenie,
    /// `PagerDuty`
    #[serde(rename = "pagerduty")]
    PagerDuty,
    /// Pushover
    #[serde(rename = "pushover")]
    Pushover,
    /// Sensu Go
    #[serde(rename = "sensugo")]
    SensuGo,
    /// Slack
    #[serde(rename = "slack")]
    Slack,
    /// Microsoft Teams
    #[serde(rename = "teams")]
    Teams,
    /// Telegram
    #[serde(rename = "telegram")]
    Telegram,
    /// Threema
    #[serde(rename = "threema")]
    Threema,
    /// `VictorOps`
    #[serde(rename = "victorops")]
    VictorOps,
    /// Generic webhook
    #[serde(rename = "webhook")]
    Webhook,
    /// `WeCom`
    #[serde(rename = "wecom")]
    WeCom,
    /// Webex
    #[serde(rename = "webex")]
    Webex,
}

impl ChannelType {
    /// Every channel type, in the order integrations are built.
    pub const ALL: [Self; 21] = [
        Self::Alertmanager,
        Self::Dingding,
        Self::Discord,
        Self::Ntfy,
        Self::Email,
        Self::GoogleChat,
        Self::Kafka,
        Self::Line,
        Self::OnCall,
        Self::Opsgenie,
        Self::PagerDuty,
        Self::Pushover,
        Self::SensuGo,
        Self::Slack,
        Self::Teams,
        Self::Telegram,
        Self::Threema,
        Self::VictorOps,
        Self::Webhook,
        Self::WeCom,
        Self::Webex,
    ];

    /// Configuration tag for this channel type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Alertmanager => "prometheus-alertmanager",
            Self::Dingding => "dingding",
            Self::Discord => "discord",
            Self::Ntfy => "ntfy",
            Self::Email => "email",
            Self::GoogleChat => "googlechat",
            Self::Kafka => "kafka",
            Self::Line => "LINE",
            Self::OnCall => "oncall",
            Self::Opsgenie => "opsgenie",
            Self::PagerDuty => "pagerduty",
            Self::Pushover => "pushover",
            Self::SensuGo => "sensugo",
            Self::Slack => "slack",
            Self::Teams => "teams",
            Self::Telegram => "telegram",
            Self::Threema => "threema",
            Self::VictorOps => "victorops",
            Self::Webhook => "webhook",
            Self::WeCom => "wecom",
            Self::Webex => "webex",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of sender a notifier is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// HTTP webhook dispatch
    Webhook,
    /// Email delivery
    Email,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Webhook => "webhook",
            Self::Email => "email",
        })
    }
}

/// Identity of one configured channel. Used for error attribution and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Stable channel UID
    pub uid: String,
    /// Human-readable channel name
    pub name: String,
    /// Channel type tag
    pub channel_type: ChannelType,
    /// Suppress notifications for resolved alerts
    pub disable_resolve_message: bool,
}

/// Process-wide values some notifiers embed in their payloads.
#[derive(Debug, Clone)]
pub struct NotifierContext {
    /// Organization the receiver belongs to
    pub org_id: i64,
    /// Version string of the hosting application
    pub app_version: String,
}

impl Default for NotifierContext {
    fn default() -> Self {
        Self {
            org_id: 1,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Capability to dispatch one outbound HTTP request.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Send `request`, aborting if `cancel` fires first.
    async fn send_webhook(
        &self,
        cancel: &CancellationToken,
        request: &OutboundRequest,
    ) -> Result<(), WebhookError>;
}

/// Capability to deliver one email message.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver `message`, aborting if `cancel` fires first.
    async fn send_email(
        &self,
        cancel: &CancellationToken,
        message: &EmailMessage,
    ) -> Result<(), BoxError>;
}

/// A constructed channel notifier.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a group of alerts to the channel.
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert])
        -> Result<(), NotifyError>;

    /// Whether resolved alerts should be delivered too.
    fn send_resolved(&self) -> bool;
}

/// A sender handed to a notifier constructor.
#[derive(Clone)]
pub enum Sender {
    /// Webhook-capable sender
    Webhook(Arc<dyn WebhookSender>),
    /// Email-capable sender
    Email(Arc<dyn EmailSender>),
}

impl Sender {
    /// Capability this sender provides.
    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::Webhook(_) => Capability::Webhook,
            Self::Email(_) => Capability::Email,
        }
    }

    /// Unwrap a webhook sender.
    pub fn into_webhook(self) -> Result<Arc<dyn WebhookSender>, BoxError> {
        match self {
            Self::Webhook(sender) => Ok(sender),
            Self::Email(_) => Err("expected a webhook sender, got an email sender".into()),
        }
    }

    /// Unwrap an email sender.
    pub fn into_email(self) -> Result<Arc<dyn EmailSender>, BoxError> {
        match self {
            Self::Email(sender) => Ok(sender),
            Self::Webhook(_) => Err("expected an email sender, got a webhook sender".into()),
        }
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sender").field(&self.capability()).finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording senders shared by notifier and factory tests.

    use std::sync::Mutex;

    use super::*;

    /// Webhook sender that records every request and answers with `fail`.
    #[derive(Default)]
    pub struct RecordingSender {
        pub requests: Mutex<Vec<OutboundRequest>>,
        pub fail: bool,
    }

    impl RecordingSender {
        pub fn failing() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn last(&self) -> OutboundRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }

        pub fn last_json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.last().body).unwrap()
        }

        pub fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WebhookSender for RecordingSender {
        async fn send_webhook(
            &self,
            _cancel: &CancellationToken,
            request: &OutboundRequest,
        ) -> Result<(), WebhookError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                Err(WebhookError::unsuccessful_status(500, b"boom"))
            } else {
                Ok(())
            }
        }
    }

    /// Email sender that records every message.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub messages: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailSender for RecordingMailer {
        async fn send_email(
            &self,
            _cancel: &CancellationToken,
            message: &EmailMessage,
        ) -> Result<(), BoxError> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_tags_round_trip_through_serde() {
        for channel_type in ChannelType::ALL {
            let json = serde_json::to_string(&channel_type).unwrap();
            assert_eq!(json, format!("\"{}\"", channel_type.as_str()));
        }
    }

    #[test]
    fn test_sender_capability_mismatch() {
        let sender = Sender::Email(Arc::new(testing::RecordingMailer::default()));
        assert_eq!(sender.capability(), Capability::Email);
        assert!(sender.into_webhook().is_err());
    }
}
