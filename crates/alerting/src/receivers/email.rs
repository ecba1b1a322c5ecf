//! Email notification channel.
//!
//! Delivery is delegated to the [`EmailSender`] the host supplies; this module
//! only decides who receives what.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{EmailSender, Metadata, Notifier, NotifierContext, Sender};
use crate::alert::{self, Alert};
use crate::config::ChannelConfig;
use crate::error::{BoxError, NotifyError};

/// Address list separators accepted in settings.
const ADDRESS_SEPARATORS: [char; 3] = [';', ',', '\n'];

/// Email channel settings as configured.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEmailSettings {
    #[serde(default)]
    addresses: String,
    #[serde(default)]
    single_email: bool,
    #[serde(default)]
    subject: Option<String>,
}

/// Email channel settings.
#[derive(Debug, Clone)]
pub struct EmailSettings {
    /// Recipients, trimmed, never empty
    pub addresses: Vec<String>,
    /// One message to all recipients instead of one per recipient
    pub single_email: bool,
    /// Subject override; the alert title is used otherwise
    pub subject: Option<String>,
}

impl EmailSettings {
    /// Parse and validate channel settings.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, BoxError> {
        let raw: RawEmailSettings = config.settings()?;
        let addresses: Vec<String> = raw
            .addresses
            .split(ADDRESS_SEPARATORS)
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(ToString::to_string)
            .collect();

        if addresses.is_empty() {
            return Err("could not find addresses in settings".into());
        }

        Ok(Self {
            addresses,
            single_email: raw.single_email,
            subject: raw.subject.filter(|s| !s.trim().is_empty()),
        })
    }
}

/// Message handed to the [`EmailSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipients
    pub to: Vec<String>,
    /// Address everyone in one message rather than one message each
    pub single_email: bool,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// Email notifier.
pub struct EmailNotifier {
    meta: Metadata,
    settings: EmailSettings,
    sender: Arc<dyn EmailSender>,
}

impl EmailNotifier {
    /// Create a notifier bound to `sender`.
    #[must_use]
    pub fn new(settings: EmailSettings, meta: Metadata, sender: Arc<dyn EmailSender>) -> Self {
        Self {
            meta,
            settings,
            sender,
        }
    }

    /// Registry constructor.
    pub fn construct(
        config: &ChannelConfig,
        sender: Sender,
        _context: &NotifierContext,
    ) -> Result<Arc<dyn Notifier>, BoxError> {
        let settings = EmailSettings::from_config(config)?;
        Ok(Arc::new(Self::new(settings, config.metadata(), sender.into_email()?)))
    }

    fn build_message(&self, alerts: &[Alert]) -> EmailMessage {
        EmailMessage {
            to: self.settings.addresses.clone(),
            single_email: self.settings.single_email,
            subject: self
                .settings
                .subject
                .clone()
                .unwrap_or_else(|| alert::title_for(alerts)),
            body: alert::message_for(alerts),
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<(), NotifyError> {
        let message = self.build_message(alerts);

        debug!(
            channel_type = %self.meta.channel_type,
            uid = %self.meta.uid,
            recipients = message.to.len(),
            single_email = message.single_email,
            "Sending email notification"
        );

        self.sender.send_email(cancel, &message).await.map_err(|e| {
            error!(
                channel_type = %self.meta.channel_type,
                uid = %self.meta.uid,
                error = %e,
                "Failed to send email notification"
            );
            NotifyError::Email(e)
        })
    }

    fn send_resolved(&self) -> bool {
        !self.meta.disable_resolve_message
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::receivers::testing::RecordingMailer;
    use crate::receivers::ChannelType;

    fn config(settings: serde_json::Value) -> ChannelConfig {
        ChannelConfig::new(ChannelType::Email, "mail-uid", "mail").with_settings(settings)
    }

    #[test]
    fn test_addresses_split_on_any_separator() {
        let settings = EmailSettings::from_config(&config(json!({
            "addresses": "a@example.com; b@example.com,c@example.com\n d@example.com ;"
        })))
        .unwrap();

        assert_eq!(
            settings.addresses,
            vec!["a@example.com", "b@example.com", "c@example.com", "d@example.com"]
        );
        assert!(!settings.single_email);
        assert!(settings.subject.is_none());
    }

    #[test]
    fn test_addresses_required() {
        assert!(EmailSettings::from_config(&config(json!({}))).is_err());
        assert!(EmailSettings::from_config(&config(json!({"addresses": " ; , "}))).is_err());
    }

    #[tokio::test]
    async fn test_notify_sends_one_message() {
        let mailer = Arc::new(RecordingMailer::default());
        let cfg = config(json!({"addresses": "a@example.com;b@example.com", "singleEmail": true}));
        let notifier = EmailNotifier::new(
            EmailSettings::from_config(&cfg).unwrap(),
            cfg.metadata(),
            mailer.clone(),
        );

        notifier
            .notify(&CancellationToken::new(), &[Alert::new("DiskFull")])
            .await
            .unwrap();

        let messages = mailer.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to.len(), 2);
        assert!(messages[0].single_email);
        assert_eq!(messages[0].subject, "[FIRING:1] DiskFull");
        assert!(messages[0].body.contains("DiskFull"));
    }

    #[tokio::test]
    async fn test_subject_override() {
        let mailer = Arc::new(RecordingMailer::default());
        let cfg = config(json!({"addresses": "ops@example.com", "subject": "Paging ops"}));
        let notifier = EmailNotifier::new(
            EmailSettings::from_config(&cfg).unwrap(),
            cfg.metadata(),
            mailer.clone(),
        );

        notifier.notify(&CancellationToken::new(), &[Alert::new("A")]).await.unwrap();
        assert_eq!(mailer.messages.lock().unwrap()[0].subject, "Paging ops");
    }

    #[test]
    fn test_construct_rejects_webhook_sender() {
        let cfg = config(json!({"addresses": "ops@example.com"}));
        let sender = Sender::Webhook(Arc::new(crate::receivers::testing::RecordingSender::default()));
        assert!(EmailNotifier::construct(&cfg, sender, &NotifierContext::default()).is_err());
    }
}
