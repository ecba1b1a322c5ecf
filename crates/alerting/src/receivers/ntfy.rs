//! ntfy push notification channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{Metadata, Notifier, NotifierContext, Sender, WebhookSender};
use crate::alert::{self, Alert};
use crate::config::ChannelConfig;
use crate::error::{BoxError, NotifyError};
use crate::http::OutboundRequest;

/// ntfy channel settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NtfySettings {
    /// ntfy server URL
    #[serde(default)]
    pub url: String,
    /// Topic to publish to
    #[serde(default)]
    pub channel: String,
}

impl NtfySettings {
    /// Parse and validate channel settings.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, BoxError> {
        let settings: Self = config.settings()?;
        if settings.url.trim().is_empty() {
            return Err("could not find url property in settings".into());
        }
        if settings.channel.trim().is_empty() {
            return Err("could not find channel property in settings".into());
        }
        Ok(settings)
    }
}

#[derive(Debug, Serialize)]
struct NtfyMessage {
    topic: String,
    title: String,
    message: String,
}

/// ntfy notifier.
pub struct NtfyNotifier {
    meta: Metadata,
    settings: NtfySettings,
    sender: Arc<dyn WebhookSender>,
}

impl NtfyNotifier {
    /// Create a notifier bound to `sender`.
    #[must_use]
    pub fn new(settings: NtfySettings, meta: Metadata, sender: Arc<dyn WebhookSender>) -> Self {
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
        let settings = NtfySettings::from_config(config)?;
        Ok(Arc::new(Self::new(settings, config.metadata(), sender.into_webhook()?)))
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<(), NotifyError> {
        let msg = NtfyMessage {
            topic: self.settings.channel.clone(),
            title: alert::title_for(alerts),
            message: alert::message_for(alerts),
        };

        let request = OutboundRequest::json(self.settings.url.clone(), &msg)?
            .with_method("POST")
            .with_content_type("application/json");

        debug!(channel_type = %self.meta.channel_type, uid = %self.meta.uid, "Sending notification");

        if let Err(e) = self.sender.send_webhook(cancel, &request).await {
            error!(
                channel_type = %self.meta.channel_type,
                uid = %self.meta.uid,
                error = %e,
                "Failed to send notification to ntfy"
            );
            return Err(e.into());
        }
        Ok(())
    }

    fn send_resolved(&self) -> bool {
        !self.meta.disable_resolve_message
    }
}
