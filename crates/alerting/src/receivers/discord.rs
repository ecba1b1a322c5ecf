//! Discord webhook notification channel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Metadata, Notifier, NotifierContext, Sender, WebhookSender};
use crate::alert::{self, Alert};
use crate::config::ChannelConfig;
use crate::error::{BoxError, NotifyError};
use crate::http::OutboundRequest;

/// Discord caps embed descriptions at 4096 characters.
const MAX_DESCRIPTION_CHARS: usize = 4096;

/// Discord caps embeds at 25 fields.
const MAX_FIELDS: usize = 25;

/// Discord channel settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordSettings {
    /// Webhook URL
    #[serde(default)]
    pub url: String,
    /// Avatar override
    #[serde(default)]
    pub avatar_url: String,
    /// Keep the username configured on the Discord side
    #[serde(default)]
    pub use_discord_username: bool,
}

impl DiscordSettings {
    /// Parse and validate channel settings.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, BoxError> {
        let settings: Self = config.settings()?;
        if settings.url.trim().is_empty() {
            return Err("could not find webhook url property in settings".into());
        }
        Ok(settings)
    }
}

/// Discord notifier.
pub struct DiscordNotifier {
    meta: Metadata,
    settings: DiscordSettings,
    sender: Arc<dyn WebhookSender>,
    app_version: String,
}

impl DiscordNotifier {
    /// Create a notifier bound to `sender`.
    #[must_use]
    pub fn new(
        settings: DiscordSettings,
        meta: Metadata,
        sender: Arc<dyn WebhookSender>,
        context: &NotifierContext,
    ) -> Self {
        Self {
            meta,
            settings,
            sender,
            app_version: context.app_version.clone(),
        }
    }

    /// Registry constructor.
    pub fn construct(
        config: &ChannelConfig,
        sender: Sender,
        context: &NotifierContext,
    ) -> Result<Arc<dyn Notifier>, BoxError> {
        let settings = DiscordSettings::from_config(config)?;
        Ok(Arc::new(Self::new(
            settings,
            config.metadata(),
            sender.into_webhook()?,
            context,
        )))
    }

    /// Format alerts as a Discord webhook payload.
    fn format_payload(&self, alerts: &[Alert]) -> DiscordPayload {
        let status = alert::group_status(alerts);
        let description: String = alert::message_for(alerts)
            .chars()
            .take(MAX_DESCRIPTION_CHARS)
            .collect();

        let embed = DiscordEmbed {
            title: alert::title_for(alerts),
            description,
            color: status.color(),
            timestamp: Utc::now().to_rfc3339(),
            footer: Some(DiscordFooter {
                text: format!("Alerting v{}", self.app_version),
            }),
            fields: alert::common_labels(alerts)
                .into_iter()
                .take(MAX_FIELDS)
                .map(|(k, v)| DiscordField::inline(k, v))
                .collect(),
        };

        DiscordPayload {
            username: (!self.settings.use_discord_username).then(|| "Alerting".to_string()),
            avatar_url: (!self.settings.avatar_url.is_empty()).then(|| self.settings.avatar_url.clone()),
            embeds: vec![embed],
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<(), NotifyError> {
        let payload = self.format_payload(alerts);
        let request = OutboundRequest::json(self.settings.url.clone(), &payload)?;

        debug!(channel_type = %self.meta.channel_type, uid = %self.meta.uid, "Sending notification");

        self.sender.send_webhook(cancel, &request).await.map_err(|e| {
            warn!(
                channel_type = %self.meta.channel_type,
                uid = %self.meta.uid,
                error = %e,
                "Discord webhook request failed"
            );
            NotifyError::from(e)
        })
    }

    fn send_resolved(&self) -> bool {
        !self.meta.disable_resolve_message
    }
}

// =============================================================================
// Discord API types
// =============================================================================

#[derive(Debug, Serialize)]
struct DiscordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordFooter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<DiscordField>,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: String,
}

#[derive(Debug, Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

impl DiscordField {
    fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::receivers::testing::RecordingSender;
    use crate::receivers::ChannelType;

    fn notifier(settings: serde_json::Value) -> (DiscordNotifier, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        let cfg = ChannelConfig::new(ChannelType::Discord, "d-uid", "discord").with_settings(settings);
        let notifier = DiscordNotifier::new(
            DiscordSettings::from_config(&cfg).unwrap(),
            cfg.metadata(),
            sender.clone(),
            &NotifierContext::default(),
        );
        (notifier, sender)
    }

    #[test]
    fn test_discord_payload_format() {
        let (notifier, _) = notifier(json!({"url": "https://discord.com/api/webhooks/x"}));
        let payload = notifier.format_payload(&[Alert::new("HighCPU").with_label("env", "prod")]);

        assert_eq!(payload.username.as_deref(), Some("Alerting"));
        assert!(payload.avatar_url.is_none());
        let embed = &payload.embeds[0];
        assert_eq!(embed.title, "[FIRING:1] HighCPU prod");
        assert_eq!(embed.color, 0x00e7_4c3c);
        assert_eq!(embed.fields.len(), 2);
        assert!(embed.fields.iter().all(|f| f.inline));
    }

    #[tokio::test]
    async fn test_use_discord_username() {
        let (notifier, sender) = notifier(json!({
            "url": "https://discord.com/api/webhooks/x",
            "use_discord_username": true,
            "avatar_url": "https://example.com/a.png"
        }));
        notifier.notify(&CancellationToken::new(), &[Alert::new("A")]).await.unwrap();

        let body = sender.last_json();
        assert!(body.get("username").is_none());
        assert_eq!(body["avatar_url"], "https://example.com/a.png");
        assert_eq!(body["embeds"][0]["title"], "[FIRING:1] A");
    }
}
