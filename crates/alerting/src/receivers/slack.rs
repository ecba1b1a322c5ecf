//! Slack incoming-webhook notification channel.

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

/// Slack channel settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackSettings {
    /// Incoming webhook URL
    #[serde(default)]
    pub url: String,
    /// Channel override (`#ops`, `@user`)
    #[serde(default)]
    pub recipient: String,
    /// Bot username override
    #[serde(default)]
    pub username: String,
}

impl SlackSettings {
    /// Parse and validate channel settings.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, BoxError> {
        let settings: Self = config.settings()?;
        if settings.url.trim().is_empty() {
            return Err("required field 'url' is not specified".into());
        }
        Ok(settings)
    }
}

/// Slack notifier.
pub struct SlackNotifier {
    meta: Metadata,
    settings: SlackSettings,
    sender: Arc<dyn WebhookSender>,
    app_version: String,
}

impl SlackNotifier {
    /// Create a notifier bound to `sender`.
    #[must_use]
    pub fn new(
        settings: SlackSettings,
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
        let settings = SlackSettings::from_config(config)?;
        Ok(Arc::new(Self::new(
            settings,
            config.metadata(),
            sender.into_webhook()?,
            context,
        )))
    }

    /// Format alerts as a Slack webhook payload using Block Kit.
    fn format_payload(&self, alerts: &[Alert]) -> SlackPayload {
        let status = alert::group_status(alerts);
        let title = alert::title_for(alerts);

        let mut blocks = vec![
            // Header with emoji and title
            SlackBlock::Section {
                text: SlackText::mrkdwn(format!("{} *{}*", status.emoji(), title)),
            },
            SlackBlock::Section {
                text: SlackText::mrkdwn(alert::message_for(alerts)),
            },
        ];

        let fields: Vec<String> = alert::common_labels(alerts)
            .iter()
            .map(|(k, v)| format!("*{k}:* {v}"))
            .collect();
        if !fields.is_empty() {
            blocks.push(SlackBlock::Divider);
            blocks.push(SlackBlock::Section {
                text: SlackText::mrkdwn(fields.join(" • ")),
            });
        }

        blocks.push(SlackBlock::Context {
            elements: vec![SlackText::mrkdwn(format!(
                "Alerting v{} • {}",
                self.app_version,
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ))],
        });

        SlackPayload {
            channel: non_empty(&self.settings.recipient),
            username: non_empty(&self.settings.username),
            text: title, // Fallback for notifications
            blocks,
            attachments: vec![SlackAttachment {
                color: format!("#{:06x}", status.color()),
            }],
        }
    }
}

/// Slack explains failures in a plain-text body (`invalid_payload`, `channel_not_found`).
fn validate_response(body: &[u8], status: u16) -> Result<(), BoxError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    let body = String::from_utf8_lossy(body);
    Err(format!("Slack returned {status}: {body}").into())
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<(), NotifyError> {
        let payload = self.format_payload(alerts);
        let request = OutboundRequest::json(self.settings.url.clone(), &payload)?
            .with_validation(validate_response);

        debug!(channel_type = %self.meta.channel_type, uid = %self.meta.uid, "Sending notification");

        self.sender.send_webhook(cancel, &request).await.map_err(|e| {
            warn!(
                channel_type = %self.meta.channel_type,
                uid = %self.meta.uid,
                error = %e,
                "Slack webhook request failed"
            );
            NotifyError::from(e)
        })
    }

    fn send_resolved(&self) -> bool {
        !self.meta.disable_resolve_message
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

// =============================================================================
// Slack API types (Block Kit)
// =============================================================================

#[derive(Debug, Serialize)]
struct SlackPayload {
    /// Channel override
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    /// Username override
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    /// Fallback text for notifications
    text: String,
    /// Block Kit blocks
    blocks: Vec<SlackBlock>,
    /// Attachments (for color strip)
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SlackBlock {
    /// Section block with text
    Section { text: SlackText },
    /// Divider line
    Divider,
    /// Context block for metadata
    Context { elements: Vec<SlackText> },
}

#[derive(Debug, Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    text_type: &'static str,
    text: String,
}

impl SlackText {
    fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            text_type: "mrkdwn",
            text: text.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    /// Hex color for the attachment strip
    color: String,
}
