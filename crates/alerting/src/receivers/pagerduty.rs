//! `PagerDuty` Events API v2 notification channel.
//!
//! A firing group triggers an incident; a resolved group resolves it. Both use
//! the same dedup key (the group key of the alerts), so `PagerDuty` correlates
//! them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Metadata, Notifier, NotifierContext, Sender, WebhookSender};
use crate::alert::{self, Alert, AlertStatus};
use crate::config::ChannelConfig;
use crate::error::{BoxError, NotifyError};
use crate::http::OutboundRequest;

/// `PagerDuty` Events API v2 endpoint.
pub const EVENTS_API_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// `PagerDuty` rejects summaries longer than this.
const MAX_SUMMARY_CHARS: usize = 1024;

/// `PagerDuty` event action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    /// Trigger a new incident or add to existing
    Trigger,
    /// Resolve an incident
    Resolve,
}

/// `PagerDuty` event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Critical severity
    #[default]
    Critical,
    /// Error severity
    Error,
    /// Warning severity
    Warning,
    /// Info severity
    Info,
}

/// `PagerDuty` channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagerDutySettings {
    /// Integration (routing) key
    #[serde(default)]
    pub integration_key: String,
    /// Severity of triggered incidents
    #[serde(default)]
    pub severity: EventSeverity,
    /// Events API endpoint
    #[serde(default = "default_url")]
    pub url: String,
    /// Event source
    #[serde(default = "default_source")]
    pub source: String,
    /// Component affected
    #[serde(default)]
    pub component: Option<String>,
    /// Group for categorization
    #[serde(default)]
    pub group: Option<String>,
    /// Class/type of event
    #[serde(default)]
    pub class: Option<String>,
}

fn default_url() -> String {
    EVENTS_API_URL.to_string()
}

fn default_source() -> String {
    "alerting".to_string()
}

impl PagerDutySettings {
    /// Parse and validate channel settings.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, BoxError> {
        let settings: Self = config.settings()?;
        if settings.integration_key.trim().is_empty() {
            return Err("could not find integration key property in settings".into());
        }
        Ok(settings)
    }
}

/// `PagerDuty` notifier.
pub struct PagerDutyNotifier {
    meta: Metadata,
    settings: PagerDutySettings,
    sender: Arc<dyn WebhookSender>,
}

impl PagerDutyNotifier {
    /// Create a notifier bound to `sender`.
    #[must_use]
    pub fn new(settings: PagerDutySettings, meta: Metadata, sender: Arc<dyn WebhookSender>) -> Self {
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
        let settings = PagerDutySettings::from_config(config)?;
        Ok(Arc::new(Self::new(settings, config.metadata(), sender.into_webhook()?)))
    }

    fn build_event(&self, alerts: &[Alert]) -> ApiPayload {
        let event_action = match alert::group_status(alerts) {
            AlertStatus::Firing => EventAction::Trigger,
            AlertStatus::Resolved => EventAction::Resolve,
        };
        let now = chrono::Utc::now();
        let firing = alerts
            .iter()
            .filter(|a| a.status_at(now) == AlertStatus::Firing)
            .count();

        ApiPayload {
            routing_key: self.settings.integration_key.clone(),
            event_action,
            dedup_key: alert::group_key(alerts),
            payload: EventPayload {
                summary: alert::title_for(alerts).chars().take(MAX_SUMMARY_CHARS).collect(),
                source: self.settings.source.clone(),
                severity: self.settings.severity,
                timestamp: Some(now.to_rfc3339()),
                component: self.settings.component.clone(),
                group: self.settings.group.clone(),
                class: self.settings.class.clone(),
                custom_details: Some(serde_json::json!({
                    "firing": alert::message_for(alerts),
                    "num_firing": firing,
                    "num_resolved": alerts.len() - firing,
                })),
            },
        }
    }
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<(), NotifyError> {
        let event = self.build_event(alerts);

        debug!(
            channel_type = %self.meta.channel_type,
            uid = %self.meta.uid,
            action = ?event.event_action,
            dedup_key = %event.dedup_key,
            "Sending PagerDuty event"
        );

        let request = OutboundRequest::json(self.settings.url.clone(), &event)?;
        self.sender.send_webhook(cancel, &request).await.map_err(|e| {
            warn!(
                channel_type = %self.meta.channel_type,
                uid = %self.meta.uid,
                error = %e,
                "PagerDuty API request failed"
            );
            NotifyError::from(e)
        })
    }

    fn send_resolved(&self) -> bool {
        !self.meta.disable_resolve_message
    }
}

// =============================================================================
// API types
// =============================================================================

/// `PagerDuty` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    /// Brief summary of the event
    pub summary: String,
    /// Source of the event
    pub source: String,
    /// Severity level
    pub severity: EventSeverity,
    /// Timestamp (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Component affected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Group for categorization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Class/type of event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Custom details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ApiPayload {
    routing_key: String,
    event_action: EventAction,
    dedup_key: String,
    payload: EventPayload,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::*;
    use crate::receivers::testing::RecordingSender;
    use crate::receivers::ChannelType;

    fn notifier(settings: serde_json::Value) -> (PagerDutyNotifier, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        let cfg = ChannelConfig::new(ChannelType::PagerDuty, "pd-uid", "pager").with_settings(settings);
        let notifier = PagerDutyNotifier::new(
            PagerDutySettings::from_config(&cfg).unwrap(),
            cfg.metadata(),
            sender.clone(),
        );
        (notifier, sender)
    }

    #[test]
    fn test_integration_key_required() {
        let cfg = ChannelConfig::new(ChannelType::PagerDuty, "u", "n").with_settings(json!({}));
        assert!(PagerDutySettings::from_config(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_trigger_then_resolve_share_dedup_key() {
        let (notifier, sender) = notifier(json!({"integrationKey": "key-123", "severity": "warning"}));
        let firing = Alert::new("DbDown").with_label("env", "prod");
        let resolved = firing.clone().resolved_at(Utc::now() - Duration::seconds(5));

        notifier.notify(&CancellationToken::new(), &[firing]).await.unwrap();
        let trigger = sender.last_json();
        notifier.notify(&CancellationToken::new(), &[resolved]).await.unwrap();
        let resolve = sender.last_json();

        assert_eq!(sender.last().url, EVENTS_API_URL);
        assert_eq!(trigger["routing_key"], "key-123");
        assert_eq!(trigger["event_action"], "trigger");
        assert_eq!(trigger["payload"]["severity"], "warning");
        assert_eq!(trigger["payload"]["source"], "alerting");
        assert_eq!(trigger["payload"]["custom_details"]["num_firing"], 1);
        assert_eq!(resolve["event_action"], "resolve");
        assert_eq!(trigger["dedup_key"], resolve["dedup_key"]);
    }

    #[test]
    fn test_unrelated_groups_get_distinct_dedup_keys() {
        let (notifier, _) = notifier(json!({"integrationKey": "k"}));
        let disk = notifier.build_event(&[
            Alert::new("DiskFull").with_label("host", "a"),
            Alert::new("HighCPU").with_label("host", "b"),
        ]);
        let memory = notifier.build_event(&[
            Alert::new("OOM").with_label("host", "c"),
            Alert::new("Latency").with_label("host", "d"),
        ]);

        assert_ne!(disk.dedup_key, memory.dedup_key);
    }

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let (notifier, _) = notifier(json!({"integrationKey": "k"}));
        let json = serde_json::to_string(&notifier.build_event(&[Alert::new("A")])).unwrap();

        assert!(json.contains("\"event_action\":\"trigger\""));
        assert!(json.contains("\"severity\":\"critical\""));
        assert!(!json.contains("\"component\""));
    }
}
