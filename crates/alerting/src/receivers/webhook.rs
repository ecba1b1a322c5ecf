//! Generic JSON webhook notifier.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{Metadata, Notifier, NotifierContext, Sender, WebhookSender};
use crate::alert::{self, Alert, AlertStatus};
use crate::config::ChannelConfig;
use crate::error::{BoxError, NotifyError};
use crate::http::{HttpMethod, OutboundRequest, SigningConfig, TlsConfig};

/// Payload schema version.
const PAYLOAD_VERSION: &str = "1";

/// HMAC settings as configured.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HmacSettings {
    /// Shared secret
    pub secret: String,
    /// Signature header (defaulted when empty)
    #[serde(default)]
    pub header: String,
    /// Timestamp header (defaulted when empty)
    #[serde(default)]
    pub timestamp_header: String,
}

/// Webhook channel settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSettings {
    /// Target URL
    pub url: String,
    /// POST or PUT; empty means POST
    #[serde(default)]
    pub http_method: String,
    /// Basic auth user
    #[serde(default)]
    pub username: String,
    /// Basic auth password
    #[serde(default)]
    pub password: String,
    /// Scheme for the `Authorization` header (defaults to `Bearer`)
    #[serde(default, rename = "authorization_scheme")]
    pub authorization_scheme: String,
    /// Credentials for the `Authorization` header
    #[serde(default, rename = "authorization_credentials")]
    pub authorization_credentials: String,
    /// Maximum alerts per request; 0 means unlimited
    #[serde(default)]
    pub max_alerts: usize,
    /// Request signing
    #[serde(default)]
    pub hmac_config: Option<HmacSettings>,
    /// TLS settings
    #[serde(default)]
    pub tls_config: Option<TlsConfig>,
    /// Extra headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl WebhookSettings {
    /// Parse and validate channel settings.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, BoxError> {
        let mut settings: Self = config.settings()?;

        if settings.url.trim().is_empty() {
            return Err("required field 'url' is not specified".into());
        }
        HttpMethod::parse(&settings.http_method)?;

        let has_basic = !settings.username.is_empty() || !settings.password.is_empty();
        if has_basic && !settings.authorization_credentials.is_empty() {
            return Err(
                "both HTTP Basic Authentication and Authorization Header are set, only 1 is permitted"
                    .into(),
            );
        }
        if !settings.authorization_credentials.is_empty() && settings.authorization_scheme.is_empty() {
            settings.authorization_scheme = "Bearer".to_string();
        }
        if let Some(hmac) = &settings.hmac_config {
            if hmac.secret.is_empty() {
                return Err("hmacConfig.secret must not be empty".into());
            }
        }

        Ok(settings)
    }
}

/// Body posted to the webhook.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookMessage<'a> {
    receiver: &'a str,
    status: AlertStatus,
    org_id: i64,
    alerts: &'a [Alert],
    truncated_alerts: usize,
    common_labels: BTreeMap<String, String>,
    title: String,
    message: String,
    version: &'static str,
}

/// Generic webhook notifier.
pub struct WebhookNotifier {
    meta: Metadata,
    settings: WebhookSettings,
    sender: Arc<dyn WebhookSender>,
    org_id: i64,
}

impl WebhookNotifier {
    /// Create a notifier bound to `sender`.
    #[must_use]
    pub fn new(
        settings: WebhookSettings,
        meta: Metadata,
        sender: Arc<dyn WebhookSender>,
        context: &NotifierContext,
    ) -> Self {
        Self {
            meta,
            settings,
            sender,
            org_id: context.org_id,
        }
    }

    /// Registry constructor.
    pub fn construct(
        config: &ChannelConfig,
        sender: Sender,
        context: &NotifierContext,
    ) -> Result<Arc<dyn Notifier>, BoxError> {
        let settings = WebhookSettings::from_config(config)?;
        Ok(Arc::new(Self::new(
            settings,
            config.metadata(),
            sender.into_webhook()?,
            context,
        )))
    }

    fn build_request(&self, alerts: &[Alert]) -> Result<OutboundRequest, NotifyError> {
        let (sent, truncated) = match self.settings.max_alerts {
            0 => (alerts, 0),
            max if alerts.len() > max => (&alerts[..max], alerts.len() - max),
            _ => (alerts, 0),
        };

        let message = WebhookMessage {
            receiver: &self.meta.name,
            status: alert::group_status(alerts),
            org_id: self.org_id,
            alerts: sent,
            truncated_alerts: truncated,
            common_labels: alert::common_labels(alerts),
            title: alert::title_for(alerts),
            message: alert::message_for(alerts),
            version: PAYLOAD_VERSION,
        };

        let mut request = OutboundRequest::new(self.settings.url.clone())
            .with_method(self.settings.http_method.clone())
            .with_body(serde_json::to_vec(&message)?)
            .with_basic_auth(self.settings.username.clone(), self.settings.password.clone());
        for (name, value) in &self.settings.headers {
            request = request.with_header(name.clone(), value.clone());
        }

        if !self.settings.authorization_credentials.is_empty() {
            request = request.with_header(
                "Authorization",
                format!(
                    "{} {}",
                    self.settings.authorization_scheme, self.settings.authorization_credentials
                ),
            );
        }
        if let Some(hmac) = &self.settings.hmac_config {
            request = request.with_signing(
                SigningConfig::new(hmac.secret.as_bytes())
                    .with_headers(hmac.header.clone(), hmac.timestamp_header.clone()),
            );
        }
        if let Some(tls) = &self.settings.tls_config {
            request = request.with_tls(tls.clone());
        }

        Ok(request)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<(), NotifyError> {
        let request = self.build_request(alerts)?;

        debug!(
            channel_type = %self.meta.channel_type,
            uid = %self.meta.uid,
            alerts = alerts.len(),
            "Sending webhook notification"
        );

        if let Err(e) = self.sender.send_webhook(cancel, &request).await {
            error!(
                channel_type = %self.meta.channel_type,
                uid = %self.meta.uid,
                error = %e,
                "Failed to send webhook notification"
            );
            return Err(e.into());
        }
        Ok(())
    }

    fn send_resolved(&self) -> bool {
        !self.meta.disable_resolve_message
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::receivers::testing::RecordingSender;
    use crate::receivers::ChannelType;

    fn config(settings: serde_json::Value) -> ChannelConfig {
        ChannelConfig::new(ChannelType::Webhook, "hook-uid", "hook").with_settings(settings)
    }

    fn notifier(settings: serde_json::Value) -> (WebhookNotifier, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        let cfg = config(settings);
        let notifier = WebhookNotifier::new(
            WebhookSettings::from_config(&cfg).unwrap(),
            cfg.metadata(),
            sender.clone(),
            &NotifierContext::default(),
        );
        (notifier, sender)
    }

    #[test]
    fn test_settings_validation() {
        assert!(WebhookSettings::from_config(&config(json!({}))).is_err());
        assert!(WebhookSettings::from_config(&config(json!({"url": "http://x", "httpMethod": "GET"}))).is_err());
        assert!(WebhookSettings::from_config(&config(json!({
            "url": "http://x",
            "username": "u",
            "password": "p",
            "authorization_credentials": "token"
        })))
        .is_err());
        assert!(WebhookSettings::from_config(&config(json!({
            "url": "http://x",
            "hmacConfig": {"secret": ""}
        })))
        .is_err());

        let settings = WebhookSettings::from_config(&config(json!({
            "url": "http://x",
            "authorization_credentials": "token"
        })))
        .unwrap();
        assert_eq!(settings.authorization_scheme, "Bearer");
    }

    #[tokio::test]
    async fn test_notify_builds_request() {
        let (notifier, sender) = notifier(json!({
            "url": "http://example.com/hook",
            "httpMethod": "PUT",
            "username": "user",
            "password": "pass",
            "headers": {"X-Team": "ops"},
            "hmacConfig": {"secret": "s3cret", "header": "X-Sig", "timestampHeader": "X-Ts"},
            "tlsConfig": {"insecureSkipVerify": true}
        }));

        notifier
            .notify(&CancellationToken::new(), &[Alert::new("HighCPU")])
            .await
            .unwrap();

        let req = sender.last();
        assert_eq!(req.url, "http://example.com/hook");
        assert_eq!(req.method, "PUT");
        assert!(req.has_basic_auth());
        assert_eq!(req.headers.get("x-team").map(String::as_str), Some("ops"));
        let signing = req.signing.as_ref().unwrap();
        assert_eq!(signing.secret, b"s3cret");
        assert_eq!(signing.signature_header(), "X-Sig");
        assert!(req.tls.as_ref().unwrap().insecure_skip_verify);

        let body = sender.last_json();
        assert_eq!(body["receiver"], "hook");
        assert_eq!(body["status"], "firing");
        assert_eq!(body["orgId"], 1);
        assert_eq!(body["alerts"][0]["labels"]["alertname"], "HighCPU");
        assert_eq!(body["title"], "[FIRING:1] HighCPU");
    }

    #[tokio::test]
    async fn test_bearer_header() {
        let (notifier, sender) = notifier(json!({
            "url": "http://x",
            "authorization_scheme": "Token",
            "authorization_credentials": "abc"
        }));
        notifier.notify(&CancellationToken::new(), &[Alert::new("A")]).await.unwrap();

        let req = sender.last();
        assert_eq!(req.headers.get("authorization").map(String::as_str), Some("Token abc"));
        assert!(!req.has_basic_auth());
    }

    #[tokio::test]
    async fn test_configured_credentials_beat_raw_authorization_header() {
        let (notifier, sender) = notifier(json!({
            "url": "http://x",
            "authorization_credentials": "abc",
            "headers": {"authorization": "Bearer stale", "X-Team": "ops"}
        }));
        notifier.notify(&CancellationToken::new(), &[Alert::new("A")]).await.unwrap();

        let req = sender.last();
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.headers.get("authorization").map(String::as_str), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_max_alerts_truncates() {
        let (notifier, sender) = notifier(json!({"url": "http://x", "maxAlerts": 2}));
        let alerts: Vec<Alert> = (0..5).map(|i| Alert::new(format!("A{i}"))).collect();

        notifier.notify(&CancellationToken::new(), &alerts).await.unwrap();

        let body = sender.last_json();
        assert_eq!(body["alerts"].as_array().unwrap().len(), 2);
        assert_eq!(body["truncatedAlerts"], 3);
    }

    #[tokio::test]
    async fn test_sender_error_propagates() {
        let sender = Arc::new(RecordingSender::failing());
        let cfg = config(json!({"url": "http://x"}));
        let notifier = WebhookNotifier::new(
            WebhookSettings::from_config(&cfg).unwrap(),
            cfg.metadata(),
            sender.clone(),
            &NotifierContext::default(),
        );

        let err = notifier
            .notify(&CancellationToken::new(), &[Alert::new("A")])
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Webhook(_)));
        assert_eq!(sender.count(), 1);
    }
}
