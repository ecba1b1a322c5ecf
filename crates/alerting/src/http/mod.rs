//! Outbound webhook client.
//!
//! [`WebhookClient::send`] issues exactly one HTTP request per call. It never
//! retries; retry policy belongs to the caller. The client holds no per-call
//! state and can be shared across tasks.
//!
//! Request construction, in order:
//!
//! 1. Method validation (POST or PUT, empty means POST)
//! 2. `Content-Type` defaulting to `application/json`
//! 3. Caller headers, then the fixed `User-Agent`
//! 4. Basic auth, only when user and password are both set
//! 5. HMAC signature and timestamp headers, computed over the final body
//! 6. Per-request TLS settings, if any
//!
//! The response is then judged by the caller's validator (if it rejects, that
//! error is returned) and finally by its status code.

pub mod request;
pub mod signing;
pub mod tls;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::WebhookError;
use crate::receivers::WebhookSender;

pub use request::{HttpMethod, OutboundRequest, ResponseValidator, DEFAULT_CONTENT_TYPE};
pub use signing::{Signature, SigningConfig};
pub use tls::TlsConfig;

/// Shared HTTP client for webhook dispatch.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    config: ClientConfig,
    client: reqwest::Client,
}

impl WebhookClient {
    /// Build a client with the given defaults.
    pub fn new(config: ClientConfig) -> Result<Self, WebhookError> {
        let client = config.client_builder().build()?;
        Ok(Self { config, client })
    }

    /// Defaults this client applies to every request.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one request, aborting if `cancel` fires before the response has
    /// been read.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        request: &OutboundRequest,
    ) -> Result<(), WebhookError> {
        let method = HttpMethod::parse(&request.method)?;
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| WebhookError::InvalidRequest(format!("invalid URL {:?}: {e}", request.url)))?;

        let mut headers = self.headers_for(request)?;

        let client = match &request.tls {
            Some(tls) => tls.apply(self.config.client_builder())?.build()?,
            None => self.client.clone(),
        };

        // Sign last: nothing touches the body after this point.
        if let Some(signing) = &request.signing {
            let signed = signing::sign(&signing.secret, &request.body, Utc::now());
            headers.insert(
                header_name(signing.signature_header())?,
                header_value(&signed.signature)?,
            );
            headers.insert(
                header_name(signing.timestamp_header())?,
                header_value(&signed.timestamp)?,
            );
        }

        let mut builder = client.request(method.as_reqwest(), url).headers(headers);
        if request.has_basic_auth() {
            builder = builder.basic_auth(&request.username, Some(&request.password));
        }
        let builder = builder.body(request.body.clone());

        debug!(
            url = %request.url,
            method = %method,
            body_len = request.body.len(),
            signed = request.signing.is_some(),
            "Sending webhook"
        );

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(WebhookError::Cancelled),
            result = builder.send() => result?,
        };

        let status = response.status();
        let body = tokio::select! {
            () = cancel.cancelled() => return Err(WebhookError::Cancelled),
            result = response.bytes() => result?,
        };

        if let Some(validate) = &request.validation {
            if let Err(e) = validate(&body, status.as_u16()) {
                debug!(url = %request.url, status = status.as_u16(), error = %e, "Webhook failed validation");
                return Err(WebhookError::ValidationRejected(e));
            }
        }

        if status.is_success() {
            debug!(url = %request.url, status = status.as_u16(), "Webhook sent successfully");
            return Ok(());
        }

        let err = WebhookError::unsuccessful_status(status.as_u16(), &body);
        warn!(url = %request.url, status = status.as_u16(), error = %err, "Webhook request failed");
        Err(err)
    }

    fn headers_for(&self, request: &OutboundRequest) -> Result<HeaderMap, WebhookError> {
        let mut headers = HeaderMap::new();

        let content_type = request
            .content_type
            .as_deref()
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        headers.insert(CONTENT_TYPE, header_value(content_type)?);

        for (name, value) in &request.headers {
            headers.insert(header_name(name)?, header_value(value)?);
        }

        headers.insert(USER_AGENT, header_value(&self.config.user_agent)?);

        Ok(headers)
    }
}

#[async_trait]
impl WebhookSender for WebhookClient {
    async fn send_webhook(
        &self,
        cancel: &CancellationToken,
        request: &OutboundRequest,
    ) -> Result<(), WebhookError> {
        self.send(cancel, request).await
    }
}

fn header_name(name: &str) -> Result<HeaderName, WebhookError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| WebhookError::InvalidRequest(format!("invalid header name {name:?}: {e}")))
}

fn header_value(value: &str) -> Result<HeaderValue, WebhookError> {
    HeaderValue::from_str(value)
        .map_err(|e| WebhookError::InvalidRequest(format!("invalid header value: {e}")))
}
