//! Outbound request description.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::signing::SigningConfig;
use super::tls::TlsConfig;
use crate::error::{BoxError, WebhookError};

/// Content type applied when the request does not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Callback deciding whether a response is acceptable, given its body and status.
pub type ResponseValidator = Arc<dyn Fn(&[u8], u16) -> Result<(), BoxError> + Send + Sync>;

/// Methods a webhook may be sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    /// POST (default)
    #[default]
    Post,
    /// PUT
    Put,
}

impl HttpMethod {
    /// Parse a configured method. Empty input means POST.
    pub fn parse(method: &str) -> Result<Self, WebhookError> {
        let trimmed = method.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("POST") {
            Ok(Self::Post)
        } else if trimmed.eq_ignore_ascii_case("PUT") {
            Ok(Self::Put)
        } else {
            Err(WebhookError::InvalidMethod(method.to_string()))
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }

    pub(crate) const fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatch attempt.
///
/// Created per call and dropped once the response has been consumed.
#[derive(Clone, Default)]
pub struct OutboundRequest {
    /// Target URL
    pub url: String,
    /// Raw method as configured; validated when sent
    pub method: String,
    /// Request body, sent verbatim
    pub body: Vec<u8>,
    /// Content type; `application/json` when unset
    pub content_type: Option<String>,
    /// Extra headers, applied over the defaults. Keys are lowercase; use
    /// [`OutboundRequest::with_header`] so a later value replaces an earlier
    /// one regardless of case.
    pub headers: BTreeMap<String, String>,
    /// Basic auth user
    pub username: String,
    /// Basic auth password
    pub password: String,
    /// Per-request TLS settings
    pub tls: Option<TlsConfig>,
    /// HMAC signing settings
    pub signing: Option<SigningConfig>,
    /// Response validator; overrides the status check when it rejects
    pub validation: Option<ResponseValidator>,
}

impl OutboundRequest {
    /// Request to `url` with every other field defaulted.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Request to `url` carrying `payload` serialized as JSON.
    pub fn json<T: Serialize + ?Sized>(url: impl Into<String>, payload: &T) -> Result<Self, WebhookError> {
        let body = serde_json::to_vec(payload)?;
        Ok(Self::new(url).with_body(body))
    }

    /// Set the method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add a header, replacing any earlier value for the same name in any case.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Set basic auth credentials.
    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set TLS settings.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sign the request.
    #[must_use]
    pub fn with_signing(mut self, signing: SigningConfig) -> Self {
        self.signing = Some(signing);
        self
    }

    /// Validate the response with `validator`.
    #[must_use]
    pub fn with_validation<F>(mut self, validator: F) -> Self
    where
        F: Fn(&[u8], u16) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.validation = Some(Arc::new(validator));
        self
    }

    /// Basic auth is sent only when both user and password are set.
    #[must_use]
    pub fn has_basic_auth(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundRequest")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("body_len", &self.body.len())
            .field("content_type", &self.content_type)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("username", &self.username)
            .field("has_password", &!self.password.is_empty())
            .field("tls", &self.tls.is_some())
            .field("signing", &self.signing.is_some())
            .field("validation", &self.validation.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!(HttpMethod::parse("").unwrap(), HttpMethod::Post);
        assert_eq!(HttpMethod::parse("POST").unwrap(), HttpMethod::Post);
        assert_eq!(HttpMethod::parse("put").unwrap(), HttpMethod::Put);

        for bad in ["GET", "DELETE", "PATCH", "HEAD", "OPTIONS", "POSTX"] {
            match HttpMethod::parse(bad) {
                Err(WebhookError::InvalidMethod(m)) => assert_eq!(m, bad),
                other => panic!("expected InvalidMethod for {bad}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_basic_auth_requires_both_parts() {
        assert!(!OutboundRequest::new("http://x").has_basic_auth());
        assert!(!OutboundRequest::new("http://x").with_basic_auth("user", "").has_basic_auth());
        assert!(!OutboundRequest::new("http://x").with_basic_auth("", "pass").has_basic_auth());
        assert!(OutboundRequest::new("http://x").with_basic_auth("user", "pass").has_basic_auth());
    }

    #[test]
    fn test_json_body() {
        let req = OutboundRequest::json("http://x", &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(req.body, br#"{"a":1}"#);
        assert!(req.content_type.is_none());
    }

    #[test]
    fn test_debug_hides_password() {
        let req = OutboundRequest::new("http://x").with_basic_auth("user", "hunter2");
        let debug = format!("{req:?}");
        assert!(!debug.contains("hunter2"));
    }
}
