//! Per-request TLS settings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WebhookError;

/// TLS settings applied to a single request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// PEM bundle of additional trusted CA certificates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,
    /// PEM client certificate for mutual TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,
    /// PEM private key for `client_certificate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    /// Disable certificate validation. Only for test or self-signed endpoints.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Config that accepts any server certificate.
    #[must_use]
    pub fn insecure() -> Self {
        Self {
            insecure_skip_verify: true,
            ..Self::default()
        }
    }

    /// Apply these settings to a client builder.
    pub fn apply(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, WebhookError> {
        if let Some(pem) = self.ca_certificate.as_deref().filter(|p| !p.trim().is_empty()) {
            let certs = reqwest::Certificate::from_pem_bundle(pem.as_bytes())
                .map_err(|e| WebhookError::Tls(format!("invalid CA certificate: {e}")))?;
            if certs.is_empty() {
                return Err(WebhookError::Tls(
                    "CA certificate bundle contains no certificates".to_string(),
                ));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        match (self.client_certificate.as_deref(), self.client_key.as_deref()) {
            (Some(cert), Some(key)) => {
                let mut pem = Vec::with_capacity(cert.len() + key.len() + 1);
                pem.extend_from_slice(cert.as_bytes());
                pem.push(b'\n');
                pem.extend_from_slice(key.as_bytes());
                let identity = reqwest::Identity::from_pem(&pem)
                    .map_err(|e| WebhookError::Tls(format!("invalid client certificate: {e}")))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(WebhookError::Tls(
                    "client certificate and client key must be set together".to_string(),
                ));
            }
        }

        if self.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(builder)
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_certificate", &self.ca_certificate.is_some())
            .field("client_certificate", &self.client_certificate.is_some())
            .field("client_key", &self.client_key.as_ref().map(|_| "<redacted>"))
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}
