//! HMAC-SHA256 request signing.
//!
//! The signed material is `timestamp || body`, where the timestamp is the
//! decimal number of seconds since the Unix epoch. Receivers use the
//! timestamp to reject stale or replayed requests; the signer itself does not
//! enforce freshness.

use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Signature header used when the config leaves it empty.
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Alerting-Signature";

/// Timestamp header used when the config leaves it empty.
pub const DEFAULT_TIMESTAMP_HEADER: &str = "X-Alerting-Timestamp";

/// Signing settings for one request. Absent means "do not sign".
#[derive(Clone, PartialEq, Eq)]
pub struct SigningConfig {
    /// HMAC key
    pub secret: Vec<u8>,
    /// Header carrying the hex signature
    pub header: String,
    /// Header carrying the decimal timestamp
    pub timestamp_header: String,
}

impl SigningConfig {
    /// Signing config with the default header names.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            header: String::new(),
            timestamp_header: String::new(),
        }
    }

    /// Override the header names.
    #[must_use]
    pub fn with_headers(mut self, header: impl Into<String>, timestamp_header: impl Into<String>) -> Self {
        self.header = header.into();
        self.timestamp_header = timestamp_header.into();
        self
    }

    /// Header the signature is sent in.
    #[must_use]
    pub fn signature_header(&self) -> &str {
        if self.header.is_empty() {
            DEFAULT_SIGNATURE_HEADER
        } else {
            &self.header
        }
    }

    /// Header the timestamp is sent in.
    #[must_use]
    pub fn timestamp_header(&self) -> &str {
        if self.timestamp_header.is_empty() {
            DEFAULT_TIMESTAMP_HEADER
        } else {
            &self.timestamp_header
        }
    }
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret", &"<redacted>")
            .field("header", &self.signature_header())
            .field("timestamp_header", &self.timestamp_header())
            .finish()
    }
}

/// Signature and timestamp for one request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Lowercase hex HMAC-SHA256
    pub signature: String,
    /// Decimal seconds since the Unix epoch
    pub timestamp: String,
}

/// Sign `body` with `secret` at time `now`.
#[must_use]
pub fn sign(secret: &[u8], body: &[u8], now: DateTime<Utc>) -> Signature {
    let timestamp = now.timestamp().to_string();
    let signature = hex::encode(mac(secret, timestamp.as_bytes(), body));
    Signature {
        signature,
        timestamp,
    }
}

/// Verify a hex `signature` for `body` sent with `timestamp`.
#[must_use]
pub fn verify(secret: &[u8], body: &[u8], timestamp: &str, signature: &str) -> bool {
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };
    let computed = mac(secret, timestamp.as_bytes(), body);

    // Constant-time comparison to prevent timing attacks
    computed.as_slice().ct_eq(&signature_bytes).into()
}

fn mac(secret: &[u8], timestamp: &[u8], body: &[u8]) -> Vec<u8> {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(timestamp);
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}
