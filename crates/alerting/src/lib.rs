//! Alert notification dispatch.
//!
//! This crate provides:
//! - [`WebhookClient`] - one outbound HTTP request per call, with method
//!   validation, basic auth, HMAC signing, per-request TLS and pluggable
//!   response validation
//! - [`IntegrationFactory`] - builds a notifier per configured channel and
//!   reports every misconfiguration in one [`AggregateError`]
//! - Built-in notifiers for webhook, email, ntfy, Slack, Discord and
//!   `PagerDuty`
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use alerting::{
//!     BoxError, ClientConfig, EmailSender, IntegrationFactory, Metadata, ReceiverConfig,
//!     SenderFactory, WebhookClient, WebhookSender,
//! };
//!
//! struct Senders {
//!     client: WebhookClient,
//! }
//!
//! impl SenderFactory for Senders {
//!     fn build_webhook_sender(&self, _: &Metadata) -> Result<Arc<dyn WebhookSender>, BoxError> {
//!         Ok(Arc::new(self.client.clone()))
//!     }
//!
//!     fn build_email_sender(&self, _: &Metadata) -> Result<Arc<dyn EmailSender>, BoxError> {
//!         Err("email is not configured".into())
//!     }
//! }
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WebhookClient::new(ClientConfig::from_env())?;
//! let factory = IntegrationFactory::new(Arc::new(Senders { client }));
//! let receiver = ReceiverConfig::from_json(
//!     r#"{"name": "ops", "integrations": [
//!         {"uid": "a1", "name": "hook", "type": "webhook", "settings": {"url": "https://example.com/hook"}}
//!     ]}"#,
//! )?;
//! let integrations = factory.build(&receiver)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! [`ClientConfig::from_env`] reads:
//!
//! - `ALERTING_USER_AGENT`: `User-Agent` for every request
//! - `ALERTING_HTTP_TIMEOUT_SECS`: total request timeout

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod alert;
pub mod config;
pub mod error;
pub mod factory;
pub mod http;
pub mod receivers;

pub use alert::{Alert, AlertStatus};
pub use config::{ChannelConfig, ClientConfig, ReceiverConfig};
pub use error::{AggregateError, BoxError, BuildError, NotifyError, WebhookError};
pub use factory::{
    ChannelDescriptor, ChannelRegistry, Integration, IntegrationFactory, NotifierConstructor,
    SenderFactory,
};
pub use http::{HttpMethod, OutboundRequest, SigningConfig, TlsConfig, WebhookClient};
pub use receivers::{
    Capability, ChannelType, EmailMessage, EmailSender, Metadata, Notifier, NotifierContext,
    Sender, WebhookSender,
};
