//! Integration factory.
//!
//! Turns a [`ReceiverConfig`] into ready-to-use [`Integration`]s. Senders come
//! from the host through [`SenderFactory`]; notifier constructors come from a
//! [`ChannelRegistry`].
//!
//! Channel types are visited in [`ChannelType::ALL`] order and channels of one
//! type in configuration order. Every failure is recorded and the loop moves
//! on. If anything failed, the whole build fails and no integration is
//! returned.
//!
//! A channel whose sender cannot be built is skipped. No placeholder sender is
//! ever handed to a notifier, so every returned integration is usable.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert::Alert;
use crate::config::{ChannelConfig, ReceiverConfig};
use crate::error::{AggregateError, BoxError, BuildError, NotifyError};
use crate::receivers::{
    Capability, ChannelType, DiscordNotifier, EmailNotifier, EmailSender, Metadata, Notifier,
    NotifierContext, NtfyNotifier, PagerDutyNotifier, Sender, SlackNotifier, WebhookNotifier,
    WebhookSender,
};

/// Sender constructors supplied by the hosting application.
///
/// The factory never builds network clients itself. Each method is called
/// once per channel that needs that capability.
pub trait SenderFactory: Send + Sync {
    /// Build a webhook-capable sender for the channel.
    fn build_webhook_sender(&self, meta: &Metadata) -> Result<Arc<dyn WebhookSender>, BoxError>;

    /// Build an email-capable sender for the channel.
    fn build_email_sender(&self, meta: &Metadata) -> Result<Arc<dyn EmailSender>, BoxError>;
}

/// Notifier constructor for one channel type.
pub type NotifierConstructor = Arc<
    dyn Fn(&ChannelConfig, Sender, &NotifierContext) -> Result<Arc<dyn Notifier>, BoxError>
        + Send
        + Sync,
>;

/// What the factory needs to know to build one channel type.
#[derive(Clone)]
pub struct ChannelDescriptor {
    /// Sender capability the notifier is built on
    pub capability: Capability,
    /// Notifier constructor
    pub constructor: NotifierConstructor,
}

impl ChannelDescriptor {
    /// Create a descriptor.
    pub fn new<F>(capability: Capability, constructor: F) -> Self
    where
        F: Fn(&ChannelConfig, Sender, &NotifierContext) -> Result<Arc<dyn Notifier>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            capability,
            constructor: Arc::new(constructor),
        }
    }
}

impl fmt::Debug for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelDescriptor")
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// Channel types the factory can build.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    descriptors: HashMap<ChannelType, ChannelDescriptor>,
}

impl ChannelRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every notifier shipped in this crate.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            ChannelType::Webhook,
            ChannelDescriptor::new(Capability::Webhook, WebhookNotifier::construct),
        );
        registry.register(
            ChannelType::Email,
            ChannelDescriptor::new(Capability::Email, EmailNotifier::construct),
        );
        registry.register(
            ChannelType::Ntfy,
            ChannelDescriptor::new(Capability::Webhook, NtfyNotifier::construct),
        );
        registry.register(
            ChannelType::Slack,
            ChannelDescriptor::new(Capability::Webhook, SlackNotifier::construct),
        );
        registry.register(
            ChannelType::Discord,
            ChannelDescriptor::new(Capability::Webhook, DiscordNotifier::construct),
        );
        registry.register(
            ChannelType::PagerDuty,
            ChannelDescriptor::new(Capability::Webhook, PagerDutyNotifier::construct),
        );
        registry
    }

    /// Register (or replace) the descriptor for a channel type.
    pub fn register(&mut self, channel_type: ChannelType, descriptor: ChannelDescriptor) {
        self.descriptors.insert(channel_type, descriptor);
    }

    /// Descriptor for a channel type.
    #[must_use]
    pub fn get(&self, channel_type: ChannelType) -> Option<&ChannelDescriptor> {
        self.descriptors.get(&channel_type)
    }
}

/// A built notifier paired with its channel identity.
#[derive(Clone)]
pub struct Integration {
    notifier: Arc<dyn Notifier>,
    metadata: Metadata,
    index: usize,
}

impl Integration {
    /// Channel display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Position among configured channels of the same type.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Channel identity.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Channel type.
    #[must_use]
    pub const fn channel_type(&self) -> ChannelType {
        self.metadata.channel_type
    }

    /// Whether resolved alerts should be delivered to this channel.
    #[must_use]
    pub fn send_resolved(&self) -> bool {
        self.notifier.send_resolved()
    }

    /// Deliver a group of alerts through this channel.
    pub async fn notify(
        &self,
        cancel: &CancellationToken,
        alerts: &[Alert],
    ) -> Result<(), NotifyError> {
        self.notifier.notify(cancel, alerts).await
    }
}

impl fmt::Debug for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Integration")
            .field("metadata", &self.metadata)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Builds integrations from receiver configuration.
pub struct IntegrationFactory {
    senders: Arc<dyn SenderFactory>,
    registry: ChannelRegistry,
    context: NotifierContext,
}

impl IntegrationFactory {
    /// Factory using the built-in channel registry.
    #[must_use]
    pub fn new(senders: Arc<dyn SenderFactory>) -> Self {
        Self {
            senders,
            registry: ChannelRegistry::with_builtins(),
            context: NotifierContext::default(),
        }
    }

    /// Replace the channel registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ChannelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the notifier context.
    #[must_use]
    pub fn with_context(mut self, context: NotifierContext) -> Self {
        self.context = context;
        self
    }

    /// Build one integration per configured channel.
    ///
    /// # Errors
    ///
    /// Returns every failure, in build order, if any channel could not be
    /// built. Integrations that did build are discarded in that case.
    pub fn build(&self, receiver: &ReceiverConfig) -> Result<Vec<Integration>, AggregateError> {
        let mut integrations = Vec::with_capacity(receiver.integrations.len());
        let mut errors = AggregateError::new();

        for channel_type in ChannelType::ALL {
            let group = receiver
                .integrations
                .iter()
                .filter(|c| c.channel_type == channel_type);

            for (index, config) in group.enumerate() {
                match self.build_one(config, index) {
                    Ok(integration) => integrations.push(integration),
                    Err(e) => {
                        warn!(
                            receiver = %receiver.name,
                            channel_type = %channel_type,
                            uid = %config.uid,
                            error = %e,
                            "Failed to build integration"
                        );
                        errors.push(e);
                    }
                }
            }
        }

        if !errors.is_empty() {
            warn!(
                receiver = %receiver.name,
                failures = errors.len(),
                discarded = integrations.len(),
                "Receiver has misconfigured channels, no integrations built"
            );
            return Err(errors);
        }

        info!(
            receiver = %receiver.name,
            integrations = integrations.len(),
            "Built receiver integrations"
        );
        Ok(integrations)
    }

    fn build_one(&self, config: &ChannelConfig, index: usize) -> Result<Integration, BuildError> {
        let meta = config.metadata();
        let descriptor = self
            .registry
            .get(config.channel_type)
            .ok_or_else(|| BuildError::unsupported(&meta))?;

        let sender = self
            .sender_for(descriptor.capability, &meta)
            .map_err(|e| BuildError::sender_construction(descriptor.capability, &meta, e))?;

        let notifier = (descriptor.constructor)(config, sender, &self.context)
            .map_err(|e| BuildError::invalid_settings(&meta, e))?;

        debug!(
            channel_type = %meta.channel_type,
            uid = %meta.uid,
            index,
            "Built integration"
        );

        Ok(Integration {
            notifier,
            metadata: meta,
            index,
        })
    }

    fn sender_for(&self, capability: Capability, meta: &Metadata) -> Result<Sender, BoxError> {
        match capability {
            Capability::Webhook => self.senders.build_webhook_sender(meta).map(Sender::Webhook),
            Capability::Email => self.senders.build_email_sender(meta).map(Sender::Email),
        }
    }
}
