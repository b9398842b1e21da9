//! Notification adapters

use async_trait::async_trait;

use crate::application::ports::{Notifier, NotifyError};
use crate::domain::events::OrderEvent;

/// Publishes events as JSON on `<prefix>.<event>` subjects.
pub struct NatsNotifier {
    client: async_nats::Client,
    prefix: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    pub fn subject(&self, event: &OrderEvent) -> String { format!("{}.{}", self.prefix, event.name()) }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(event).map_err(|e| NotifyError(e.to_string()))?;
        self.client
            .publish(self.subject(event), payload.into())
            .await
            .map_err(|e| NotifyError(e.to_string()))
    }
}

/// Used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<(), NotifyError> {
        tracing::info!(event = event.name(), order_id = %event.order_id(), "Order event");
        Ok(())
    }
}
