//! Durable notification stream with consumer-group semantics.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{NotificationMessage, StreamEntry};

/// Notification queue shared between the forecast job and the dispatcher.
///
/// Claiming and acknowledging are atomic inside the store; callers never
/// lock around them.
#[async_trait]
pub trait NotificationStream: Send + Sync {
    /// Create the consumer group (and backing stream). Idempotent.
    async fn ensure_consumer_group(&self, group: &str) -> Result<()>;

    /// Read at most one message for `consumer`, waiting up to `block`.
    async fn read_one(
        &self,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<NotificationMessage>>;

    /// Mark a message as processed for the group.
    async fn acknowledge(&self, group: &str, message_id: &str) -> Result<()>;

    /// Append an entry; returns the store-assigned message ID.
    async fn enqueue(&self, entry: StreamEntry) -> Result<String>;
}
