//! Push notification transport trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::PushSubscription;

/// Delivers a payload to a browser push endpoint.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Returns the HTTP status code reported by the push service.
    async fn deliver_push(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<u16>;
}
