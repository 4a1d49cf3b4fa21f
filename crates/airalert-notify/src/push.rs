//! Web push delivery over HTTP: encrypted payload, VAPID-signed request.

use std::time::Duration;

use airalert_core::config::NotificationConfig;
use airalert_core::error::{AirAlertError, Result};
use airalert_core::traits::PushTransport;
use airalert_core::types::PushSubscription;
use async_trait::async_trait;

use crate::ece;
use crate::vapid::{self, VapidKeys};

/// Posts encrypted payloads to a subscription's push endpoint.
pub struct HttpPushTransport {
    client: reqwest::Client,
    keys: VapidKeys,
    /// Seconds the push service should hold an undeliverable message.
    ttl_secs: u32,
    /// VAPID `sub` claim.
    subject: String,
}

impl HttpPushTransport {
    pub fn new(keys: VapidKeys, ttl_secs: u32, contact: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("air-alert/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AirAlertError::Http(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            keys,
            ttl_secs,
            subject: vapid::subject(contact),
        })
    }

    /// Transport configured from the `[notifications]` section. Fails when
    /// the VAPID keys are missing or do not form a pair.
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        if config.public_key.is_empty() || config.private_key.is_empty() {
            return Err(AirAlertError::Config(
                "VAPID keys are not configured; run `air-alert --generate-keys`".into(),
            ));
        }
        let keys = VapidKeys::from_base64(&config.public_key, &config.private_key)?;
        Self::new(keys, config.push_ttl_secs, &config.admin_mail, Duration::from_secs(10))
    }

    /// Build the signed, encrypted request without sending it.
    fn request(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<reqwest::Request> {
        let body = ece::encrypt(payload, &subscription.keys)?;
        let authorization = self.keys.authorization(&subscription.endpoint, &self.subject)?;
        self.client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_secs.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Authorization", authorization)
            .body(body)
            .build()
            .map_err(|e| AirAlertError::DeliveryFailed(format!("bad push request: {e}")))
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn deliver_push(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<u16> {
        let request = self.request(subscription, payload)?;
        let resp = self
            .client
            .execute(request)
            .await
            .map_err(|e| AirAlertError::DeliveryFailed(format!("push send failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!("Push service answered {status} for {}", subscription.endpoint);
        }
        Ok(status.as_u16())
    }
}
