//! Rate-limited, retrying reading source.

use std::sync::Arc;
use std::time::Duration;

use airalert_core::config::PurpleAirConfig;
use airalert_core::error::{AirAlertError, Result};
use airalert_core::traits::ReadingSource;
use airalert_core::types::SensorReading;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::api::{HttpSensorApi, SensorApi};
use crate::purple::Schema;
use crate::rate_limit::TokenBucket;

/// Wraps a [`SensorApi`] with a shared token bucket and bounded retry.
///
/// One fetcher is shared by every job that reads the sensor network, so all
/// of them draw from the same bucket.
pub struct RateLimitedFetcher {
    api: Arc<dyn SensorApi>,
    bucket: Mutex<TokenBucket>,
    max_attempts: u32,
    schema: Schema,
}

impl RateLimitedFetcher {
    pub fn new(api: Arc<dyn SensorApi>, rate_limit: Duration, max_attempts: u32) -> Self {
        Self {
            api,
            bucket: Mutex::new(TokenBucket::every(rate_limit)),
            max_attempts: max_attempts.max(1),
            schema: Schema::default(),
        }
    }

    /// HTTP fetcher configured from the `[purpleair]` section.
    pub fn from_config(config: &PurpleAirConfig) -> Result<Self> {
        let api = HttpSensorApi::new(
            &config.url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(
            Arc::new(api),
            Duration::from_secs(config.rate_limit_secs),
            config.max_attempts,
        ))
    }

    /// Wait for a token unless cancelled first.
    async fn wait_for_token(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AirAlertError::Cancelled),
            waited = async { self.bucket.lock().await.acquire().await } => {
                if !waited.is_zero() {
                    tracing::debug!("⏳ Waited {waited:?} for sensor API token");
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ReadingSource for RateLimitedFetcher {
    async fn fetch_readings(&self, cancel: &CancellationToken) -> Result<Vec<SensorReading>> {
        for attempt in 1..=self.max_attempts {
            self.wait_for_token(cancel).await?;

            let response = self.api.get().await?;
            if response.is_ok() {
                let readings = self.schema.decode(&response.body)?;
                tracing::debug!("🌫️ Fetched {} sensor readings", readings.len());
                return Ok(readings);
            }

            tracing::debug!(
                "Sensor API returned {} (attempt {attempt}/{}), retrying",
                response.status,
                self.max_attempts
            );
        }

        Err(AirAlertError::RateLimited(format!(
            "sensor API still throttled after {} attempts",
            self.max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResponse;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replays scripted responses and counts calls.
    struct ScriptedApi {
        responses: StdMutex<VecDeque<Result<ApiResponse>>>,
        calls: StdMutex<u32>,
    }

    impl ScriptedApi {
        fn new(responses: Vec<Result<ApiResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                calls: StdMutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl SensorApi for ScriptedApi {
        async fn get(&self) -> Result<ApiResponse> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(status(429)))
        }
    }

    fn status(code: u16) -> ApiResponse {
        ApiResponse {
            status: code,
            body: Vec::new(),
        }
    }

    fn ok(body: &str) -> ApiResponse {
        ApiResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        }
    }

    const FAST: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let api = ScriptedApi::new(vec![Ok(ok(r#"{"results": [{"ID": 1, "PM2_5Value": "3.5"}]}"#))]);
        let fetcher = RateLimitedFetcher::new(api.clone(), FAST, 5);

        let readings = fetcher.fetch_readings(&CancellationToken::new()).await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].pm25, 3.5);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_throttled_responses() {
        let api = ScriptedApi::new(vec![
            Ok(status(429)),
            Ok(status(503)),
            Ok(ok(r#"{"results": []}"#)),
        ]);
        let fetcher = RateLimitedFetcher::new(api.clone(), FAST, 5);

        let readings = fetcher.fetch_readings(&CancellationToken::new()).await.unwrap();
        assert!(readings.is_empty());
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_rate_limited() {
        let api = ScriptedApi::new(Vec::new());
        let fetcher = RateLimitedFetcher::new(api.clone(), FAST, 5);

        let err = fetcher.fetch_readings(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AirAlertError::RateLimited(_)));
        assert_eq!(api.calls(), 5);
    }

    #[tokio::test]
    async fn test_transport_error_aborts() {
        let api = ScriptedApi::new(vec![Err(AirAlertError::Http("connection refused".into()))]);
        let fetcher = RateLimitedFetcher::new(api.clone(), FAST, 5);

        let err = fetcher.fetch_readings(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AirAlertError::Http(_)));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting() {
        let api = ScriptedApi::new(Vec::new());
        let fetcher = RateLimitedFetcher::new(api.clone(), Duration::from_secs(60), 5);
        let cancel = CancellationToken::new();

        // First attempt uses the initial token; the second waits a full minute.
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch_readings(&cancel))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, AirAlertError::Cancelled));
        assert_eq!(api.calls(), 1);
    }
}
