//! Raw sensor API access.

use std::time::Duration;

use airalert_core::error::{AirAlertError, Result};
use async_trait::async_trait;

/// Status and body of one API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// One unthrottled request against the sensor network.
#[async_trait]
pub trait SensorApi: Send + Sync {
    /// Perform the request. Transport failures are `Http` errors; any HTTP
    /// status is a successful call.
    async fn get(&self) -> Result<ApiResponse>;
}

/// Sensor API over HTTP.
pub struct HttpSensorApi {
    client: reqwest::Client,
    url: String,
}

impl HttpSensorApi {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("air-alert/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AirAlertError::Http(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl SensorApi for HttpSensorApi {
    async fn get(&self) -> Result<ApiResponse> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AirAlertError::Http(format!("GET {} failed: {e}", self.url)))?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| AirAlertError::Http(format!("reading body failed: {e}")))?;
        Ok(ApiResponse {
            status,
            body: body.to_vec(),
        })
    }
}
