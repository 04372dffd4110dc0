//! HTTP accrual client.

use std::time::Duration;

use async_trait::async_trait;
use common::OrderNumber;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::client::AccrualClient;
use crate::error::{AccrualError, Result};
use crate::model::{AccrualReply, AccrualResponse};

/// Settings for [`HttpAccrualClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base address of the accrual service, e.g. `http://localhost:8081`.
    pub base_url: String,
    /// Per-request timeout (default 5s).
    pub request_timeout: Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Talks to the accrual service's `GET /api/orders/{number}` endpoint.
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAccrualClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    async fn get_order_accrual(&self, number: &OrderNumber) -> Result<AccrualReply> {
        let response = self.http.get(self.order_url(number)).send().await?;
        let status = response.status();

        match status {
            StatusCode::OK => {
                let body = response.bytes().await?;
                let payload: AccrualResponse = serde_json::from_slice(&body)?;
                Ok(AccrualReply::Found(payload))
            }
            StatusCode::NO_CONTENT => Ok(AccrualReply::NotRegistered),
            StatusCode::TOO_MANY_REQUESTS => Ok(AccrualReply::RateLimited {
                retry_after: retry_after(response.headers()),
            }),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(AccrualError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

/// Parses an integer-seconds `Retry-After` header. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
