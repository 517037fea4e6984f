//! HTTP client for the NYT API.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::schema::UpstreamConfig;
use crate::upstream::types::NytRequest;
use crate::upstream::UpstreamError;

/// Thin reqwest wrapper; resilience is applied by the caller.
#[derive(Debug, Clone)]
pub struct NytClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NytClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(concat!("news-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Issue `request` and decode the JSON body.
    pub async fn fetch(&self, request: &NytRequest) -> Result<Value, UpstreamError> {
        let url = format!("{}{}", self.base_url, request.path());
        let mut query = request.query();
        query.push(("api-key", self.api_key.clone()));

        tracing::debug!(url = %url, route = request.route(), "Calling upstream");
        let response = self.http.get(&url).query(&query).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(UpstreamError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(url = %url, status = status.as_u16(), "Upstream returned error status");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: truncate(&message, 256),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
