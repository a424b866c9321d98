//! HTTP client for the backend REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::ServerConfig;
use crate::error::{Error, Result};

use super::{ApiMethod, ApiTransport};

/// HTTP client for `{server_url}/api/...`
pub struct RestClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("server.url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &config.token {
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid token: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ApiTransport for RestClient {
    async fn call_api(
        &self,
        method: ApiMethod,
        path: &str,
        params: Option<&Value>,
    ) -> Result<Value> {
        let url = self.url_for(path);

        let request = match method {
            ApiMethod::Get => self.http_client.get(&url),
            ApiMethod::Post => self.http_client.post(&url),
            ApiMethod::Put => self.http_client.put(&url),
            ApiMethod::Delete => self.http_client.delete(&url),
        };
        let request = match params {
            Some(body) => request.json(body),
            None => request,
        };

        tracing::debug!(method = %method, path = %path, "Calling REST API");

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| Error::Transport(format!("failed to read response: {}", e)))?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            Ok(serde_json::from_str(&text)?)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            tracing::warn!(method = %method, path = %path, status = %status, "REST API call failed");
            Err(Error::Backend {
                code: status.as_u16().to_string(),
                message: extract_message(&error_text),
            })
        }
    }
}

/// Pull `message` out of a JSON error body, or return the body as is.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
