//! Thin JSON-over-HTTP wrapper around reqwest.

use crate::error::RestError;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Back-off suggested when the server answers 429/418 without a usable
/// `Retry-After` header.
const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

/// Generic REST client for making HTTP requests.
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    /// Create a client for `base_url` (e.g. "https://fapi.binance.com").
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::RequestBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_default_timeout(base_url: &str) -> Result<Self, RestError> {
        Self::new(base_url, DEFAULT_TIMEOUT)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        self.send(Method::GET, path, query, headers).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        self.send(Method::POST, path, query, headers).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        self.send(Method::DELETE, path, query, headers).await
    }

    /// Send a request with the query string in the URL and decode the JSON
    /// response.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        let url = self.build_url(path, query);
        tracing::debug!(method = %method, path = %path, "REST request");

        let mut request = self.client.request(method, &url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    fn build_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, RestError> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            return serde_json::from_str(&body).map_err(|e| {
                tracing::warn!(body = %body, error = %e, "Failed to parse response");
                RestError::Parse(e.to_string())
            });
        }

        // 418 is the exchange's IP ban after ignoring 429s
        if status.as_u16() == 429 || status.as_u16() == 418 {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1_000)
                .unwrap_or(DEFAULT_RETRY_AFTER_MS);
            return Err(RestError::RateLimited { retry_after_ms });
        }

        let body = response.text().await.unwrap_or_default();
        Err(RestError::HttpError {
            status: status.as_u16(),
            message: body,
        })
    }
}
