//! Reqwest-based HTTP client adapter.
//!
//! Production implementation of the [`HttpClient`] trait. The vendor cloud
//! answers quickly or not at all, so a conservative request timeout is
//! applied by default; hosts that need different behavior can inject their
//! own configured `reqwest::Client`.

use async_trait::async_trait;
use std::time::Duration;

use crate::traits::{Headers, HttpClient, HttpError, Response};

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Wrap a pre-configured `reqwest::Client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying reqwest::Client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Convert reqwest error to HttpError.
    fn convert_error(err: reqwest::Error) -> HttpError {
        if err.is_timeout() {
            HttpError::Timeout(err.to_string())
        } else if err.is_connect() {
            HttpError::ConnectionFailed(err.to_string())
        } else {
            HttpError::Other(err.to_string())
        }
    }

    /// Convert reqwest headers to our Headers type.
    fn convert_headers(headers: &reqwest::header::HeaderMap) -> Headers {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    /// Apply headers to a request builder.
    fn apply_headers(
        builder: reqwest::RequestBuilder,
        headers: &Headers,
    ) -> reqwest::RequestBuilder {
        let mut builder = builder;
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        builder
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError> {
        let builder = self.client.get(url);
        let builder = Self::apply_headers(builder, headers);

        let response = builder.send().await.map_err(Self::convert_error)?;

        let status = response.status().as_u16();
        let response_headers = Self::convert_headers(response.headers());
        let body = response.bytes().await.map_err(Self::convert_error)?;

        Ok(Response::with_headers(status, response_headers, body))
    }

    async fn post(&self, url: &str, body: &str, headers: &Headers) -> Result<Response, HttpError> {
        let builder = self.client.post(url).body(body.to_string());
        let builder = Self::apply_headers(builder, headers);

        let response = builder.send().await.map_err(Self::convert_error)?;

        let status = response.status().as_u16();
        let response_headers = Self::convert_headers(response.headers());
        let body = response.bytes().await.map_err(Self::convert_error)?;

        Ok(Response::with_headers(status, response_headers, body))
    }
}
