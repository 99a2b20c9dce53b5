//! Mock HTTP client for testing.
//!
//! A scripted stand-in for the vendor cloud: tests register responses per
//! URL (exact match first, then prefix match) and inspect the requests the
//! agent actually issued.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::traits::{Headers, HttpClient, HttpError, Response};

/// A recorded HTTP request for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method (GET or POST)
    pub method: String,
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request body (for POST requests)
    pub body: Option<String>,
}

/// Configuration for a mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a successful response
    Success(Response),
    /// Return a sequence of responses, one per matching request, repeating
    /// the final element once exhausted
    Sequence(Vec<Response>),
    /// Return an error
    Error(HttpError),
}

/// Mock HTTP client for testing.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the agent under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    /// Configured responses by URL pattern
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    /// Per-pattern counters for Sequence responses
    sequence_positions: Arc<Mutex<HashMap<String, usize>>>,
    /// Recorded requests for verification
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a response for a URL (exact match, falling back to prefix match).
    pub fn set_response(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Shorthand: respond to `url` with `status` and a JSON body.
    pub fn set_json_response(&self, url: &str, status: u16, body: &serde_json::Value) {
        self.set_response(
            url,
            MockResponse::Success(Response::new(status, body.to_string().into())),
        );
    }

    /// Get all recorded requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose URL contains `fragment`.
    pub fn requests_to(&self, fragment: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains(fragment))
            .collect()
    }

    /// Clear all recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn record_request(&self, method: &str, url: &str, headers: &Headers, body: Option<String>) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            body,
        });
    }

    fn respond(&self, url: &str) -> Result<Response, HttpError> {
        let responses = self.responses.lock().unwrap();

        let matched = responses
            .get(url)
            .map(|r| (url.to_string(), r.clone()))
            .or_else(|| {
                responses
                    .iter()
                    .find(|(pattern, _)| url.starts_with(pattern.as_str()))
                    .map(|(pattern, r)| (pattern.clone(), r.clone()))
            });
        drop(responses);

        match matched {
            Some((_, MockResponse::Success(response))) => Ok(response),
            Some((pattern, MockResponse::Sequence(responses))) => {
                let mut positions = self.sequence_positions.lock().unwrap();
                let position = positions.entry(pattern).or_insert(0);
                let response = responses
                    .get(*position)
                    .or_else(|| responses.last())
                    .cloned()
                    .ok_or_else(|| HttpError::Other("empty mock sequence".to_string()))?;
                *position += 1;
                Ok(response)
            }
            Some((_, MockResponse::Error(err))) => Err(err),
            None => Err(HttpError::Other(format!("no mock response for URL: {}", url))),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("GET", url, headers, None);
        self.respond(url)
    }

    async fn post(&self, url: &str, body: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("POST", url, headers, Some(body.to_string()));
        self.respond(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_exact_match_response() {
        let client = MockHttpClient::new();
        client.set_response(
            "https://cloud.test/v1.0/devices",
            MockResponse::Success(Response::new(200, Bytes::from("ok"))),
        );

        let response = client
            .get("https://cloud.test/v1.0/devices", &Headers::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text().unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_prefix_match_response() {
        let client = MockHttpClient::new();
        client.set_response(
            "https://cloud.test/v1.0/devices/",
            MockResponse::Success(Response::new(200, Bytes::from("{}"))),
        );

        let response = client
            .get("https://cloud.test/v1.0/devices/abc/logs?x=1", &Headers::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_unmatched_url_errors() {
        let client = MockHttpClient::new();
        let result = client.get("https://cloud.test/unknown", &Headers::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_error_response() {
        let client = MockHttpClient::new();
        client.set_response(
            "https://cloud.test/down",
            MockResponse::Error(HttpError::Timeout("30s".to_string())),
        );

        let result = client.get("https://cloud.test/down", &Headers::new()).await;
        assert!(matches!(result, Err(HttpError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_sequence_advances_then_repeats_last() {
        let client = MockHttpClient::new();
        client.set_response(
            "https://cloud.test/seq",
            MockResponse::Sequence(vec![
                Response::new(200, Bytes::from("first")),
                Response::new(200, Bytes::from("second")),
            ]),
        );

        let first = client.get("https://cloud.test/seq", &Headers::new()).await.unwrap();
        let second = client.get("https://cloud.test/seq", &Headers::new()).await.unwrap();
        let third = client.get("https://cloud.test/seq", &Headers::new()).await.unwrap();
        assert_eq!(first.text().unwrap(), "first");
        assert_eq!(second.text().unwrap(), "second");
        assert_eq!(third.text().unwrap(), "second");
    }

    #[tokio::test]
    async fn test_records_requests() {
        let client = MockHttpClient::new();
        client.set_response(
            "https://cloud.test/",
            MockResponse::Success(Response::new(200, Bytes::from("{}"))),
        );

        client
            .post("https://cloud.test/a", r#"{"x":1}"#, &Headers::new())
            .await
            .unwrap();
        client.get("https://cloud.test/b", &Headers::new()).await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body.as_deref(), Some(r#"{"x":1}"#));
        assert_eq!(requests[1].method, "GET");

        assert_eq!(client.requests_to("/b").len(), 1);
        client.clear_requests();
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let client = MockHttpClient::new();
        let handle = client.clone();
        handle.set_response(
            "https://cloud.test/",
            MockResponse::Success(Response::new(200, Bytes::from("{}"))),
        );

        client.get("https://cloud.test/x", &Headers::new()).await.unwrap();
        assert_eq!(handle.requests().len(), 1);
    }
}
