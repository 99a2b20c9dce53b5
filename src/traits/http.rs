//! HTTP transport abstraction.
//!
//! The vendor cloud is reached through this trait so the agent never depends
//! on a concrete HTTP stack: production code injects the reqwest adapter,
//! tests inject a scripted mock. The agent only ever needs GET and POST with
//! JSON bodies and responses.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// HTTP headers represented as a key-value map.
pub type Headers = HashMap<String, String>;

/// HTTP response wrapper.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Bytes,
}

impl Response {
    /// Create a new response.
    pub fn new(status: u16, body: Bytes) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    /// Create a new response with headers.
    pub fn with_headers(status: u16, headers: Headers, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get the response body as a string.
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }

    /// Parse the response body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Transport-layer errors.
///
/// Everything here means "no usable vendor verdict was obtained", which is
/// why body decoding failures live alongside connection failures: the agent
/// treats both as retryable transport conditions.
#[derive(Debug, Clone)]
pub enum HttpError {
    /// Connection failed
    ConnectionFailed(String),
    /// Request timeout
    Timeout(String),
    /// Server returned an error status
    ServerError { status: u16, message: String },
    /// Response body could not be decoded
    Decode(String),
    /// IO error
    Io(String),
    /// Other error
    Other(String),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            HttpError::Timeout(msg) => write!(f, "Request timeout: {}", msg),
            HttpError::ServerError { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            HttpError::Decode(msg) => write!(f, "Undecodable response: {}", msg),
            HttpError::Io(msg) => write!(f, "IO error: {}", msg),
            HttpError::Other(msg) => write!(f, "HTTP error: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

/// Trait for HTTP client operations.
///
/// Implementations include the production reqwest-based client and a mock
/// client for tests. The agent assumes serial request/response semantics;
/// timeouts and retries are configured on the concrete client, not here.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET request.
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError>;

    /// Perform a POST request with a JSON string body.
    async fn post(&self, url: &str, body: &str, headers: &Headers) -> Result<Response, HttpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_is_success() {
        assert!(Response::new(200, Bytes::new()).is_success());
        assert!(Response::new(204, Bytes::new()).is_success());
        assert!(!Response::new(302, Bytes::new()).is_success());
        assert!(!Response::new(401, Bytes::new()).is_success());
        assert!(!Response::new(500, Bytes::new()).is_success());
    }

    #[test]
    fn test_response_text() {
        let response = Response::new(200, Bytes::from("hello"));
        assert_eq!(response.text().unwrap(), "hello");
    }

    #[test]
    fn test_response_json() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Payload {
            success: bool,
        }

        let response = Response::new(200, Bytes::from(r#"{"success":true}"#));
        let payload: Payload = response.json().unwrap();
        assert_eq!(payload, Payload { success: true });
    }

    #[test]
    fn test_response_with_headers() {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let response = Response::with_headers(200, headers, Bytes::from("{}"));
        assert_eq!(
            response.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
    }

    #[test]
    fn test_http_error_display() {
        assert_eq!(
            HttpError::ConnectionFailed("refused".to_string()).to_string(),
            "Connection failed: refused"
        );
        assert_eq!(
            HttpError::ServerError {
                status: 502,
                message: "Bad Gateway".to_string()
            }
            .to_string(),
            "Server error (502): Bad Gateway"
        );
        assert_eq!(
            HttpError::Decode("unexpected EOF".to_string()).to_string(),
            "Undecodable response: unexpected EOF"
        );
    }
}
