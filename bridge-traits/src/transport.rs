//! Network Transport Abstraction
//!
//! The generic request/response contract between the session core and the
//! platform network stack. Bodies and URLs are UTF-8 text; binary payloads
//! are not part of this contract.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{BridgeError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handed to the platform transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub timeout_ms: u64,
}

impl Request {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: String::new(),
            timeout_ms: 0,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = serde_json::to_string(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Timeout in whole seconds.
    ///
    /// Truncates: 9500ms is 9 seconds, never 10.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_ms / 1000
    }
}

/// A response produced by the platform transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub http_status_code: i32,
    /// Non-zero when the transport itself reports a failure.
    pub custom_status_code: i32,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Response {
    pub fn new(http_status_code: i32, body: impl Into<String>) -> Self {
        Self {
            http_status_code,
            custom_status_code: 0,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_custom_status(mut self, code: i32) -> Self {
        self.custom_status_code = code;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Check if response status is successful (2xx) with no transport failure
    pub fn is_success(&self) -> bool {
        self.custom_status_code == 0 && (200..300).contains(&self.http_status_code)
    }

    /// Check if response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status_code)
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.http_status_code)
    }
}

/// Async network transport trait
///
/// Each call to [`send`](NetworkTransport::send) resolves exactly once.
/// Implementations must not retry on their own; failures to reach the
/// network are reported as a [`BridgeError`] or as a [`Response`] carrying
/// a non-zero `custom_status_code`, never swallowed.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::transport::{HttpMethod, NetworkTransport, Request};
///
/// async fn ping(transport: &dyn NetworkTransport) -> bridge_traits::error::Result<i32> {
///     let request = Request::new(HttpMethod::Get, "https://example.com/ping").timeout_ms(6000);
///     Ok(transport.send(request).await?.http_status_code)
/// }
/// ```
#[async_trait]
pub trait NetworkTransport: Send + Sync {
    /// Send a request and wait for its single response.
    async fn send(&self, request: Request) -> Result<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = Request::new(HttpMethod::Post, "https://example.com")
            .header("User-Agent", "test")
            .bearer_token("secret")
            .timeout_ms(6000);

        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.headers.get("User-Agent"), Some(&"test".to_string()));
        assert_eq!(
            request.headers.get("Authorization"),
            Some(&"Bearer secret".to_string())
        );
        assert_eq!(request.timeout_ms, 6000);
    }

    #[test]
    fn test_timeout_secs_truncates() {
        let request = Request::new(HttpMethod::Get, "https://example.com").timeout_ms(9500);
        assert_eq!(request.timeout_secs(), 9);

        let request = request.timeout_ms(999);
        assert_eq!(request.timeout_secs(), 0);

        let request = request.timeout_ms(6000);
        assert_eq!(request.timeout_secs(), 6);
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = Request::new(HttpMethod::Post, "https://example.com")
            .json(&serde_json::json!({"key": "value"}))
            .unwrap();

        assert_eq!(request.body, r#"{"key":"value"}"#);
        assert_eq!(
            request.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
    }

    #[test]
    fn test_response_status_checks() {
        let response = Response::new(200, "ok");
        assert!(response.is_success());
        assert!(!response.is_client_error());
        assert!(!response.is_server_error());

        let response = Response::new(200, "ok").with_custom_status(-3);
        assert!(!response.is_success());

        let response = Response::new(404, "");
        assert!(response.is_client_error());

        let response = Response::new(503, "");
        assert!(response.is_server_error());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let response = Response::new(200, "").with_header("Content-Type", "application/json");
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("x-missing"), None);
    }
}
