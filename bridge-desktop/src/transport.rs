//! Network Transport Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    transport::{HttpMethod, NetworkTransport, Request, Response},
};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based network transport
///
/// Provides:
/// - Connection pooling via reqwest
/// - TLS support by default
/// - Per-request timeouts in whole seconds
///
/// It never retries; every [`send`](NetworkTransport::send) maps to exactly
/// one HTTP exchange.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a new transport with default configuration
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("app-bridge-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default reqwest client");
                Client::new()
            });

        Self { client }
    }

    /// Create a new transport around a preconfigured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }

    /// Whole-second timeout for a request, if it has one.
    ///
    /// Truncates toward zero; sub-second timeouts keep the client default.
    fn request_timeout(request: &Request) -> Option<Duration> {
        match request.timeout_secs() {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: Request) -> reqwest::RequestBuilder {
        let timeout = Self::request_timeout(&request);
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if !request.body.is_empty() {
            req = req.body(request.body);
        }

        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        req
    }

    /// Collect response headers, joining repeated names so none are lost.
    ///
    /// Header values must be visible ASCII, like bodies must be UTF-8.
    fn collect_headers(headers: &reqwest::header::HeaderMap) -> Result<HashMap<String, String>> {
        let mut collected: HashMap<String, String> = HashMap::new();
        for (name, value) in headers {
            let value = value
                .to_str()
                .map_err(|e| BridgeError::InvalidText(format!("header '{}': {}", name, e)))?
                .to_string();
            collected
                .entry(name.to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        Ok(collected)
    }

    fn convert_error(error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Timeout(error.to_string())
        } else if error.is_connect() {
            BridgeError::Connection(error.to_string())
        } else {
            BridgeError::OperationFailed(error.to_string())
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkTransport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        debug!(method = %request.method, url = %request.url, timeout_ms = request.timeout_ms, "Sending request");

        let response = self.build_request(request).send().await.map_err(|e| {
            warn!(error = %e, "Request failed before a response was received");
            Self::convert_error(e)
        })?;

        let http_status_code = i32::from(response.status().as_u16());
        let headers = Self::collect_headers(response.headers())?;
        let bytes = response.bytes().await.map_err(Self::convert_error)?;
        let body = String::from_utf8(bytes.to_vec())
            .map_err(|e| BridgeError::InvalidText(e.to_string()))?;

        debug!(status = http_status_code, "Received response");

        Ok(Response {
            http_status_code,
            custom_status_code: 0,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one connection with a canned reply; yields the raw request text.
    async fn serve_once(reply: Vec<u8>) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&received).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if received.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(&reply).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&received).to_string()
        });

        (url, handle)
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(
            ReqwestTransport::convert_method(HttpMethod::Get),
            reqwest::Method::GET
        );
        assert_eq!(
            ReqwestTransport::convert_method(HttpMethod::Post),
            reqwest::Method::POST
        );
        assert_eq!(
            ReqwestTransport::convert_method(HttpMethod::Patch),
            reqwest::Method::PATCH
        );
        assert_eq!(
            ReqwestTransport::convert_method(HttpMethod::Delete),
            reqwest::Method::DELETE
        );
    }

    #[test]
    fn test_timeout_truncates_to_whole_seconds() {
        let request = Request::new(HttpMethod::Get, "http://localhost").timeout_ms(9500);
        assert_eq!(
            ReqwestTransport::request_timeout(&request),
            Some(Duration::from_secs(9))
        );

        let request = request.timeout_ms(6000);
        assert_eq!(
            ReqwestTransport::request_timeout(&request),
            Some(Duration::from_secs(6))
        );

        let request = request.timeout_ms(500);
        assert_eq!(ReqwestTransport::request_timeout(&request), None);
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let reply = b"HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nX-Trace: abc\r\nContent-Length: 11\r\nConnection: close\r\n\r\n{\"ok\":true}".to_vec();
        let (url, server) = serve_once(reply).await;

        let transport = ReqwestTransport::new();
        let request = Request::new(HttpMethod::Post, format!("{}/api/echo", url))
            .header("X-Custom", "value-1")
            .body(r#"{"hello":"world"}"#)
            .timeout_ms(6000);

        let response = transport.send(request).await.unwrap();
        let raw_request = server.await.unwrap();

        assert_eq!(response.http_status_code, 201);
        assert_eq!(response.custom_status_code, 0);
        assert_eq!(response.body, r#"{"ok":true}"#);
        assert_eq!(response.header("x-trace"), Some("abc"));
        assert!(raw_request.starts_with("POST /api/echo"));
        assert!(raw_request.to_lowercase().contains("x-custom: value-1"));
        assert!(raw_request.ends_with(r#"{"hello":"world"}"#));
    }

    #[tokio::test]
    async fn test_non_utf8_body_is_rejected() {
        let mut reply =
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n".to_vec();
        reply.extend_from_slice(&[0xff, 0xfe]);
        let (url, _server) = serve_once(reply).await;

        let transport = ReqwestTransport::new();
        let result = transport
            .send(Request::new(HttpMethod::Get, url).timeout_ms(6000))
            .await;

        assert!(matches!(result, Err(BridgeError::InvalidText(_))));
    }

    #[test]
    fn test_opaque_header_value_is_rejected() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-trace",
            reqwest::header::HeaderValue::from_bytes(&[b'a', 0xff]).unwrap(),
        );

        let result = ReqwestTransport::collect_headers(&headers);
        assert!(matches!(result, Err(BridgeError::InvalidText(_))));
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.append("set-cookie", "a=1".parse().unwrap());
        headers.append("set-cookie", "b=2".parse().unwrap());

        let collected = ReqwestTransport::collect_headers(&headers).unwrap();
        assert_eq!(collected["set-cookie"], "a=1, b=2");
    }

    #[tokio::test]
    async fn test_connection_failure_is_surfaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let transport = ReqwestTransport::new();
        let result = transport
            .send(Request::new(HttpMethod::Get, url).timeout_ms(2000))
            .await;

        let error = result.unwrap_err();
        assert!(error.custom_status_code() < 0);
    }
}
