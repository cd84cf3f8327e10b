//! # Application Configuration
//!
//! Holds the identity of a backend application and the collaborators a
//! session needs to reach it.
//!
//! ## Overview
//!
//! [`AppConfig`] is built once through [`AppConfigBuilder`], validated up
//! front, and never mutated after a session is constructed from it. The only
//! exception is `app_id`, which the session stamps exactly once at
//! construction via [`AppConfig::with_app_id`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AppConfig;
//! use std::sync::Arc;
//!
//! let config = AppConfig::builder()
//!     .base_url("https://services.cloud.mongodb.com")
//!     .local_app_name("Field Notes")
//!     .local_app_version("2.4.1")
//!     .transport(Arc::new(MyTransport))
//!     .build()?;
//!
//! assert_eq!(config.default_request_timeout_ms, 6000);
//! ```
//!
//! ## Required Dependencies
//!
//! - A transport factory. With the `desktop-shims` feature a `reqwest` based
//!   transport is injected when none is provided; without it the builder
//!   fails with [`Error::CapabilityMissing`].

use crate::error::{Error, Result};
use bridge_traits::{JsonCodec, NetworkTransport, ValueCodec};
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 6000;

/// Shortest accepted request timeout.
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 1000;

/// Backend location used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://services.cloud.mongodb.com";

/// Produces the transport a session sends its requests through.
///
/// Any `Fn() -> Arc<dyn NetworkTransport>` closure is a factory.
pub trait TransportFactory: Send + Sync {
    fn make_transport(&self) -> Arc<dyn NetworkTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Arc<dyn NetworkTransport> + Send + Sync,
{
    fn make_transport(&self) -> Arc<dyn NetworkTransport> {
        self()
    }
}

/// Configuration for one backend application.
#[derive(Clone)]
pub struct AppConfig {
    /// Backend application identifier (required before a session is built)
    pub app_id: String,

    /// Backend base URL; [`DEFAULT_BASE_URL`] when unset
    pub base_url: Option<String>,

    /// Name of the local application, reported with logins
    pub local_app_name: Option<String>,

    /// Version of the local application, reported with logins
    pub local_app_version: Option<String>,

    /// Timeout attached to every request
    pub default_request_timeout_ms: u64,

    /// Builds the network transport for a session
    pub transport_factory: Arc<dyn TransportFactory>,

    /// Structured-value codec for remote function calls
    pub codec: Arc<dyn ValueCodec>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("app_id", &self.app_id)
            .field("base_url", &self.base_url)
            .field("local_app_name", &self.local_app_name)
            .field("local_app_version", &self.local_app_version)
            .field(
                "default_request_timeout_ms",
                &self.default_request_timeout_ms,
            )
            .field("transport_factory", &"TransportFactory { ... }")
            .field("codec", &"ValueCodec { ... }")
            .finish()
    }
}

/// The externally settable knobs of an [`AppConfig`], in comparable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSettings {
    pub base_url: String,
    pub local_app_name: Option<String>,
    pub local_app_version: Option<String>,
    pub default_request_timeout_ms: u64,
}

impl AppConfig {
    /// Creates a new builder for constructing an `AppConfig`.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validates every knob except `app_id`, which is checked when a session
    /// stamps it.
    pub fn validate(&self) -> Result<()> {
        // Transports work in whole seconds; anything shorter would truncate
        // to no timeout at all.
        if self.default_request_timeout_ms < MIN_REQUEST_TIMEOUT_MS {
            return Err(Error::Config(format!(
                "Default request timeout must be at least {}ms, got {}ms",
                MIN_REQUEST_TIMEOUT_MS, self.default_request_timeout_ms
            )));
        }

        if let Some(base_url) = &self.base_url {
            validate_base_url(base_url)?;
        }

        if matches!(&self.local_app_name, Some(name) if name.trim().is_empty()) {
            return Err(Error::Config(
                "Local app name cannot be empty when set".to_string(),
            ));
        }

        if matches!(&self.local_app_version, Some(version) if version.trim().is_empty()) {
            return Err(Error::Config(
                "Local app version cannot be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns a copy with `app_id` set.
    ///
    /// Fails if the id is empty, or if the config already names a different
    /// application.
    pub fn with_app_id(mut self, app_id: &str) -> Result<Self> {
        if app_id.trim().is_empty() {
            return Err(Error::Config("App id cannot be empty".to_string()));
        }

        if !self.app_id.is_empty() && self.app_id != app_id {
            return Err(Error::Config(format!(
                "Config is already bound to app id '{}', cannot rebind to '{}'",
                self.app_id, app_id
            )));
        }

        self.app_id = app_id.to_string();
        Ok(self)
    }

    /// Base URL with the default applied and any trailing slash removed.
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    /// Builds a transport through the configured factory.
    pub fn make_transport(&self) -> Arc<dyn NetworkTransport> {
        self.transport_factory.make_transport()
    }

    pub fn settings(&self) -> ConfigSettings {
        ConfigSettings {
            base_url: self.effective_base_url(),
            local_app_name: self.local_app_name.clone(),
            local_app_version: self.local_app_version.clone(),
            default_request_timeout_ms: self.default_request_timeout_ms,
        }
    }
}

fn validate_base_url(base_url: &str) -> Result<()> {
    if base_url.trim().is_empty() {
        return Err(Error::Config("Base URL cannot be empty when set".to_string()));
    }

    let parsed = Url::parse(base_url)
        .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::Config(format!(
            "Base URL must use http or https, got '{}'",
            scheme
        ))),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn transport_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "NetworkTransport".to_string(),
        message: "A transport factory is required to reach the backend. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestTransport. \
                 Mobile/embedded: inject the platform network stack through `transport_factory`."
            .to_string(),
    }
}

/// Builder for [`AppConfig`].
#[derive(Default)]
pub struct AppConfigBuilder {
    app_id: Option<String>,
    base_url: Option<String>,
    local_app_name: Option<String>,
    local_app_version: Option<String>,
    default_request_timeout_ms: Option<u64>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    codec: Option<Arc<dyn ValueCodec>>,
}

impl AppConfigBuilder {
    /// Sets the app id up front; usually left to the session or registry.
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn local_app_name(mut self, name: impl Into<String>) -> Self {
        self.local_app_name = Some(name.into());
        self
    }

    pub fn local_app_version(mut self, version: impl Into<String>) -> Self {
        self.local_app_version = Some(version.into());
        self
    }

    /// Per-request timeout. Transports truncate it to whole seconds, so
    /// values below one second are rejected by `build()`.
    pub fn default_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_request_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Shares one transport instance across every session built from this config.
    pub fn transport(self, transport: Arc<dyn NetworkTransport>) -> Self {
        self.transport_factory(Arc::new(move || Arc::clone(&transport)))
    }

    pub fn codec(mut self, codec: Arc<dyn ValueCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when no transport is available
    /// - [`Error::Config`] when a knob is invalid
    pub fn build(self) -> Result<AppConfig> {
        #[cfg(feature = "desktop-shims")]
        let transport_factory: Arc<dyn TransportFactory> = match self.transport_factory {
            Some(factory) => factory,
            None => Arc::new(|| -> Arc<dyn NetworkTransport> {
                Arc::new(bridge_desktop::ReqwestTransport::new())
            }),
        };

        #[cfg(not(feature = "desktop-shims"))]
        let transport_factory = self
            .transport_factory
            .ok_or_else(transport_missing_error)?;

        let codec: Arc<dyn ValueCodec> = match self.codec {
            Some(codec) => codec,
            None => Arc::new(JsonCodec),
        };

        let config = AppConfig {
            app_id: self.app_id.unwrap_or_default(),
            base_url: self.base_url,
            local_app_name: self.local_app_name,
            local_app_version: self.local_app_version,
            default_request_timeout_ms: self
                .default_request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            transport_factory,
            codec,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{Request, Response};

    struct NoopTransport;

    #[async_trait]
    impl NetworkTransport for NoopTransport {
        async fn send(&self, _request: Request) -> BridgeResult<Response> {
            Ok(Response::new(200, ""))
        }
    }

    fn builder() -> AppConfigBuilder {
        AppConfig::builder().transport(Arc::new(NoopTransport))
    }

    #[test]
    fn test_default_timeout() {
        let config = builder().build().unwrap();
        assert_eq!(config.default_request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(config.default_request_timeout_ms, 6000);
    }

    #[test]
    fn test_explicit_timeout() {
        let config = builder().default_request_timeout_ms(9500).build().unwrap();
        assert_eq!(config.default_request_timeout_ms, 9500);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = builder().default_request_timeout_ms(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_sub_second_timeout_rejected() {
        let result = builder().default_request_timeout_ms(500).build();
        match result {
            Err(Error::Config(message)) => assert!(message.contains("500ms")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
        assert!(builder().default_request_timeout_ms(999).build().is_err());
        assert!(builder().default_request_timeout_ms(1000).build().is_ok());
    }

    #[test]
    fn test_base_url_validation() {
        assert!(builder().base_url("").build().is_err());
        assert!(builder().base_url("not a url").build().is_err());
        assert!(builder().base_url("ftp://example.com").build().is_err());
        assert!(builder().base_url("http://localhost:9090").build().is_ok());
    }

    #[test]
    fn test_effective_base_url() {
        let config = builder().build().unwrap();
        assert_eq!(config.effective_base_url(), DEFAULT_BASE_URL);

        let config = builder().base_url("https://example.com/").build().unwrap();
        assert_eq!(config.effective_base_url(), "https://example.com");
    }

    #[test]
    fn test_empty_local_app_metadata_rejected() {
        assert!(builder().local_app_name(" ").build().is_err());
        assert!(builder().local_app_version("").build().is_err());
        assert!(builder()
            .local_app_name("Field Notes")
            .local_app_version("1.0.0")
            .build()
            .is_ok());
    }

    #[test]
    fn test_with_app_id_sets_once() {
        let config = builder().build().unwrap();
        assert!(config.app_id.is_empty());

        let config = config.with_app_id("app-1").unwrap();
        assert_eq!(config.app_id, "app-1");

        // Re-stamping with the same id is harmless.
        let config = config.with_app_id("app-1").unwrap();
        assert!(config.clone().with_app_id("app-2").is_err());
        assert!(builder().build().unwrap().with_app_id("").is_err());
    }

    #[test]
    fn test_settings_compare_knobs() {
        let a = builder().local_app_name("A").build().unwrap();
        let b = builder().local_app_name("A").build().unwrap();
        let c = builder().local_app_name("C").build().unwrap();

        assert_eq!(a.settings(), b.settings());
        assert_ne!(a.settings(), c.settings());
    }

    #[test]
    fn test_debug_hides_trait_objects() {
        let config = builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("TransportFactory { ... }"));
        assert!(debug.contains("default_request_timeout_ms: 6000"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_transport_fails_fast() {
        let result = AppConfig::builder().build();
        assert!(matches!(result, Err(Error::CapabilityMissing { .. })));
    }

    #[tokio::test]
    async fn test_closure_factory() {
        let config = AppConfig::builder()
            .transport_factory(Arc::new(|| -> Arc<dyn NetworkTransport> {
                Arc::new(NoopTransport)
            }))
            .build()
            .unwrap();

        let transport = config.make_transport();
        let response = transport
            .send(Request::new(bridge_traits::HttpMethod::Get, "http://localhost"))
            .await
            .unwrap();
        assert_eq!(response.http_status_code, 200);
    }
}
