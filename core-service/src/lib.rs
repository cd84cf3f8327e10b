//! Core service façade.
//!
//! This crate ties the session core together for host applications: the
//! [`AppRegistry`] hands out one [`App`] per application id, and the types a
//! host needs (configuration, credentials, users, errors, transports, events)
//! are re-exported here. Desktop apps typically enable the `desktop-shims`
//! feature (which depends on `bridge-desktop`) so configs default to the
//! reqwest-backed transport.

pub mod error;
pub mod registry;

pub use error::{RegistryError, Result};
pub use registry::{AppRegistry, RegistryPolicy};

pub use core_auth::{
    App, AppError, ClientErrorCode, Credentials, ErrorNormalizer, ProviderType, ServiceErrorCode,
    SessionState, User, UserProfile, UserState,
};
pub use core_runtime::config::{
    DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_MS, MIN_REQUEST_TIMEOUT_MS,
};
pub use core_runtime::events::{AuthEvent, CoreEvent, EventBus, FunctionEvent};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
pub use core_runtime::{AppConfig, AppConfigBuilder, TransportFactory};

pub use bridge_traits::{
    completion_pair, CallbackTransport, Completion, HttpMethod, JsonCodec, LoggerSink,
    NetworkTransport, Request, Response, ValueCodec,
};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::ReqwestTransport;
