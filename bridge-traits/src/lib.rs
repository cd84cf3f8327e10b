//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the session core and the
//! platform-specific collaborators it cannot own itself: the network stack,
//! the structured-value codec used for remote function calls, and the host
//! logging pipeline.
//!
//! ## Traits
//!
//! - [`NetworkTransport`](transport::NetworkTransport) - Sends one [`Request`](transport::Request)
//!   and resolves exactly once with a [`Response`](transport::Response)
//! - [`CallbackTransport`](completion::CallbackTransport) - Adapts a callback-style host
//!   transport through a single-use [`Completion`](completion::Completion)
//! - [`ValueCodec`](codec::ValueCodec) - Encodes function arguments and decodes results
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Every
//! variant maps to a negative custom status code so transport failures can be
//! told apart from HTTP statuses once they reach the session core.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`. Transport completions may fire on
//! any thread the host chooses.
//!
//! ## Examples
//!
//! ### Implementing NetworkTransport
//!
//! ```ignore
//! use bridge_traits::transport::{NetworkTransport, Request, Response};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyTransport;
//!
//! #[async_trait]
//! impl NetworkTransport for MyTransport {
//!     async fn send(&self, request: Request) -> Result<Response> {
//!         // Hand the request to the platform stack
//!         todo!()
//!     }
//! }
//! ```

pub mod codec;
pub mod completion;
pub mod error;
pub mod log;
pub mod transport;

pub use error::{BridgeError, Result};

// Re-export commonly used types
pub use codec::{JsonCodec, ValueCodec};
pub use completion::{completion_pair, CallbackTransport, Completion, PendingResponse};
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use transport::{HttpMethod, NetworkTransport, Request, Response};
