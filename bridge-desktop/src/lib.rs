//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `NetworkTransport` using `reqwest`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestTransport;
//! use bridge_traits::transport::{HttpMethod, NetworkTransport, Request};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = ReqwestTransport::new();
//!     let response = transport
//!         .send(Request::new(HttpMethod::Get, "https://example.com").timeout_ms(6000))
//!         .await;
//! }
//! ```

mod transport;

pub use transport::ReqwestTransport;
