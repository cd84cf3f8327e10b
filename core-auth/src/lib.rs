//! # Session Module
//!
//! Application session management for a backend application: logging in
//! with pluggable credential providers, tracking several logged-in users,
//! and calling backend functions on their behalf.
//!
//! ## Overview
//!
//! [`App`] owns the transport and a local identity store. It runs login,
//! link and logout flows against the backend and hands out non-owning
//! [`User`] handles. Every failure is an [`AppError`] produced by the
//! [`ErrorNormalizer`].
//!
//! ## Features
//!
//! - Anonymous, email/password, API key, custom token, function and OAuth
//!   credential providers
//! - Multiple logged-in users with a switchable current user
//! - Access token refresh, including a single retry on rejected function calls
//! - Auth and function event emission

mod app;
pub mod error;
mod functions;
mod routes;
pub mod types;
mod user;
mod user_store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use app::App;
pub use error::{
    AppError, BackendError, ClientErrorCode, ErrorNormalizer, JsonErrorCode, Result,
    ServiceErrorCode,
};
pub use types::{AuthTokens, Credentials, ProviderType, SessionState, UserProfile, UserState};
pub use user::User;
