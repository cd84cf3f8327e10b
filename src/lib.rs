//! Workspace placeholder crate.
//!
//! This crate exposes shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `app-bridge-workspace`
//! and enable `desktop-shims` to get the registry, the session core and the
//! `reqwest` transport without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
