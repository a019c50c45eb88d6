//! Agentry Core — transport-agnostic domain logic for the agent registry.
//!
//! This crate contains the registry store, heartbeat monitor, discovery
//! engine, cross-service invocation proxy, and registry client. It has
//! **no HTTP framework dependency** by default, making it suitable for:
//!
//! - HTTP servers (via `agentry-server`)
//! - CLI tools
//! - services that embed the registry directly
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `RegistryError` for use in
//!   axum handlers.

pub mod client;
pub mod correlation;
pub mod db;
pub mod discovery;
pub mod error;
pub mod models;
pub mod monitor;
pub mod proxy;
pub mod state;
pub mod store;

// Convenience re-exports
pub use db::Database;
pub use error::RegistryError;
pub use state::{AppState, AppStateInner};
