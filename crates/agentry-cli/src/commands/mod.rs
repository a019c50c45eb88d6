//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command. Client commands
//! talk to a running registry through `RegistryClient`; the `server`
//! command hosts one.

pub mod call;
pub mod query;
pub mod server;
pub mod service;

use agentry_core::client::RegistryClient;

/// Build a client for commands that carry no service identity of their own.
pub fn connect(registry: &str) -> Result<RegistryClient, String> {
    RegistryClient::connect(registry).map_err(|e| e.to_string())
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
