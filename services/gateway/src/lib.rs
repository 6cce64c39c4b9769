//! Courier gateway library crate.
//!
//! # Purpose
//! Hosts the broker engine behind a WebSocket endpoint: configuration and
//! the per-connection session lifecycle.
//!
//! # Notes
//! The binary in `main.rs` adds observability and wires these pieces
//! together; integration tests drive `transport` directly on an ephemeral port.
pub mod config;
mod connection;
pub mod transport;
