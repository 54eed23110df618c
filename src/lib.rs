//! A record/replay/transform HTTP intermediary: sits between a test client
//! and a real upstream, matching live requests against previously recorded
//! exchanges (or forwarding to the real thing and recording as it goes),
//! with optional response transforms, fault injection, and a small admin
//! control plane.
//!
//! # Compatibility
//! - Runtime: `tokio`
//! - HTTP: `hyper` 1.x
//!
//! # Key modules
//! - [engine] owns per-process state and runs the dispatch pipeline.
//! - [matcher] scores recorded exchanges against a live request.
//! - [chaos] injects latency and synthetic errors.
//! - [intercept] composes response transforms.
//! - [custom_route] lets callers register handlers ahead of any mode.
//! - [storage] is the pluggable persistence contract (file-journal or sqlite).
//! - [forward] relays requests to a real upstream.
//! - [admin] implements the `/__*` control-plane endpoints.

/// Boxed streaming response body.
pub mod body;

/// The `/__*` control-plane endpoints.
pub mod admin;

/// Fault injection: latency and synthetic errors.
pub mod chaos;

/// YAML-backed configuration.
pub mod config;

/// Cross-origin preflight handling, applied directly from the engine.
pub mod cors;

/// User-declared routes that take precedence over mode dispatch.
pub mod custom_route;

/// Error families for storage and the request engine.
pub mod error;

/// In-process lifecycle event bus.
pub mod events;

/// Per-process engine: owned state plus the request dispatch pipeline.
pub mod engine;

/// Upstream forwarder.
pub mod forward;

/// Response transform pipeline.
pub mod intercept;

/// Tracing subscriber setup for the binary.
pub mod logging;

/// Approximate request matcher.
pub mod matcher;

/// Shared data model (requests, responses, recorded exchanges).
pub mod model;

/// Path pattern compilation.
pub mod pattern;

/// Conversion of handler return values into responses.
pub mod responder;

/// HTTP server implementation and graceful shutdown.
mod server;

/// Pluggable storage backings.
pub mod storage;

/// Core type aliases used throughout the crate.
pub mod types;

pub use bytes::Bytes;
pub use http::{Method, StatusCode, header};
pub use server::serve;
