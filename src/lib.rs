//! Server-side response cache for axum services.
//!
//! The [`cache`] module holds the middleware; [`infra`] provides the Redis
//! store, telemetry, and the demo HTTP surface used by the binary.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
