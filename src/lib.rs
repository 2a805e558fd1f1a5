//! Turnstile - Per-Key Rate Limiting for HTTP APIs
//!
//! This crate implements a fixed-window, per-client rate limiter with
//! bounded in-memory state, together with axum middleware guards that
//! gate handlers behind it and a security audit log for violations.
//! State is process-local by design; nothing is persisted or shared
//! across instances.

pub mod audit;
pub mod config;
pub mod error;
pub mod middleware;
pub mod ratelimit;
