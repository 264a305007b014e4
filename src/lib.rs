//! Turnstile - HTTP Admission Control
//!
//! This crate implements a rate limiting layer that sits in front of HTTP
//! handlers. Each request is counted under its API credential or, failing
//! that, its client IP, using a fixed-window counter kept in a pluggable
//! counter store (Redis or in-memory).

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
