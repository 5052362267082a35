//! Shared library for cross-cutting concerns in commerce platform Rust services.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration and building
//! - Tracing subscriber initialization
//! - Prometheus-style counters for in-process caches

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod metrics;
pub mod tracing_config;

pub use error::PlatformError;
pub use http::{HttpConfig, build_http_client};
pub use metrics::{CacheMetrics, Counter, Gauge};
pub use tracing_config::{LogFormat, TracingConfig, init_tracing};
