//! Shared test utilities for the tenant provider registry.
//!
//! This crate provides:
//! - Proptest generators for provider names, keys and configuration payloads
//! - A counting, fault-injecting configuration store
//! - Valid sample configurations and sealed records per provider

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
