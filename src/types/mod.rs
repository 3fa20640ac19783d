//! Core types for the runtime.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (RunId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the driver and observability

mod config;
mod errors;
mod ids;

pub use config::{Config, DriverConfig, ObservabilityConfig};
pub use errors::{EffectError, Error, ErrorMessage, Result};
pub use ids::RunId;
