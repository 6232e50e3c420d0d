//! Layerforge Core - Foundational Types
//!
//! This module provides the error taxonomy and build configuration
//! shared by the runtime and the CLI.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{ForgeConfig, LogLevel};
pub use error::{ForgeError, Result};

/// Layerforge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
