//! Zero Common - Shared types, utilities, and configuration for the Zero ecosystem.
//!
//! This crate provides:
//! - Layered JSON configuration loading with environment overrides
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config_loader;
pub mod error;
pub mod logging;
pub mod validation;

pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult, Validator};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config_loader::{apply_env_overrides, load_layered};
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError, Validator};
}
