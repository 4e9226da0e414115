//! Configuration module for the Brass runtime.
//!
//! Loads the engine, logging and runtime sections from files, environment
//! variables and programmatic overrides, then validates them.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BrassConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, RuntimeConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
