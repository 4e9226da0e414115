//! Brass Runtime - the layer between adapters and the matching engine.
//!
//! This crate provides:
//! - Configuration loading with figment (`brass.toml`, `BRASS_*` variables)
//! - Logging setup with tracing-subscriber
//! - [`Plugin`]s, which register matchers from their own config section
//! - [`BrassRuntime`], which runs each event in its own task and sweeps
//!   expired conversations
//!
//! ```ignore
//! use brass_runtime::BrassRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = BrassRuntime::builder()
//!         .plugin::<Weather>()
//!         .build()?;
//!
//!     // Hand `runtime.handle_event` to an adapter, then:
//!     runtime.run().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod plugin;
pub mod runtime;

pub use config::{BrassConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use plugin::{Plugin, plugin_config};
pub use runtime::{BrassRuntime, RuntimeBuilder, RuntimeStats};

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for plugins.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
