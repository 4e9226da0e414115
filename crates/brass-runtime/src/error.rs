//! Runtime error types.

use brass_framework::RegistrationError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while assembling or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin's configuration section did not deserialize.
    #[error("Failed to deserialize config for plugin '{plugin}': {source}")]
    PluginConfig {
        plugin: String,
        #[source]
        source: serde_json::Error,
    },

    /// A plugin failed to register a matcher or processor.
    #[error("Plugin '{plugin}' failed to register: {source}")]
    Registration {
        plugin: String,
        #[source]
        source: RegistrationError,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
