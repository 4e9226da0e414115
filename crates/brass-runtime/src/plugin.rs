//! Plugins: bundles of matchers and processors with their own config section.
//!
//! A plugin reads `plugins.<name>` from the configuration and registers
//! whatever it needs on the [`DispatcherBuilder`].
//!
//! ```rust,ignore
//! #[derive(Default, Deserialize)]
//! struct EchoConfig {
//!     prefix: String,
//! }
//!
//! struct Echo;
//!
//! impl Plugin for Echo {
//!     type Config = EchoConfig;
//!
//!     fn name() -> &'static str {
//!         "echo"
//!     }
//!
//!     fn setup(config: EchoConfig, dispatcher: &mut DispatcherBuilder) -> RegistrationResult<()> {
//!         dispatcher.register(on_command("echo").handle(move |state: State| {
//!             let prefix = config.prefix.clone();
//!             async move { format!("{prefix}{}", state.get_str(keys::COMMAND_ARG).unwrap_or_default()) }
//!         }))?;
//!         Ok(())
//!     }
//! }
//! ```

use brass_framework::{DispatcherBuilder, RegistrationResult};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::config::BrassConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// A named unit of matchers and processors.
pub trait Plugin: 'static {
    /// The plugin's configuration section.
    type Config: DeserializeOwned + Default;

    /// Section name under `plugins`, also used in logs.
    fn name() -> &'static str;

    /// Registers the plugin's matchers and processors.
    fn setup(config: Self::Config, dispatcher: &mut DispatcherBuilder) -> RegistrationResult<()>;
}

type SetupFn = Box<dyn FnOnce(&BrassConfig, &mut DispatcherBuilder) -> RuntimeResult<()> + Send>;

/// A plugin waiting for the configuration to be loaded.
pub(crate) struct PendingPlugin {
    name: String,
    setup: SetupFn,
}

impl PendingPlugin {
    pub(crate) fn of<P: Plugin>() -> Self {
        Self {
            name: P::name().to_string(),
            setup: Box::new(|config, dispatcher| {
                let plugin_config = plugin_config::<P::Config>(config, P::name())?;
                P::setup(plugin_config, dispatcher).map_err(|source| RuntimeError::Registration {
                    plugin: P::name().to_string(),
                    source,
                })
            }),
        }
    }

    pub(crate) fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(&mut DispatcherBuilder) -> RegistrationResult<()> + Send + 'static,
    {
        let name = name.into();
        let plugin = name.clone();
        Self {
            name,
            setup: Box::new(move |_, dispatcher| {
                f(dispatcher).map_err(|source| RuntimeError::Registration { plugin, source })
            }),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn apply(
        self,
        config: &BrassConfig,
        dispatcher: &mut DispatcherBuilder,
    ) -> RuntimeResult<()> {
        (self.setup)(config, dispatcher)?;
        info!(plugin = self.name.as_str(), "Plugin loaded");
        Ok(())
    }
}

/// Deserializes the `plugins.<name>` section, or returns the default.
pub fn plugin_config<T>(config: &BrassConfig, name: &str) -> RuntimeResult<T>
where
    T: DeserializeOwned + Default,
{
    match config.plugins.get(name) {
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|source| RuntimeError::PluginConfig {
                plugin: name.to_string(),
                source,
            })
        }
        None => {
            warn!(plugin = name, "No configuration found for plugin, using default");
            Ok(T::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use brass_framework::EngineConfig;
    use brass_framework::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct GreetConfig {
        greeting: String,
    }

    struct Greet;

    impl Plugin for Greet {
        type Config = GreetConfig;

        fn name() -> &'static str {
            "greet"
        }

        fn setup(config: GreetConfig, dispatcher: &mut DispatcherBuilder) -> RegistrationResult<()> {
            let greeting = config.greeting;
            dispatcher.register(on_command("hi").name("greet").handle(move || {
                let greeting = greeting.clone();
                async move { greeting }
            }))?;
            Ok(())
        }
    }

    #[test]
    fn test_plugin_config_section() {
        let mut config = BrassConfig::default();
        config
            .plugins
            .insert("greet".to_string(), json!({ "greeting": "hello" }));

        let parsed: GreetConfig = plugin_config(&config, "greet").unwrap();
        assert_eq!(parsed.greeting, "hello");

        let missing: GreetConfig = plugin_config(&config, "other").unwrap();
        assert_eq!(missing, GreetConfig::default());
    }

    #[test]
    fn test_bad_section_is_reported() {
        let mut config = BrassConfig::default();
        config
            .plugins
            .insert("greet".to_string(), json!({ "greeting": 3 }));

        let mut dispatcher = DispatcherBuilder::new(EngineConfig::default());
        let result = PendingPlugin::of::<Greet>().apply(&config, &mut dispatcher);
        assert!(matches!(result, Err(RuntimeError::PluginConfig { plugin, .. }) if plugin == "greet"));
    }

    #[test]
    fn test_registration_failure_names_plugin() {
        let mut dispatcher = DispatcherBuilder::new(EngineConfig::default());
        let result = PendingPlugin::from_fn("broken", |d| {
            d.register(on_regex("("))?;
            Ok(())
        })
        .apply(&BrassConfig::default(), &mut dispatcher);
        assert!(matches!(
            result,
            Err(RuntimeError::Registration { plugin, source: RegistrationError::InvalidPattern { .. } })
                if plugin == "broken"
        ));
    }
}
