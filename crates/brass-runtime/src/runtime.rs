//! Runtime orchestration.
//!
//! The runtime owns the [`Dispatcher`], runs every inbound event in its own
//! task and sweeps expired conversations in the background.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use brass_runtime::BrassRuntime;
//!
//! let runtime = BrassRuntime::builder()
//!     .config_file("config/brass.toml")
//!     .plugin::<Echo>()
//!     .build()?;
//!
//! runtime.start();
//! // adapters call runtime.handle_event(bot, event) for every inbound event
//! runtime.run().await;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use brass_core::{BoxedBot, BoxedEvent};
use brass_framework::{Dispatcher, DispatcherBuilder, RegistrationResult};
use parking_lot::Mutex;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{BrassConfig, ConfigLoader, validate_config};
use crate::error::RuntimeResult;
use crate::logging;
use crate::plugin::{PendingPlugin, Plugin};

/// Counters describing the runtime's work so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Events accepted by [`BrassRuntime::handle_event`].
    pub events_received: u64,
    /// Events some matcher handled.
    pub events_handled: u64,
    /// Conversations currently waiting for input.
    pub open_sessions: usize,
    /// Registered matchers.
    pub matchers: usize,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    handled: AtomicU64,
}

/// The Brass runtime.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct BrassRuntime {
    config: BrassConfig,
    dispatcher: Dispatcher,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl BrassRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    fn new(config: BrassConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
            counters: Arc::default(),
        }
    }

    /// Returns the configuration the runtime was built from.
    pub fn config(&self) -> &BrassConfig {
        &self.config
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns a token that is cancelled when the runtime shuts down.
    ///
    /// Adapters use it to stop feeding events.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Returns true between [`start`](Self::start) and shutdown.
    pub fn is_running(&self) -> bool {
        self.sweeper.lock().is_some() && !self.shutdown.is_cancelled()
    }

    /// Starts the background sweeper.
    ///
    /// Must be called from within a tokio runtime. Calling it twice does
    /// nothing.
    pub fn start(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            warn!("Runtime is already running");
            return;
        }
        if self.shutdown.is_cancelled() {
            warn!("Runtime has been shut down and cannot restart");
            return;
        }

        let period = self.config.runtime.sweep_interval();
        let dispatcher = self.dispatcher.clone();
        let token = self.shutdown.clone();
        *sweeper = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {
                        let now = Instant::now();
                        let expired = dispatcher.sessions().sweep(now);
                        let pruned = dispatcher.registry().prune(now);
                        if expired > 0 || pruned > 0 {
                            debug!(expired, pruned, "Swept sessions and matchers");
                        }
                    }
                }
            }
            debug!("Sweeper stopped");
        }));

        info!(
            matchers = self.dispatcher.registry().len(),
            sweep_interval = ?period,
            "Runtime started"
        );
    }

    /// Dispatches `event` in its own task.
    ///
    /// The task resolves to whether some matcher handled the event. Returns
    /// `None` once shutdown has begun.
    pub fn handle_event(&self, bot: BoxedBot, event: BoxedEvent) -> Option<JoinHandle<bool>> {
        if self.shutdown.is_cancelled() {
            warn!(
                event = event.event_name(),
                "Runtime is shutting down, event dropped"
            );
            return None;
        }

        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let dispatcher = self.dispatcher.clone();
        let counters = self.counters.clone();
        Some(self.tracker.spawn(async move {
            let handled = dispatcher.dispatch(bot, event).await;
            if handled {
                counters.handled.fetch_add(1, Ordering::Relaxed);
            }
            handled
        }))
    }

    /// Returns a snapshot of the runtime counters.
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            events_received: self.counters.received.load(Ordering::Relaxed),
            events_handled: self.counters.handled.load(Ordering::Relaxed),
            open_sessions: self.dispatcher.sessions().len(),
            matchers: self.dispatcher.registry().len(),
        }
    }

    /// Stops accepting events, waits for running dispatches and stops the
    /// sweeper.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Stopping Brass runtime");
        self.shutdown.cancel();

        self.tracker.close();
        self.tracker.wait().await;

        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        let stats = self.stats();
        info!(
            events_received = stats.events_received,
            events_handled = stats.events_handled,
            "Runtime stopped"
        );
    }

    /// Runs until Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(&self) {
        self.run_until(wait_for_signal()).await;
    }

    /// Runs until `shutdown` completes or the runtime is shut down
    /// elsewhere, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.start();
        info!("Brass runtime is now running");
        tokio::select! {
            _ = shutdown => {}
            _ = self.shutdown.cancelled() => {}
        }
        self.shutdown().await;
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(err) => warn!(error = %err, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => warn!(error = %err, "Failed to listen for Ctrl+C, shutting down"),
    }
}

/// Builder for a [`BrassRuntime`].
///
/// Plugins are collected first and set up once the configuration is known.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<BrassConfig>,
    init_logging: bool,
    plugins: Vec<PendingPlugin>,
}

impl RuntimeBuilder {
    /// Creates a builder that loads configuration from the default
    /// locations and initializes logging.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            init_logging: true,
            plugins: Vec::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration on top of every loaded source.
    pub fn merge(mut self, config: BrassConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is, skipping files and environment.
    pub fn config(mut self, config: BrassConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leaves logging setup to the caller.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Adds a plugin configured from `plugins.<P::name()>`.
    pub fn plugin<P: Plugin>(mut self) -> Self {
        self.plugins.push(PendingPlugin::of::<P>());
        self
    }

    /// Adds an unconfigured plugin given as a setup function.
    pub fn setup<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(&mut DispatcherBuilder) -> RegistrationResult<()> + Send + 'static,
    {
        self.plugins.push(PendingPlugin::from_fn(name, f));
        self
    }

    /// Loads configuration, initializes logging and sets up every plugin in
    /// the order added.
    pub fn build(self) -> RuntimeResult<BrassRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let mut dispatcher = DispatcherBuilder::new(config.engine.clone());
        for plugin in self.plugins {
            debug!(plugin = plugin.name(), "Loading plugin");
            plugin.apply(&config, &mut dispatcher)?;
        }

        info!(
            log_level = %config.logging.level,
            command_start = ?config.engine.command_start,
            "Runtime initialized from configuration"
        );
        Ok(BrassRuntime::new(config, dispatcher.build()))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::time::Duration;

    use async_trait::async_trait;
    use brass_core::{ApiResult, Bot, Event, EventType, Message};
    use brass_framework::prelude::*;
    use serde_json::Value;

    use super::*;

    struct Line {
        text: Message,
        session: &'static str,
    }

    impl Event for Line {
        fn event_name(&self) -> &str {
            "message.line"
        }

        fn event_type(&self) -> EventType {
            EventType::Message
        }

        fn session_id(&self) -> Option<String> {
            Some(self.session.to_string())
        }

        fn message(&self) -> Option<&Message> {
            Some(&self.text)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn line(text: &str, session: &'static str) -> BoxedEvent {
        BoxedEvent::new(Line {
            text: Message::from(text),
            session,
        })
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Bot for Recorder {
        fn id(&self) -> &str {
            "recorder"
        }

        async fn call_api(&self, _action: &str, _params: Value) -> ApiResult<Value> {
            Ok(Value::Null)
        }

        async fn send(&self, _event: &dyn Event, message: Message) -> ApiResult<String> {
            self.sent.lock().push(message.to_string());
            Ok(String::new())
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn runtime() -> BrassRuntime {
        let mut config = BrassConfig::default();
        config.engine.command_start = vec![String::new()];
        config.engine.session_expire_secs = 5;
        config.runtime.sweep_interval_secs = 1;

        BrassRuntime::builder()
            .config(config)
            .without_logging()
            .setup("test", |d| {
                d.register(
                    on_command("echo")
                        .handle(|state: State| async move { state.get_message(keys::COMMAND_ARG) }),
                )?;
                d.register(on_command("ask").got("city", "Which city?", |m: MatcherHandle| async move {
                    format!("city={}", m.get_arg("city").unwrap_or_default())
                }))?;
                Ok(())
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_handle_event_dispatches() {
        let runtime = runtime();
        let bot = Arc::new(Recorder::default());

        let handled = runtime
            .handle_event(bot.clone(), line("echo hi", "a"))
            .unwrap()
            .await
            .unwrap();
        assert!(handled);

        let ignored = runtime
            .handle_event(bot.clone(), line("nothing", "a"))
            .unwrap()
            .await
            .unwrap();
        assert!(!ignored);

        assert_eq!(*bot.sent.lock(), vec!["hi"]);
        let stats = runtime.stats();
        assert_eq!(stats.events_received, 2);
        assert_eq!(stats.events_handled, 1);
        assert_eq!(stats.matchers, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_expired_conversations() {
        let runtime = runtime();
        runtime.start();
        let bot = Arc::new(Recorder::default());

        runtime
            .handle_event(bot.clone(), line("ask", "a"))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(runtime.stats().open_sessions, 1);

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(runtime.stats().open_sessions, 0);

        runtime.shutdown().await;
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_conversation_across_tasks() {
        let runtime = runtime();
        let bot = Arc::new(Recorder::default());

        for text in ["ask", "Paris"] {
            runtime
                .handle_event(bot.clone(), line(text, "a"))
                .unwrap()
                .await
                .unwrap();
        }
        assert_eq!(*bot.sent.lock(), vec!["Which city?", "city=Paris"]);
    }

    #[tokio::test]
    async fn test_events_dropped_after_shutdown() {
        let runtime = runtime();
        runtime.start();
        assert!(runtime.is_running());

        let token = runtime.shutdown_token();
        runtime.shutdown().await;
        assert!(token.is_cancelled());
        assert!(
            runtime
                .handle_event(Arc::new(Recorder::default()), line("echo hi", "a"))
                .is_none()
        );
        assert_eq!(runtime.stats().events_received, 0);
    }

    #[tokio::test]
    async fn test_run_until_waits_for_in_flight_events() {
        let runtime = Arc::new(runtime());
        let bot = Arc::new(Recorder::default());
        for i in 0..8 {
            let session = if i % 2 == 0 { "a" } else { "b" };
            let _ = runtime.handle_event(bot.clone(), line("echo x", session));
        }

        runtime.run_until(async {}).await;
        assert_eq!(bot.sent.lock().len(), 8);
        assert_eq!(runtime.stats().events_handled, 8);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = BrassConfig::default();
        config.runtime.sweep_interval_secs = 0;
        let result = BrassRuntime::builder()
            .config(config)
            .without_logging()
            .build();
        assert!(result.is_err());
    }
}
