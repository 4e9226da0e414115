//! Per-event resolution context.

use std::sync::Arc;

use brass_core::{BoxedBot, BoxedEvent};

use crate::config::EngineConfig;
use crate::dependency::{DependencyCache, ExitStack};
use crate::error::HandlerError;
use crate::matcher::MatcherHandle;
use crate::state::State;

struct PassInner {
    cache: DependencyCache,
    stack: ExitStack,
    config: Arc<EngineConfig>,
}

/// Resources shared by everything that runs for one event.
///
/// Holds the dependency cache and the exit stack. The dispatcher closes the
/// pass once the event is fully processed.
#[derive(Clone)]
pub struct EventPass {
    inner: Arc<PassInner>,
}

impl EventPass {
    /// Opens a pass.
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            inner: Arc::new(PassInner {
                cache: DependencyCache::new(),
                stack: ExitStack::new(),
                config,
            }),
        }
    }

    /// Returns the dependency cache.
    pub fn cache(&self) -> &DependencyCache {
        &self.inner.cache
    }

    /// Returns the exit stack.
    pub fn stack(&self) -> &ExitStack {
        &self.inner.stack
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Runs the pending teardowns.
    pub async fn close(&self) {
        self.inner.stack.close().await;
    }
}

/// What a dependent is resolved against.
#[derive(Clone)]
pub struct SolveContext {
    bot: BoxedBot,
    event: BoxedEvent,
    state: Option<State>,
    matcher: Option<MatcherHandle>,
    exception: Option<HandlerError>,
    pass: EventPass,
}

impl SolveContext {
    /// Creates a context without state or matcher.
    pub fn new(bot: BoxedBot, event: BoxedEvent, pass: EventPass) -> Self {
        Self {
            bot,
            event,
            state: None,
            matcher: None,
            exception: None,
            pass,
        }
    }

    /// Creates the context of a running matcher.
    pub fn for_matcher(matcher: MatcherHandle, pass: EventPass) -> Self {
        Self {
            bot: matcher.bot().clone(),
            event: matcher.event().clone(),
            state: Some(matcher.state().clone()),
            matcher: Some(matcher),
            exception: None,
            pass,
        }
    }

    /// Binds a state.
    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    /// Binds the fault of the run that just ended.
    pub fn with_exception(mut self, exception: Option<HandlerError>) -> Self {
        self.exception = exception;
        self
    }

    /// Returns the bot.
    pub fn bot(&self) -> &BoxedBot {
        &self.bot
    }

    /// Returns the event.
    pub fn event(&self) -> &BoxedEvent {
        &self.event
    }

    /// Returns the bound state.
    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// Returns the running matcher.
    pub fn matcher(&self) -> Option<&MatcherHandle> {
        self.matcher.as_ref()
    }

    /// Returns the bound exception.
    pub fn exception(&self) -> Option<&HandlerError> {
        self.exception.as_ref()
    }

    /// Returns the event pass.
    pub fn pass(&self) -> &EventPass {
        &self.pass
    }
}
