//! Event dispatcher.
//!
//! The [`Dispatcher`] takes every inbound event through:
//!
//! 1. the event preprocessors;
//! 2. the session lock, and the open conversation if one can be resumed;
//! 3. otherwise, one command-prefix lookup and the priority buckets in
//!    ascending order, running every matcher whose checks hold;
//! 4. the event postprocessors, the exit stack and matcher pruning.
//!
//! ```rust,ignore
//! use brass_framework::prelude::*;
//!
//! let mut builder = DispatcherBuilder::new(EngineConfig::default());
//! builder.register(on_command("ping").handle(|| async { "pong" }))?;
//! let dispatcher = builder.build();
//!
//! let handled = dispatcher.dispatch(bot, event).await;
//! ```

use std::fmt;
use std::sync::Arc;

use brass_core::{BoxedBot, BoxedEvent, Message};
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, info, warn};

use crate::config::EngineConfig;
use crate::context::{EventPass, SolveContext};
use crate::dependency::{DependencyGraph, IntoDeclared};
use crate::error::RegistrationResult;
use crate::hooks::{HookOutcome, Hooks};
use crate::matcher::instance::MatcherInstance;
use crate::matcher::service::{RunRequest, run_with_timeout};
use crate::matcher::{Matcher, MatcherBuilder, MatcherHandle};
use crate::registry::MatcherRegistry;
use crate::session::{Conversation, SessionGuard, SessionStore};
use crate::state::{State, keys};
use crate::trie::TrieRouter;

/// Collects matchers and processors, then freezes them into a
/// [`Dispatcher`].
pub struct DispatcherBuilder {
    config: Arc<EngineConfig>,
    trie: TrieRouter,
    registry: MatcherRegistry,
    hooks: Hooks,
    graph: DependencyGraph,
}

impl DispatcherBuilder {
    /// Creates a builder with no matchers.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            trie: TrieRouter::new(),
            registry: MatcherRegistry::new(),
            hooks: Hooks::default(),
            graph: DependencyGraph::new(),
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Binds and registers a matcher.
    ///
    /// Fails if a parameter cannot be bound, if a pattern is invalid, or if
    /// one of the matcher's commands collides with a different command.
    /// Dependency cycles fail the same way.
    pub fn register(&mut self, builder: MatcherBuilder) -> RegistrationResult<Matcher> {
        let matcher = builder.build(&mut self.graph, &self.config)?;
        self.trie.insert_commands(builder.commands(), &self.config)?;
        info!(
            matcher = matcher.name(),
            plugin = matcher.plugin(),
            priority = matcher.priority(),
            "Matcher registered"
        );
        self.registry.insert(matcher.clone());
        Ok(matcher)
    }

    /// Adds an event preprocessor.
    pub fn event_preprocessor<F, T, R>(&mut self, f: F) -> RegistrationResult<&mut Self>
    where
        F: IntoDeclared<T, R>,
        R: Into<HookOutcome> + Send + 'static,
    {
        self.hooks.add_event_pre(f, &mut self.graph)?;
        Ok(self)
    }

    /// Adds an event postprocessor.
    pub fn event_postprocessor<F, T>(&mut self, f: F) -> RegistrationResult<&mut Self>
    where
        F: IntoDeclared<T, ()>,
    {
        self.hooks.add_event_post(f, &mut self.graph)?;
        Ok(self)
    }

    /// Adds a run preprocessor.
    pub fn run_preprocessor<F, T, R>(&mut self, f: F) -> RegistrationResult<&mut Self>
    where
        F: IntoDeclared<T, R>,
        R: Into<HookOutcome> + Send + 'static,
    {
        self.hooks.add_run_pre(f, &mut self.graph)?;
        Ok(self)
    }

    /// Adds a run postprocessor.
    pub fn run_postprocessor<F, T>(&mut self, f: F) -> RegistrationResult<&mut Self>
    where
        F: IntoDeclared<T, ()>,
    {
        self.hooks.add_run_post(f, &mut self.graph)?;
        Ok(self)
    }

    /// Freezes the registrations.
    pub fn build(self) -> Dispatcher {
        let sessions = SessionStore::new(self.config.session_expire_timeout());
        Dispatcher {
            inner: Arc::new(DispatcherInner {
                config: self.config,
                trie: self.trie,
                registry: self.registry,
                sessions,
                hooks: self.hooks,
            }),
        }
    }
}

struct DispatcherInner {
    config: Arc<EngineConfig>,
    trie: TrieRouter,
    registry: MatcherRegistry,
    sessions: SessionStore,
    hooks: Hooks,
}

/// Routes events to matchers.
///
/// Cheap to clone; clones share registrations and open conversations.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

/// How one matcher run ended, as far as dispatch is concerned.
enum RunEnd {
    Ignored(MatcherInstance),
    Finished { faulted: bool },
    Suspended(MatcherInstance),
}

impl Dispatcher {
    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns the registered matchers.
    pub fn registry(&self) -> &MatcherRegistry {
        &self.inner.registry
    }

    /// Returns the open conversations.
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Dispatches one event; returns true if any matcher handled it.
    pub async fn dispatch(&self, bot: BoxedBot, event: BoxedEvent) -> bool {
        let span = debug_span!(
            "dispatch",
            event = event.event_name(),
            session = event.session_id().as_deref()
        );
        self.dispatch_event(bot, event).instrument(span).await
    }

    async fn dispatch_event(&self, bot: BoxedBot, event: BoxedEvent) -> bool {
        let pass = EventPass::new(self.inner.config.clone());
        // Event processors share one state of their own; matchers fork theirs
        // from the routing state.
        let cx = SolveContext::new(bot, event, pass.clone()).with_state(State::new());

        let handled = if self.inner.hooks.event_pre(&cx).await {
            let handled = self.route(&cx).await;
            self.inner.hooks.event_post(&cx).await;
            handled
        } else {
            debug!("Event ignored");
            false
        };

        pass.close().await;
        let pruned = self.inner.registry.prune(Instant::now());
        if pruned > 0 {
            debug!(pruned, "Matchers pruned");
        }
        handled
    }

    async fn route(&self, cx: &SolveContext) -> bool {
        let event = cx.event();
        let mut session = match event.session_id() {
            Some(id) => Some(self.inner.sessions.lock(&id).await),
            None => None,
        };

        if let Some(guard) = session.as_mut()
            && let Some(conversation) = guard.take_resumable(event.event_type(), Instant::now())
        {
            if conversation.matcher().is_expired(Instant::now()) {
                debug!(
                    matcher = conversation.matcher().name(),
                    "Conversation matcher expired"
                );
            } else if !conversation.permission().check(cx).await {
                debug!(
                    matcher = conversation.matcher().name(),
                    session = guard.id(),
                    "Sender may not resume conversation"
                );
                guard.store(conversation);
            } else {
                self.resume(cx, conversation.into_instance(), guard).await;
                return true;
            }
        }

        let base = State::new();
        if let Some(message) = event.message()
            && let Some(prefix) = self.inner.trie.parse(message)
            && let Err(err) = base.set(keys::PREFIX, &prefix)
        {
            warn!(error = %err, "Failed to record command prefix");
        }

        let mut handled = false;
        let mut suspended = false;
        for (priority, bucket) in self.inner.registry.snapshot() {
            let now = Instant::now();
            let live: Vec<Matcher> = bucket.into_iter().filter(|m| m.is_live(now)).collect();

            let checks = join_all(live.iter().map(|matcher| {
                let state = base.fork();
                let cx = cx.clone().with_state(state.clone());
                async move { matcher.check(&cx).await.then_some(state) }
            }))
            .await;

            let mut stop = false;
            for (matcher, state) in live.into_iter().zip(checks) {
                let Some(state) = state else {
                    continue;
                };
                debug!(matcher = matcher.name(), priority, "Matcher matched");

                let instance = MatcherInstance::new(matcher.clone(), state);
                let handle = self.handle_for(cx, &instance);
                match self.run(cx, instance, &handle, true).await {
                    RunEnd::Ignored(_) => continue,
                    RunEnd::Finished { faulted: true } => return true,
                    RunEnd::Finished { faulted: false } => {}
                    RunEnd::Suspended(instance) => match session.as_mut() {
                        None => warn!(
                            matcher = matcher.name(),
                            "Cannot suspend without a session, finishing"
                        ),
                        Some(_) if suspended => warn!(
                            matcher = matcher.name(),
                            "Session already suspended by another matcher, finishing"
                        ),
                        Some(guard) => {
                            suspended = self.persist(guard, instance, cx).await;
                        }
                    },
                }

                handled = true;
                if matcher.is_blocking() || handle.is_propagation_stopped() {
                    stop = true;
                }
            }

            if stop {
                debug!(priority, "Propagation stopped");
                break;
            }
        }
        handled
    }

    async fn resume(
        &self,
        cx: &SolveContext,
        mut instance: MatcherInstance,
        guard: &mut SessionGuard,
    ) {
        debug!(
            matcher = instance.matcher().name(),
            session = guard.id(),
            "Resuming conversation"
        );
        let message = cx.event().message().cloned().unwrap_or_else(Message::new);
        instance.receive(&message);

        let handle = self.handle_for(cx, &instance);
        match self.run(cx, instance, &handle, false).await {
            RunEnd::Ignored(instance) | RunEnd::Suspended(instance) => {
                self.persist(guard, instance, cx).await;
            }
            RunEnd::Finished { .. } => {}
        }
    }

    fn handle_for(&self, cx: &SolveContext, instance: &MatcherInstance) -> MatcherHandle {
        MatcherHandle::new(
            instance.matcher().clone(),
            cx.bot().clone(),
            cx.event().clone(),
            instance.state().clone(),
        )
    }

    /// Leaves `instance` waiting in the session.
    ///
    /// The matcher's updaters decide which event type and which senders may
    /// resume it.
    async fn persist(
        &self,
        guard: &mut SessionGuard,
        instance: MatcherInstance,
        cx: &SolveContext,
    ) -> bool {
        let matcher = instance.matcher().clone();
        if guard.is_open() {
            warn!(
                matcher = matcher.name(),
                session = guard.id(),
                "Session already has a conversation"
            );
            return false;
        }

        let handle = self.handle_for(cx, &instance);
        let updater_cx = SolveContext::for_matcher(handle, cx.pass().clone());
        let event_type = matcher.next_event_type(&updater_cx).await;
        let permission = matcher.next_permission(&updater_cx).await;

        let expires_at = Instant::now() + self.inner.sessions.ttl();
        guard.store(Conversation::new(instance, event_type, permission, expires_at));
        debug!(
            matcher = matcher.name(),
            session = guard.id(),
            %event_type,
            "Conversation stored"
        );
        true
    }

    /// Runs one instance between the run processors.
    ///
    /// `claim` is set for fresh runs, so temp matchers run at most once.
    async fn run(
        &self,
        cx: &SolveContext,
        instance: MatcherInstance,
        handle: &MatcherHandle,
        claim: bool,
    ) -> RunEnd {
        let hook_cx = SolveContext::for_matcher(handle.clone(), cx.pass().clone());
        if !self.inner.hooks.run_pre(&hook_cx).await {
            debug!(matcher = instance.matcher().name(), "Run ignored");
            return RunEnd::Ignored(instance);
        }
        if claim && !instance.matcher().try_claim() {
            debug!(matcher = instance.matcher().name(), "Temp matcher already claimed");
            return RunEnd::Ignored(instance);
        }

        let request = RunRequest {
            instance,
            handle: handle.clone(),
            pass: cx.pass().clone(),
        };
        let report = run_with_timeout(request, self.inner.config.handler_timeout()).await;
        let (end, fault) = match report {
            Some(report) if report.fault.is_some() => {
                (RunEnd::Finished { faulted: true }, report.fault)
            }
            Some(report) if report.instance.is_suspended() => {
                (RunEnd::Suspended(report.instance), None)
            }
            Some(_) | None => (RunEnd::Finished { faulted: false }, None),
        };

        self.inner
            .hooks
            .run_post(&hook_cx.with_exception(fault))
            .await;
        end
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("matchers", &self.inner.registry.len())
            .field("commands", &self.inner.trie.len())
            .finish()
    }
}
