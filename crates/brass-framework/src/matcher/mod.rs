//! Matchers: a rule, a permission and an ordered chain of handlers.
//!
//! A [`MatcherBuilder`] collects the pieces and is handed to the
//! [`DispatcherBuilder`](crate::DispatcherBuilder), which binds every
//! dependent to its providers and freezes the result into a [`Matcher`].
//!
//! For every event that passes a matcher's checks, the dispatcher creates a
//! fresh [`MatcherInstance`](instance::MatcherInstance) with its own state.
//! The instance walks the handler chain and may suspend halfway to wait for
//! the session's next message.
//!
//! # Example
//!
//! ```rust,ignore
//! use brass_framework::prelude::*;
//!
//! let weather = on_command("weather")
//!     .priority(5)
//!     .block(true)
//!     .got("city", "Which city?", |matcher: MatcherHandle| async move {
//!         let city = matcher.get_arg("city").unwrap_or_default();
//!         format!("Sunny in {city}")
//!     });
//! ```

mod flow;
mod handle;
pub(crate) mod instance;
pub(crate) mod service;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use brass_core::{EventType, Message};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{trace, warn};

pub use flow::{Flow, HandleResponse, Outcome};
pub use handle::MatcherHandle;
pub use instance::MatcherStatus;

use crate::config::EngineConfig;
use crate::context::SolveContext;
use crate::dependency::{Declared, Dependent, DependencyGraph, IntoDeclared, ParamKind};
use crate::error::{RegistrationError, RegistrationResult, SolveError};
use crate::permission::{CompiledPermission, Permission};
use crate::rule::{CompiledRule, Rule};
use crate::state::{StateMap, keys};

static NEXT_MATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// A slot a handler needs filled before it runs.
#[derive(Debug, Clone)]
pub(crate) struct Wait {
    pub(crate) key: String,
    pub(crate) prompt: Option<Message>,
}

/// One bound handler of a matcher.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) dependent: Dependent<Outcome>,
    pub(crate) wait: Option<Wait>,
}

struct MatcherInner {
    id: u64,
    name: String,
    plugin: Option<String>,
    event_type: Option<EventType>,
    rule: CompiledRule,
    permission: CompiledPermission,
    handlers: Vec<HandlerEntry>,
    priority: i32,
    block: bool,
    temp: bool,
    expire_at: Option<Instant>,
    default_state: StateMap,
    type_updater: Option<Dependent<EventType>>,
    permission_updater: Option<Dependent<Permission>>,
    consumed: AtomicBool,
}

/// A registered matcher.
///
/// Cheap to clone; clones refer to the same registration.
#[derive(Clone)]
pub struct Matcher {
    inner: Arc<MatcherInner>,
}

impl Matcher {
    /// Returns the registration id, unique per process.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the matcher's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the plugin or module the matcher was registered from.
    pub fn plugin(&self) -> Option<&str> {
        self.inner.plugin.as_deref()
    }

    /// Returns the event type filter.
    pub fn event_type(&self) -> Option<EventType> {
        self.inner.event_type
    }

    /// Returns the priority; lower runs first.
    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    /// Returns true if lower priorities are skipped once this matcher ran.
    pub fn is_blocking(&self) -> bool {
        self.inner.block
    }

    /// Returns true if the matcher runs at most once.
    pub fn is_temp(&self) -> bool {
        self.inner.temp
    }

    /// Returns the number of handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    pub(crate) fn handlers(&self) -> &[HandlerEntry] {
        &self.inner.handlers
    }

    pub(crate) fn default_state(&self) -> &StateMap {
        &self.inner.default_state
    }

    /// Returns true if the expiry time has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.inner.expire_at.is_some_and(|at| at <= now)
    }

    /// Returns true if a temp matcher has already run.
    pub fn is_consumed(&self) -> bool {
        self.inner.consumed.load(Ordering::Acquire)
    }

    /// Returns true if the matcher may still see events.
    pub fn is_live(&self, now: Instant) -> bool {
        !self.is_expired(now) && !(self.inner.temp && self.is_consumed())
    }

    /// Claims the matcher for one run.
    ///
    /// Always succeeds for ordinary matchers. A temp matcher is claimed by
    /// exactly one caller.
    pub(crate) fn try_claim(&self) -> bool {
        if !self.inner.temp {
            return true;
        }
        self.inner
            .consumed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The event type that may resume a conversation this matcher leaves.
    ///
    /// Without a type updater, that is the type of the event that suspended
    /// it. A failing updater falls back to the same.
    pub(crate) async fn next_event_type(&self, cx: &SolveContext) -> EventType {
        let current = cx.event().event_type();
        let Some(updater) = &self.inner.type_updater else {
            return current;
        };
        match updater.call(cx).await {
            Ok(event_type) => event_type,
            Err(reason) => {
                warn!(matcher = self.name(), %reason, "Type updater failed, keeping event type");
                current
            }
        }
    }

    /// The permission a sender needs to resume a conversation this matcher
    /// leaves.
    ///
    /// Without a permission updater, that is the matcher's own permission.
    /// A failing updater falls back to the same.
    pub(crate) async fn next_permission(&self, cx: &SolveContext) -> CompiledPermission {
        let Some(updater) = &self.inner.permission_updater else {
            return self.inner.permission.clone();
        };
        let compiled = match updater.call(cx).await {
            Ok(permission) => permission
                .compile(&mut DependencyGraph::new(), cx.pass().config())
                .map_err(|err| err.to_string()),
            Err(reason) => Err(reason.to_string()),
        };
        compiled.unwrap_or_else(|reason| {
            warn!(matcher = self.name(), %reason, "Permission updater failed, keeping permission");
            self.inner.permission.clone()
        })
    }

    /// Evaluates the event type filter, then the permission, then the rule.
    pub async fn check(&self, cx: &SolveContext) -> bool {
        if let Some(wanted) = self.inner.event_type
            && cx.event().event_type() != wanted
        {
            trace!(matcher = self.name(), "Event type does not match");
            return false;
        }
        if !self.inner.permission.check(cx).await {
            trace!(matcher = self.name(), "Permission denied");
            return false;
        }
        self.inner.rule.check(cx).await
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("priority", &self.inner.priority)
            .field("block", &self.inner.block)
            .field("temp", &self.inner.temp)
            .field("handlers", &self.inner.handlers.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Expiry {
    At(Instant),
    In(Duration),
}

#[derive(Clone)]
struct PendingHandler {
    declared: Declared<Outcome>,
    wait: Option<Wait>,
}

/// Builder for a [`Matcher`].
///
/// Defaults: priority `1`, not blocking, not temp, no expiry. Errors found
/// while building (an invalid regex, say) are kept and reported when the
/// matcher is registered.
#[derive(Clone, Default)]
pub struct MatcherBuilder {
    name: Option<String>,
    plugin: Option<String>,
    event_type: Option<EventType>,
    rule: Rule,
    permission: Permission,
    handlers: Vec<PendingHandler>,
    priority: Option<i32>,
    block: bool,
    temp: bool,
    expiry: Option<Expiry>,
    default_state: StateMap,
    type_updater: Option<Declared<EventType>>,
    permission_updater: Option<Declared<Permission>>,
    errors: Vec<RegistrationError>,
}

impl MatcherBuilder {
    /// Creates a matcher that sees every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the plugin or module label used in logs.
    pub fn plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Only sees events of `event_type`.
    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Adds a rule; every rule added must pass.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rule = std::mem::take(&mut self.rule).and(rule);
        self
    }

    /// Adds a permission; any permission added may pass.
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = std::mem::take(&mut self.permission).or(permission);
        self
    }

    /// Sets the priority. Lower values run first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Stops lower priorities from seeing events this matcher ran on.
    pub fn block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    /// Removes the matcher after its first run.
    pub fn temp(mut self, temp: bool) -> Self {
        self.temp = temp;
        self
    }

    /// Expires the matcher at `at`.
    pub fn expire_at(mut self, at: Instant) -> Self {
        self.expiry = Some(Expiry::At(at));
        self
    }

    /// Expires the matcher `after` its registration.
    pub fn expire_in(mut self, after: Duration) -> Self {
        self.expiry = Some(Expiry::In(after));
        self
    }

    /// Seeds every instance's state with `key`.
    ///
    /// Values written by the rule take precedence.
    pub fn state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_state.insert(key.into(), value.into());
        self
    }

    /// Decides which event type resumes a conversation left by this matcher.
    ///
    /// Runs when the matcher suspends, with the bot, the event, the state and
    /// the matcher available.
    pub fn type_updater<F, T>(mut self, f: F) -> Self
    where
        F: IntoDeclared<T, EventType>,
    {
        self.type_updater = Some(f.into_declared());
        self
    }

    /// Decides who may resume a conversation left by this matcher.
    ///
    /// Runs when the matcher suspends. The session already has to match;
    /// by default the matcher's own permission must pass as well.
    ///
    /// ```rust,ignore
    /// // Only the user who started the conversation may continue it.
    /// builder.permission_updater(|event: BoxedEvent| async move {
    ///     let owner = event.user_id();
    ///     Permission::checker(move |event: BoxedEvent| {
    ///         let owner = owner.clone();
    ///         async move { event.user_id() == owner }
    ///     })
    /// })
    /// ```
    pub fn permission_updater<F, T>(mut self, f: F) -> Self
    where
        F: IntoDeclared<T, Permission>,
    {
        self.permission_updater = Some(f.into_declared());
        self
    }

    /// Appends a handler.
    pub fn handle<F, T, R>(self, f: F) -> Self
    where
        F: IntoDeclared<T, R>,
        R: HandleResponse,
    {
        self.push_handler(into_outcome(f), None)
    }

    /// Appends an already declared handler.
    pub fn handle_declared(self, declared: Declared<Outcome>) -> Self {
        self.push_handler(declared, None)
    }

    /// Appends a handler that needs slot `key`.
    ///
    /// While the slot is empty, `prompt` is sent and the matcher waits for
    /// the session's next message to fill it.
    pub fn got<F, T, R>(self, key: impl Into<String>, prompt: impl Into<Message>, f: F) -> Self
    where
        F: IntoDeclared<T, R>,
        R: HandleResponse,
    {
        let prompt: Message = prompt.into();
        let wait = Wait {
            key: key.into(),
            prompt: (!prompt.is_empty()).then_some(prompt),
        };
        self.push_handler(into_outcome(f), Some(wait))
    }

    /// Appends a handler that runs on the session's next message.
    ///
    /// The message is kept under `id` and read back with
    /// [`MatcherHandle::get_receive`].
    pub fn receive<F, T, R>(self, id: &str, f: F) -> Self
    where
        F: IntoDeclared<T, R>,
        R: HandleResponse,
    {
        let wait = Wait {
            key: keys::receive(id),
            prompt: None,
        };
        self.push_handler(into_outcome(f), Some(wait))
    }

    fn push_handler(mut self, declared: Declared<Outcome>, wait: Option<Wait>) -> Self {
        self.handlers.push(PendingHandler { declared, wait });
        self
    }

    pub(crate) fn push_error(mut self, error: RegistrationError) -> Self {
        self.errors.push(error);
        self
    }

    /// Fills in what this builder leaves unset from `defaults`.
    ///
    /// Rules, permissions, handlers and state add to the defaults; the
    /// defaults' handlers run first and this builder's state wins.
    pub(crate) fn with_defaults(self, defaults: &MatcherBuilder) -> Self {
        let mut default_state = defaults.default_state.clone();
        default_state.extend(self.default_state);
        let mut handlers = defaults.handlers.clone();
        handlers.extend(self.handlers);
        let mut errors = defaults.errors.clone();
        errors.extend(self.errors);

        Self {
            name: self.name.or_else(|| defaults.name.clone()),
            plugin: self.plugin.or_else(|| defaults.plugin.clone()),
            event_type: self.event_type.or(defaults.event_type),
            rule: defaults.rule.clone().and(self.rule),
            permission: defaults.permission.clone().or(self.permission),
            handlers,
            priority: self.priority.or(defaults.priority),
            block: self.block || defaults.block,
            temp: self.temp || defaults.temp,
            expiry: self.expiry.or(defaults.expiry),
            default_state,
            type_updater: self.type_updater.or_else(|| defaults.type_updater.clone()),
            permission_updater: self
                .permission_updater
                .or_else(|| defaults.permission_updater.clone()),
            errors,
        }
    }

    /// Commands the rule needs routed.
    pub(crate) fn commands(&self) -> &[Vec<String>] {
        self.rule.commands()
    }

    /// Binds every dependent and freezes the matcher.
    pub(crate) fn build(
        &self,
        graph: &mut DependencyGraph,
        config: &EngineConfig,
    ) -> RegistrationResult<Matcher> {
        if let Some(error) = self.errors.first() {
            return Err(error.clone());
        }

        let rule = self.rule.compile(graph)?;
        let permission = self.permission.compile(graph, config)?;
        let handlers = self
            .handlers
            .iter()
            .map(|pending| {
                Ok(HandlerEntry {
                    dependent: pending.declared.parse(ParamKind::HANDLER, graph)?,
                    wait: pending.wait.clone(),
                })
            })
            .collect::<RegistrationResult<Vec<_>>>()?;
        let type_updater = self
            .type_updater
            .as_ref()
            .map(|declared| declared.parse(ParamKind::UPDATER, graph))
            .transpose()?;
        let permission_updater = self
            .permission_updater
            .as_ref()
            .map(|declared| declared.parse(ParamKind::UPDATER, graph))
            .transpose()?;

        let id = NEXT_MATCHER_ID.fetch_add(1, Ordering::Relaxed);
        let name = self
            .name
            .clone()
            .or_else(|| handlers.first().map(|h| h.dependent.name().to_string()))
            .unwrap_or_else(|| format!("matcher#{id}"));
        let expire_at = self.expiry.map(|expiry| match expiry {
            Expiry::At(at) => at,
            Expiry::In(after) => Instant::now() + after,
        });

        Ok(Matcher {
            inner: Arc::new(MatcherInner {
                id,
                name,
                plugin: self.plugin.clone(),
                event_type: self.event_type,
                rule,
                permission,
                handlers,
                priority: self.priority.unwrap_or(1),
                block: self.block,
                temp: self.temp,
                expire_at,
                default_state: self.default_state.clone(),
                type_updater,
                permission_updater,
                consumed: AtomicBool::new(false),
            }),
        })
    }
}

fn into_outcome<F, T, R>(f: F) -> Declared<Outcome>
where
    F: IntoDeclared<T, R>,
    R: HandleResponse,
{
    f.into_declared()
        .map(|response: R| response.into_outcome().map_err(SolveError::Fault))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use brass_core::BoxedBot;

    use super::*;
    use crate::context::EventPass;
    use crate::permission;
    use crate::rule::startswith;
    use crate::state::State;
    use crate::testing::{MockBot, TestEvent};

    fn build(builder: MatcherBuilder) -> RegistrationResult<Matcher> {
        builder.build(&mut DependencyGraph::new(), &EngineConfig::default())
    }

    fn context(event: TestEvent) -> SolveContext {
        let bot: BoxedBot = MockBot::new();
        SolveContext::new(
            bot,
            event.boxed(),
            EventPass::new(Arc::new(EngineConfig::default())),
        )
        .with_state(State::new())
    }

    #[test]
    fn test_defaults() {
        let matcher = build(MatcherBuilder::new().name("plain")).unwrap();
        assert_eq!(matcher.priority(), 1);
        assert!(!matcher.is_blocking());
        assert!(!matcher.is_temp());
        assert_eq!(matcher.name(), "plain");
        assert!(matcher.is_live(Instant::now()));
    }

    #[test]
    fn test_unnamed_matchers_get_distinct_names() {
        let a = build(MatcherBuilder::new()).unwrap();
        let b = build(MatcherBuilder::new()).unwrap();
        assert_ne!(a.name(), b.name());
        assert!(a.id() < b.id());
    }

    #[test]
    fn test_collected_error_fails_build() {
        let builder = MatcherBuilder::new().push_error(RegistrationError::InvalidPattern {
            pattern: "(".into(),
            reason: "unclosed group".into(),
        });
        assert!(matches!(
            build(builder),
            Err(RegistrationError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_temp_claimed_once() {
        let matcher = build(MatcherBuilder::new().temp(true)).unwrap();
        assert!(matcher.try_claim());
        assert!(!matcher.try_claim());
        assert!(!matcher.is_live(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relative_expiry() {
        let matcher = build(MatcherBuilder::new().expire_in(Duration::from_secs(10))).unwrap();
        assert!(matcher.is_live(Instant::now()));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(matcher.is_expired(Instant::now()));
    }

    #[tokio::test]
    async fn test_check_order() {
        let matcher = build(
            MatcherBuilder::new()
                .event_type(EventType::Message)
                .permission(permission::message())
                .rule(startswith(["hi"], false)),
        )
        .unwrap();

        assert!(matcher.check(&context(TestEvent::message("hi there"))).await);
        assert!(!matcher.check(&context(TestEvent::message("bye"))).await);
        assert!(!matcher.check(&context(TestEvent::notice())).await);
    }

    #[tokio::test]
    async fn test_handler_with_unknown_param_fails() {
        let declared = Declared::dynamic(
            "needs_exception",
            vec![crate::dependency::ParamDecl::named("exception")],
            |_args| async { Ok(Outcome::next()) },
        );
        let result = build(MatcherBuilder::new().handle_declared(declared));
        assert!(matches!(
            result,
            Err(RegistrationError::UnknownParameter { .. })
        ));
    }
}
