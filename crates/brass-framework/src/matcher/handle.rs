//! The handle handlers use to talk to their running matcher.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use brass_core::{ApiResult, BoxedBot, BoxedEvent, Message};

use crate::state::{State, keys};

use super::Matcher;
use super::flow::Outcome;

struct HandleInner {
    matcher: Matcher,
    bot: BoxedBot,
    event: BoxedEvent,
    state: State,
    stop_propagation: AtomicBool,
}

/// A running matcher, as seen from its handlers.
///
/// Cheap to clone; all clones share the same state and propagation flag.
#[derive(Clone)]
pub struct MatcherHandle {
    inner: Arc<HandleInner>,
}

impl MatcherHandle {
    pub(crate) fn new(matcher: Matcher, bot: BoxedBot, event: BoxedEvent, state: State) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                matcher,
                bot,
                event,
                state,
                stop_propagation: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the matcher definition.
    pub fn matcher(&self) -> &Matcher {
        &self.inner.matcher
    }

    /// Returns the bot the current event arrived on.
    pub fn bot(&self) -> &BoxedBot {
        &self.inner.bot
    }

    /// Returns the current event.
    pub fn event(&self) -> &BoxedEvent {
        &self.inner.event
    }

    /// Returns the instance state.
    pub fn state(&self) -> &State {
        &self.inner.state
    }

    /// Returns the message in slot `key`.
    pub fn get_arg(&self, key: &str) -> Option<Message> {
        self.inner.state.get_message(key)
    }

    /// Fills slot `key`.
    pub fn set_arg(&self, key: &str, message: impl Into<Message>) {
        self.inner.state.set_message(key, &message.into());
    }

    /// Returns the slot `key`, or an outcome that asks for it.
    ///
    /// ```rust,ignore
    /// let city = match matcher.require_arg("city", "Which city?") {
    ///     Ok(city) => city,
    ///     Err(ask) => return ask,
    /// };
    /// ```
    pub fn require_arg(&self, key: &str, prompt: impl Into<Message>) -> Result<Message, Outcome> {
        self.get_arg(key)
            .ok_or_else(|| Outcome::suspend(key).with_reply(prompt))
    }

    /// Returns the message stored by `receive(id)`.
    pub fn get_receive(&self, id: &str) -> Option<Message> {
        self.inner.state.get_message(&keys::receive(id))
    }

    /// Returns the message that last resumed this instance.
    pub fn last_receive(&self) -> Option<Message> {
        self.inner.state.get_message(keys::LAST_RECEIVE)
    }

    /// Sends a message to the current event's session.
    pub async fn send(&self, message: impl Into<Message>) -> ApiResult<String> {
        self.inner
            .bot
            .send(&*self.inner.event, message.into())
            .await
    }

    /// Prevents lower-priority matchers from running for this event.
    pub fn stop_propagation(&self) {
        self.inner.stop_propagation.store(true, Ordering::SeqCst);
    }

    /// Returns true if propagation was stopped.
    pub fn is_propagation_stopped(&self) -> bool {
        self.inner.stop_propagation.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherHandle")
            .field("matcher", &self.inner.matcher.name())
            .field("event", &self.inner.event)
            .field("state", &self.inner.state)
            .finish()
    }
}
