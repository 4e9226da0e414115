//! One run of a matcher's handler chain.

use brass_core::Message;
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use crate::context::{EventPass, SolveContext};
use crate::error::{HandlerError, SolveError};
use crate::state::{State, keys};

use super::flow::Flow;
use super::{Matcher, MatcherHandle};

/// Where a matcher instance is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatcherStatus {
    /// Not started.
    Created,
    /// Walking the handler chain.
    Running,
    /// Waiting for the session's next message.
    Suspended {
        /// The slot the message fills, or `None` for free-form input.
        awaiting: Option<String>,
    },
    /// Done. Terminal.
    Finished,
}

/// A matcher's handler chain together with its progress.
pub(crate) struct MatcherInstance {
    matcher: Matcher,
    state: State,
    cursor: usize,
    status: MatcherStatus,
    last_awaited: Option<String>,
}

/// What a run ended with.
pub(crate) struct RunReport {
    pub(crate) instance: MatcherInstance,
    pub(crate) fault: Option<HandlerError>,
}

impl MatcherInstance {
    /// Starts an instance over the state its rule produced.
    pub(crate) fn new(matcher: Matcher, state: State) -> Self {
        state.merge_missing(matcher.default_state());
        Self {
            matcher,
            state,
            cursor: 0,
            status: MatcherStatus::Created,
            last_awaited: None,
        }
    }

    pub(crate) fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub(crate) fn state(&self) -> &State {
        &self.state
    }

    pub(crate) fn status(&self) -> &MatcherStatus {
        &self.status
    }

    pub(crate) fn is_suspended(&self) -> bool {
        matches!(self.status, MatcherStatus::Suspended { .. })
    }

    /// Feeds the message that resumes a suspended instance.
    ///
    /// Fills the awaited slot, if any, and always records the message as the
    /// last received input.
    pub(crate) fn receive(&mut self, message: &Message) {
        if let MatcherStatus::Suspended {
            awaiting: Some(key),
        } = &self.status
        {
            trace!(matcher = self.matcher.name(), key = key.as_str(), "Slot filled");
            self.state.set_message(key.as_str(), message);
        }
        self.state.set_message(keys::LAST_RECEIVE, message);
    }

    /// Runs handlers from the cursor until the chain ends or suspends.
    pub(crate) async fn run(mut self, handle: &MatcherHandle, pass: &EventPass) -> RunReport {
        self.status = MatcherStatus::Running;
        let cx = SolveContext::for_matcher(handle.clone(), pass.clone());
        let matcher = self.matcher.clone();
        let handlers = matcher.handlers();

        while let Some(entry) = handlers.get(self.cursor) {
            let index = self.cursor;

            if let Some(wait) = &entry.wait
                && !self.state.contains(&wait.key)
            {
                if let Some(prompt) = &wait.prompt {
                    self.reply(handle, prompt.clone()).await;
                }
                self.suspend(Some(wait.key.clone()));
                return self.report(None);
            }

            trace!(matcher = matcher.name(), handler = index, "Running handler");
            let outcome = match entry.dependent.call(&cx).await {
                Ok(outcome) => outcome,
                Err(SolveError::Fault(err)) => return self.fail(index, err),
                Err(reason) => {
                    debug!(matcher = matcher.name(), handler = index, %reason, "Handler skipped");
                    self.cursor += 1;
                    continue;
                }
            };

            if let Some(reply) = outcome.reply {
                self.reply(handle, reply).await;
            }

            match outcome.flow {
                Flow::Continue | Flow::Skip => self.cursor += 1,
                Flow::Finish => break,
                Flow::Pause => {
                    self.cursor += 1;
                    if self.cursor < handlers.len() {
                        self.suspend(None);
                        return self.report(None);
                    }
                }
                Flow::Suspend { key } => {
                    self.suspend(Some(key));
                    return self.report(None);
                }
                Flow::Reject { key } => {
                    let key = key.or_else(|| self.last_awaited.clone());
                    if let Some(key) = &key {
                        self.state.remove(key);
                    }
                    self.suspend(key);
                    return self.report(None);
                }
            }
        }

        self.status = MatcherStatus::Finished;
        self.report(None)
    }

    fn suspend(&mut self, awaiting: Option<String>) {
        debug!(
            matcher = self.matcher.name(),
            cursor = self.cursor,
            awaiting = awaiting.as_deref(),
            "Matcher suspended"
        );
        if awaiting.is_some() {
            self.last_awaited = awaiting.clone();
        }
        self.status = MatcherStatus::Suspended { awaiting };
    }

    fn fail(mut self, index: usize, err: HandlerError) -> RunReport {
        error!(
            matcher = self.matcher.name(),
            handler = index,
            error = %err,
            "Handler failed"
        );
        self.status = MatcherStatus::Finished;
        self.report(Some(err))
    }

    fn report(self, fault: Option<HandlerError>) -> RunReport {
        RunReport {
            instance: self,
            fault,
        }
    }

    async fn reply(&self, handle: &MatcherHandle, message: Message) {
        if let Err(err) = handle.send(message).await {
            warn!(matcher = self.matcher.name(), error = %err, "Failed to send reply");
        }
    }
}
