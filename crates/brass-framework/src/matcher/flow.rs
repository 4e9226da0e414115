//! Handler outcomes.
//!
//! A handler tells the matcher what to do next by returning a [`Flow`],
//! optionally paired with a reply. These are ordinary values, not errors.

use std::fmt::Display;

use brass_core::Message;

use crate::error::HandlerError;

/// What the matcher instance does after a handler returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Flow {
    /// Move on to the next handler.
    #[default]
    Continue,
    /// This handler does not apply; move on to the next one.
    Skip,
    /// End the instance now.
    Finish,
    /// Move on to the next handler, but only on the session's next event.
    Pause,
    /// Re-run this handler once `key` has been filled by the next event.
    Suspend {
        /// The slot to fill.
        key: String,
    },
    /// Clear `key` (or the slot last awaited) and wait for it again.
    Reject {
        /// The slot to clear, if not the last awaited one.
        key: Option<String>,
    },
}

/// A flow plus an optional reply, sent before the flow is applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outcome {
    /// Sent to the event's session before the transition.
    pub reply: Option<Message>,
    /// The transition.
    pub flow: Flow,
}

impl Outcome {
    /// Continues to the next handler.
    pub fn next() -> Self {
        Self::default()
    }

    /// Ends the instance.
    pub fn finish() -> Self {
        Flow::Finish.into()
    }

    /// Waits for the next event, then continues with the next handler.
    pub fn pause() -> Self {
        Flow::Pause.into()
    }

    /// Waits for `key` to be filled, then re-runs this handler.
    pub fn suspend(key: impl Into<String>) -> Self {
        Flow::Suspend { key: key.into() }.into()
    }

    /// Clears the slot last awaited and waits for it again.
    pub fn reject() -> Self {
        Flow::Reject { key: None }.into()
    }

    /// Clears `key` and waits for it again.
    pub fn reject_arg(key: impl Into<String>) -> Self {
        Flow::Reject {
            key: Some(key.into()),
        }
        .into()
    }

    /// Skips this handler.
    pub fn skip() -> Self {
        Flow::Skip.into()
    }

    /// Attaches a reply.
    pub fn with_reply(mut self, reply: impl Into<Message>) -> Self {
        self.reply = Some(reply.into());
        self
    }
}

impl From<Flow> for Outcome {
    fn from(flow: Flow) -> Self {
        Self { reply: None, flow }
    }
}

/// Conversion of handler return values into an [`Outcome`].
///
/// Text and messages become a reply followed by [`Flow::Continue`]. An `Err`
/// is a handler fault.
pub trait HandleResponse: Send + 'static {
    /// Performs the conversion.
    fn into_outcome(self) -> Result<Outcome, HandlerError>;
}

impl HandleResponse for () {
    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(Outcome::next())
    }
}

impl HandleResponse for Flow {
    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(self.into())
    }
}

impl HandleResponse for Outcome {
    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(self)
    }
}

impl HandleResponse for String {
    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(Outcome::next().with_reply(self))
    }
}

impl HandleResponse for &'static str {
    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(Outcome::next().with_reply(self))
    }
}

impl HandleResponse for Message {
    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(Outcome::next().with_reply(self))
    }
}

impl<T: HandleResponse> HandleResponse for Option<T> {
    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        match self {
            Some(inner) => inner.into_outcome(),
            None => Ok(Outcome::next()),
        }
    }
}

impl<T, E> HandleResponse for Result<T, E>
where
    T: HandleResponse,
    E: Display + Send + 'static,
{
    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        match self {
            Ok(inner) => inner.into_outcome(),
            Err(err) => Err(HandlerError::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_replies_and_continues() {
        let outcome = "hi".into_outcome().unwrap();
        assert_eq!(outcome.reply, Some(Message::from("hi")));
        assert_eq!(outcome.flow, Flow::Continue);
    }

    #[test]
    fn test_err_is_fault() {
        let result: Result<(), String> = Err("disk on fire".into());
        assert_eq!(result.into_outcome().unwrap_err().message(), "disk on fire");
    }

    #[test]
    fn test_with_reply_keeps_flow() {
        let outcome = Outcome::suspend("city").with_reply("Which city?");
        assert_eq!(
            outcome.flow,
            Flow::Suspend {
                key: "city".to_string()
            }
        );
        assert!(outcome.reply.is_some());
    }
}
