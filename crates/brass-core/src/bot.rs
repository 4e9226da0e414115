//! Bot trait and related types.
//!
//! A [`Bot`] is the outbound half of an adapter: handlers use it to reply to
//! the event they are handling or to call arbitrary protocol APIs.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiResult;
use crate::event::Event;
use crate::message::Message;

/// The core Bot trait.
///
/// # API Design
///
/// - `call_api`: Raw API call with action name and JSON parameters
/// - `send`: Unified message sending that extracts the session from the event
///
/// Concrete implementations should provide strongly-typed API methods on top
/// of `call_api`.
#[async_trait]
pub trait Bot: Send + Sync + 'static {
    /// Returns the bot's unique identifier.
    fn id(&self) -> &str;

    /// Calls a raw API with the given action name and parameters.
    ///
    /// Returns the raw JSON response from the API.
    async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value>;

    /// Sends a message in response to an event.
    ///
    /// The session information (user, group, channel...) is taken from the
    /// event. Returns the message id if successful.
    async fn send(&self, event: &dyn Event, message: Message) -> ApiResult<String>;

    /// Returns self as an `Arc<dyn Any>` for safe downcasting.
    ///
    /// Implementors should simply return `self`:
    ///
    /// ```rust,ignore
    /// fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
    ///     self
    /// }
    /// ```
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A boxed Bot trait object.
pub type BoxedBot = Arc<dyn Bot>;
