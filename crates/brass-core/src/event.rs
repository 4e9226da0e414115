//! Event system for the Brass engine.
//!
//! - [`Event`] - the object-safe trait adapters implement for inbound events
//! - [`EventType`] - coarse classification used by matchers and permissions
//! - [`BoxedEvent`] - the cheaply clonable, type-erased handle passed around
//!   the dispatcher

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::message::Message;

// ============================================================================
// Event Type Classification
// ============================================================================

/// Classification of event types.
///
/// This is the high-level category of an event. Matchers filter on it without
/// knowing the concrete event type, and open conversations only resume on an
/// event of the same type they were opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Message events (private messages, group messages, etc.)
    Message,
    /// Notice events (group changes, recalls, friend adds, etc.)
    Notice,
    /// Request events (friend requests, group join requests, etc.)
    Request,
    /// Meta events (lifecycle, heartbeat, etc.)
    Meta,
    /// Other/unknown event types
    Other,
}

impl EventType {
    /// Returns the lowercase name of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Message => "message",
            EventType::Notice => "notice",
            EventType::Request => "request",
            EventType::Meta => "meta",
            EventType::Other => "other",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "message" => EventType::Message,
            "notice" => EventType::Notice,
            "request" => EventType::Request,
            "meta" | "meta_event" => EventType::Meta,
            _ => EventType::Other,
        })
    }
}

// ============================================================================
// Core Event Trait
// ============================================================================

/// The base trait for all events seen by the engine.
///
/// Events are immutable once handed to the dispatcher. They are type-erased
/// behind `dyn Event` and can be downcast to their concrete type through
/// [`as_any`](Event::as_any), which is what `Event<T>` extraction in handlers
/// relies on.
pub trait Event: Any + Send + Sync {
    /// Returns the human-readable name of this event (e.g. `"message.private"`).
    fn event_name(&self) -> &str;

    /// Returns the high-level event type classification.
    fn event_type(&self) -> EventType {
        EventType::Other
    }

    /// Returns the id of the conversation session this event belongs to.
    ///
    /// Events without a session (heartbeats, lifecycle notices) return `None`
    /// and can never resume or open a multi-turn conversation.
    fn session_id(&self) -> Option<String> {
        None
    }

    /// Returns the id of the user that caused this event, if any.
    fn user_id(&self) -> Option<String> {
        None
    }

    /// Returns the message carried by this event, if it is a message event.
    fn message(&self) -> Option<&Message> {
        None
    }

    /// Whether the event is addressed to the bot (mention, private chat, ...).
    ///
    /// Computed upstream by the adapter.
    fn is_tome(&self) -> bool {
        false
    }

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the plain text of the carried message, or an empty string.
    fn plain_text(&self) -> String {
        self.message()
            .map(Message::extract_plain_text)
            .unwrap_or_default()
    }
}

// ============================================================================
// Boxed Event
// ============================================================================

/// A type-erased container for events that supports runtime downcasting.
///
/// `BoxedEvent` wraps any type implementing [`Event`] in an `Arc`, so it can
/// be cloned into every concurrently evaluated checker for free.
///
/// `BoxedEvent` derefs to `dyn Event`:
///
/// ```rust,ignore
/// let event: BoxedEvent = /* ... */;
/// let name = event.event_name();
/// let text = event.plain_text();
/// ```
#[derive(Clone)]
pub struct BoxedEvent {
    inner: Arc<dyn Event>,
}

impl BoxedEvent {
    /// Creates a new `BoxedEvent` from any type implementing `Event`.
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            inner: Arc::new(event),
        }
    }

    /// Returns the inner `Arc<dyn Event>`.
    pub fn inner(&self) -> &Arc<dyn Event> {
        &self.inner
    }

    /// Returns true if the concrete event type is `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.inner.as_any().is::<E>()
    }

    /// Attempts to downcast to a concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref()
    }
}

impl Deref for BoxedEvent {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for BoxedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedEvent")
            .field("event_name", &self.event_name())
            .field("event_type", &self.event_type())
            .field("session_id", &self.session_id())
            .finish()
    }
}
