//! # Brass Core
//!
//! The adapter-facing abstractions of the Brass event-matching engine.
//!
//! Protocol adapters (which live outside this workspace) translate whatever
//! their platform sends into types implementing [`Event`], and expose their
//! outbound API through a type implementing [`Bot`]. Everything above this
//! crate only ever sees the type-erased [`BoxedEvent`] and [`BoxedBot`].
//!
//! ```text
//! ┌─────────────┐  BoxedEvent  ┌────────────┐   Matcher runs   ┌───────────┐
//! │   Adapter   │─────────────▶│ Dispatcher │─────────────────▶│  Handler  │
//! │ (external)  │◀─────────────│  (engine)  │                  │           │
//! └─────────────┘   BoxedBot   └────────────┘                  └───────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use brass_core::{Event, EventType, Message};
//!
//! struct ConsoleLine {
//!     text: Message,
//! }
//!
//! impl Event for ConsoleLine {
//!     fn event_name(&self) -> &str { "console.line" }
//!     fn event_type(&self) -> EventType { EventType::Message }
//!     fn session_id(&self) -> Option<String> { Some("console".into()) }
//!     fn user_id(&self) -> Option<String> { Some("operator".into()) }
//!     fn message(&self) -> Option<&Message> { Some(&self.text) }
//!     fn as_any(&self) -> &dyn std::any::Any { self }
//! }
//! ```

pub mod bot;
pub mod error;
pub mod event;
pub mod message;

pub use bot::{Bot, BoxedBot};
pub use error::{ApiError, ApiResult};
pub use event::{BoxedEvent, Event, EventType};
pub use message::{Message, Segment};
