//! # Brass
//!
//! An event-matching engine for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  handle_event  ┌────────────┐   bucket 1   ┌──────────────────┐
//! │   Adapter   │───────────────▶│ Dispatcher │─────────────▶│ Matcher (rule,   │──▶ handlers
//! │ (external)  │                │            │   bucket 5   │  permission,     │
//! └─────────────┘                └────────────┘─────────────▶│  handler chain)  │──▶ handlers
//!                                      │                     └──────────────────┘
//!                                      └── open conversation? resume it instead
//! ```
//!
//! - **Runtime**: loads configuration, sets up logging, runs one task per event
//! - **Dispatcher**: walks priority buckets, honours blocking, resumes conversations
//! - **Matchers**: a rule, a permission and an ordered chain of handlers
//! - **Handlers**: async functions whose arguments are injected (Axum-style)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brass::prelude::*;
//!
//! let runtime = BrassRuntime::builder()
//!     .setup("weather", |d| {
//!         d.register(
//!             on_command("weather")
//!                 .got("city", "Which city?", |m: MatcherHandle| async move {
//!                     format!("Sunny in {}", m.get_arg("city").unwrap_or_default())
//!                 }),
//!         )?;
//!         Ok(())
//!     })
//!     .build()?;
//!
//! runtime.run().await;
//! ```
//!
//! ## Features
//!
//! - `shell` *(default)*: shell-style commands parsed with clap
//! - `toml-config` *(default)* / `yaml-config`: configuration file formats
//! - `json-log`: JSON log lines

pub use brass_core as core;
pub use brass_framework as framework;
pub use brass_runtime as runtime;

/// Everything needed to write plugins and start a bot.
pub mod prelude {
    pub use brass_core::{Bot, BoxedBot, BoxedEvent, Event, EventType, Message, Segment};
    pub use brass_framework::RegistrationResult;
    pub use brass_framework::prelude::*;
    pub use brass_runtime::{BrassConfig, BrassRuntime, Plugin};
}
