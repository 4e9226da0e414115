//! # Brass Framework
//!
//! The event-matching engine of Brass: it decides, for every inbound event,
//! which handlers run, in what order, with which arguments.
//!
//! This layer provides:
//! - A [`TrieRouter`] that parses command prefixes once per event
//! - [`Rule`]s and [`Permission`]s built from async checkers
//! - Dependency injection for checkers, handlers and processors, with
//!   per-event caching and scoped teardown
//! - [`Matcher`]s, whose handler chains can suspend and wait for the
//!   session's next message
//! - The [`Dispatcher`], which walks priority buckets and honours blocking
//!
//! # Example
//!
//! ```rust,ignore
//! use brass_framework::prelude::*;
//!
//! let mut builder = DispatcherBuilder::new(EngineConfig::default());
//! builder.register(
//!     on_command("echo").handle(|state: State| async move {
//!         state.get_message(keys::COMMAND_ARG)
//!     }),
//! )?;
//!
//! let dispatcher = builder.build();
//! dispatcher.dispatch(bot, event).await;
//! ```

pub mod config;
pub mod context;
pub mod dependency;
pub mod dispatcher;
pub mod error;
pub mod group;
pub mod hooks;
pub mod matcher;
pub mod permission;
pub mod registry;
pub mod routing;
pub mod rule;
pub mod session;
pub mod state;
pub mod trie;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use context::{EventPass, SolveContext};
pub use dependency::{
    BotContext, Declared, Dependent, Depends, EventContext, Exception, Fresh, Injectable,
    IntoDeclared, ParamDecl, Provider, Scoped,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{
    HandlerError, IgnoredEvent, RegistrationError, RegistrationResult, SolveError, SolveResult,
};
pub use group::{CommandGroup, MatcherGroup};
pub use hooks::HookOutcome;
pub use matcher::{
    Flow, HandleResponse, Matcher, MatcherBuilder, MatcherHandle, MatcherStatus, Outcome,
};
pub use permission::Permission;
pub use registry::MatcherRegistry;
pub use rule::Rule;
pub use session::SessionStore;
pub use state::{State, keys};
pub use trie::{CommandPrefix, TrieRouter};

/// Everything a plugin usually needs.
pub mod prelude {
    pub use crate::dependency::{
        Arg, ArgKey, ArgKind, ArgPlainText, ArgStr, BotContext, Depends, EventContext, Exception,
        Fresh, Injectable, ParamDecl, Provider, Scoped,
    };
    pub use crate::permission::{self, Permission};
    pub use crate::routing::*;
    pub use crate::rule::{self, Rule};
    pub use crate::{
        CommandGroup, Dispatcher, DispatcherBuilder, EngineConfig, Flow, HandlerError,
        HookOutcome, IgnoredEvent, MatcherBuilder, MatcherGroup, MatcherHandle, Outcome,
        RegistrationError, State, keys,
    };
}
