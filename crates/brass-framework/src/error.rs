//! Error types for the Brass framework.
//!
//! Three channels are kept apart on purpose:
//!
//! - [`RegistrationError`]: raised while building the dispatcher, fatal to the
//!   one registration that caused it.
//! - [`SolveError`]: raised while resolving a dependent for one event. Only
//!   [`SolveError::Fault`] is a genuine failure; the other variants mean the
//!   dependent opted out.
//! - Control flow (`Flow`) is not an error at all and never travels here.

use std::fmt::Display;

use thiserror::Error;

/// Errors raised while registering matchers, hooks and dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A command prefix collides with one registered earlier.
    #[error("command prefix '{prefix}' is already registered")]
    DuplicatePrefix {
        /// The colliding prefix text.
        prefix: String,
    },

    /// No parameter provider could claim a declared parameter.
    #[error("unknown parameter '{param}' in '{dependent}'")]
    UnknownParameter {
        /// Name of the dependent declaring the parameter.
        dependent: String,
        /// Name of the parameter.
        param: String,
    },

    /// The declared sub-dependencies form a cycle.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle {
        /// The dependencies along the cycle, first one repeated at the end.
        path: Vec<String>,
    },

    /// A pattern or command could not be compiled.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type for registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// A genuine failure inside a handler, checker, hook or dependency.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error from anything displayable.
    pub fn new(message: impl Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur while resolving a dependent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    /// The dependent opted out cleanly.
    ///
    /// Checkers treat this as `false`, handlers as "skip this handler".
    #[error("skipped")]
    Skipped,

    /// A resolved value's runtime type disagrees with its declaration.
    #[error("type mismatch for parameter '{param}': expected '{expected}'")]
    TypeMismatch {
        /// The parameter whose value did not fit.
        param: String,
        /// The declared type.
        expected: &'static str,
    },

    /// A genuine failure.
    #[error(transparent)]
    Fault(#[from] HandlerError),
}

impl SolveError {
    /// Creates a fault from anything displayable.
    pub fn fault(message: impl Display) -> Self {
        Self::Fault(HandlerError::new(message))
    }

    /// Returns true if the dependent opted out rather than failed.
    pub fn is_opt_out(&self) -> bool {
        matches!(self, Self::Skipped | Self::TypeMismatch { .. })
    }
}

/// Result type for dependent resolution.
pub type SolveResult<T> = Result<T, SolveError>;

/// Returned by an event or run preprocessor to drop what it is looking at.
///
/// The dispatcher recognises this and skips silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ignored by processor")]
pub struct IgnoredEvent;
