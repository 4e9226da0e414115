//! Engine configuration.
//!
//! The runtime crate loads this from files and environment; the engine only
//! needs the deserialized values.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings consumed by the dispatcher and the built-in rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Strings a command may start with (`"/"`, `"!"`, or `""` for none).
    pub command_start: Vec<String>,

    /// Separators joining the parts of a multi-part command (`"a.b"`).
    pub command_sep: Vec<String>,

    /// How long an open conversation waits for its next input, in seconds.
    pub session_expire_secs: u64,

    /// Upper bound for one matcher instance's handler chain, in milliseconds.
    pub handler_timeout_ms: Option<u64>,

    /// User ids granted the `superuser` permission.
    pub superusers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_start: vec!["/".to_string()],
            command_sep: vec![".".to_string()],
            session_expire_secs: 120,
            handler_timeout_ms: None,
            superusers: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Returns the conversation time-to-live.
    pub fn session_expire_timeout(&self) -> Duration {
        Duration::from_secs(self.session_expire_secs)
    }

    /// Returns the handler timeout, if one is configured.
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }

    /// Replaces the command start strings.
    pub fn with_command_start<I, S>(mut self, starts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command_start = starts.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the command separators.
    pub fn with_command_sep<I, S>(mut self, seps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command_sep = seps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the conversation time-to-live.
    pub fn with_session_expire(mut self, ttl: Duration) -> Self {
        self.session_expire_secs = ttl.as_secs();
        self
    }

    /// Sets the handler timeout.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Replaces the superuser list.
    pub fn with_superusers<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.superusers = users.into_iter().map(Into::into).collect();
        self
    }
}
