//! Shared matcher state.
//!
//! A [`State`] is a JSON-valued map shared by the rule checkers of one matcher
//! evaluation and, if they pass, by every handler of the resulting instance.
//! Named slots live in it under their plain key, serialized as a [`Message`].
//! Keys starting with `_` are written by the engine (see [`keys`]).

use std::fmt;
use std::sync::Arc;

use brass_core::Message;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// The plain map behind a [`State`].
pub type StateMap = Map<String, Value>;

/// Reserved state keys written by the built-in rules and the matcher runtime.
pub mod keys {
    /// Command prefix parsed by the trie router for this event.
    pub const PREFIX: &str = "_prefix";
    /// The matched command as a token array.
    pub const COMMAND: &str = "_command";
    /// The raw text the command was matched from.
    pub const RAW_COMMAND: &str = "_raw_command";
    /// The message remaining after the command.
    pub const COMMAND_ARG: &str = "_command_arg";
    /// The start flag the command was written with.
    pub const COMMAND_START: &str = "_command_start";
    /// Whitespace between the command and its argument.
    pub const COMMAND_WHITESPACE: &str = "_command_whitespace";
    /// Shell-split argument vector.
    pub const SHELL_ARGV: &str = "_argv";
    /// Parsed shell arguments or the parser exit.
    pub const SHELL_ARGS: &str = "_args";
    /// Text matched by a regex rule.
    pub const REGEX_MATCHED: &str = "_matched";
    /// Positional groups of a regex match.
    pub const REGEX_GROUP: &str = "_matched_groups";
    /// Named groups of a regex match.
    pub const REGEX_DICT: &str = "_matched_dict";
    /// Prefix matched by a startswith rule.
    pub const STARTSWITH: &str = "_startswith";
    /// Suffix matched by an endswith rule.
    pub const ENDSWITH: &str = "_endswith";
    /// Text matched by a fullmatch rule.
    pub const FULLMATCH: &str = "_fullmatch";
    /// Keyword matched by a keyword rule.
    pub const KEYWORD: &str = "_keyword";
    /// The message that most recently resumed a conversation.
    pub const LAST_RECEIVE: &str = "_last_receive";

    /// Key under which `receive(id)` stores its message.
    pub fn receive(id: &str) -> String {
        format!("_receive_{id}")
    }
}

/// Cheaply clonable handle to a shared state map.
#[derive(Clone, Default)]
pub struct State {
    inner: Arc<Mutex<StateMap>>,
}

impl State {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state from an existing map.
    pub fn from_map(map: StateMap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// Returns a clone of the value under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().get(key).cloned()
    }

    /// Deserializes the value under `key`.
    ///
    /// Returns `None` if the key is absent or holds a value of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Returns the string under `key`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the message stored under `key`.
    pub fn get_message(&self, key: &str) -> Option<Message> {
        self.get_as(key)
    }

    /// Inserts a raw JSON value, returning the previous one.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.lock().insert(key.into(), value.into())
    }

    /// Serializes `value` into the state under `key`.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.inner.lock().insert(key.into(), value);
        Ok(())
    }

    /// Stores a message under `key`.
    pub fn set_message(&self, key: impl Into<String>, message: &Message) {
        // A message is a list of plain enums; serialization is infallible.
        let value = serde_json::to_value(message).unwrap_or(Value::Null);
        self.inner.lock().insert(key.into(), value);
    }

    /// Removes the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.lock().remove(key)
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Inserts every entry of `map` that is not already present.
    pub fn merge_missing(&self, map: &StateMap) {
        let mut inner = self.inner.lock();
        for (key, value) in map {
            if !inner.contains_key(key) {
                inner.insert(key.clone(), value.clone());
            }
        }
    }

    /// Returns a copy of the current contents.
    pub fn snapshot(&self) -> StateMap {
        self.inner.lock().clone()
    }

    /// Returns an independent state with the same contents.
    pub fn fork(&self) -> State {
        State::from_map(self.snapshot())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if the state holds nothing.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.lock().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fork_is_independent() {
        let state = State::new();
        state.insert("a", 1);
        let forked = state.fork();
        forked.insert("b", 2);

        assert!(!state.contains("b"));
        assert_eq!(forked.get("a"), Some(json!(1)));
    }

    #[test]
    fn test_message_slot() {
        let state = State::new();
        state.set_message("b", &Message::from("42"));
        assert_eq!(state.get_message("b").unwrap().extract_plain_text(), "42");
        assert_eq!(state.get_str("b"), None);
    }

    #[test]
    fn test_merge_missing_keeps_existing() {
        let state = State::new();
        state.insert("k", "rule");
        let mut defaults = StateMap::new();
        defaults.insert("k".into(), json!("default"));
        defaults.insert("d".into(), json!(true));
        state.merge_missing(&defaults);

        assert_eq!(state.get_str("k").as_deref(), Some("rule"));
        assert_eq!(state.get("d"), Some(json!(true)));
    }
}
