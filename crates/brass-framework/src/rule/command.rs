//! Command rule.

use std::sync::Arc;

use brass_core::BoxedEvent;

use crate::state::{State, keys};
use crate::trie::CommandPrefix;

use super::Rule;

/// A command as a token list: `"echo"` or `["group", "kick"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandName(pub Vec<String>);

impl From<&str> for CommandName {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for CommandName {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl<const N: usize> From<[&str; N]> for CommandName {
    fn from(parts: [&str; N]) -> Self {
        Self(parts.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<String>> for CommandName {
    fn from(parts: Vec<String>) -> Self {
        Self(parts)
    }
}

/// Reads the command prefix the router stored for this event.
pub(crate) fn routed_prefix(state: &State) -> Option<CommandPrefix> {
    state.get_as(keys::PREFIX)
}

/// Writes the command keys for a matched prefix.
pub(crate) fn store_command(state: &State, prefix: &CommandPrefix) {
    state.insert(keys::COMMAND, prefix.command.clone());
    state.insert(keys::RAW_COMMAND, prefix.raw_command.as_str());
    state.set_message(keys::COMMAND_ARG, &prefix.command_arg);
    state.insert(keys::COMMAND_START, prefix.command_start.as_str());
    state.insert(
        keys::COMMAND_WHITESPACE,
        prefix
            .command_whitespace
            .clone()
            .map_or(serde_json::Value::Null, serde_json::Value::String),
    );
}

/// Matches messages that start with one of `commands`.
///
/// Relies on the prefix the trie router parsed for the event, so the start
/// flags and separators come from the engine configuration. With
/// `force_whitespace`, the command must be followed by whitespace or end the
/// message (`Some(true)`), or must not be (`Some(false)`).
///
/// On match, stores [`keys::COMMAND`], [`keys::RAW_COMMAND`],
/// [`keys::COMMAND_ARG`], [`keys::COMMAND_START`] and
/// [`keys::COMMAND_WHITESPACE`].
pub fn command<I, C>(commands: I, force_whitespace: Option<bool>) -> Rule
where
    I: IntoIterator<Item = C>,
    C: Into<CommandName>,
{
    let commands: Vec<Vec<String>> = commands.into_iter().map(|c| c.into().0).collect();
    let wanted: Arc<[Vec<String>]> = commands.clone().into();

    Rule::named_checker("command", move |_event: BoxedEvent, state: State| {
        let wanted = wanted.clone();
        async move {
            let Some(prefix) = routed_prefix(&state) else {
                return false;
            };
            if !wanted.contains(&prefix.command) {
                return false;
            }
            if let Some(force) = force_whitespace {
                let has_arg = !prefix.command_arg.is_empty();
                let has_whitespace = prefix.command_whitespace.is_some();
                if force && has_arg && !has_whitespace {
                    return false;
                }
                if !force && has_whitespace {
                    return false;
                }
            }
            store_command(&state, &prefix);
            true
        }
    })
    .with_commands(commands)
}

#[cfg(test)]
mod tests {
    use brass_core::Message;
    use serde_json::json;

    use super::*;
    use crate::config::EngineConfig;
    use crate::dependency::DependencyGraph;
    use crate::rule::tests::rule_context;
    use crate::testing::TestEvent;
    use crate::trie::TrieRouter;

    async fn run(rule: Rule, text: &str) -> Option<State> {
        let config = EngineConfig::default().with_command_start(["/", ""]);
        let mut trie = TrieRouter::new();
        trie.insert_commands(rule.commands(), &config).unwrap();

        let cx = rule_context(TestEvent::message(text));
        let state = cx.state().cloned().unwrap();
        if let Some(prefix) = trie.parse(&Message::from(text)) {
            state.set(keys::PREFIX, &prefix).unwrap();
        }
        let compiled = rule.compile(&mut DependencyGraph::new()).unwrap();
        compiled.check(&cx).await.then_some(state)
    }

    #[tokio::test]
    async fn test_command_stores_keys() {
        let state = run(command(["echo"], None), "/echo hello").await.unwrap();

        assert_eq!(state.get(keys::COMMAND), Some(json!(["echo"])));
        assert_eq!(state.get_str(keys::RAW_COMMAND).as_deref(), Some("/echo"));
        assert_eq!(state.get_str(keys::COMMAND_START).as_deref(), Some("/"));
        assert_eq!(
            state.get_message(keys::COMMAND_ARG),
            Some(Message::from("hello"))
        );
    }

    #[tokio::test]
    async fn test_multi_part_command() {
        let state = run(command([["group", "kick"]], None), "group.kick 42")
            .await
            .unwrap();
        assert_eq!(state.get(keys::COMMAND), Some(json!(["group", "kick"])));
    }

    #[tokio::test]
    async fn test_force_whitespace() {
        assert!(run(command(["echo"], Some(true)), "echohello").await.is_none());
        assert!(run(command(["echo"], Some(true)), "echo hello").await.is_some());
        assert!(run(command(["echo"], Some(true)), "echo").await.is_some());
        assert!(run(command(["echo"], Some(false)), "echo hello").await.is_none());
    }

    #[tokio::test]
    async fn test_other_command_does_not_match() {
        assert!(run(command(["echo"], None), "/help").await.is_none());
    }
}
