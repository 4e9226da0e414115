//! Command prefix routing.
//!
//! Every command matcher registers the text prefixes it answers to (one per
//! start flag and separator combination). Before matchers are consulted, the
//! dispatcher runs the leading text of a message through the [`TrieRouter`]
//! once and stores the longest hit in the base state under
//! [`keys::PREFIX`](crate::state::keys::PREFIX).

use std::collections::HashMap;

use brass_core::{Message, Segment};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::{RegistrationError, RegistrationResult};

/// The value stored under a registered prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPath {
    /// The start flag this prefix was built with.
    pub start: String,
    /// The command tokens.
    pub command: Vec<String>,
}

/// The result of parsing a message against the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPrefix {
    /// The matched command tokens.
    pub command: Vec<String>,
    /// The text the command was matched from, start flag included.
    pub raw_command: String,
    /// The start flag that was used.
    pub command_start: String,
    /// Everything after the command, leading whitespace stripped.
    pub command_arg: Message,
    /// The whitespace between the command and its argument, if any.
    pub command_whitespace: Option<String>,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<char, Node>,
    value: Option<CommandPath>,
}

/// Character trie mapping command prefixes to their [`CommandPath`].
#[derive(Debug, Default)]
pub struct TrieRouter {
    root: Node,
    len: usize,
}

impl TrieRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of registered prefixes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no prefix is registered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the value registered under exactly `prefix`.
    pub fn get(&self, prefix: &str) -> Option<&CommandPath> {
        let mut node = &self.root;
        for c in prefix.chars() {
            node = node.children.get(&c)?;
        }
        node.value.as_ref()
    }

    /// Registers `prefix`.
    ///
    /// The first registration of a prefix wins; later ones are rejected with
    /// a warning and [`RegistrationError::DuplicatePrefix`].
    pub fn insert(&mut self, prefix: &str, value: CommandPath) -> RegistrationResult<()> {
        if prefix.is_empty() {
            return Err(RegistrationError::InvalidPattern {
                pattern: String::new(),
                reason: "empty command prefix".to_string(),
            });
        }

        let mut node = &mut self.root;
        for c in prefix.chars() {
            node = node.children.entry(c).or_default();
        }
        if node.value.is_some() {
            warn!(prefix, "Duplicated command prefix, keeping the first one");
            return Err(RegistrationError::DuplicatePrefix {
                prefix: prefix.to_string(),
            });
        }
        node.value = Some(value);
        self.len += 1;
        Ok(())
    }

    /// Registers every prefix `commands` are reachable by under `config`.
    ///
    /// A prefix already registered with the same command is accepted, so
    /// several matchers may share one command. A prefix claimed by a
    /// different command, either in the router or among `commands`, fails
    /// the whole call before anything is inserted.
    pub fn insert_commands(
        &mut self,
        commands: &[Vec<String>],
        config: &EngineConfig,
    ) -> RegistrationResult<()> {
        let mut candidates: Vec<(String, CommandPath)> = Vec::new();
        for command in commands {
            for (prefix, path) in command_prefixes(command, config)? {
                let claimed = self
                    .get(&prefix)
                    .or_else(|| candidates.iter().find(|(p, _)| *p == prefix).map(|(_, v)| v));
                match claimed {
                    Some(existing) if *existing != path => {
                        warn!(prefix = prefix.as_str(), "Command prefix collides with another command");
                        return Err(RegistrationError::DuplicatePrefix { prefix });
                    }
                    Some(_) => {}
                    None => candidates.push((prefix, path)),
                }
            }
        }

        for (prefix, path) in candidates {
            self.insert(&prefix, path)?;
        }
        Ok(())
    }

    /// Finds the longest registered prefix of `text`.
    ///
    /// Returns the matched slice of `text` and its value.
    pub fn longest_prefix<'t>(&self, text: &'t str) -> Option<(&'t str, &CommandPath)> {
        let mut node = &self.root;
        let mut best = None;
        for (i, c) in text.char_indices() {
            match node.children.get(&c) {
                Some(next) => node = next,
                None => break,
            }
            if let Some(value) = &node.value {
                best = Some((&text[..i + c.len_utf8()], value));
            }
        }
        best
    }

    /// Parses the leading text segment of `message` into a command prefix.
    pub fn parse(&self, message: &Message) -> Option<CommandPrefix> {
        let (first, rest) = message.split_first()?;
        let text = first.as_text()?.trim_start();
        let (raw, path) = self.longest_prefix(text)?;

        let remainder = &text[raw.len()..];
        let arg = remainder.trim_start();
        let whitespace = &remainder[..remainder.len() - arg.len()];

        let mut command_arg = Message::new();
        if !arg.is_empty() {
            command_arg.push(Segment::text(arg));
        }
        for segment in rest {
            command_arg.push(segment.clone());
        }

        Some(CommandPrefix {
            command: path.command.clone(),
            raw_command: raw.to_string(),
            command_start: path.start.clone(),
            command_arg,
            command_whitespace: (!whitespace.is_empty()).then(|| whitespace.to_string()),
        })
    }
}

/// Builds every `(prefix, path)` pair a command is reachable by.
fn command_prefixes(
    command: &[String],
    config: &EngineConfig,
) -> RegistrationResult<Vec<(String, CommandPath)>> {
    if command.is_empty() || command.iter().any(String::is_empty) {
        return Err(RegistrationError::InvalidPattern {
            pattern: command.join("."),
            reason: "command tokens must not be empty".to_string(),
        });
    }

    let mut joined = if command.len() == 1 {
        vec![command[0].clone()]
    } else {
        config.command_sep.iter().map(|sep| command.join(sep)).collect()
    };
    joined.dedup();

    let mut prefixes = Vec::new();
    for start in &config.command_start {
        for body in &joined {
            let prefix = format!("{start}{body}");
            if prefixes.iter().any(|(p, _)| p == &prefix) {
                continue;
            }
            prefixes.push((
                prefix,
                CommandPath {
                    start: start.clone(),
                    command: command.to_vec(),
                },
            ));
        }
    }
    Ok(prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(start: &str, command: &[&str]) -> CommandPath {
        CommandPath {
            start: start.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut trie = TrieRouter::new();
        trie.insert("/help", path("/", &["help"])).unwrap();
        trie.insert("/helpme", path("/", &["helpme"])).unwrap();

        let (raw, value) = trie.longest_prefix("/helpme now").unwrap();
        assert_eq!(raw, "/helpme");
        assert_eq!(value.command, vec!["helpme"]);
        assert!(trie.longest_prefix("/hel").is_none());
    }

    #[test]
    fn test_duplicate_prefix_first_wins() {
        let mut trie = TrieRouter::new();
        trie.insert("/a", path("/", &["a"])).unwrap();
        let err = trie.insert("/a", path("/", &["other"])).unwrap_err();

        assert_eq!(
            err,
            RegistrationError::DuplicatePrefix {
                prefix: "/a".to_string()
            }
        );
        assert_eq!(trie.get("/a").unwrap().command, vec!["a"]);
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_parse_splits_argument() {
        let mut trie = TrieRouter::new();
        trie.insert("echo", path("", &["echo"])).unwrap();

        let message = Message::new().text("  echo  hi there").at("42");
        let prefix = trie.parse(&message).unwrap();

        assert_eq!(prefix.command, vec!["echo"]);
        assert_eq!(prefix.raw_command, "echo");
        assert_eq!(prefix.command_whitespace.as_deref(), Some("  "));
        assert_eq!(prefix.command_arg, Message::new().text("hi there").at("42"));
    }

    #[test]
    fn test_parse_without_argument() {
        let mut trie = TrieRouter::new();
        trie.insert("/ping", path("/", &["ping"])).unwrap();

        let prefix = trie.parse(&Message::from("/ping")).unwrap();
        assert!(prefix.command_arg.is_empty());
        assert_eq!(prefix.command_whitespace, None);
        assert!(trie.parse(&Message::new().at("1").text("/ping")).is_none());
    }

    #[test]
    fn test_insert_command_combinations() {
        let config = EngineConfig::default()
            .with_command_start(["/", "!"])
            .with_command_sep([".", " "]);
        let mut trie = TrieRouter::new();
        let command = vec!["group".to_string(), "kick".to_string()];
        trie.insert_commands(&[command.clone()], &config).unwrap();

        assert_eq!(trie.len(), 4);
        assert_eq!(trie.get("!group kick").unwrap().start, "!");
        // Same command again is tolerated.
        trie.insert_commands(&[command], &config).unwrap();
        assert_eq!(trie.len(), 4);
    }

    #[test]
    fn test_insert_command_conflict_inserts_nothing() {
        let config = EngineConfig::default().with_command_start(["/", ""]);
        let mut trie = TrieRouter::new();
        trie.insert("x", path("", &["y"])).unwrap();

        let err = trie
            .insert_commands(&[vec!["x".to_string()]], &config)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicatePrefix { .. }));
        assert!(trie.get("/x").is_none());
    }

    #[test]
    fn test_later_conflicting_command_inserts_nothing() {
        let config = EngineConfig::default();
        let mut trie = TrieRouter::new();
        trie.insert("/taken", path("/", &["other"])).unwrap();

        let commands = vec![vec!["a".to_string()], vec!["taken".to_string()]];
        assert!(trie.insert_commands(&commands, &config).is_err());
        assert!(trie.get("/a").is_none());
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_commands_of_one_call_conflicting_with_each_other() {
        let config = EngineConfig::default().with_command_sep([" "]);
        let mut trie = TrieRouter::new();

        let commands = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["a b".to_string()],
        ];
        assert!(trie.insert_commands(&commands, &config).is_err());
        assert!(trie.is_empty());
    }
}
