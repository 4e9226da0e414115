//! Shell-style command rule, parsed with clap.

use std::sync::Arc;

use brass_core::{BoxedEvent, Message, Segment};
use clap::error::ErrorKind;
use clap::{ArgAction, ArgMatches};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::state::{State, keys};

use super::Rule;
use super::command::{CommandName, routed_prefix, store_command};

/// Why text could not be split into arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SplitError {
    /// A quote was opened and never closed.
    #[error("no closing quotation")]
    UnclosedQuote,
    /// The text ends in a bare backslash.
    #[error("no escaped character")]
    TrailingEscape,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Between,
    Word,
    Single,
    Double,
}

/// Splits text into arguments the way a POSIX shell would.
///
/// Single quotes keep everything literally. Inside double quotes a backslash
/// escapes only `"` and `\`; outside quotes it escapes any character. Quotes
/// may join a word (`a"b c"` is one argument) and `""` is an empty argument.
pub fn shell_split(input: &str) -> Result<Vec<String>, SplitError> {
    let mut argv = Vec::new();
    let mut word = String::new();
    let mut mode = Mode::Between;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match (mode, ch) {
            (Mode::Single, '\'') | (Mode::Double, '"') => mode = Mode::Word,
            (Mode::Single, c) => word.push(c),
            (Mode::Double, '\\') => match chars.next() {
                Some(c @ ('"' | '\\')) => word.push(c),
                Some(c) => {
                    word.push('\\');
                    word.push(c);
                }
                None => return Err(SplitError::UnclosedQuote),
            },
            (Mode::Double, c) => word.push(c),
            (_, c) if c.is_whitespace() => {
                if mode == Mode::Word {
                    argv.push(std::mem::take(&mut word));
                    mode = Mode::Between;
                }
            }
            (_, '\'') => mode = Mode::Single,
            (_, '"') => mode = Mode::Double,
            (_, '\\') => {
                word.push(chars.next().ok_or(SplitError::TrailingEscape)?);
                mode = Mode::Word;
            }
            (_, c) => {
                word.push(c);
                mode = Mode::Word;
            }
        }
    }

    match mode {
        Mode::Single | Mode::Double => Err(SplitError::UnclosedQuote),
        Mode::Word => {
            argv.push(word);
            Ok(argv)
        }
        Mode::Between => Ok(argv),
    }
}

/// Splits a message into arguments.
///
/// Text segments are shell-split; every other segment becomes one argument
/// in its rendered form. A segment boundary always breaks a word.
fn message_argv(message: &Message) -> Result<Vec<String>, SplitError> {
    let mut argv = Vec::new();
    for segment in message.iter() {
        match segment {
            Segment::Text(text) => argv.extend(shell_split(text)?),
            other => argv.push(other.to_string()),
        }
    }
    Ok(argv)
}

/// Why the argument parser stopped instead of producing arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserExit {
    /// `0` for help and version output, `2` for usage errors.
    pub status: i32,
    /// The rendered parser output.
    pub message: String,
}

/// The outcome of parsing a shell command, stored under [`keys::SHELL_ARGS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShellArgs {
    /// Arguments parsed successfully, keyed by argument id.
    Parsed {
        /// The parsed values.
        args: Map<String, Value>,
    },
    /// The parser exited.
    Exit(ParserExit),
}

impl ShellArgs {
    /// Returns the parsed arguments, if parsing succeeded.
    pub fn parsed(&self) -> Option<&Map<String, Value>> {
        match self {
            ShellArgs::Parsed { args } => Some(args),
            ShellArgs::Exit(_) => None,
        }
    }
}

fn parse_argv(parser: &clap::Command, argv: &[String]) -> ShellArgs {
    match parser
        .clone()
        .no_binary_name(true)
        .try_get_matches_from(argv)
    {
        Ok(matches) => ShellArgs::Parsed {
            args: matches_to_json(parser, &matches),
        },
        Err(err) => {
            let status = match err.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
                _ => 2,
            };
            ShellArgs::Exit(ParserExit {
                status,
                message: err.to_string(),
            })
        }
    }
}

fn matches_to_json(command: &clap::Command, matches: &ArgMatches) -> Map<String, Value> {
    let mut map = Map::new();
    for arg in command.get_arguments() {
        let id = arg.get_id().as_str();
        let value = match arg.get_action() {
            ArgAction::SetTrue | ArgAction::SetFalse => matches
                .try_get_one::<bool>(id)
                .ok()
                .flatten()
                .map(|b| Value::Bool(*b)),
            ArgAction::Count => matches
                .try_get_one::<u8>(id)
                .ok()
                .flatten()
                .map(|n| Value::from(*n)),
            action => matches.try_get_raw(id).ok().flatten().map(|raw| {
                let mut values: Vec<Value> = raw
                    .map(|v| Value::String(v.to_string_lossy().into_owned()))
                    .collect();
                let multiple = matches!(action, ArgAction::Append)
                    || arg.get_num_args().is_some_and(|n| n.max_values() > 1);
                if multiple || values.len() != 1 {
                    Value::Array(values)
                } else {
                    values.remove(0)
                }
            }),
        };
        map.insert(id.to_string(), value.unwrap_or(Value::Null));
    }

    if let Some((name, sub_matches)) = matches.subcommand()
        && let Some(sub_command) = command.find_subcommand(name)
    {
        let mut sub = Map::new();
        sub.insert("name".to_string(), Value::String(name.to_string()));
        sub.insert(
            "args".to_string(),
            Value::Object(matches_to_json(sub_command, sub_matches)),
        );
        map.insert("subcommand".to_string(), Value::Object(sub));
    }
    map
}

/// Matches shell-style commands.
///
/// Behaves like [`command`](super::command), then splits the argument into
/// [`keys::SHELL_ARGV`]. With a parser, the argv is parsed and the result
/// stored under [`keys::SHELL_ARGS`] as [`ShellArgs`]. A parse failure still
/// matches; handlers read the [`ParserExit`] to reply with help or errors.
/// An argument that cannot be split (an unclosed quote, say) leaves an empty
/// argv and a [`ShellArgs::Exit`] with status `2`, parser or not.
pub fn shell_command<I, C>(commands: I, parser: Option<clap::Command>) -> Rule
where
    I: IntoIterator<Item = C>,
    C: Into<CommandName>,
{
    let commands: Vec<Vec<String>> = commands.into_iter().map(|c| c.into().0).collect();
    let wanted: Arc<[Vec<String>]> = commands.clone().into();
    let parser = parser.map(Arc::new);

    Rule::named_checker("shell_command", move |_event: BoxedEvent, state: State| {
        let wanted = wanted.clone();
        let parser = parser.clone();
        async move {
            let Some(prefix) = routed_prefix(&state) else {
                return false;
            };
            if !wanted.contains(&prefix.command) {
                return false;
            }
            store_command(&state, &prefix);

            let (argv, parsed) = match message_argv(&prefix.command_arg) {
                Ok(argv) => {
                    let parsed = parser.map(|parser| parse_argv(&parser, &argv));
                    (argv, parsed)
                }
                Err(err) => {
                    let exit = ParserExit {
                        status: 2,
                        message: err.to_string(),
                    };
                    (Vec::new(), Some(ShellArgs::Exit(exit)))
                }
            };
            if let Some(parsed) = parsed
                && state.set(keys::SHELL_ARGS, &parsed).is_err()
            {
                return false;
            }
            state.insert(keys::SHELL_ARGV, argv);
            true
        }
    })
    .with_commands(commands)
}

#[cfg(test)]
mod tests {
    use clap::Arg;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_shell_split_quotes() {
        let args = shell_split(r#"roll "two dice" 'd 6' a"b c"d """#).unwrap();
        assert_eq!(args, vec!["roll", "two dice", "d 6", "ab cd", ""]);
    }

    #[test]
    fn test_shell_split_escapes() {
        let args = shell_split(r#"say \"hi\" "a \"b\" \n" 'c\d'"#).unwrap();
        assert_eq!(args, vec!["say", r#""hi""#, r#"a "b" \n"#, r"c\d"]);
    }

    #[test]
    fn test_shell_split_whitespace_only() {
        assert!(shell_split("   \t\n ").unwrap().is_empty());
    }

    #[test]
    fn test_shell_split_rejects_unclosed() {
        assert_eq!(shell_split("say 'hi"), Err(SplitError::UnclosedQuote));
        assert_eq!(shell_split(r#"say "hi\""#), Err(SplitError::UnclosedQuote));
        assert_eq!(shell_split(r"say hi\"), Err(SplitError::TrailingEscape));
    }

    #[test]
    fn test_message_argv_keeps_segments_whole() {
        let message = Message::new().text("kick ").at("12345").text(" 'bad words'");
        assert_eq!(
            message_argv(&message).unwrap(),
            vec!["kick", "[at:12345]", "bad words"]
        );
    }

    #[tokio::test]
    async fn test_unclosed_quote_is_exit() {
        let rule = shell_command(["say"], None);
        let config = crate::config::EngineConfig::default();
        let mut trie = crate::trie::TrieRouter::new();
        trie.insert_commands(rule.commands(), &config).unwrap();

        let cx = crate::rule::tests::rule_context(crate::testing::TestEvent::message("/say 'hi"));
        let state = cx.state().cloned().unwrap();
        let prefix = trie.parse(&Message::from("/say 'hi")).unwrap();
        state.set(keys::PREFIX, &prefix).unwrap();
        let compiled = rule.compile(&mut crate::dependency::DependencyGraph::new()).unwrap();

        assert!(compiled.check(&cx).await);
        assert_eq!(state.get(keys::SHELL_ARGV), Some(json!([])));
        match state.get_as::<ShellArgs>(keys::SHELL_ARGS) {
            Some(ShellArgs::Exit(exit)) => {
                assert_eq!(exit.status, 2);
                assert_eq!(exit.message, "no closing quotation");
            }
            other => panic!("expected exit, got {other:?}"),
        }
    }

    fn parser() -> clap::Command {
        clap::Command::new("weather")
            .arg(Arg::new("city").required(true))
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(ArgAction::SetTrue),
            )
    }

    #[test]
    fn test_parse_success() {
        let argv = vec!["paris".to_string(), "-v".to_string()];
        let parsed = parse_argv(&parser(), &argv);
        let args = parsed.parsed().unwrap();

        assert_eq!(args["city"], json!("paris"));
        assert_eq!(args["verbose"], json!(true));
    }

    #[test]
    fn test_parse_failure_is_exit() {
        match parse_argv(&parser(), &[]) {
            ShellArgs::Exit(exit) => {
                assert_eq!(exit.status, 2);
                assert!(!exit.message.is_empty());
            }
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[test]
    fn test_help_exits_zero() {
        match parse_argv(&parser(), &["--help".to_string()]) {
            ShellArgs::Exit(exit) => assert_eq!(exit.status, 0),
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[test]
    fn test_shell_args_serde_shape() {
        let exit = ShellArgs::Exit(ParserExit {
            status: 2,
            message: "bad".into(),
        });
        let value = serde_json::to_value(&exit).unwrap();
        assert_eq!(value, json!({"kind": "exit", "status": 2, "message": "bad"}));
        let back: ShellArgs = serde_json::from_value(value).unwrap();
        assert_eq!(back, exit);
    }
}
