//! Text and event-shape rules.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use brass_core::{BoxedEvent, EventType};
use ::regex::Regex;
use serde_json::Value;

use crate::dependency::TypeTag;
use crate::error::{RegistrationError, RegistrationResult};
use crate::state::{State, keys};

use super::Rule;

/// Extracts the text a text rule looks at, if the event is a message.
fn message_text(event: &BoxedEvent) -> Option<String> {
    if event.event_type() != EventType::Message {
        return None;
    }
    event.message().map(|m| m.extract_plain_text())
}

fn fold(text: &str, ignorecase: bool) -> String {
    if ignorecase {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}

fn collect<I, S>(items: I) -> Arc<[String]>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Matches messages whose plain text starts with one of `prefixes`.
///
/// Stores the matched prefix under [`keys::STARTSWITH`].
pub fn startswith<I, S>(prefixes: I, ignorecase: bool) -> Rule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let prefixes = collect(prefixes);
    Rule::named_checker("startswith", move |event: BoxedEvent, state: State| {
        let prefixes = prefixes.clone();
        async move {
            let Some(text) = message_text(&event) else {
                return false;
            };
            let text = fold(&text, ignorecase);
            match prefixes
                .iter()
                .find(|p| text.starts_with(fold(p, ignorecase).as_str()))
            {
                Some(prefix) => {
                    state.insert(keys::STARTSWITH, prefix.as_str());
                    true
                }
                None => false,
            }
        }
    })
}

/// Matches messages whose plain text ends with one of `suffixes`.
///
/// Stores the matched suffix under [`keys::ENDSWITH`].
pub fn endswith<I, S>(suffixes: I, ignorecase: bool) -> Rule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let suffixes = collect(suffixes);
    Rule::named_checker("endswith", move |event: BoxedEvent, state: State| {
        let suffixes = suffixes.clone();
        async move {
            let Some(text) = message_text(&event) else {
                return false;
            };
            let text = fold(&text, ignorecase);
            match suffixes
                .iter()
                .find(|s| text.ends_with(fold(s, ignorecase).as_str()))
            {
                Some(suffix) => {
                    state.insert(keys::ENDSWITH, suffix.as_str());
                    true
                }
                None => false,
            }
        }
    })
}

/// Matches messages whose whole plain text equals one of `texts`.
///
/// Stores the matched text under [`keys::FULLMATCH`].
pub fn fullmatch<I, S>(texts: I, ignorecase: bool) -> Rule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let texts = collect(texts);
    Rule::named_checker("fullmatch", move |event: BoxedEvent, state: State| {
        let texts = texts.clone();
        async move {
            let Some(text) = message_text(&event) else {
                return false;
            };
            let text = fold(&text, ignorecase);
            match texts.iter().find(|t| text == fold(t, ignorecase)) {
                Some(matched) => {
                    state.insert(keys::FULLMATCH, matched.as_str());
                    true
                }
                None => false,
            }
        }
    })
}

/// Matches messages whose plain text contains one of `keywords`.
///
/// Stores the first matching keyword under [`keys::KEYWORD`].
pub fn keyword<I, S>(keywords: I) -> Rule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let keywords = collect(keywords);
    Rule::named_checker("keyword", move |event: BoxedEvent, state: State| {
        let keywords = keywords.clone();
        async move {
            let Some(text) = message_text(&event) else {
                return false;
            };
            match keywords.iter().find(|k| text.contains(k.as_str())) {
                Some(keyword) => {
                    state.insert(keys::KEYWORD, keyword.as_str());
                    true
                }
                None => false,
            }
        }
    })
}

/// Matches messages whose rendered text contains a match of `pattern`.
///
/// Non-text segments take part in their rendered form, so `\[at:\d+\]`
/// matches a mention. Stores the matched text, the positional groups and the
/// named groups under [`keys::REGEX_MATCHED`], [`keys::REGEX_GROUP`] and
/// [`keys::REGEX_DICT`].
pub fn regex(pattern: &str) -> RegistrationResult<Rule> {
    let re = Regex::new(pattern).map_err(|err| RegistrationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })?;
    let re = Arc::new(re);

    Ok(Rule::named_checker(
        "regex",
        move |event: BoxedEvent, state: State| {
            let re = re.clone();
            async move {
                if event.event_type() != EventType::Message {
                    return false;
                }
                let Some(message) = event.message() else {
                    return false;
                };
                let text = message.to_string();
                let Some(caps) = re.captures(&text) else {
                    return false;
                };

                let group = |m: Option<::regex::Match<'_>>| {
                    m.map_or(Value::Null, |m| Value::String(m.as_str().to_string()))
                };
                let groups: Vec<Value> = caps.iter().skip(1).map(group).collect();
                let named: HashMap<&str, Value> = re
                    .capture_names()
                    .flatten()
                    .map(|name| (name, group(caps.name(name))))
                    .collect();

                state.insert(keys::REGEX_MATCHED, group(caps.get(0)));
                state.insert(keys::REGEX_GROUP, groups);
                state.insert(
                    keys::REGEX_DICT,
                    named
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect::<serde_json::Map<_, _>>(),
                );
                true
            }
        },
    ))
}

/// Matches events addressed to the bot.
pub fn to_me() -> Rule {
    Rule::named_checker("to_me", |event: BoxedEvent| async move { event.is_tome() })
}

/// Matches events of one of the given concrete types.
pub fn is_type<I>(types: I) -> Rule
where
    I: IntoIterator<Item = TypeTag>,
{
    let types: Arc<[TypeTag]> = types.into_iter().collect();
    Rule::named_checker("is_type", move |event: BoxedEvent| {
        let types = types.clone();
        async move {
            let actual = Any::type_id(event.as_any());
            types.iter().any(|t| t.id() == actual)
        }
    })
}

#[cfg(test)]
mod tests {
    use brass_core::Message;
    use serde_json::json;

    use super::*;
    use crate::dependency::DependencyGraph;
    use crate::rule::tests::rule_context;
    use crate::testing::{OtherEvent, TestEvent};

    async fn passes(rule: Rule, event: TestEvent) -> (bool, State) {
        let compiled = rule.compile(&mut DependencyGraph::new()).unwrap();
        let cx = rule_context(event);
        let passed = compiled.check(&cx).await;
        (passed, cx.state().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn test_startswith_ignorecase() {
        let (passed, state) = passes(startswith(["Hello"], true), TestEvent::message("hello world")).await;
        assert!(passed);
        assert_eq!(state.get_str(keys::STARTSWITH).as_deref(), Some("Hello"));

        let (passed, _) = passes(startswith(["Hello"], false), TestEvent::message("hello")).await;
        assert!(!passed);
    }

    #[tokio::test]
    async fn test_text_rules_ignore_non_message_events() {
        let (passed, _) = passes(keyword(["x"]), TestEvent::notice()).await;
        assert!(!passed);
    }

    #[tokio::test]
    async fn test_endswith_fullmatch_keyword() {
        assert!(passes(endswith(["!"], false), TestEvent::message("wow!")).await.0);
        assert!(passes(fullmatch(["PING"], true), TestEvent::message("ping")).await.0);
        assert!(!passes(fullmatch(["ping"], false), TestEvent::message("ping pong")).await.0);

        let (passed, state) = passes(keyword(["cat", "dog"]), TestEvent::message("hotdog")).await;
        assert!(passed);
        assert_eq!(state.get_str(keys::KEYWORD).as_deref(), Some("dog"));
    }

    #[tokio::test]
    async fn test_regex_stores_groups() {
        let rule = regex(r"(?P<n>\d+)\+(\d+)").unwrap();
        let (passed, state) = passes(rule, TestEvent::message("calc 1+22")).await;

        assert!(passed);
        assert_eq!(state.get(keys::REGEX_MATCHED), Some(json!("1+22")));
        assert_eq!(state.get(keys::REGEX_GROUP), Some(json!(["1", "22"])));
        assert_eq!(state.get(keys::REGEX_DICT), Some(json!({"n": "1"})));
    }

    #[tokio::test]
    async fn test_regex_sees_rendered_segments() {
        let rule = regex(r"^\[at:(\d+)\]").unwrap();
        let event = TestEvent::message_from(Message::new().at("10").text(" hi"));
        assert!(passes(rule, event).await.0);
    }

    #[test]
    fn test_invalid_regex_fails_registration() {
        assert!(matches!(
            regex("(unclosed"),
            Err(RegistrationError::InvalidPattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_to_me_and_is_type() {
        assert!(passes(to_me(), TestEvent::message("x").tome()).await.0);
        assert!(!passes(to_me(), TestEvent::message("x")).await.0);

        assert!(passes(is_type([TypeTag::of::<TestEvent>()]), TestEvent::message("x")).await.0);
        assert!(!passes(is_type([TypeTag::of::<OtherEvent>()]), TestEvent::message("x")).await.0);
    }
}
