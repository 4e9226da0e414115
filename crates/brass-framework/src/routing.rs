//! Shortcuts for common matchers.
//!
//! Each function returns a [`MatcherBuilder`] with the relevant event type
//! and rule already set; chain handlers and options onto it.
//!
//! ```rust,ignore
//! use brass_framework::prelude::*;
//!
//! builder.register(on_message().handle(log_handler))?;
//! builder.register(on_command("echo").block(true).handle(echo_handler))?;
//! builder.register(on_regex(r"^roll (\d+)d(\d+)$").handle(roll_handler))?;
//! ```

use brass_core::EventType;

use crate::dependency::TypeTag;
use crate::matcher::MatcherBuilder;
use crate::rule::{self, CommandName};

/// Creates a matcher that sees every event.
pub fn on() -> MatcherBuilder {
    MatcherBuilder::new()
}

/// Creates a matcher for events of `event_type`.
pub fn on_event_type(event_type: EventType) -> MatcherBuilder {
    MatcherBuilder::new().event_type(event_type)
}

/// Creates a matcher for message events.
pub fn on_message() -> MatcherBuilder {
    on_event_type(EventType::Message)
}

/// Creates a matcher for notice events.
pub fn on_notice() -> MatcherBuilder {
    on_event_type(EventType::Notice)
}

/// Creates a matcher for request events.
pub fn on_request() -> MatcherBuilder {
    on_event_type(EventType::Request)
}

/// Creates a matcher for meta events.
pub fn on_meta() -> MatcherBuilder {
    on_event_type(EventType::Meta)
}

/// Creates a matcher for the command `name`.
///
/// Multi-part commands are given as token lists: `["group", "kick"]`.
pub fn on_command(name: impl Into<CommandName>) -> MatcherBuilder {
    on_message().rule(rule::command([name.into()], None))
}

/// Creates a matcher for any of `names`.
pub fn on_commands<I, C>(names: I) -> MatcherBuilder
where
    I: IntoIterator<Item = C>,
    C: Into<CommandName>,
{
    on_message().rule(rule::command(names, None))
}

/// Creates a matcher for the shell-style command `name`.
///
/// With a `parser`, the argument is parsed into
/// [`ShellArgs`](crate::rule::ShellArgs).
#[cfg(feature = "shell")]
pub fn on_shell_command(
    name: impl Into<CommandName>,
    parser: Option<clap::Command>,
) -> MatcherBuilder {
    on_message().rule(rule::shell_command([name.into()], parser))
}

/// Creates a matcher for messages starting with one of `prefixes`.
pub fn on_startswith<I, S>(prefixes: I, ignorecase: bool) -> MatcherBuilder
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    on_message().rule(rule::startswith(prefixes, ignorecase))
}

/// Creates a matcher for messages ending with one of `suffixes`.
pub fn on_endswith<I, S>(suffixes: I, ignorecase: bool) -> MatcherBuilder
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    on_message().rule(rule::endswith(suffixes, ignorecase))
}

/// Creates a matcher for messages equal to one of `texts`.
pub fn on_fullmatch<I, S>(texts: I, ignorecase: bool) -> MatcherBuilder
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    on_message().rule(rule::fullmatch(texts, ignorecase))
}

/// Creates a matcher for messages containing one of `keywords`.
pub fn on_keyword<I, S>(keywords: I) -> MatcherBuilder
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    on_message().rule(rule::keyword(keywords))
}

/// Creates a matcher for messages matching `pattern`.
///
/// An invalid pattern is reported when the matcher is registered.
pub fn on_regex(pattern: &str) -> MatcherBuilder {
    match rule::regex(pattern) {
        Ok(rule) => on_message().rule(rule),
        Err(err) => on_message().push_error(err),
    }
}

/// Creates a matcher for events of one of the given concrete types.
pub fn on_type<I>(types: I) -> MatcherBuilder
where
    I: IntoIterator<Item = TypeTag>,
{
    on().rule(rule::is_type(types))
}

#[cfg(test)]
mod tests {
    use brass_core::{BoxedBot, BoxedEvent};

    use super::*;
    use crate::config::EngineConfig;
    use crate::dispatcher::{Dispatcher, DispatcherBuilder};
    use crate::error::RegistrationError;
    use crate::testing::{MockBot, OtherEvent, TestEvent};

    fn dispatcher(builders: Vec<MatcherBuilder>) -> Dispatcher {
        let config = EngineConfig::default().with_command_start(["/"]);
        let mut dispatcher = DispatcherBuilder::new(config);
        for builder in builders {
            dispatcher.register(builder).unwrap();
        }
        dispatcher.build()
    }

    async fn replies(dispatcher: &Dispatcher, event: BoxedEvent) -> Vec<String> {
        let bot = MockBot::new();
        let boxed: BoxedBot = bot.clone();
        dispatcher.dispatch(boxed, event).await;
        bot.sent()
    }

    #[tokio::test]
    async fn test_text_shortcuts() {
        let dispatcher = dispatcher(vec![
            on_startswith(["hi"], true).handle(|| async { "start" }),
            on_endswith(["?"], false).handle(|| async { "end" }),
            on_keyword(["cake"]).handle(|| async { "keyword" }),
        ]);

        assert_eq!(
            replies(&dispatcher, TestEvent::message("HI there").boxed()).await,
            vec!["start"]
        );
        assert_eq!(
            replies(&dispatcher, TestEvent::message("any cake?").boxed()).await,
            vec!["end", "keyword"]
        );
        assert!(replies(&dispatcher, TestEvent::message("nothing").boxed()).await.is_empty());
    }

    #[tokio::test]
    async fn test_command_shortcuts() {
        let dispatcher = dispatcher(vec![
            on_commands(["start", "begin"]).handle(|| async { "started" }),
        ]);

        assert_eq!(
            replies(&dispatcher, TestEvent::message("/begin now").boxed()).await,
            vec!["started"]
        );
        assert!(replies(&dispatcher, TestEvent::message("/stop").boxed()).await.is_empty());
    }

    #[cfg(feature = "shell")]
    #[tokio::test]
    async fn test_shell_command_shortcut() {
        let dispatcher = dispatcher(vec![on_shell_command("roll", None).handle(|| async { "rolled" })]);

        assert_eq!(
            replies(&dispatcher, TestEvent::message("/roll 2 \"d 6\"").boxed()).await,
            vec!["rolled"]
        );
    }

    #[tokio::test]
    async fn test_event_type_shortcuts() {
        let dispatcher = dispatcher(vec![
            on_notice().handle(|| async { "notice" }),
            on_request().handle(|| async { "request" }),
            on_meta().handle(|| async { "meta" }),
        ]);

        assert_eq!(
            replies(&dispatcher, TestEvent::notice().boxed()).await,
            vec!["notice"]
        );
        assert!(replies(&dispatcher, TestEvent::message("hello").boxed()).await.is_empty());
    }

    #[tokio::test]
    async fn test_on_type_filters_concrete_event() {
        let dispatcher = dispatcher(vec![
            on_type([TypeTag::of::<OtherEvent>()]).handle(|| async { "other" }),
        ]);

        assert_eq!(
            replies(&dispatcher, BoxedEvent::new(OtherEvent)).await,
            vec!["other"]
        );
        assert!(replies(&dispatcher, TestEvent::message("hi").boxed()).await.is_empty());
    }

    #[test]
    fn test_invalid_regex_reported_on_register() {
        let mut dispatcher = DispatcherBuilder::new(EngineConfig::default());
        let result = dispatcher.register(on_regex("(unclosed").handle(|| async {}));
        assert!(matches!(result, Err(RegistrationError::InvalidPattern { .. })));
    }
}
