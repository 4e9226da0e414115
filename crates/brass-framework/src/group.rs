//! Matchers that share settings.
//!
//! A [`MatcherGroup`] holds a [`MatcherBuilder`] of defaults and offers the
//! same shortcuts as [`routing`](crate::routing). Every builder it hands out
//! starts from those defaults. Settings made on the returned builder win over
//! single-valued defaults; rules, permissions, handlers and state are added
//! to the group's.
//!
//! A [`CommandGroup`] also prefixes every command with a base command.
//!
//! ```rust,ignore
//! use brass_framework::prelude::*;
//!
//! let admin = CommandGroup::new("admin", on().permission(permission::superuser()).priority(2));
//! builder.register(admin.command("ban").handle(ban_handler))?;
//! builder.register(admin.command(["user", "list"]).handle(list_handler))?;
//! ```

use brass_core::EventType;

use crate::dependency::TypeTag;
use crate::matcher::MatcherBuilder;
use crate::routing;
use crate::rule::CommandName;

/// Shortcuts sharing one set of defaults.
#[derive(Clone, Default)]
pub struct MatcherGroup {
    defaults: MatcherBuilder,
}

impl MatcherGroup {
    /// Creates a group whose matchers start from `defaults`.
    pub fn new(defaults: MatcherBuilder) -> Self {
        Self { defaults }
    }

    /// Returns the defaults.
    pub fn defaults(&self) -> &MatcherBuilder {
        &self.defaults
    }

    fn apply(&self, builder: MatcherBuilder) -> MatcherBuilder {
        builder.with_defaults(&self.defaults)
    }

    /// See [`routing::on`].
    pub fn on(&self) -> MatcherBuilder {
        self.apply(routing::on())
    }

    /// See [`routing::on_event_type`].
    pub fn on_event_type(&self, event_type: EventType) -> MatcherBuilder {
        self.apply(routing::on_event_type(event_type))
    }

    /// See [`routing::on_message`].
    pub fn on_message(&self) -> MatcherBuilder {
        self.apply(routing::on_message())
    }

    /// See [`routing::on_notice`].
    pub fn on_notice(&self) -> MatcherBuilder {
        self.apply(routing::on_notice())
    }

    /// See [`routing::on_request`].
    pub fn on_request(&self) -> MatcherBuilder {
        self.apply(routing::on_request())
    }

    /// See [`routing::on_meta`].
    pub fn on_meta(&self) -> MatcherBuilder {
        self.apply(routing::on_meta())
    }

    /// See [`routing::on_command`].
    pub fn on_command(&self, name: impl Into<CommandName>) -> MatcherBuilder {
        self.apply(routing::on_command(name))
    }

    /// See [`routing::on_commands`].
    pub fn on_commands<I, C>(&self, names: I) -> MatcherBuilder
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandName>,
    {
        self.apply(routing::on_commands(names))
    }

    /// See [`routing::on_shell_command`].
    #[cfg(feature = "shell")]
    pub fn on_shell_command(
        &self,
        name: impl Into<CommandName>,
        parser: Option<clap::Command>,
    ) -> MatcherBuilder {
        self.apply(routing::on_shell_command(name, parser))
    }

    /// See [`routing::on_startswith`].
    pub fn on_startswith<I, S>(&self, prefixes: I, ignorecase: bool) -> MatcherBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(routing::on_startswith(prefixes, ignorecase))
    }

    /// See [`routing::on_endswith`].
    pub fn on_endswith<I, S>(&self, suffixes: I, ignorecase: bool) -> MatcherBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(routing::on_endswith(suffixes, ignorecase))
    }

    /// See [`routing::on_fullmatch`].
    pub fn on_fullmatch<I, S>(&self, texts: I, ignorecase: bool) -> MatcherBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(routing::on_fullmatch(texts, ignorecase))
    }

    /// See [`routing::on_keyword`].
    pub fn on_keyword<I, S>(&self, keywords: I) -> MatcherBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(routing::on_keyword(keywords))
    }

    /// See [`routing::on_regex`].
    pub fn on_regex(&self, pattern: &str) -> MatcherBuilder {
        self.apply(routing::on_regex(pattern))
    }

    /// See [`routing::on_type`].
    pub fn on_type<I>(&self, types: I) -> MatcherBuilder
    where
        I: IntoIterator<Item = TypeTag>,
    {
        self.apply(routing::on_type(types))
    }
}

/// Sub-commands of one base command.
#[derive(Clone)]
pub struct CommandGroup {
    base: Vec<String>,
    group: MatcherGroup,
}

impl CommandGroup {
    /// Creates a group for commands under `base`, starting from `defaults`.
    pub fn new(base: impl Into<CommandName>, defaults: MatcherBuilder) -> Self {
        Self {
            base: base.into().0,
            group: MatcherGroup::new(defaults),
        }
    }

    /// Returns the base command tokens.
    pub fn base(&self) -> &[String] {
        &self.base
    }

    fn join(&self, sub: impl Into<CommandName>) -> CommandName {
        let mut tokens = self.base.clone();
        tokens.extend(sub.into().0);
        CommandName(tokens)
    }

    /// Creates a matcher for the base command followed by `sub`.
    pub fn command(&self, sub: impl Into<CommandName>) -> MatcherBuilder {
        self.group.on_command(self.join(sub))
    }

    /// Creates a matcher for the shell-style base command followed by `sub`.
    #[cfg(feature = "shell")]
    pub fn shell_command(
        &self,
        sub: impl Into<CommandName>,
        parser: Option<clap::Command>,
    ) -> MatcherBuilder {
        self.group.on_shell_command(self.join(sub), parser)
    }
}

#[cfg(test)]
mod tests {
    use brass_core::BoxedBot;

    use super::*;
    use crate::config::EngineConfig;
    use crate::dependency::DependencyGraph;
    use crate::dispatcher::{Dispatcher, DispatcherBuilder};
    use crate::permission::Permission;
    use crate::rule::Rule;
    use crate::state::State;
    use crate::testing::{MockBot, TestEvent};

    fn dispatcher(builders: Vec<MatcherBuilder>) -> Dispatcher {
        let mut dispatcher = DispatcherBuilder::new(EngineConfig::default());
        for builder in builders {
            dispatcher.register(builder).unwrap();
        }
        dispatcher.build()
    }

    async fn replies(dispatcher: &Dispatcher, event: TestEvent) -> Vec<String> {
        let bot = MockBot::new();
        let boxed: BoxedBot = bot.clone();
        dispatcher.dispatch(boxed, event.boxed()).await;
        bot.sent()
    }

    #[test]
    fn test_own_settings_win() {
        let group = MatcherGroup::new(routing::on().priority(3).block(true).name("grouped"));
        let matcher = group
            .on_message()
            .priority(20)
            .build(&mut DependencyGraph::new(), &EngineConfig::default())
            .unwrap();

        assert_eq!(matcher.priority(), 20);
        assert!(matcher.is_blocking());
        assert_eq!(matcher.name(), "grouped");
        assert_eq!(matcher.event_type(), Some(EventType::Message));
    }

    #[tokio::test]
    async fn test_group_state_and_handlers_come_first() {
        let group = MatcherGroup::new(
            routing::on()
                .state("greeting", "hello")
                .handle(|| async { "from group" }),
        );
        let dispatcher = dispatcher(vec![
            group
                .on_startswith(["hi"], false)
                .state("name", "brass")
                .handle(|state: State| async move {
                    let greeting = state.get_str("greeting").unwrap_or_default();
                    let name = state.get_str("name").unwrap_or_default();
                    format!("{greeting} {name}")
                }),
        ]);

        assert_eq!(
            replies(&dispatcher, TestEvent::message("hi")).await,
            vec!["from group", "hello brass"]
        );
        assert!(replies(&dispatcher, TestEvent::message("bye")).await.is_empty());
    }

    #[tokio::test]
    async fn test_group_rule_and_permission_combine() {
        let group = MatcherGroup::new(
            routing::on()
                .rule(Rule::checker(|state: State| async move {
                    state.insert("checked", true);
                    true
                }))
                .permission(Permission::checker(|event: brass_core::BoxedEvent| async move {
                    event.user_id().as_deref() == Some("admin")
                })),
        );
        let dispatcher = dispatcher(vec![
            group
                .on_fullmatch(["ping"], false)
                .permission(Permission::checker(|event: brass_core::BoxedEvent| async move {
                    event.user_id().as_deref() == Some("u1")
                }))
                .handle(|state: State| async move {
                    state.get_as::<bool>("checked").map(|_| "pong")
                }),
        ]);

        assert_eq!(replies(&dispatcher, TestEvent::message("ping")).await, vec!["pong"]);
        assert_eq!(
            replies(&dispatcher, TestEvent::message("ping").user("admin")).await,
            vec!["pong"]
        );
        assert!(replies(&dispatcher, TestEvent::message("ping").user("u2")).await.is_empty());
        assert!(replies(&dispatcher, TestEvent::message("pong")).await.is_empty());
    }

    #[tokio::test]
    async fn test_command_group_prefixes_base() {
        let admin = CommandGroup::new("admin", routing::on().priority(2));
        let dispatcher = dispatcher(vec![
            admin.command("ban").handle(|| async { "banned" }),
            admin.command(["user", "list"]).handle(|| async { "listed" }),
        ]);

        assert_eq!(admin.base(), ["admin"]);
        assert_eq!(
            replies(&dispatcher, TestEvent::message("/admin.ban u2")).await,
            vec!["banned"]
        );
        assert_eq!(
            replies(&dispatcher, TestEvent::message("/admin.user.list")).await,
            vec!["listed"]
        );
        assert!(replies(&dispatcher, TestEvent::message("/ban u2")).await.is_empty());
    }
}
