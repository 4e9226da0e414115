//! Parameter declarations and the providers that claim them.
//!
//! A dependent declares an ordered list of [`ParamDecl`]s. At registration
//! every declaration is offered to the allowed [`ParamKind`]s in their fixed
//! order; the first one that recognises it turns it into a [`Param`].

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use brass_core::{BoxedBot, BoxedEvent, Message};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::SolveContext;
use crate::error::{HandlerError, RegistrationResult, SolveError, SolveResult};
use crate::matcher::MatcherHandle;
use crate::state::State;

use super::Dependency;
use super::graph::DependencyGraph;
use super::provider::DependsOn;

/// The kinds of value a parameter can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKind {
    /// A sub-dependency.
    Depends,
    /// The bot the event arrived on.
    Bot,
    /// The event itself.
    Event,
    /// The matcher state.
    State,
    /// A named slot from the matcher state.
    Arg,
    /// The running matcher instance.
    Matcher,
    /// The fault of the run that just ended.
    Exception,
    /// A declared default value.
    Default,
}

impl ParamKind {
    /// Kinds available to rule checkers.
    pub const RULE: &'static [ParamKind] = &[
        ParamKind::Depends,
        ParamKind::Bot,
        ParamKind::Event,
        ParamKind::State,
        ParamKind::Default,
    ];

    /// Kinds available to permission checkers.
    pub const PERMISSION: &'static [ParamKind] = &[
        ParamKind::Depends,
        ParamKind::Bot,
        ParamKind::Event,
        ParamKind::Default,
    ];

    /// Kinds available to handlers.
    pub const HANDLER: &'static [ParamKind] = &[
        ParamKind::Depends,
        ParamKind::Bot,
        ParamKind::Event,
        ParamKind::State,
        ParamKind::Arg,
        ParamKind::Matcher,
        ParamKind::Default,
    ];

    /// Kinds available to event pre- and postprocessors.
    pub const EVENT_HOOK: &'static [ParamKind] = &[
        ParamKind::Depends,
        ParamKind::Bot,
        ParamKind::Event,
        ParamKind::State,
        ParamKind::Default,
    ];

    /// Kinds available to run preprocessors.
    pub const RUN_PRE_HOOK: &'static [ParamKind] = &[
        ParamKind::Depends,
        ParamKind::Bot,
        ParamKind::Event,
        ParamKind::State,
        ParamKind::Matcher,
        ParamKind::Default,
    ];

    /// Kinds available to type and permission updaters.
    pub const UPDATER: &'static [ParamKind] = &[
        ParamKind::Depends,
        ParamKind::Bot,
        ParamKind::Event,
        ParamKind::State,
        ParamKind::Matcher,
        ParamKind::Default,
    ];

    /// Kinds available to run postprocessors.
    pub const RUN_POST_HOOK: &'static [ParamKind] = &[
        ParamKind::Depends,
        ParamKind::Bot,
        ParamKind::Event,
        ParamKind::State,
        ParamKind::Matcher,
        ParamKind::Exception,
        ParamKind::Default,
    ];
}

/// Runtime identity of a concrete bot or event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Returns the tag of `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the type id.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn matches(&self, value: &dyn Any) -> bool {
        (*value).type_id() == self.id
    }
}

/// What a parameter says it wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Annotation {
    /// Nothing; only the parameter name and markers can identify it.
    #[default]
    None,
    /// A bot, optionally of one concrete type.
    Bot(Option<TypeTag>),
    /// An event, optionally of one concrete type.
    Event(Option<TypeTag>),
    /// The matcher state.
    State,
    /// The running matcher.
    Matcher,
    /// The fault of the run that just ended.
    Exception,
    /// A plain value of the named type.
    Value(&'static str),
}

/// How a named slot is handed to the parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgKind {
    /// The message as stored.
    #[default]
    Message,
    /// The message rendered to a string.
    Str,
    /// Only the text segments of the message.
    PlainText,
}

/// An explicit marker attached to a parameter.
#[derive(Clone)]
pub enum Marker {
    /// Resolve through a sub-dependency.
    Depends(DependsOn),
    /// Resolve from a named slot. Without a key, the parameter name is used.
    Arg {
        /// The slot key.
        key: Option<String>,
        /// How the slot is handed over.
        kind: ArgKind,
    },
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Depends(on) => f.debug_tuple("Depends").field(&on.name()).finish(),
            Marker::Arg { key, kind } => f
                .debug_struct("Arg")
                .field("key", key)
                .field("kind", kind)
                .finish(),
        }
    }
}

/// A declared parameter, before any provider has claimed it.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub(crate) name: String,
    pub(crate) annotation: Annotation,
    pub(crate) default: Option<Value>,
    pub(crate) marker: Option<Marker>,
}

impl ParamDecl {
    /// Declares a parameter known only by its name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: Annotation::None,
            default: None,
            marker: None,
        }
    }

    /// Sets the annotation.
    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotation = annotation;
        self
    }

    /// Sets a default used when nothing else claims the parameter.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Binds the parameter to a sub-dependency.
    pub fn depends(mut self, on: DependsOn) -> Self {
        self.marker = Some(Marker::Depends(on));
        self
    }

    /// Binds the parameter to the slot of the same name.
    pub fn arg(self, kind: ArgKind) -> Self {
        self.arg_key(None::<String>, kind)
    }

    /// Binds the parameter to an explicitly keyed slot.
    pub fn arg_key(mut self, key: Option<impl Into<String>>, kind: ArgKind) -> Self {
        self.marker = Some(Marker::Arg {
            key: key.map(Into::into),
            kind,
        });
        self
    }

    /// Returns the parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A parameter bound to its provider.
#[derive(Clone)]
pub enum Param {
    /// The bot, checked against a concrete type if one was declared.
    Bot {
        /// The expected concrete type.
        expect: Option<TypeTag>,
    },
    /// The event, checked against a concrete type if one was declared.
    Event {
        /// The expected concrete type.
        expect: Option<TypeTag>,
    },
    /// The matcher state.
    State,
    /// The running matcher.
    Matcher,
    /// A named slot.
    Arg {
        /// The slot key.
        key: String,
        /// How the slot is handed over.
        kind: ArgKind,
    },
    /// A sub-dependency.
    Depends {
        /// The parsed sub-dependency.
        dependency: Arc<Dependency>,
        /// Whether the per-event cache is used.
        use_cache: bool,
    },
    /// The fault of the run that just ended.
    Exception,
    /// A constant.
    Default(Value),
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Bot { expect } => f.debug_struct("Bot").field("expect", expect).finish(),
            Param::Event { expect } => f.debug_struct("Event").field("expect", expect).finish(),
            Param::State => f.write_str("State"),
            Param::Matcher => f.write_str("Matcher"),
            Param::Arg { key, kind } => f
                .debug_struct("Arg")
                .field("key", key)
                .field("kind", kind)
                .finish(),
            Param::Depends {
                dependency,
                use_cache,
            } => f
                .debug_struct("Depends")
                .field("dependency", &dependency.name())
                .field("use_cache", use_cache)
                .finish(),
            Param::Exception => f.write_str("Exception"),
            Param::Default(value) => f.debug_tuple("Default").field(value).finish(),
        }
    }
}

impl Param {
    /// Offers `decl` to the provider of `kind`.
    ///
    /// Returns `None` if that provider does not recognise the declaration.
    pub(crate) fn claim(
        kind: ParamKind,
        decl: &ParamDecl,
        allowed: &[ParamKind],
        graph: &mut DependencyGraph,
    ) -> RegistrationResult<Option<Param>> {
        let param = match kind {
            ParamKind::Depends => match &decl.marker {
                Some(Marker::Depends(on)) => Some(Param::Depends {
                    dependency: graph.resolve(on, allowed)?,
                    use_cache: on.use_cache(),
                }),
                _ => None,
            },
            ParamKind::Bot => match decl.annotation {
                Annotation::Bot(expect) => Some(Param::Bot { expect }),
                Annotation::None if decl.marker.is_none() && decl.name == "bot" => {
                    Some(Param::Bot { expect: None })
                }
                _ => None,
            },
            ParamKind::Event => match decl.annotation {
                Annotation::Event(expect) => Some(Param::Event { expect }),
                Annotation::None if decl.marker.is_none() && decl.name == "event" => {
                    Some(Param::Event { expect: None })
                }
                _ => None,
            },
            ParamKind::State => match decl.annotation {
                Annotation::State => Some(Param::State),
                Annotation::None if decl.marker.is_none() && decl.name == "state" => {
                    Some(Param::State)
                }
                _ => None,
            },
            ParamKind::Arg => match &decl.marker {
                Some(Marker::Arg { key, kind }) => Some(Param::Arg {
                    key: key.clone().unwrap_or_else(|| decl.name.clone()),
                    kind: *kind,
                }),
                _ => None,
            },
            ParamKind::Matcher => match decl.annotation {
                Annotation::Matcher => Some(Param::Matcher),
                Annotation::None if decl.marker.is_none() && decl.name == "matcher" => {
                    Some(Param::Matcher)
                }
                _ => None,
            },
            ParamKind::Exception => match decl.annotation {
                Annotation::Exception => Some(Param::Exception),
                Annotation::None if decl.marker.is_none() && decl.name == "exception" => {
                    Some(Param::Exception)
                }
                _ => None,
            },
            ParamKind::Default => decl.default.clone().map(Param::Default),
        };
        Ok(param)
    }

    /// Runs the pre-check of this parameter.
    ///
    /// Type expectations are enforced here, before anything is resolved.
    pub(crate) fn check<'a>(
        &'a self,
        name: &'a str,
        cx: &'a SolveContext,
    ) -> BoxFuture<'a, SolveResult<()>> {
        Box::pin(async move {
            match self {
                Param::Bot {
                    expect: Some(expect),
                } => {
                    let any = cx.bot().clone().as_any();
                    if !expect.matches(any.as_ref()) {
                        return Err(SolveError::TypeMismatch {
                            param: name.to_string(),
                            expected: expect.name(),
                        });
                    }
                    Ok(())
                }
                Param::Event {
                    expect: Some(expect),
                } => {
                    if !expect.matches(cx.event().as_any()) {
                        return Err(SolveError::TypeMismatch {
                            param: name.to_string(),
                            expected: expect.name(),
                        });
                    }
                    Ok(())
                }
                Param::Depends { dependency, .. } => dependency.dependent().check(cx).await,
                _ => Ok(()),
            }
        })
    }

    /// Resolves this parameter against the context.
    pub(crate) fn solve<'a>(
        &'a self,
        name: &'a str,
        cx: &'a SolveContext,
    ) -> BoxFuture<'a, SolveResult<Resolved>> {
        Box::pin(async move {
            match self {
                Param::Bot { .. } => Ok(Resolved::Bot(cx.bot().clone())),
                Param::Event { .. } => Ok(Resolved::Event(cx.event().clone())),
                Param::State => cx
                    .state()
                    .cloned()
                    .map(Resolved::State)
                    .ok_or_else(|| unavailable(name, "state")),
                Param::Matcher => cx
                    .matcher()
                    .cloned()
                    .map(Resolved::Matcher)
                    .ok_or_else(|| unavailable(name, "matcher")),
                Param::Arg { key, kind } => {
                    let state = cx.state().ok_or_else(|| unavailable(name, "state"))?;
                    let message = state.get_message(key);
                    Ok(match kind {
                        ArgKind::Message => Resolved::Message(message),
                        ArgKind::Str => Resolved::Value(
                            message.map_or(Value::Null, |m| Value::String(m.to_string())),
                        ),
                        ArgKind::PlainText => Resolved::Value(
                            message.map_or(Value::Null, |m| Value::String(m.extract_plain_text())),
                        ),
                    })
                }
                Param::Depends {
                    dependency,
                    use_cache,
                } => {
                    let value = if *use_cache {
                        cx.pass()
                            .cache()
                            .get_or_solve(dependency.id(), || dependency.provide(cx))
                            .await?
                    } else {
                        dependency.provide(cx).await?
                    };
                    Ok(Resolved::Provided(value))
                }
                Param::Exception => Ok(Resolved::Exception(cx.exception().cloned())),
                Param::Default(value) => Ok(Resolved::Value(value.clone())),
            }
        })
    }
}

fn unavailable(param: &str, what: &str) -> SolveError {
    SolveError::fault(format!("parameter '{param}' needs a {what}, none is bound"))
}

/// A value produced by a sub-dependency.
#[derive(Clone)]
pub struct Provided(Arc<dyn Any + Send + Sync>);

impl Provided {
    /// Wraps a value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Attempts to view the value as `T`.
    pub fn downcast<T: Send + Sync + 'static>(self) -> Option<Arc<T>> {
        self.0.downcast().ok()
    }

    /// Returns a reference to the value as `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for Provided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Provided(..)")
    }
}

/// A resolved parameter value.
#[derive(Clone)]
pub enum Resolved {
    /// The bot.
    Bot(BoxedBot),
    /// The event.
    Event(BoxedEvent),
    /// The matcher state.
    State(State),
    /// The running matcher.
    Matcher(MatcherHandle),
    /// A slot as a message; `None` if the slot is empty.
    Message(Option<Message>),
    /// A plain JSON value.
    Value(Value),
    /// The fault of the run that just ended, if there was one.
    Exception(Option<HandlerError>),
    /// A sub-dependency's output.
    Provided(Provided),
}

impl Resolved {
    /// Short description used in mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Resolved::Bot(_) => "bot",
            Resolved::Event(_) => "event",
            Resolved::State(_) => "state",
            Resolved::Matcher(_) => "matcher",
            Resolved::Message(_) => "message",
            Resolved::Value(_) => "value",
            Resolved::Exception(_) => "exception",
            Resolved::Provided(_) => "provided",
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Message(m) => f.debug_tuple("Message").field(m).finish(),
            Resolved::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Resolved::Exception(e) => f.debug_tuple("Exception").field(e).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Resolved arguments of one call, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedArgs {
    values: Vec<(String, Resolved)>,
}

impl ResolvedArgs {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, name: String, value: Resolved) {
        self.values.push((name, value));
    }

    /// Returns the number of resolved arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the argument named `name`.
    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns the first resolved bot.
    pub fn bot(&self) -> Option<BoxedBot> {
        self.values.iter().find_map(|(_, v)| match v {
            Resolved::Bot(bot) => Some(bot.clone()),
            _ => None,
        })
    }

    /// Returns the first resolved event.
    pub fn event(&self) -> Option<BoxedEvent> {
        self.values.iter().find_map(|(_, v)| match v {
            Resolved::Event(event) => Some(event.clone()),
            _ => None,
        })
    }

    /// Returns the first resolved state.
    pub fn state(&self) -> Option<State> {
        self.values.iter().find_map(|(_, v)| match v {
            Resolved::State(state) => Some(state.clone()),
            _ => None,
        })
    }

    /// Returns the first resolved matcher.
    pub fn matcher(&self) -> Option<MatcherHandle> {
        self.values.iter().find_map(|(_, v)| match v {
            Resolved::Matcher(matcher) => Some(matcher.clone()),
            _ => None,
        })
    }

    /// Returns the slot message bound to `name`.
    pub fn message(&self, name: &str) -> Option<Message> {
        match self.get(name)? {
            Resolved::Message(message) => message.clone(),
            _ => None,
        }
    }

    /// Returns the plain value bound to `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name)? {
            Resolved::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the string bound to `name`, from a text slot or a default.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Resolved::Value(Value::String(s)) => Some(s.clone()),
            Resolved::Message(Some(message)) => Some(message.to_string()),
            _ => None,
        }
    }

    /// Returns the sub-dependency output bound to `name`.
    pub fn provided<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        match self.get(name)? {
            Resolved::Provided(p) => p.clone().downcast(),
            _ => None,
        }
    }

    /// Returns the exception bound to any parameter.
    pub fn exception(&self) -> Option<&HandlerError> {
        self.values.iter().find_map(|(_, v)| match v {
            Resolved::Exception(e) => e.as_ref(),
            _ => None,
        })
    }
}

impl IntoIterator for ResolvedArgs {
    type Item = (String, Resolved);
    type IntoIter = std::vec::IntoIter<(String, Resolved)>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
