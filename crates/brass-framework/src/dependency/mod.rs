//! Dependency injection.
//!
//! Checkers, handlers, hooks and providers are all *dependents*: callables
//! whose parameters are declared up front and bound to providers when they
//! are registered. Binding failures surface at registration, never per
//! event.
//!
//! # Lifecycle
//!
//! 1. [`Declared`]: a callable plus its [`ParamDecl`]s, usually produced from
//!    an async function through [`IntoDeclared`].
//! 2. [`Declared::parse`]: every declaration is offered to the allowed
//!    [`ParamKind`]s in fixed order, yielding a [`Dependent`].
//! 3. [`Dependent::call`]: pre-checks run concurrently, parameters resolve in
//!    order, then the callable runs.
//!
//! Sub-dependencies are cached per event in a [`DependencyCache`] and may
//! register teardowns on an [`ExitStack`].

mod cache;
mod dependent;
mod extract;
mod graph;
mod param;
mod provider;
mod stack;

pub use cache::DependencyCache;
pub use dependent::{Declared, Dependent};
pub use extract::{
    Arg, ArgKey, ArgPlainText, ArgStr, BotContext, Depends, EventContext, Exception, Fresh,
    FromParam, IntoDeclared,
};
pub use graph::DependencyGraph;
pub use param::{
    Annotation, ArgKind, Marker, Param, ParamDecl, ParamKind, Provided, Resolved, ResolvedArgs,
    TypeTag,
};
pub use provider::{DependencyId, DependsOn, Injectable, Provider, Scoped};
pub use stack::ExitStack;

use crate::context::SolveContext;
use crate::error::SolveResult;

use provider::Supplied;

/// A parsed sub-dependency.
pub struct Dependency {
    id: DependencyId,
    name: String,
    dependent: Dependent<Supplied>,
}

impl Dependency {
    pub(crate) fn new(id: DependencyId, name: String, dependent: Dependent<Supplied>) -> Self {
        Self {
            id,
            name,
            dependent,
        }
    }

    /// Returns the identity.
    pub fn id(&self) -> DependencyId {
        self.id
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn dependent(&self) -> &Dependent<Supplied> {
        &self.dependent
    }

    /// Evaluates the provider, registering its teardown if it has one.
    pub(crate) async fn provide(&self, cx: &SolveContext) -> SolveResult<Provided> {
        let supplied = self.dependent.call(cx).await?;
        if let Some(teardown) = supplied.teardown {
            cx.pass().stack().push(self.name.clone(), teardown);
        }
        Ok(supplied.value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use brass_core::{BoxedBot, BoxedEvent};
    use serde_json::json;

    use super::*;
    use crate::config::EngineConfig;
    use crate::context::{EventPass, SolveContext};
    use crate::error::{RegistrationError, SolveError};
    use crate::state::State;
    use crate::testing::{MockBot, OtherEvent, TestEvent};

    fn context() -> SolveContext {
        let bot: BoxedBot = MockBot::new();
        let event = BoxedEvent::new(TestEvent::message("hello"));
        SolveContext::new(bot, event, EventPass::new(Arc::new(EngineConfig::default())))
            .with_state(State::new())
    }

    static COUNTER_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Counter;

    impl Injectable for Counter {
        type Output = usize;

        fn provider() -> Provider {
            Provider::new(|| async { COUNTER_CALLS.fetch_add(1, Ordering::SeqCst) + 100 })
        }
    }

    struct Ouroboros;

    impl Injectable for Ouroboros {
        type Output = ();

        fn provider() -> Provider {
            Provider::new(|_tail: Depends<Tail>| async {})
        }
    }

    struct Tail;

    impl Injectable for Tail {
        type Output = ();

        fn provider() -> Provider {
            Provider::new(|_head: Depends<Ouroboros>| async {})
        }
    }

    #[tokio::test]
    async fn test_typed_function_resolves_in_order() {
        let declared = (|event: BoxedEvent, state: State| async move {
            state.insert("seen", event.plain_text());
            event.event_name().to_string()
        })
        .into_declared();
        let mut graph = DependencyGraph::new();
        let dependent = declared.parse(ParamKind::RULE, &mut graph).unwrap();

        let cx = context();
        let name = dependent.call(&cx).await.unwrap();

        assert_eq!(name, "message.test");
        assert_eq!(cx.state().unwrap().get("seen"), Some(json!("hello")));
    }

    #[tokio::test]
    async fn test_unclaimed_parameter_fails_registration() {
        let declared = (|_state: State| async { true }).into_declared();
        let mut graph = DependencyGraph::new();
        let err = declared
            .named("needs_state")
            .parse(ParamKind::PERMISSION, &mut graph)
            .unwrap_err();

        assert!(matches!(
            err,
            RegistrationError::UnknownParameter { ref dependent, .. } if dependent == "needs_state"
        ));
    }

    #[tokio::test]
    async fn test_cached_dependency_runs_once_per_event() {
        let declared = (|a: Depends<Counter>, b: Depends<Counter>| async move { (*a, *b) })
            .into_declared();
        let mut graph = DependencyGraph::new();
        let dependent = declared.parse(ParamKind::HANDLER, &mut graph).unwrap();

        let before = COUNTER_CALLS.load(Ordering::SeqCst);
        let cx = context();
        let (a, b) = dependent.call(&cx).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(COUNTER_CALLS.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn test_dependency_cycle_is_rejected() {
        let declared = (|_d: Depends<Ouroboros>| async {}).into_declared();
        let mut graph = DependencyGraph::new();
        let err = declared.parse(ParamKind::HANDLER, &mut graph).unwrap_err();

        match err {
            RegistrationError::DependencyCycle { path } => {
                assert_eq!(path.len(), 3);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_type_mismatch_opts_out() {
        let declared = (|_event: EventContext<OtherEvent>| async { true }).into_declared();
        let mut graph = DependencyGraph::new();
        let dependent = declared.parse(ParamKind::RULE, &mut graph).unwrap();

        let err = dependent.call(&context()).await.unwrap_err();
        assert!(matches!(err, SolveError::TypeMismatch { .. }));
        assert!(err.is_opt_out());
    }

    #[tokio::test]
    async fn test_dynamic_params_by_name_and_default() {
        let declared = Declared::dynamic(
            "dynamic",
            vec![
                ParamDecl::named("event"),
                ParamDecl::named("greeting").with_default("hi"),
                ParamDecl::named("slot").arg(ArgKind::PlainText),
            ],
            |args: ResolvedArgs| async move {
                let event = args.event().ok_or(SolveError::Skipped)?;
                Ok(format!(
                    "{} {} {:?}",
                    args.text("greeting").unwrap_or_default(),
                    event.plain_text(),
                    args.text("slot")
                ))
            },
        );
        let mut graph = DependencyGraph::new();
        let dependent = declared.parse(ParamKind::HANDLER, &mut graph).unwrap();

        let cx = context();
        cx.state()
            .unwrap()
            .set_message("slot", &brass_core::Message::from("42"));
        let out = dependent.call(&cx).await.unwrap();
        assert_eq!(out, "hi hello Some(\"42\")");
    }

    struct Slot;

    impl ArgKey for Slot {
        const KEY: &'static str = "slot";
    }

    #[tokio::test]
    async fn test_typed_slot_extractors() {
        let declared = (|raw: Arg<Slot>, text: ArgStr<Slot>, plain: ArgPlainText<Slot>| async move {
            (raw.into_inner(), text.into_inner(), plain.into_inner())
        })
        .into_declared();
        let dependent = declared
            .parse(ParamKind::HANDLER, &mut DependencyGraph::new())
            .unwrap();

        let cx = context();
        assert_eq!(dependent.call(&cx).await.unwrap(), (None, None, None));

        let message = brass_core::Message::new().at("1").text("42");
        cx.state().unwrap().set_message("slot", &message);
        let (raw, text, plain) = dependent.call(&cx).await.unwrap();
        assert_eq!(raw, Some(message.clone()));
        assert_eq!(text, Some(message.to_string()));
        assert_eq!(plain.as_deref(), Some("42"));
    }

    #[test]
    fn test_typed_slot_not_allowed_in_rules() {
        let declared = (|_: ArgStr<Slot>| async { true }).into_declared();
        let result = declared.parse(ParamKind::RULE, &mut DependencyGraph::new());
        assert!(matches!(
            result,
            Err(RegistrationError::UnknownParameter { .. })
        ));
    }

    #[tokio::test]
    async fn test_scoped_teardown_runs_on_close() {
        let closed = Arc::new(AtomicUsize::new(0));
        let flag = closed.clone();
        let provider = Provider::scoped(move || {
            let flag = flag.clone();
            async move {
                Scoped::new("session", async move {
                    flag.fetch_add(1, Ordering::SeqCst);
                })
            }
        });
        let on = DependsOn::provider("scoped", provider);
        let declared = Declared::dynamic(
            "uses_scoped",
            vec![ParamDecl::named("db").depends(on)],
            |args: ResolvedArgs| async move {
                Ok(args.provided::<&'static str>("db").map(|v| *v))
            },
        );
        let mut graph = DependencyGraph::new();
        let dependent = declared.parse(ParamKind::HANDLER, &mut graph).unwrap();

        let cx = context();
        assert_eq!(dependent.call(&cx).await.unwrap(), Some("session"));
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        cx.pass().close().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
