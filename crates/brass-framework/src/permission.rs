//! Permissions decide whether the event's sender may trigger a matcher.
//!
//! A [`Permission`] is a disjunction: it passes if any of its terms passes,
//! and a permission without terms always passes. Permission checkers see the
//! bot and the event but never the matcher state.

use std::collections::HashSet;
use std::ops::BitOr;
use std::sync::Arc;

use brass_core::{BoxedEvent, EventType};
use futures::future::{BoxFuture, join_all};

use crate::config::EngineConfig;
use crate::context::SolveContext;
use crate::dependency::{Declared, Dependent, DependencyGraph, IntoDeclared, ParamKind};
use crate::error::RegistrationResult;
use crate::rule::run_checkers;

#[derive(Clone)]
enum Term {
    Checker(Declared<bool>),
    Superuser,
    User {
        sessions: Arc<HashSet<String>>,
        inner: Option<Box<Permission>>,
    },
}

/// A disjunction of permission checkers.
#[derive(Clone, Default)]
pub struct Permission {
    terms: Vec<Term>,
}

impl Permission {
    /// Creates a permission that always passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a permission from one async checker.
    pub fn checker<F, T>(f: F) -> Self
    where
        F: IntoDeclared<T, bool>,
    {
        Self::from_declared(f.into_declared())
    }

    /// Creates a permission from an already declared checker.
    pub fn from_declared(checker: Declared<bool>) -> Self {
        Self {
            terms: vec![Term::Checker(checker)],
        }
    }

    fn named_checker<F, T>(name: &str, f: F) -> Self
    where
        F: IntoDeclared<T, bool>,
    {
        Self::from_declared(f.into_declared().named(name))
    }

    /// Returns the permission passing if either `self` or `other` does.
    pub fn or(mut self, other: Permission) -> Self {
        self.terms.extend(other.terms);
        self
    }

    /// Returns true if the permission always passes.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub(crate) fn compile(
        &self,
        graph: &mut DependencyGraph,
        config: &EngineConfig,
    ) -> RegistrationResult<CompiledPermission> {
        let mut checkers = Vec::new();
        let mut superusers = None;
        let mut users = Vec::new();

        for term in &self.terms {
            match term {
                Term::Checker(declared) => {
                    checkers.push(declared.parse(ParamKind::PERMISSION, graph)?);
                }
                Term::Superuser => {
                    superusers = Some(Arc::new(
                        config.superusers.iter().cloned().collect::<HashSet<_>>(),
                    ));
                }
                Term::User { sessions, inner } => {
                    let inner = match inner {
                        Some(permission) => Some(permission.compile(graph, config)?),
                        None => None,
                    };
                    users.push((sessions.clone(), inner));
                }
            }
        }

        Ok(CompiledPermission {
            inner: Arc::new(CompiledInner {
                always: self.terms.is_empty(),
                checkers,
                superusers,
                users,
            }),
        })
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        self.or(rhs)
    }
}

struct CompiledInner {
    always: bool,
    checkers: Vec<Dependent<bool>>,
    superusers: Option<Arc<HashSet<String>>>,
    users: Vec<(Arc<HashSet<String>>, Option<CompiledPermission>)>,
}

/// A permission whose checkers are bound to providers.
#[derive(Clone)]
pub struct CompiledPermission {
    inner: Arc<CompiledInner>,
}

impl Default for CompiledPermission {
    fn default() -> Self {
        Self {
            inner: Arc::new(CompiledInner {
                always: true,
                checkers: Vec::new(),
                superusers: None,
                users: Vec::new(),
            }),
        }
    }
}

impl CompiledPermission {
    /// Evaluates every term concurrently; true if any passes.
    pub fn check<'a>(&'a self, cx: &'a SolveContext) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let inner = &self.inner;
            if inner.always {
                return true;
            }

            if let Some(superusers) = &inner.superusers
                && cx
                    .event()
                    .user_id()
                    .is_some_and(|user| superusers.contains(&user))
            {
                return true;
            }

            let session = cx.event().session_id();
            let users = join_all(inner.users.iter().map(|(sessions, perm)| {
                let in_session = session.as_ref().is_some_and(|s| sessions.contains(s));
                async move {
                    match (in_session, perm) {
                        (false, _) => false,
                        (true, None) => true,
                        (true, Some(perm)) => perm.check(cx).await,
                    }
                }
            }));
            let (checkers, users) = futures::join!(run_checkers(&inner.checkers, cx), users);

            checkers.into_iter().chain(users).any(|ok| ok)
        })
    }
}

fn event_type_is(name: &'static str, wanted: EventType) -> Permission {
    Permission::named_checker(name, move |event: BoxedEvent| async move {
        event.event_type() == wanted
    })
}

/// Passes for message events.
pub fn message() -> Permission {
    event_type_is("message", EventType::Message)
}

/// Passes for notice events.
pub fn notice() -> Permission {
    event_type_is("notice", EventType::Notice)
}

/// Passes for request events.
pub fn request() -> Permission {
    event_type_is("request", EventType::Request)
}

/// Passes for meta events.
pub fn meta_event() -> Permission {
    event_type_is("meta_event", EventType::Meta)
}

/// Passes for events sent by a configured superuser.
pub fn superuser() -> Permission {
    Permission {
        terms: vec![Term::Superuser],
    }
}

/// Passes for events from one of `sessions`, further restricted by `inner`.
pub fn user<I, S>(sessions: I, inner: Option<Permission>) -> Permission
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Permission {
        terms: vec![Term::User {
            sessions: Arc::new(sessions.into_iter().map(Into::into).collect()),
            inner: inner.map(Box::new),
        }],
    }
}

#[cfg(test)]
mod tests {
    use brass_core::BoxedBot;

    use super::*;
    use crate::context::EventPass;
    use crate::testing::{MockBot, TestEvent};

    async fn allows(permission: Permission, config: EngineConfig, event: TestEvent) -> bool {
        let config = Arc::new(config);
        let compiled = permission
            .compile(&mut DependencyGraph::new(), &config)
            .unwrap();
        let bot: BoxedBot = MockBot::new();
        let cx = SolveContext::new(bot, event.boxed(), EventPass::new(config));
        compiled.check(&cx).await
    }

    #[tokio::test]
    async fn test_empty_permission_allows() {
        assert!(allows(Permission::new(), EngineConfig::default(), TestEvent::notice()).await);
    }

    #[tokio::test]
    async fn test_disjunction() {
        let perm = notice() | message();
        assert!(allows(perm.clone(), EngineConfig::default(), TestEvent::message("x")).await);
        assert!(!allows(request() | meta_event(), EngineConfig::default(), TestEvent::message("x")).await);
    }

    #[tokio::test]
    async fn test_superuser_from_config() {
        let config = EngineConfig::default().with_superusers(["admin"]);
        assert!(allows(superuser(), config.clone(), TestEvent::message("x").user("admin")).await);
        assert!(!allows(superuser(), config, TestEvent::message("x").user("guest")).await);
    }

    #[tokio::test]
    async fn test_user_with_inner_permission() {
        let perm = user(["s1"], Some(notice()));
        assert!(allows(perm.clone(), EngineConfig::default(), TestEvent::notice()).await);
        assert!(!allows(perm.clone(), EngineConfig::default(), TestEvent::message("x")).await);
        assert!(!allows(perm, EngineConfig::default(), TestEvent::notice().session("s2")).await);
    }
}
