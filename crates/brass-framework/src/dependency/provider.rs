//! Sub-dependency providers.
//!
//! A provider is a dependent whose output is handed to other dependents. It
//! may be plain, fallible, or scoped; a scoped provider registers a teardown
//! on the event's exit stack.

use std::any::{TypeId, type_name};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;

use crate::error::{HandlerError, SolveError};

use super::dependent::Declared;
use super::extract::IntoDeclared;
use super::param::{ParamDecl, Provided, ResolvedArgs};

/// Identity of a sub-dependency, used for caching and cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyId {
    /// A provider named by an [`Injectable`] type.
    Type(TypeId),
    /// An ad-hoc provider.
    Anonymous(u64),
}

impl DependencyId {
    fn next_anonymous() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self::Anonymous(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A value with a teardown that runs once the event is fully processed.
pub struct Scoped<T> {
    value: T,
    teardown: BoxFuture<'static, ()>,
}

impl<T> Scoped<T> {
    /// Pairs `value` with its teardown.
    pub fn new<Fut>(value: T, teardown: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            value,
            teardown: Box::pin(teardown),
        }
    }
}

/// The output of a provider call.
pub(crate) struct Supplied {
    pub(crate) value: Provided,
    pub(crate) teardown: Option<BoxFuture<'static, ()>>,
}

impl Supplied {
    fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Provided::new(value),
            teardown: None,
        }
    }
}

/// A sub-dependency provider.
#[derive(Clone)]
pub struct Provider(pub(crate) Declared<Supplied>);

impl Provider {
    /// Provides whatever `f` returns.
    pub fn new<F, T, Out>(f: F) -> Self
    where
        F: IntoDeclared<T, Out>,
        Out: Send + Sync + 'static,
    {
        Self(f.into_declared().map(|out| Ok(Supplied::value(out))))
    }

    /// Provides the success value of `f`; an error is a fault.
    pub fn fallible<F, T, Out, E>(f: F) -> Self
    where
        F: IntoDeclared<T, Result<Out, E>>,
        Out: Send + Sync + 'static,
        E: Display + Send + 'static,
    {
        Self(f.into_declared().map(|out| match out {
            Ok(value) => Ok(Supplied::value(value)),
            Err(err) => Err(SolveError::Fault(HandlerError::new(err))),
        }))
    }

    /// Provides the value of a [`Scoped`] and registers its teardown.
    pub fn scoped<F, T, Out>(f: F) -> Self
    where
        F: IntoDeclared<T, Scoped<Out>>,
        Out: Send + Sync + 'static,
    {
        Self(f.into_declared().map(|scoped: Scoped<Out>| {
            Ok(Supplied {
                value: Provided::new(scoped.value),
                teardown: Some(scoped.teardown),
            })
        }))
    }

    /// Provides over explicitly listed parameters.
    pub fn dynamic<F, Fut, Out>(name: impl Into<String>, decls: Vec<ParamDecl>, f: F) -> Self
    where
        F: Fn(ResolvedArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, SolveError>> + Send + 'static,
        Out: Send + Sync + 'static,
    {
        Self(Declared::dynamic(name, decls, f).map(|out| Ok(Supplied::value(out))))
    }
}

/// A type that names a sub-dependency.
///
/// Every use of the same `Injectable` within one event shares one cached
/// value unless the parameter opts out of caching.
///
/// ```rust,ignore
/// struct Greeting;
///
/// impl Injectable for Greeting {
///     type Output = String;
///
///     fn provider() -> Provider {
///         Provider::new(|event: BoxedEvent| async move {
///             format!("hello {}", event.user_id().unwrap_or_default())
///         })
///     }
/// }
/// ```
pub trait Injectable: Send + Sync + 'static {
    /// The provided value.
    type Output: Send + Sync + 'static;

    /// Returns the provider.
    fn provider() -> Provider;
}

/// A reference to a sub-dependency, attached to a parameter declaration.
#[derive(Clone)]
pub struct DependsOn {
    id: DependencyId,
    name: String,
    build: Arc<dyn Fn() -> Provider + Send + Sync>,
    use_cache: bool,
}

impl DependsOn {
    /// Refers to the provider of `D`.
    pub fn of<D: Injectable>() -> Self {
        Self {
            id: DependencyId::Type(TypeId::of::<D>()),
            name: type_name::<D>().to_string(),
            build: Arc::new(D::provider),
            use_cache: true,
        }
    }

    /// Refers to an ad-hoc provider with a fresh identity.
    pub fn provider(name: impl Into<String>, provider: Provider) -> Self {
        Self {
            id: DependencyId::next_anonymous(),
            name: name.into(),
            build: Arc::new(move || provider.clone()),
            use_cache: true,
        }
    }

    /// Disables the per-event cache for this use.
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Returns the identity.
    pub fn id(&self) -> DependencyId {
        self.id
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the per-event cache is used.
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub(crate) fn build(&self) -> Provider {
        (self.build)()
    }
}
