//! Declared and parsed dependents.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tracing::trace;

use crate::context::SolveContext;
use crate::error::{RegistrationError, RegistrationResult, SolveError, SolveResult};

use super::graph::DependencyGraph;
use super::param::{Param, ParamDecl, ParamKind, ResolvedArgs};

/// The callable behind a dependent, fed with its resolved arguments.
pub(crate) type CallFn<R> =
    Arc<dyn Fn(ResolvedArgs) -> BoxFuture<'static, SolveResult<R>> + Send + Sync>;

/// A callable with its parameter declarations, not yet bound to providers.
///
/// Produced from async functions by
/// [`IntoDeclared`](super::IntoDeclared), or built by hand with
/// [`Declared::dynamic`] for name-based parameters.
pub struct Declared<R> {
    name: String,
    decls: Vec<ParamDecl>,
    call: CallFn<R>,
}

impl<R> Clone for Declared<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            decls: self.decls.clone(),
            call: self.call.clone(),
        }
    }
}

impl<R> fmt::Debug for Declared<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declared")
            .field("name", &self.name)
            .field("decls", &self.decls)
            .finish()
    }
}

impl<R: Send + 'static> Declared<R> {
    pub(crate) fn from_parts(name: String, decls: Vec<ParamDecl>, call: CallFn<R>) -> Self {
        Self { name, decls, call }
    }

    /// Declares a callable over explicitly listed parameters.
    ///
    /// The callable receives every resolved argument by name.
    pub fn dynamic<F, Fut>(name: impl Into<String>, decls: Vec<ParamDecl>, f: F) -> Self
    where
        F: Fn(ResolvedArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SolveResult<R>> + Send + 'static,
    {
        Self {
            name: name.into(),
            decls,
            call: Arc::new(move |args| -> BoxFuture<'static, SolveResult<R>> {
                Box::pin(f(args))
            }),
        }
    }

    /// Renames the dependent, for diagnostics.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the dependent's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter declarations.
    pub fn decls(&self) -> &[ParamDecl] {
        &self.decls
    }

    /// Transforms the output of the callable.
    pub fn map<U, G>(self, g: G) -> Declared<U>
    where
        U: Send + 'static,
        G: Fn(R) -> SolveResult<U> + Send + Sync + 'static,
    {
        let call = self.call;
        let g = Arc::new(g);
        Declared {
            name: self.name,
            decls: self.decls,
            call: Arc::new(move |args| -> BoxFuture<'static, SolveResult<U>> {
                let fut = call(args);
                let g = g.clone();
                Box::pin(async move { g(fut.await?) })
            }),
        }
    }

    /// Binds every declared parameter to a provider of the allowed kinds.
    ///
    /// Each declaration is offered to the allowed kinds in their fixed order
    /// and the first one that claims it wins. A declaration nobody claims
    /// fails the whole dependent.
    pub fn parse(
        &self,
        allowed: &[ParamKind],
        graph: &mut DependencyGraph,
    ) -> RegistrationResult<Dependent<R>> {
        let mut order = allowed.to_vec();
        order.sort();

        let mut params = Vec::with_capacity(self.decls.len());
        for decl in &self.decls {
            let mut claimed = None;
            for kind in &order {
                if let Some(param) = Param::claim(*kind, decl, allowed, graph)? {
                    claimed = Some(param);
                    break;
                }
            }
            let param = claimed.ok_or_else(|| RegistrationError::UnknownParameter {
                dependent: self.name.clone(),
                param: decl.name.clone(),
            })?;
            trace!(dependent = %self.name, param = %decl.name, ?param, "Parameter bound");
            params.push((decl.name.clone(), param));
        }

        Ok(Dependent {
            name: self.name.as_str().into(),
            params: params.into(),
            call: self.call.clone(),
        })
    }
}

/// A callable whose parameters are bound to providers.
pub struct Dependent<R> {
    name: Arc<str>,
    params: Arc<[(String, Param)]>,
    call: CallFn<R>,
}

impl<R> Clone for Dependent<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            params: self.params.clone(),
            call: self.call.clone(),
        }
    }
}

impl<R> fmt::Debug for Dependent<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependent")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl<R: Send + 'static> Dependent<R> {
    /// Returns the dependent's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bound parameters.
    pub fn params(&self) -> &[(String, Param)] {
        &self.params
    }

    /// Runs every parameter's pre-check concurrently.
    ///
    /// Fails with the first failure in declaration order.
    pub async fn check(&self, cx: &SolveContext) -> SolveResult<()> {
        let results = join_all(self.params.iter().map(|(name, param)| param.check(name, cx))).await;
        results.into_iter().collect()
    }

    /// Resolves every parameter in declaration order.
    pub async fn solve(&self, cx: &SolveContext) -> SolveResult<ResolvedArgs> {
        let mut args = ResolvedArgs::with_capacity(self.params.len());
        for (name, param) in self.params.iter() {
            let value = param.solve(name, cx).await?;
            args.push(name.clone(), value);
        }
        Ok(args)
    }

    /// Checks, resolves and invokes the callable.
    ///
    /// A panic anywhere in the pass is caught and reported as a fault.
    pub async fn call(&self, cx: &SolveContext) -> SolveResult<R> {
        let pass = async {
            self.check(cx).await?;
            let args = self.solve(cx).await?;
            (self.call)(args).await
        };
        match AssertUnwindSafe(pass).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(SolveError::fault(panic_message(&self.name, &*panic))),
        }
    }
}

fn panic_message(name: &str, payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("{name} panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("{name} panicked: {s}")
    } else {
        format!("{name} panicked")
    }
}
