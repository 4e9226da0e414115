//! Processors that run around every event and every matcher run.
//!
//! - Event preprocessors run concurrently before routing. Any of them may
//!   ignore the event.
//! - Event postprocessors run after routing.
//! - Run preprocessors run before each matcher run and may ignore that run.
//! - Run postprocessors run after each matcher run and can take the run's
//!   fault as an [`Exception`](crate::dependency::Exception).
//!
//! A preprocessor that fails ignores what it guards. Postprocessor failures
//! are only logged.

use futures::future::join_all;
use tracing::{debug, error};

use crate::context::SolveContext;
use crate::dependency::{Dependent, DependencyGraph, IntoDeclared, ParamKind};
use crate::error::{IgnoredEvent, RegistrationResult, SolveError};

/// What a preprocessor decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookOutcome {
    /// Let the event or run through.
    #[default]
    Continue,
    /// Drop the event or run silently.
    Ignore,
}

impl From<()> for HookOutcome {
    fn from(_: ()) -> Self {
        HookOutcome::Continue
    }
}

impl From<bool> for HookOutcome {
    fn from(proceed: bool) -> Self {
        if proceed {
            HookOutcome::Continue
        } else {
            HookOutcome::Ignore
        }
    }
}

impl From<Result<(), IgnoredEvent>> for HookOutcome {
    fn from(result: Result<(), IgnoredEvent>) -> Self {
        match result {
            Ok(()) => HookOutcome::Continue,
            Err(IgnoredEvent) => HookOutcome::Ignore,
        }
    }
}

#[derive(Default)]
pub(crate) struct Hooks {
    event_pre: Vec<Dependent<HookOutcome>>,
    event_post: Vec<Dependent<()>>,
    run_pre: Vec<Dependent<HookOutcome>>,
    run_post: Vec<Dependent<()>>,
}

impl Hooks {
    pub(crate) fn add_event_pre<F, T, R>(
        &mut self,
        f: F,
        graph: &mut DependencyGraph,
    ) -> RegistrationResult<()>
    where
        F: IntoDeclared<T, R>,
        R: Into<HookOutcome> + Send + 'static,
    {
        let declared = f.into_declared().map(|r: R| Ok(r.into()));
        self.event_pre
            .push(declared.parse(ParamKind::EVENT_HOOK, graph)?);
        Ok(())
    }

    pub(crate) fn add_event_post<F, T>(
        &mut self,
        f: F,
        graph: &mut DependencyGraph,
    ) -> RegistrationResult<()>
    where
        F: IntoDeclared<T, ()>,
    {
        self.event_post
            .push(f.into_declared().parse(ParamKind::EVENT_HOOK, graph)?);
        Ok(())
    }

    pub(crate) fn add_run_pre<F, T, R>(
        &mut self,
        f: F,
        graph: &mut DependencyGraph,
    ) -> RegistrationResult<()>
    where
        F: IntoDeclared<T, R>,
        R: Into<HookOutcome> + Send + 'static,
    {
        let declared = f.into_declared().map(|r: R| Ok(r.into()));
        self.run_pre
            .push(declared.parse(ParamKind::RUN_PRE_HOOK, graph)?);
        Ok(())
    }

    pub(crate) fn add_run_post<F, T>(
        &mut self,
        f: F,
        graph: &mut DependencyGraph,
    ) -> RegistrationResult<()>
    where
        F: IntoDeclared<T, ()>,
    {
        self.run_post
            .push(f.into_declared().parse(ParamKind::RUN_POST_HOOK, graph)?);
        Ok(())
    }

    /// Returns false if any event preprocessor ignores the event.
    pub(crate) async fn event_pre(&self, cx: &SolveContext) -> bool {
        proceed(&self.event_pre, cx).await
    }

    pub(crate) async fn event_post(&self, cx: &SolveContext) {
        observe(&self.event_post, cx).await;
    }

    /// Returns false if any run preprocessor ignores the run.
    pub(crate) async fn run_pre(&self, cx: &SolveContext) -> bool {
        proceed(&self.run_pre, cx).await
    }

    pub(crate) async fn run_post(&self, cx: &SolveContext) {
        observe(&self.run_post, cx).await;
    }
}

async fn proceed(hooks: &[Dependent<HookOutcome>], cx: &SolveContext) -> bool {
    let outcomes = join_all(hooks.iter().map(|hook| async move {
        match hook.call(cx).await {
            Ok(HookOutcome::Continue) => true,
            Ok(HookOutcome::Ignore) => {
                debug!(hook = hook.name(), "Ignored by preprocessor");
                false
            }
            Err(SolveError::Fault(err)) => {
                error!(hook = hook.name(), error = %err, "Preprocessor failed");
                false
            }
            Err(reason) => {
                debug!(hook = hook.name(), %reason, "Preprocessor opted out");
                true
            }
        }
    }))
    .await;
    outcomes.into_iter().all(|ok| ok)
}

async fn observe(hooks: &[Dependent<()>], cx: &SolveContext) {
    join_all(hooks.iter().map(|hook| async move {
        match hook.call(cx).await {
            Ok(()) => {}
            Err(SolveError::Fault(err)) => {
                error!(hook = hook.name(), error = %err, "Postprocessor failed");
            }
            Err(reason) => {
                debug!(hook = hook.name(), %reason, "Postprocessor opted out");
            }
        }
    }))
    .await;
}
