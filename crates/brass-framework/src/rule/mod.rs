//! Rules decide whether a matcher responds to an event.
//!
//! A [`Rule`] is a conjunction of checkers. Checkers are plain dependents
//! returning `bool`; they run concurrently and all of them must pass. A rule
//! without checkers always passes.
//!
//! Rules share the matcher's candidate state: a checker that matches writes
//! what it found (the parsed command, regex groups...) for the handlers to
//! read.

mod command;
#[cfg(feature = "shell")]
mod shell;
mod text;

use std::ops::BitAnd;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error};

pub use command::{CommandName, command};
#[cfg(feature = "shell")]
pub use shell::{ParserExit, ShellArgs, SplitError, shell_command, shell_split};
pub use text::{endswith, fullmatch, is_type, keyword, regex, startswith, to_me};

use crate::context::SolveContext;
use crate::dependency::{Declared, Dependent, DependencyGraph, IntoDeclared, ParamKind};
use crate::error::{RegistrationResult, SolveError};

/// A conjunction of checkers.
#[derive(Clone, Default)]
pub struct Rule {
    checkers: Vec<Declared<bool>>,
    commands: Vec<Vec<String>>,
}

impl Rule {
    /// Creates a rule that always passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a rule from one async checker.
    pub fn checker<F, T>(f: F) -> Self
    where
        F: IntoDeclared<T, bool>,
    {
        Self::from_declared(f.into_declared())
    }

    /// Creates a rule from an already declared checker.
    pub fn from_declared(checker: Declared<bool>) -> Self {
        Self {
            checkers: vec![checker],
            commands: Vec::new(),
        }
    }

    pub(crate) fn named_checker<F, T>(name: &str, f: F) -> Self
    where
        F: IntoDeclared<T, bool>,
    {
        Self::from_declared(f.into_declared().named(name))
    }

    pub(crate) fn with_commands(mut self, commands: Vec<Vec<String>>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Returns the rule requiring both `self` and `other`.
    pub fn and(mut self, other: Rule) -> Self {
        self.checkers.extend(other.checkers);
        self.commands.extend(other.commands);
        self
    }

    /// Returns the number of checkers.
    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    /// Returns true if the rule always passes.
    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Commands the trie router must know about for this rule to match.
    pub(crate) fn commands(&self) -> &[Vec<String>] {
        &self.commands
    }

    pub(crate) fn compile(&self, graph: &mut DependencyGraph) -> RegistrationResult<CompiledRule> {
        let checkers = self
            .checkers
            .iter()
            .map(|checker| checker.parse(ParamKind::RULE, graph))
            .collect::<RegistrationResult<Vec<_>>>()?;
        Ok(CompiledRule {
            checkers: checkers.into(),
        })
    }
}

impl BitAnd for Rule {
    type Output = Rule;

    fn bitand(self, rhs: Rule) -> Rule {
        self.and(rhs)
    }
}

/// A rule whose checkers are bound to providers.
#[derive(Clone, Default)]
pub struct CompiledRule {
    checkers: Arc<[Dependent<bool>]>,
}

impl CompiledRule {
    /// Evaluates every checker; true only if all pass.
    pub async fn check(&self, cx: &SolveContext) -> bool {
        run_checkers(&self.checkers, cx).await.into_iter().all(|ok| ok)
    }
}

/// Runs checkers concurrently, mapping opt-outs and faults to `false`.
pub(crate) async fn run_checkers(checkers: &[Dependent<bool>], cx: &SolveContext) -> Vec<bool> {
    join_all(checkers.iter().map(|checker| async move {
        match checker.call(cx).await {
            Ok(passed) => passed,
            Err(SolveError::Fault(err)) => {
                error!(checker = checker.name(), error = %err, "Checker failed");
                false
            }
            Err(reason) => {
                debug!(checker = checker.name(), %reason, "Checker opted out");
                false
            }
        }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use brass_core::BoxedBot;

    use super::*;
    use crate::config::EngineConfig;
    use crate::context::EventPass;
    use crate::error::HandlerError;
    use crate::state::State;
    use crate::testing::{MockBot, TestEvent};

    pub(crate) fn rule_context(event: TestEvent) -> SolveContext {
        let bot: BoxedBot = MockBot::new();
        SolveContext::new(
            bot,
            event.boxed(),
            EventPass::new(Arc::new(EngineConfig::default())),
        )
        .with_state(State::new())
    }

    #[tokio::test]
    async fn test_empty_rule_passes() {
        let compiled = Rule::new().compile(&mut DependencyGraph::new()).unwrap();
        assert!(compiled.check(&rule_context(TestEvent::message("x"))).await);
    }

    #[tokio::test]
    async fn test_conjunction_runs_every_checker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = |result: bool| {
            let calls = calls.clone();
            Rule::checker(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    result
                }
            })
        };

        let rule = counted(false) & counted(true) & counted(true);
        assert_eq!(rule.len(), 3);
        let compiled = rule.compile(&mut DependencyGraph::new()).unwrap();

        assert!(!compiled.check(&rule_context(TestEvent::message("x"))).await);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_faulting_checker_is_false() {
        let rule = Rule::from_declared(Declared::dynamic(
            "broken",
            Vec::new(),
            |_args| async { Err::<bool, _>(SolveError::Fault(HandlerError::new("boom"))) },
        ));
        let compiled = rule.compile(&mut DependencyGraph::new()).unwrap();
        assert!(!compiled.check(&rule_context(TestEvent::message("x"))).await);
    }

    #[tokio::test]
    async fn test_panicking_checker_is_false() {
        let rule = Rule::checker(|| async {
            if true {
                panic!("checker bug");
            }
            true
        }) & Rule::checker(|| async { true });
        let compiled = rule.compile(&mut DependencyGraph::new()).unwrap();
        assert!(!compiled.check(&rule_context(TestEvent::message("x"))).await);
    }
}
