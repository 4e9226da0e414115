//! Tower service around one matcher instance run.
//!
//! Wrapping the run in a [`Service`] lets the dispatcher bound it with
//! tower's [`TimeoutLayer`] instead of hand-rolled timers.

use std::convert::Infallible;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower::{Service, ServiceBuilder, ServiceExt};
use tracing::{error, warn};

use crate::context::EventPass;

use super::MatcherHandle;
use super::instance::{MatcherInstance, RunReport};

/// Everything one run needs.
pub(crate) struct RunRequest {
    pub(crate) instance: MatcherInstance,
    pub(crate) handle: MatcherHandle,
    pub(crate) pass: EventPass,
}

/// Runs a matcher instance to completion or suspension.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunService;

impl Service<RunRequest> for RunService {
    type Response = RunReport;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<RunReport, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RunRequest) -> Self::Future {
        Box::pin(async move {
            let RunRequest {
                instance,
                handle,
                pass,
            } = req;
            Ok(instance.run(&handle, &pass).await)
        })
    }
}

/// Runs `req`, giving up after `timeout`.
///
/// Returns `None` if the run timed out; the instance is dropped with it.
pub(crate) async fn run_with_timeout(
    req: RunRequest,
    timeout: Option<Duration>,
) -> Option<RunReport> {
    let matcher = req.instance.matcher().name().to_string();

    let Some(timeout) = timeout else {
        return match RunService.oneshot(req).await {
            Ok(report) => Some(report),
            Err(never) => match never {},
        };
    };

    let service = ServiceBuilder::new()
        .layer(TimeoutLayer::new(timeout))
        .service(RunService);
    match service.oneshot(req).await {
        Ok(report) => Some(report),
        Err(err) if err.is::<Elapsed>() => {
            warn!(matcher = matcher.as_str(), ?timeout, "Matcher run timed out");
            None
        }
        Err(err) => {
            error!(matcher = matcher.as_str(), error = %err, "Matcher run failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use brass_core::BoxedBot;

    use super::*;
    use crate::config::EngineConfig;
    use crate::dependency::DependencyGraph;
    use crate::matcher::{MatcherBuilder, MatcherStatus};
    use crate::state::State;
    use crate::testing::{MockBot, TestEvent};

    fn request(builder: MatcherBuilder, bot: BoxedBot) -> RunRequest {
        let matcher = builder
            .build(&mut DependencyGraph::new(), &EngineConfig::default())
            .unwrap();
        let instance = MatcherInstance::new(matcher.clone(), State::new());
        let handle = MatcherHandle::new(
            matcher,
            bot,
            TestEvent::message("x").boxed(),
            instance.state().clone(),
        );
        RunRequest {
            instance,
            handle,
            pass: EventPass::new(Arc::new(EngineConfig::default())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_run_times_out() {
        let bot = MockBot::new();
        let req = request(
            MatcherBuilder::new().handle(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "too late"
            }),
            bot.clone(),
        );

        let report = run_with_timeout(req, Some(Duration::from_secs(1))).await;
        assert!(report.is_none());
        assert!(bot.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_run_completes() {
        let bot = MockBot::new();
        let req = request(MatcherBuilder::new().handle(|| async { "ok" }), bot.clone());

        let report = run_with_timeout(req, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(report.instance.status(), &MatcherStatus::Finished);
        assert_eq!(bot.sent(), vec!["ok"]);
    }

    #[test]
    fn test_run_without_timeout() {
        let bot = MockBot::new();
        let req = request(MatcherBuilder::new().handle(|| async { "ok" }), bot.clone());

        let report = tokio_test::block_on(run_with_timeout(req, None));
        assert!(report.is_some());
        assert_eq!(bot.sent(), vec!["ok"]);
    }
}
