//! Per-event dependency cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::error::SolveResult;

use super::param::Provided;
use super::provider::DependencyId;

type Cell = Arc<OnceCell<SolveResult<Provided>>>;

/// Results of cached sub-dependencies for one event.
///
/// Concurrent requests for the same dependency wait on a single evaluation.
#[derive(Default)]
pub struct DependencyCache {
    cells: Mutex<HashMap<DependencyId, Cell>>,
}

impl DependencyCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached result for `id`, evaluating `solve` if there is none.
    pub async fn get_or_solve<F, Fut>(&self, id: DependencyId, solve: F) -> SolveResult<Provided>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SolveResult<Provided>>,
    {
        let cell = self.cells.lock().entry(id).or_default().clone();
        cell.get_or_init(solve).await.clone()
    }

    /// Returns the number of dependencies seen.
    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    /// Returns true if nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.cells.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::join_all;

    use super::*;

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_evaluation() {
        let cache = DependencyCache::new();
        let calls = AtomicUsize::new(0);
        let id = DependencyId::Anonymous(7);

        let results = join_all((0..4).map(|_| {
            cache.get_or_solve(id, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(Provided::new(42u32))
            })
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(*result.unwrap().downcast::<u32>().unwrap(), 42);
        }
        assert_eq!(cache.len(), 1);
    }
}
