//! Teardown stack for scoped dependencies.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::trace;

/// Teardowns registered while processing one event.
///
/// [`close`](ExitStack::close) runs them in reverse registration order. Each
/// teardown runs at most once.
#[derive(Default)]
pub struct ExitStack {
    entries: Mutex<Vec<(String, BoxFuture<'static, ()>)>>,
}

impl ExitStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a teardown.
    pub fn push(&self, name: impl Into<String>, teardown: BoxFuture<'static, ()>) {
        self.entries.lock().push((name.into(), teardown));
    }

    /// Returns the number of pending teardowns.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Runs every pending teardown, last registered first.
    pub async fn close(&self) {
        let entries = std::mem::take(&mut *self.entries.lock());
        for (name, teardown) in entries.into_iter().rev() {
            trace!(dependency = %name, "Running teardown");
            teardown.await;
        }
    }
}
