//! Registered matchers, bucketed by priority.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::matcher::Matcher;

/// Matchers grouped into priority buckets.
///
/// Buckets iterate in ascending priority; within a bucket, matchers keep
/// their registration order.
#[derive(Default)]
pub struct MatcherRegistry {
    buckets: RwLock<BTreeMap<i32, Vec<Matcher>>>,
}

impl MatcherRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `matcher` to its priority bucket.
    pub fn insert(&self, matcher: Matcher) {
        self.buckets
            .write()
            .entry(matcher.priority())
            .or_default()
            .push(matcher);
    }

    /// Returns the buckets as they are now.
    pub fn snapshot(&self) -> Vec<(i32, Vec<Matcher>)> {
        self.buckets
            .read()
            .iter()
            .map(|(priority, bucket)| (*priority, bucket.clone()))
            .collect()
    }

    /// Removes expired and consumed matchers; returns how many.
    pub fn prune(&self, now: Instant) -> usize {
        {
            let buckets = self.buckets.read();
            if buckets
                .values()
                .flatten()
                .all(|matcher| matcher.is_live(now))
            {
                return 0;
            }
        }

        let mut buckets = self.buckets.write();
        let mut removed = 0;
        for bucket in buckets.values_mut() {
            bucket.retain(|matcher| {
                let live = matcher.is_live(now);
                if !live {
                    debug!(matcher = matcher.name(), "Matcher removed");
                    removed += 1;
                }
                live
            });
        }
        buckets.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    /// Returns the first matcher named `name`.
    pub fn find(&self, name: &str) -> Option<Matcher> {
        self.buckets
            .read()
            .values()
            .flatten()
            .find(|matcher| matcher.name() == name)
            .cloned()
    }

    /// Returns the number of matchers.
    pub fn len(&self) -> usize {
        self.buckets.read().values().map(Vec::len).sum()
    }

    /// Returns true if no matcher is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::EngineConfig;
    use crate::dependency::DependencyGraph;
    use crate::matcher::MatcherBuilder;

    fn matcher(builder: MatcherBuilder) -> Matcher {
        builder
            .build(&mut DependencyGraph::new(), &EngineConfig::default())
            .unwrap()
    }

    #[test]
    fn test_buckets_sorted_and_stable() {
        let registry = MatcherRegistry::new();
        registry.insert(matcher(MatcherBuilder::new().name("late").priority(10)));
        registry.insert(matcher(MatcherBuilder::new().name("first").priority(1)));
        registry.insert(matcher(MatcherBuilder::new().name("second").priority(1)));

        let order: Vec<(i32, Vec<String>)> = registry
            .snapshot()
            .into_iter()
            .map(|(p, bucket)| (p, bucket.iter().map(|m| m.name().to_string()).collect()))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, vec!["first".to_string(), "second".to_string()]),
                (10, vec!["late".to_string()]),
            ]
        );
        assert_eq!(registry.len(), 3);
        assert!(registry.find("second").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune() {
        let registry = MatcherRegistry::new();
        let temp = matcher(MatcherBuilder::new().name("temp").temp(true));
        registry.insert(temp.clone());
        registry.insert(matcher(
            MatcherBuilder::new()
                .name("short")
                .priority(3)
                .expire_in(Duration::from_secs(1)),
        ));
        registry.insert(matcher(MatcherBuilder::new().name("stays")));

        assert_eq!(registry.prune(Instant::now()), 0);
        assert!(temp.try_claim());
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(registry.prune(Instant::now()), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot().len(), 1);
    }
}
