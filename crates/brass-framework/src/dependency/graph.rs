//! Registration-time dependency graph.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{RegistrationError, RegistrationResult};

use super::Dependency;
use super::param::ParamKind;
use super::provider::{DependencyId, DependsOn};

/// Parses sub-dependencies once and rejects cycles among them.
///
/// A dependency is parsed against the allowed kinds of the dependent that
/// first reaches it, so the same provider may be parsed once per context.
#[derive(Default)]
pub struct DependencyGraph {
    parsed: HashMap<(DependencyId, Vec<ParamKind>), Arc<Dependency>>,
    visiting: Vec<(DependencyId, String)>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of parsed dependencies.
    pub fn len(&self) -> usize {
        self.parsed.len()
    }

    /// Returns true if nothing has been parsed.
    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
    }

    /// Parses the dependency `on` refers to, or returns the parsed one.
    pub(crate) fn resolve(
        &mut self,
        on: &DependsOn,
        allowed: &[ParamKind],
    ) -> RegistrationResult<Arc<Dependency>> {
        let key = (on.id(), allowed.to_vec());
        if let Some(parsed) = self.parsed.get(&key) {
            return Ok(parsed.clone());
        }

        if let Some(pos) = self.visiting.iter().position(|(id, _)| *id == on.id()) {
            let mut path: Vec<String> = self.visiting[pos..]
                .iter()
                .map(|(_, name)| name.clone())
                .collect();
            path.push(on.name().to_string());
            return Err(RegistrationError::DependencyCycle { path });
        }

        self.visiting.push((on.id(), on.name().to_string()));
        let result = on.build().0.parse(allowed, self);
        self.visiting.pop();

        let dependency = Arc::new(Dependency::new(on.id(), on.name().to_string(), result?));
        debug!(dependency = %on.name(), "Dependency parsed");
        self.parsed.insert(key, dependency.clone());
        Ok(dependency)
    }
}
