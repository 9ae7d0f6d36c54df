//! Dependency graph view over a [`TargetRegistry`].
//!
//! The graph is induced by each target's declared dependencies plus one
//! invocation-specific edge: `test` depends on `build` when `test` was
//! explicitly requested (not when it is reached transitively).

use std::collections::HashSet;

use super::{ResolveError, TargetRegistry, normalize_name};
use crate::consts::{BUILD_TARGET, TEST_TARGET};

/// Dependency edges for one invocation.
#[derive(Debug, Clone)]
pub struct DependencyGraph<'a> {
  registry: &'a TargetRegistry,
  explicit: HashSet<String>,
}

impl<'a> DependencyGraph<'a> {
  /// Build the graph for the explicitly requested targets.
  pub fn new<S: AsRef<str>>(registry: &'a TargetRegistry, requested: &[S]) -> Self {
    let explicit = requested.iter().map(|name| normalize_name(name.as_ref())).collect();
    Self { registry, explicit }
  }

  pub fn registry(&self) -> &'a TargetRegistry {
    self.registry
  }

  /// Whether a target was requested on the command line.
  pub fn is_explicit(&self, name: &str) -> bool {
    self.explicit.contains(&normalize_name(name))
  }

  /// Direct dependencies of `name`, in execution order.
  pub fn dependencies(&self, name: &str) -> Result<Vec<String>, ResolveError> {
    let name = normalize_name(name);
    let target = self.registry.get(&name).ok_or_else(|| ResolveError::UnknownTarget {
      name: name.clone(),
      required_by: None,
    })?;

    let mut deps = Vec::with_capacity(target.deps().len() + 1);
    if name == TEST_TARGET && self.explicit.contains(TEST_TARGET) && !target.deps().iter().any(|d| d == BUILD_TARGET) {
      deps.push(BUILD_TARGET.to_string());
    }
    deps.extend(target.deps().iter().cloned());
    Ok(deps)
  }

  /// Fail if a cycle is reachable from `target` or any reachable target is unknown.
  ///
  /// `path` holds the chain of targets currently being visited; a target that
  /// appears on it again closes a cycle.
  pub fn check_acyclic(&self, target: &str, path: &mut Vec<String>) -> Result<(), ResolveError> {
    let mut cleared = HashSet::new();
    self.check_from(&normalize_name(target), path, &mut cleared)
  }

  fn check_from(&self, name: &str, path: &mut Vec<String>, cleared: &mut HashSet<String>) -> Result<(), ResolveError> {
    if let Some(pos) = path.iter().position(|p| p == name) {
      let mut cycle: Vec<String> = path.get(pos..).map(<[String]>::to_vec).unwrap_or_default();
      cycle.push(name.to_string());
      return Err(ResolveError::CircularDependency { path: cycle });
    }
    if cleared.contains(name) {
      return Ok(());
    }

    let deps = self.dependencies(name).map_err(|e| match e {
      ResolveError::UnknownTarget { name, .. } => ResolveError::UnknownTarget {
        name,
        required_by: path.last().cloned(),
      },
      other => other,
    })?;

    path.push(name.to_string());
    for dep in &deps {
      self.check_from(dep, path, cleared)?;
    }
    path.pop();

    cleared.insert(name.to_string());
    Ok(())
  }

  /// Check every requested target before anything runs.
  pub fn verify<S: AsRef<str>>(&self, requested: &[S]) -> Result<(), ResolveError> {
    for target in requested {
      self.check_acyclic(target.as_ref(), &mut Vec::new())?;
    }
    Ok(())
  }

  /// The order in which [`super::Executor`] would run the requested targets:
  /// dependencies first, in declared order, each target once.
  pub fn execution_order<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<String>, ResolveError> {
    self.verify(requested)?;

    let mut order = Vec::new();
    let mut seen = HashSet::new();
    for target in requested {
      self.visit(&normalize_name(target.as_ref()), &mut seen, &mut order)?;
    }
    Ok(order)
  }

  fn visit(&self, name: &str, seen: &mut HashSet<String>, order: &mut Vec<String>) -> Result<(), ResolveError> {
    if !seen.insert(name.to_string()) {
      return Ok(());
    }
    for dep in self.dependencies(name)? {
      self.visit(&dep, seen, order)?;
    }
    order.push(name.to_string());
    Ok(())
  }
}
