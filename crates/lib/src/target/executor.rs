//! Memoized, dependency-ordered target execution.
//!
//! Every target body runs at most once per [`Executor`]. Dependencies run first,
//! in declared order, and the first failure stops the walk. A failed target is
//! not marked executed.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info};

use super::{DependencyGraph, ExecuteError, ExecutedTarget, ResolveError, normalize_name};
use crate::observer::RunObserver;

pub struct Executor<'a> {
  graph: DependencyGraph<'a>,
  observer: &'a dyn RunObserver,
  executed: HashSet<String>,
  in_progress: Vec<String>,
  history: Vec<ExecutedTarget>,
}

impl<'a> Executor<'a> {
  pub fn new(graph: DependencyGraph<'a>, observer: &'a dyn RunObserver) -> Self {
    Self {
      graph,
      observer,
      executed: HashSet::new(),
      in_progress: Vec::new(),
      history: Vec::new(),
    }
  }

  /// Run `target` and its dependencies unless they already ran.
  pub fn execute(&mut self, target: &str) -> Result<(), ExecuteError> {
    let name = normalize_name(target);

    if self.executed.contains(&name) {
      debug!(target = %name, "already executed, skipping");
      return Ok(());
    }
    if let Some(pos) = self.in_progress.iter().position(|n| *n == name) {
      let mut path: Vec<String> = self.in_progress.get(pos..).map(<[String]>::to_vec).unwrap_or_default();
      path.push(name);
      return Err(ResolveError::CircularDependency { path }.into());
    }

    let deps = self.graph.dependencies(&name).map_err(|e| match e {
      ResolveError::UnknownTarget { name, .. } => ResolveError::UnknownTarget {
        name,
        required_by: self.in_progress.last().cloned(),
      },
      other => other,
    })?;

    self.in_progress.push(name.clone());
    let result = self.run_with_deps(&name, &deps);
    self.in_progress.pop();
    result
  }

  fn run_with_deps(&mut self, name: &str, deps: &[String]) -> Result<(), ExecuteError> {
    for dep in deps {
      self.execute(dep)?;
    }

    let registry = self.graph.registry();
    let target = registry.get(name).ok_or_else(|| ResolveError::UnknownTarget {
      name: name.to_string(),
      required_by: None,
    })?;

    info!(target = %name, "running target");
    self.observer.target_started(name);
    let started = Instant::now();
    let outcome = target.run();
    let duration = started.elapsed();
    self.observer.target_finished(name, duration, outcome.is_ok());

    match outcome {
      Ok(()) => {
        self.executed.insert(name.to_string());
        self.history.push(ExecutedTarget {
          name: name.to_string(),
          duration,
        });
        Ok(())
      }
      Err(source) => Err(ExecuteError::TargetFailed {
        target: name.to_string(),
        source,
      }),
    }
  }

  /// Whether `target` completed successfully in this run.
  pub fn is_executed(&self, target: &str) -> bool {
    self.executed.contains(&normalize_name(target))
  }

  /// Successfully executed targets in completion order.
  pub fn history(&self) -> &[ExecutedTarget] {
    &self.history
  }

  pub fn into_history(self) -> Vec<ExecutedTarget> {
    self.history
  }
}
