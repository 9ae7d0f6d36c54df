//! Targets: named, at-most-once-per-run units of work.
//!
//! # Submodules
//!
//! - [`builtin`] - default `clean`, `build` and `test` bodies
//! - [`executor`] - dependency-ordered, memoized execution
//! - [`resolver`] - dependency graph view and cycle detection
//! - [`types`] - bodies and errors

pub mod builtin;
pub mod executor;
pub mod resolver;
pub mod types;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub use executor::Executor;
pub use resolver::DependencyGraph;
pub use types::{BodyError, ExecuteError, ExecutedTarget, ResolveError, TargetFn, TargetOrigin};

/// Normalize a target name so that `My-Target`, `my-target` and `my_target`
/// all refer to the same target.
pub fn normalize_name(name: &str) -> String {
  name.trim().to_lowercase().replace('-', "_")
}

/// A registered target.
#[derive(Clone)]
pub struct Target {
  name: String,
  deps: Vec<String>,
  description: Option<String>,
  origin: TargetOrigin,
  body: TargetFn,
}

impl Target {
  pub fn new(name: &str, body: impl Fn() -> Result<(), BodyError> + 'static) -> Self {
    Self::from_fn(name, Rc::new(body))
  }

  pub fn from_fn(name: &str, body: TargetFn) -> Self {
    Self {
      name: normalize_name(name),
      deps: Vec::new(),
      description: None,
      origin: TargetOrigin::Module,
      body,
    }
  }

  /// Declare dependencies, normalized and de-duplicated in declaration order.
  pub fn with_deps<I, S>(mut self, deps: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    for dep in deps {
      let dep = normalize_name(dep.as_ref());
      if !self.deps.contains(&dep) {
        self.deps.push(dep);
      }
    }
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_origin(mut self, origin: TargetOrigin) -> Self {
    self.origin = origin;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn deps(&self) -> &[String] {
    &self.deps
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  pub fn origin(&self) -> TargetOrigin {
    self.origin
  }

  /// Invoke the body.
  pub fn run(&self) -> Result<(), BodyError> {
    (self.body)()
  }
}

impl fmt::Debug for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Target")
      .field("name", &self.name)
      .field("deps", &self.deps)
      .field("description", &self.description)
      .field("origin", &self.origin)
      .finish_non_exhaustive()
  }
}

/// Targets keyed by normalized name, remembering first registration order.
#[derive(Debug, Default, Clone)]
pub struct TargetRegistry {
  targets: HashMap<String, Target>,
  order: Vec<String>,
}

impl TargetRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a target, replacing any previous one with the same name.
  /// Returns the replaced target.
  pub fn register(&mut self, target: Target) -> Option<Target> {
    let name = target.name.clone();
    let previous = self.targets.insert(name.clone(), target);
    if previous.is_none() {
      self.order.push(name);
    }
    previous
  }

  pub fn get(&self, name: &str) -> Option<&Target> {
    self.targets.get(&normalize_name(name))
  }

  pub fn contains(&self, name: &str) -> bool {
    self.targets.contains_key(&normalize_name(name))
  }

  /// Targets in first-registration order.
  pub fn iter(&self) -> impl Iterator<Item = &Target> {
    self.order.iter().filter_map(|name| self.targets.get(name))
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }
}
