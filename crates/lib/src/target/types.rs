//! Types shared by target registration, resolution and execution.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::extension::sh::ShellError;
use crate::testing::TestRunError;

/// A target body: a zero-argument callable that succeeds or fails.
pub type TargetFn = Rc<dyn Fn() -> Result<(), BodyError>>;

/// Why a target body failed.
#[derive(Debug, Error)]
pub enum BodyError {
  /// The built-in `build` body, which every module must override.
  #[error("target '{0}' is not implemented by this module")]
  NotImplemented(String),

  /// The Lua body raised an error.
  #[error("{0}")]
  Script(String),

  /// The Lua body returned `false`.
  #[error("target body returned false")]
  ReturnedFalse,

  /// A `cmd` target's command failed.
  #[error(transparent)]
  Command(#[from] ShellError),

  /// The test run completed with failures.
  #[error("{failed_suites} test suite(s) and {failed_cases} test case(s) failed")]
  TestsFailed { failed_suites: usize, failed_cases: usize },

  /// The test run could not be carried out.
  #[error(transparent)]
  TestRun(#[from] TestRunError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Errors detected while walking the dependency graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
  /// A dependency chain leads back to a target already on the path.
  #[error("circular dependency: {}", .path.join(" -> "))]
  CircularDependency { path: Vec<String> },

  /// No body is registered under this name.
  #[error("unknown target '{name}'{}", required_by_suffix(.required_by))]
  UnknownTarget { name: String, required_by: Option<String> },
}

fn required_by_suffix(required_by: &Option<String>) -> String {
  match required_by {
    Some(parent) => format!(" (required by '{}')", parent),
    None => String::new(),
  }
}

/// Errors raised while executing targets.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error("target '{target}' failed: {source}")]
  TargetFailed {
    target: String,
    #[source]
    source: BodyError,
  },
}

impl ExecuteError {
  /// Name of the target whose body failed, if any.
  pub fn failed_target(&self) -> Option<&str> {
    match self {
      ExecuteError::TargetFailed { target, .. } => Some(target),
      ExecuteError::Resolve(_) => None,
    }
  }
}

/// A target that ran to completion during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTarget {
  pub name: String,
  pub duration: std::time::Duration,
}

/// Where a target's body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOrigin {
  Builtin,
  Module,
}

impl fmt::Display for TargetOrigin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TargetOrigin::Builtin => write!(f, "builtin"),
      TargetOrigin::Module => write!(f, "module"),
    }
  }
}
