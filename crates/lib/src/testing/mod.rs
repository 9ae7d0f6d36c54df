//! The built-in `test` target: discovery, isolated execution and reporting.
//!
//! # Submodules
//!
//! - [`discovery`] - finding test files and include/exclude filters
//! - [`report`] - aggregation and the persisted text/JSON reports
//! - [`runner`] - per-file isolation and the setup/case/teardown sequence
//! - [`types`] - file and case results

pub mod discovery;
pub mod report;
pub mod runner;
pub mod types;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

pub use discovery::{TestFile, TestFilter, discover};
pub use report::{Counts, TestRunSummary};
pub use runner::{FileRunner, RunOptions};
pub use types::{CaseReport, FailureKind, FileReport, Verdict};

use crate::consts::{KEEP_TEST_FILES_FLAG, TEST_SCRATCH_DIR, TEST_TIMEOUT_PARAM};
use crate::context::RunContext;

/// Errors that prevent a test run from being carried out at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TestRunError {
  #[error("invalid regular expression in -P{param}: {message}")]
  InvalidPattern { param: String, message: String },

  #[error("invalid -Ptest.timeout={value}: expected a positive number of seconds")]
  InvalidTimeout { value: String },

  #[error("failed to scan {}: {message}", .dir.display())]
  Discovery { dir: PathBuf, message: String },

  #[error("failed to write {}: {message}", .path.display())]
  Report { path: PathBuf, message: String },
}

fn parse_timeout(value: Option<&str>) -> Result<Option<Duration>, TestRunError> {
  let Some(value) = value else {
    return Ok(None);
  };
  match value.trim().parse::<f64>() {
    Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
    _ => Err(TestRunError::InvalidTimeout {
      value: value.to_string(),
    }),
  }
}

/// Run every test file of the module and persist the reports.
///
/// Per-file failures are part of the returned summary; only problems that
/// stop the run as a whole are errors.
pub fn run_tests(ctx: &RunContext) -> Result<TestRunSummary, TestRunError> {
  let params = ctx.params().borrow().clone();
  let filter = TestFilter::from_params(&params)?;
  let options = RunOptions {
    keep_files: ctx.flags().contains(KEEP_TEST_FILES_FLAG),
    timeout: parse_timeout(params.get(TEST_TIMEOUT_PARAM))?,
  };

  let files = discover(&ctx.test_dir())?;
  info!(count = files.len(), dir = %ctx.test_dir().display(), "running tests");

  let scratch_root = ctx.build_dir().join(TEST_SCRATCH_DIR);
  // Leftovers from an earlier --keep-test-files run.
  if scratch_root.exists()
    && let Err(e) = std::fs::remove_dir_all(&scratch_root)
  {
    debug!(dir = %scratch_root.display(), error = %e, "could not clear scratch root");
  }

  let runner = FileRunner::new(ctx, scratch_root.clone(), options);
  let started = Instant::now();
  let mut reports = Vec::with_capacity(files.len());
  for file in &files {
    let report = runner.run(file, &filter);
    ctx.observer().test_file_finished(&report);
    reports.push(report);
  }

  // Per-file removal leaves the parents of nested test files behind.
  if !options.keep_files
    && let Err(e) = std::fs::remove_dir_all(&scratch_root)
    && e.kind() != std::io::ErrorKind::NotFound
  {
    debug!(dir = %scratch_root.display(), error = %e, "could not remove scratch root");
  }

  let summary = TestRunSummary::new(reports, started.elapsed());
  summary.write(&ctx.build_dir())?;
  info!(
    suites = summary.suites.total,
    failed_suites = summary.suites.failed,
    cases = summary.cases.total,
    failed_cases = summary.cases.failed,
    "test run finished"
  );
  Ok(summary)
}
