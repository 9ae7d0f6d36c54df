//! Progress callbacks for front ends.
//!
//! The library never prints; a CLI or test harness implements [`RunObserver`]
//! to show progress as targets and test files complete.

use std::time::Duration;

use crate::testing::FileReport;

pub trait RunObserver {
  fn target_started(&self, _name: &str) {}

  fn target_finished(&self, _name: &str, _duration: Duration, _success: bool) {}

  fn test_file_finished(&self, _report: &FileReport) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
