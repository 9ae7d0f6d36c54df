//! Aggregated test results and the persisted reports.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::TestRunError;
use super::types::{FileReport, Verdict, as_millis};
use crate::consts::{JSON_REPORT_FILE, TEXT_REPORT_FILE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
  pub total: usize,
  pub passed: usize,
  pub failed: usize,
  pub skipped: usize,
}

impl Counts {
  fn record(&mut self, verdict: Verdict) {
    self.total += 1;
    match verdict {
      Verdict::Passed => self.passed += 1,
      Verdict::Failed => self.failed += 1,
      Verdict::Skipped => self.skipped += 1,
    }
  }

  fn line(&self) -> String {
    format!(
      "{} total, {} passed, {} failed, {} skipped",
      self.total, self.passed, self.failed, self.skipped
    )
  }
}

/// Results of one `test` run, counted at suite (file) and case granularity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestRunSummary {
  pub suites: Counts,
  pub cases: Counts,
  #[serde(rename = "duration_ms", serialize_with = "as_millis")]
  pub duration: Duration,
  pub files: Vec<FileReport>,
}

impl TestRunSummary {
  pub fn new(files: Vec<FileReport>, duration: Duration) -> Self {
    let mut suites = Counts::default();
    let mut cases = Counts::default();
    for file in &files {
      suites.record(file.verdict);
      for case in &file.cases {
        cases.record(case.verdict);
      }
    }
    Self {
      suites,
      cases,
      duration,
      files,
    }
  }

  /// No suite and no case failed.
  pub fn success(&self) -> bool {
    self.suites.failed == 0 && self.cases.failed == 0
  }

  pub fn failed_files(&self) -> impl Iterator<Item = &FileReport> {
    self.files.iter().filter(|f| f.verdict == Verdict::Failed)
  }

  /// Totals and the failed suites with their failure indicators.
  pub fn render_summary(&self) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Suites: {}", self.suites.line());
    let _ = writeln!(out, "Cases:  {}", self.cases.line());
    let _ = writeln!(out, "Time:   {}ms", self.duration.as_millis());

    let failed: Vec<_> = self.failed_files().collect();
    if !failed.is_empty() {
      let _ = writeln!(out, "Failed suites:");
      for file in failed {
        let indicator = file.indicator().unwrap_or_else(|| "failed".to_string());
        let _ = writeln!(out, "  {} ({})", file.file, indicator);
      }
    }
    out
  }

  /// Full report: every file and case, then the summary.
  pub fn render_text(&self) -> String {
    let mut out = String::new();
    for file in &self.files {
      let _ = write!(out, "{} {} ({}ms)", file.verdict, file.file, file.duration.as_millis());
      match &file.message {
        Some(message) => {
          let _ = writeln!(out, ": {}", message);
        }
        None => out.push('\n'),
      }
      for case in &file.cases {
        let _ = write!(out, "    {} {}", case.verdict, case.label);
        match &case.message {
          Some(message) => {
            let _ = writeln!(out, ": {}", message);
          }
          None => out.push('\n'),
        }
      }
    }
    if !self.files.is_empty() {
      out.push('\n');
    }
    out.push_str(&self.render_summary());
    out
  }

  /// Write the text and JSON reports into `build_dir`, replacing earlier ones.
  pub fn write(&self, build_dir: &Path) -> Result<(), TestRunError> {
    let report_error = |path: &Path, message: String| TestRunError::Report {
      path: path.to_path_buf(),
      message,
    };

    fs::create_dir_all(build_dir).map_err(|e| report_error(build_dir, e.to_string()))?;

    let text_path = build_dir.join(TEXT_REPORT_FILE);
    fs::write(&text_path, self.render_text()).map_err(|e| report_error(&text_path, e.to_string()))?;

    let json_path = build_dir.join(JSON_REPORT_FILE);
    let json = serde_json::to_string_pretty(self).map_err(|e| report_error(&json_path, e.to_string()))?;
    fs::write(&json_path, json).map_err(|e| report_error(&json_path, e.to_string()))?;

    info!(path = %text_path.display(), "wrote test report");
    Ok(())
  }
}
