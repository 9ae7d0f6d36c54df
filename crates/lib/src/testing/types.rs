//! Per-file and per-case results.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
  Passed,
  Failed,
  Skipped,
}

impl Verdict {
  /// Label used in progress lines and the text report.
  pub fn label(self) -> &'static str {
    match self {
      Verdict::Passed => "PASS",
      Verdict::Failed => "FAIL",
      Verdict::Skipped => "SKIP",
    }
  }
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Why a test file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// The scratch directory could not be prepared.
  Isolation,
  /// The file raised an error while being evaluated.
  LoadError,
  SetupFailed,
  CaseFailed,
  MainFailed,
}

impl FailureKind {
  pub fn indicator(self) -> &'static str {
    match self {
      FailureKind::Isolation => "isolation error",
      FailureKind::LoadError => "load error",
      FailureKind::SetupFailed => "setup failed",
      FailureKind::CaseFailed => "case failures",
      FailureKind::MainFailed => "test_main failed",
    }
  }
}

pub(crate) fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
  /// Function name, e.g. `test_builds_image`.
  pub name: String,
  /// Human-readable label, e.g. `builds image`.
  pub label: String,
  pub verdict: Verdict,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(rename = "duration_ms", serialize_with = "as_millis")]
  pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
  /// Path relative to the test directory, `/`-separated.
  pub file: String,
  pub verdict: Verdict,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure: Option<FailureKind>,
  /// Failure detail or skip reason.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  pub cases: Vec<CaseReport>,
  #[serde(rename = "duration_ms", serialize_with = "as_millis")]
  pub duration: Duration,
}

impl FileReport {
  pub fn skipped(file: impl Into<String>, reason: impl Into<String>) -> Self {
    Self {
      file: file.into(),
      verdict: Verdict::Skipped,
      failure: None,
      message: Some(reason.into()),
      cases: Vec::new(),
      duration: Duration::ZERO,
    }
  }

  pub fn failed_cases(&self) -> usize {
    self.cases.iter().filter(|c| c.verdict == Verdict::Failed).count()
  }

  /// Short failure description for summaries, e.g. `2 case(s) failed`.
  pub fn indicator(&self) -> Option<String> {
    match self.failure? {
      FailureKind::CaseFailed => Some(format!("{} case(s) failed", self.failed_cases())),
      kind => Some(kind.indicator().to_string()),
    }
  }
}

/// Label for a case function: strip `test_`, separators become spaces.
pub fn case_label(name: &str) -> String {
  name
    .strip_prefix(crate::consts::TEST_CASE_PREFIX)
    .unwrap_or(name)
    .replace(['_', '-'], " ")
}
