//! Test file discovery and include/exclude filtering.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use super::TestRunError;
use crate::args::Params;
use crate::consts::{TEST_EXCLUDE_PARAM, TEST_INCLUDE_PARAM};

/// A discovered test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFile {
  pub path: PathBuf,
  /// Relative to the test directory, `/`-separated.
  pub relative: String,
}

/// All `*.lua` files under `test_dir`, in lexicographic order of relative path.
/// A missing directory has no tests.
pub fn discover(test_dir: &Path) -> Result<Vec<TestFile>, TestRunError> {
  if !test_dir.is_dir() {
    debug!(dir = %test_dir.display(), "no test directory");
    return Ok(Vec::new());
  }

  let mut files = Vec::new();
  for entry in WalkDir::new(test_dir).follow_links(true) {
    let entry = entry.map_err(|e| TestRunError::Discovery {
      dir: test_dir.to_path_buf(),
      message: e.to_string(),
    })?;
    if !entry.file_type().is_file() || entry.path().extension().is_none_or(|ext| ext != "lua") {
      continue;
    }

    let Ok(relative) = entry.path().strip_prefix(test_dir) else {
      continue;
    };
    let relative = relative
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    files.push(TestFile {
      path: entry.path().to_path_buf(),
      relative,
    });
  }

  files.sort_by(|a, b| a.relative.cmp(&b.relative));
  debug!(count = files.len(), "discovered test files");
  Ok(files)
}

/// Include/exclude patterns matched against a file's relative path.
#[derive(Debug, Clone, Default)]
pub struct TestFilter {
  include: Option<Regex>,
  exclude: Option<Regex>,
}

impl TestFilter {
  pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self, TestRunError> {
    Ok(Self {
      include: compile(TEST_INCLUDE_PARAM, include)?,
      exclude: compile(TEST_EXCLUDE_PARAM, exclude)?,
    })
  }

  pub fn from_params(params: &Params) -> Result<Self, TestRunError> {
    Self::new(params.get(TEST_INCLUDE_PARAM), params.get(TEST_EXCLUDE_PARAM))
  }

  /// Skip reason for `relative`, or `None` if it should run. Exclusion wins.
  pub fn skip_reason(&self, relative: &str) -> Option<String> {
    if let Some(exclude) = &self.exclude
      && exclude.is_match(relative)
    {
      return Some(format!("excluded by {}", TEST_EXCLUDE_PARAM));
    }
    if let Some(include) = &self.include
      && !include.is_match(relative)
    {
      return Some(format!("not matched by {}", TEST_INCLUDE_PARAM));
    }
    None
  }
}

fn compile(param: &str, pattern: Option<&str>) -> Result<Option<Regex>, TestRunError> {
  let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
    return Ok(None);
  };
  Regex::new(pattern)
    .map(Some)
    .map_err(|e| TestRunError::InvalidPattern {
      param: param.to_string(),
      message: e.to_string(),
    })
}
