//! Isolated execution of one test file.
//!
//! Each file is evaluated in the run's Lua state, in an environment table of
//! its own that is dropped when the file completes, so nothing it defined
//! survives into the next file. While the file runs, the active scope is its
//! scratch directory with an empty environment overlay, and parameter changes
//! are rolled back afterwards. Extensions stay loaded across files.
//!
//! Order within a file: evaluate, then either `test_main` alone, or `setup`,
//! each `test_*` case in first-definition order, and `teardown`.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use mlua::prelude::*;
use tracing::{debug, info, warn};

use super::discovery::{TestFile, TestFilter};
use super::types::{CaseReport, FailureKind, FileReport, Verdict, case_label};
use crate::context::{RunContext, Scope};
use crate::lua::error_message;
use crate::lua::globals::{self, SkipSignal};
use crate::lua::loaders::{self, MAIN_FN, SETUP_FN, TEARDOWN_FN, TestDeclarations};
use crate::module;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
  /// Keep per-file scratch directories after the run.
  pub keep_files: bool,
  /// Default timeout for `sh` operations inside test files.
  pub timeout: Option<Duration>,
}

enum Outcome {
  Passed,
  Failed(String),
  Skipped(String),
}

/// Call a test function, turning its result (and any skip request) into an [`Outcome`].
fn call(func: &LuaFunction, signal: &RefCell<SkipSignal>) -> Outcome {
  let result = func.call::<LuaValue>(());
  if let Some(reason) = signal.borrow_mut().take() {
    return Outcome::Skipped(reason);
  }
  match result {
    Ok(LuaValue::Boolean(false)) => Outcome::Failed("returned false".to_string()),
    Ok(_) => Outcome::Passed,
    Err(e) => Outcome::Failed(error_message(&e)),
  }
}

pub struct FileRunner<'a> {
  ctx: &'a RunContext,
  options: RunOptions,
  scratch_root: PathBuf,
}

impl<'a> FileRunner<'a> {
  pub fn new(ctx: &'a RunContext, scratch_root: PathBuf, options: RunOptions) -> Self {
    Self {
      ctx,
      options,
      scratch_root,
    }
  }

  /// Scratch directory for a file, mirroring its relative path.
  pub fn scratch_dir(&self, file: &TestFile) -> PathBuf {
    file
      .relative
      .split('/')
      .fold(self.scratch_root.clone(), |dir, part| dir.join(part))
  }

  pub fn run(&self, file: &TestFile, filter: &TestFilter) -> FileReport {
    if let Some(reason) = filter.skip_reason(&file.relative) {
      info!(file = %file.relative, reason = %reason, "skipping test file");
      return FileReport::skipped(&file.relative, reason);
    }

    let started = Instant::now();
    let scratch = self.scratch_dir(file);
    let mut report = match recreate_dir(&scratch) {
      Ok(()) => self.evaluate(file, &scratch),
      Err(e) => failed(
        file,
        FailureKind::Isolation,
        format!("cannot prepare {}: {}", scratch.display(), e),
        Vec::new(),
      ),
    };
    report.duration = started.elapsed();

    if self.options.keep_files {
      debug!(file = %file.relative, dir = %scratch.display(), "keeping scratch directory");
    } else if let Err(e) = fs::remove_dir_all(&scratch)
      && e.kind() != std::io::ErrorKind::NotFound
    {
      warn!(file = %file.relative, error = %e, "failed to remove scratch directory");
    }

    info!(file = %file.relative, verdict = %report.verdict, "test file finished");
    report
  }

  fn evaluate(&self, file: &TestFile, scratch: &Path) -> FileReport {
    let lua = match module::script_state(self.ctx) {
      Ok(lua) => lua,
      Err(e) => return failed(file, FailureKind::LoadError, error_message(&e), Vec::new()),
    };
    let scope = Scope::new(scratch).with_default_timeout(self.options.timeout);
    self.ctx.isolated(scope, || self.evaluate_in(&lua, file))
  }

  fn evaluate_in(&self, lua: &Lua, file: &TestFile) -> FileReport {
    let signal = Rc::new(RefCell::new(SkipSignal::default()));
    let kiln = match globals::create_test_globals(lua, &file.relative, signal.clone()) {
      Ok(kiln) => kiln,
      Err(e) => return failed(file, FailureKind::LoadError, error_message(&e), Vec::new()),
    };

    let loaded = loaders::load_test_file(lua, &file.path, Some(kiln));
    if let Some(reason) = signal.borrow_mut().take() {
      return FileReport::skipped(&file.relative, reason);
    }
    let decls = match loaded {
      Ok(decls) => decls,
      Err(e) => return failed(file, FailureKind::LoadError, error_message(&e), Vec::new()),
    };

    match self.run_declarations(file, &decls, &signal) {
      Ok(report) => report,
      Err(e) => failed(file, FailureKind::LoadError, error_message(&e), Vec::new()),
    }
  }

  fn run_declarations(
    &self,
    file: &TestFile,
    decls: &TestDeclarations,
    signal: &RefCell<SkipSignal>,
  ) -> LuaResult<FileReport> {
    if let Some(main) = decls.function(MAIN_FN)? {
      debug!(file = %file.relative, "running test_main");
      return Ok(match call(&main, signal) {
        Outcome::Passed => passed(file, Vec::new()),
        Outcome::Failed(msg) => failed(file, FailureKind::MainFailed, msg, Vec::new()),
        Outcome::Skipped(reason) => FileReport::skipped(&file.relative, reason),
      });
    }

    let teardown = decls.function(TEARDOWN_FN)?;
    if let Some(setup) = decls.function(SETUP_FN)? {
      match call(&setup, signal) {
        Outcome::Passed => {}
        Outcome::Failed(msg) => {
          return Ok(failed(file, FailureKind::SetupFailed, msg, Vec::new()));
        }
        Outcome::Skipped(reason) => {
          run_teardown(file, teardown.as_ref(), signal);
          return Ok(FileReport::skipped(&file.relative, reason));
        }
      }
    }

    let mut cases = Vec::new();
    for name in decls.case_names()? {
      let Some(func) = decls.function(&name)? else {
        continue;
      };
      let started = Instant::now();
      let outcome = call(&func, signal);
      let duration = started.elapsed();

      let (verdict, message) = match outcome {
        Outcome::Passed => (Verdict::Passed, None),
        Outcome::Failed(msg) => (Verdict::Failed, Some(msg)),
        Outcome::Skipped(reason) => (Verdict::Skipped, Some(reason)),
      };
      debug!(file = %file.relative, case = %name, verdict = %verdict, "case finished");
      cases.push(CaseReport {
        label: case_label(&name),
        name,
        verdict,
        message,
        duration,
      });
    }

    run_teardown(file, teardown.as_ref(), signal);

    // Skipped cases count on their own and never fail the file.
    let failures = cases.iter().filter(|c| c.verdict == Verdict::Failed).count();
    Ok(if failures > 0 {
      failed(
        file,
        FailureKind::CaseFailed,
        format!("{} of {} case(s) failed", failures, cases.len()),
        cases,
      )
    } else {
      passed(file, cases)
    })
  }
}

/// Teardown failures are logged and never change the file's verdict.
fn run_teardown(file: &TestFile, teardown: Option<&LuaFunction>, signal: &RefCell<SkipSignal>) {
  let Some(teardown) = teardown else {
    return;
  };
  match call(teardown, signal) {
    Outcome::Passed => {}
    Outcome::Failed(msg) => warn!(file = %file.relative, error = %msg, "teardown failed"),
    Outcome::Skipped(_) => debug!(file = %file.relative, "skip requested from teardown ignored"),
  }
}

fn recreate_dir(dir: &Path) -> std::io::Result<()> {
  match fs::remove_dir_all(dir) {
    Ok(()) => {}
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => return Err(e),
  }
  fs::create_dir_all(dir)
}

fn passed(file: &TestFile, cases: Vec<CaseReport>) -> FileReport {
  FileReport {
    file: file.relative.clone(),
    verdict: Verdict::Passed,
    failure: None,
    message: None,
    cases,
    duration: Duration::ZERO,
  }
}

fn failed(file: &TestFile, kind: FailureKind, message: String, cases: Vec<CaseReport>) -> FileReport {
  FileReport {
    file: file.relative.clone(),
    verdict: Verdict::Failed,
    failure: Some(kind),
    message: Some(message),
    cases,
    duration: Duration::ZERO,
  }
}
