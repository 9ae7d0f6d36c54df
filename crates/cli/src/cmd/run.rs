//! Implementation of the default command: run the requested targets.
//!
//! Progress is printed as targets finish and as each test file completes.
//! When the `test` target ran, its summary is printed even if it failed.

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};
use tracing::debug;

use kiln_lib::Engine;
use kiln_lib::observer::RunObserver;
use kiln_lib::testing::{FileReport, Verdict};

use crate::output::{format_duration, print_success, symbols};

/// Prints target and test-file progress to stdout.
#[derive(Debug, Default)]
pub struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
  fn target_started(&self, name: &str) {
    println!(
      "{} {}",
      symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.blue()),
      name.if_supports_color(Stream::Stdout, |s| s.bold())
    );
  }

  fn target_finished(&self, name: &str, duration: Duration, success: bool) {
    if success {
      println!(
        "{} {} ({})",
        symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
        name,
        format_duration(duration)
      );
    }
  }

  fn test_file_finished(&self, report: &FileReport) {
    println!("{}", file_line(report));
    for case in &report.cases {
      if case.verdict == Verdict::Passed {
        continue;
      }
      match &case.message {
        Some(message) => println!("    {} {}: {}", verdict_label(case.verdict), case.label, message),
        None => println!("    {} {}", verdict_label(case.verdict), case.label),
      }
    }
  }
}

fn verdict_label(verdict: Verdict) -> String {
  match verdict {
    Verdict::Passed => verdict.label().if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    Verdict::Failed => verdict.label().if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    Verdict::Skipped => verdict.label().if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
  }
}

fn file_line(report: &FileReport) -> String {
  let mut line = format!(
    "{} {} ({})",
    verdict_label(report.verdict),
    report.file,
    format_duration(report.duration)
  );
  if let Some(message) = &report.message {
    line.push_str(": ");
    line.push_str(message);
  }
  line
}

pub fn cmd_run(module_dir: &Path, args: &[String]) -> Result<()> {
  debug!(module = %module_dir.display(), ?args, "running module");
  let engine = Engine::load(module_dir, args, Rc::new(ConsoleObserver))?;
  let result = engine.run();

  if let Some(summary) = engine.test_summary() {
    println!();
    print!("{}", summary.render_summary());
  }

  let executed = result?;
  let total: Duration = executed.iter().map(|t| t.duration).sum();
  print_success(&format!(
    "{} target(s) completed in {}",
    executed.len(),
    format_duration(total)
  ));
  Ok(())
}

