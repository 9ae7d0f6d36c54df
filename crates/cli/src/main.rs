mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kiln_lib::EngineError;
use kiln_lib::consts::{EXIT_STRUCTURAL, TEST_TIMEOUT_PARAM};

use crate::output::print_error;

/// Declarative build orchestration for Lua-scripted modules
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Module directory, or the path of its module.lua
  #[arg(short = 'C', long, env = "KILN_MODULE", default_value = ".")]
  module_dir: PathBuf,

  /// List the registered targets without running anything
  #[arg(long, conflicts_with = "show_plan")]
  list: bool,

  /// Print the order targets would run in without running them
  #[arg(long)]
  show_plan: bool,

  /// Default timeout for shell commands in test files (e.g. "30s", "2m")
  #[arg(long, value_parser = parse_timeout)]
  test_timeout: Option<Duration>,

  /// Targets, -P<key>=<value> parameters and --<flag> flags
  #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
  args: Vec<String>,
}

impl Cli {
  /// Module arguments, with `--test-timeout` turned into its parameter.
  ///
  /// The parameter goes first so an explicit `-Ptest.timeout=` still wins.
  fn module_args(&self) -> Vec<String> {
    let mut args = Vec::with_capacity(self.args.len() + 1);
    if let Some(timeout) = self.test_timeout {
      args.push(format!("-P{}={}", TEST_TIMEOUT_PARAM, timeout.as_secs_f64()));
    }
    args.extend(self.args.iter().cloned());
    args
  }
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
  let timeout = humantime::parse_duration(value).map_err(|e| e.to_string())?;
  if timeout.is_zero() {
    return Err("timeout must be greater than zero".to_string());
  }
  Ok(timeout)
}

fn init_tracing() {
  let filter = EnvFilter::try_from_env("KILN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .with_target(false)
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing();

  let args = cli.module_args();
  let result = if cli.list {
    cmd::cmd_list(&cli.module_dir, &args)
  } else if cli.show_plan {
    cmd::cmd_plan(&cli.module_dir, &args)
  } else {
    cmd::cmd_run(&cli.module_dir, &args)
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&err.to_string());
      let code = err
        .downcast_ref::<EngineError>()
        .map_or(EXIT_STRUCTURAL, EngineError::exit_code);
      ExitCode::from(code)
    }
  }
}
