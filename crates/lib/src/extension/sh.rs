//! The `sh` extension: run shell commands from scripts.
//!
//! Commands run through the platform shell in the scope's working directory.
//! The child inherits the process environment, overlaid with the scope's
//! environment and then the per-call `env` option. A timeout kills the child
//! and is reported like any other failed command.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use mlua::prelude::*;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::context::{Scope, SharedScope};

#[derive(Debug, Error)]
pub enum ShellError {
  #[error("failed to spawn '{cmd}': {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command '{cmd}' exited with {}{}", exit_status(.code), stderr_suffix(.stderr))]
  Failed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("command '{cmd}' timed out after {}s", .timeout.as_secs_f64())]
  TimedOut { cmd: String, timeout: Duration },

  #[error("failed to start process runtime: {0}")]
  Runtime(#[source] std::io::Error),
}

fn exit_status(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("code {}", code),
    None => "a signal".to_string(),
  }
}

fn stderr_suffix(stderr: &str) -> String {
  let stderr = stderr.trim();
  if stderr.is_empty() {
    String::new()
  } else {
    format!(": {}", stderr)
  }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOptions {
  /// Working directory, relative to the scope's.
  pub cwd: Option<String>,
  pub env: BTreeMap<String, String>,
  /// Overrides the scope's default timeout.
  pub timeout: Option<Duration>,
  pub shell: Option<String>,
}

/// Captured result of a finished (or killed) command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
  /// `None` when the process was killed.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub timed_out: bool,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    !self.timed_out && self.code == Some(0)
  }
}

/// Run `cmd` to completion. A non-zero exit is not an error here.
pub fn run(cmd: &str, scope: &Scope, opts: &ShellOptions) -> Result<CommandOutput, ShellError> {
  let (shell_cmd, shell_args) = get_shell(opts.shell.as_deref());
  let working_dir: PathBuf = match &opts.cwd {
    Some(cwd) => scope.resolve(cwd),
    None => scope.workdir().to_path_buf(),
  };
  let timeout = opts.timeout.or(scope.default_timeout());

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(cmd)
    .current_dir(&working_dir)
    .stdin(Stdio::null())
    .kill_on_drop(true);

  for (key, value) in scope.env_overlay() {
    match value {
      Some(value) => command.env(key, value),
      None => command.env_remove(key),
    };
  }
  for (key, value) in &opts.env {
    command.env(key, value);
  }

  info!(cmd = %cmd, "executing command");
  debug!(shell = %shell_cmd, working_dir = ?working_dir, timeout = ?timeout, "spawning process");

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .map_err(ShellError::Runtime)?;

  let output = runtime.block_on(async {
    match timeout {
      Some(limit) => tokio::time::timeout(limit, command.output()).await.ok(),
      None => Some(command.output().await),
    }
  });

  let output = match output {
    Some(result) => result.map_err(|source| ShellError::Spawn {
      cmd: cmd.to_string(),
      source,
    })?,
    None => {
      debug!(cmd = %cmd, "command timed out, child killed");
      return Ok(CommandOutput {
        code: None,
        stdout: String::new(),
        stderr: String::new(),
        timed_out: true,
      });
    }
  };

  let result = CommandOutput {
    code: output.status.code(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    timed_out: false,
  };

  if !result.success() {
    if !result.stderr.is_empty() {
      debug!(stderr = %result.stderr, "command stderr");
    }
    if !result.stdout.is_empty() {
      debug!(stdout = %result.stdout, "command stdout");
    }
  }

  Ok(result)
}

/// Run `cmd` and return its trimmed stdout, failing on non-zero exit or timeout.
pub fn exec(cmd: &str, scope: &Scope, opts: &ShellOptions) -> Result<String, ShellError> {
  let output = run(cmd, scope, opts)?;
  if output.timed_out {
    return Err(ShellError::TimedOut {
      cmd: cmd.to_string(),
      timeout: opts.timeout.or(scope.default_timeout()).unwrap_or_default(),
    });
  }
  if output.code != Some(0) {
    return Err(ShellError::Failed {
      cmd: cmd.to_string(),
      code: output.code,
      stderr: output.stderr,
    });
  }
  Ok(output.stdout.trim().to_string())
}

/// Shell command and the arguments that precede the script.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  // Not $SHELL: interactive shells may source user profiles.
  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}

fn options_from_lua(opts: Option<LuaTable>) -> LuaResult<ShellOptions> {
  let Some(opts) = opts else {
    return Ok(ShellOptions::default());
  };

  let mut env = BTreeMap::new();
  if let Some(table) = opts.get::<Option<LuaTable>>("env")? {
    for pair in table.pairs::<String, String>() {
      let (key, value) = pair?;
      env.insert(key, value);
    }
  }

  let timeout = match opts.get::<Option<f64>>("timeout")? {
    Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
    Some(secs) => return Err(LuaError::external(format!("invalid timeout: {}", secs))),
    None => None,
  };

  Ok(ShellOptions {
    cwd: opts.get("cwd")?,
    env,
    timeout,
    shell: opts.get("shell")?,
  })
}

/// Build the `sh` operations table bound to `scope`.
pub fn create_sh(lua: &Lua, scope: SharedScope) -> LuaResult<LuaTable> {
  let sh = lua.create_table()?;

  let run_scope = scope.clone();
  sh.set(
    "run",
    lua.create_function(move |lua, (cmd, opts): (String, Option<LuaTable>)| {
      let opts = options_from_lua(opts)?;
      let output = run(&cmd, &run_scope.borrow(), &opts).map_err(LuaError::external)?;

      let result = lua.create_table()?;
      result.set("ok", output.success())?;
      result.set("code", output.code)?;
      result.set("stdout", output.stdout)?;
      result.set("stderr", output.stderr)?;
      result.set("timed_out", output.timed_out)?;
      Ok(result)
    })?,
  )?;

  sh.set(
    "exec",
    lua.create_function(move |_, (cmd, opts): (String, Option<LuaTable>)| {
      let opts = options_from_lua(opts)?;
      exec(&cmd, &scope.borrow(), &opts).map_err(LuaError::external)
    })?,
  )?;

  Ok(sh)
}
