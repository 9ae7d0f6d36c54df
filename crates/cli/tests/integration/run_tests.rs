//! Running module targets through the binary.

use predicates::prelude::*;

use super::common::TestEnv;

const COUNTING_MODULE: &str = r#"
local fs = kiln.load("fs")
local runs = 0

kiln.target {
  name = "compile",
  run = function()
    runs = runs + 1
    fs.write(kiln.build_dir .. "/compile-runs.txt", tostring(runs))
  end,
}

kiln.target { name = "lint", deps = { "compile" }, run = function() end }
kiln.target { name = "package", deps = { "compile", "lint" }, run = function() end }
"#;

#[test]
fn shared_dependency_runs_once() {
  let env = TestEnv::with_module(COUNTING_MODULE);

  env
    .kiln_cmd()
    .args(["package", "lint", "compile"])
    .assert()
    .success()
    .stdout(predicate::str::contains("3 target(s) completed"));

  let runs = std::fs::read_to_string(env.build_path("compile-runs.txt")).unwrap();
  assert_eq!(runs, "1");
}

#[test]
fn params_and_flags_reach_the_module() {
  let env = TestEnv::with_module(
    r#"
local fs = kiln.load("fs")
kiln.target {
  name = "build",
  run = function()
    local load = kiln.flag("load") and "yes" or "no"
    fs.write(kiln.build_dir .. "/out.txt", kiln.param("arch", "none") .. " " .. load)
  end,
}
"#,
  );

  env
    .kiln_cmd()
    .args(["-Parch=arm64", "--load", "build", "-Parch=amd64"])
    .assert()
    .success();

  let out = std::fs::read_to_string(env.build_path("out.txt")).unwrap();
  assert_eq!(out, "amd64 yes");
}

#[test]
fn disabled_flag_aborts_with_reason() {
  let env = TestEnv::with_module(
    r#"
local fs = kiln.load("fs")
kiln.disable_flag("push", "the registry is read-only")
kiln.target {
  name = "build",
  run = function() fs.write(kiln.build_dir .. "/ran.txt", "yes") end,
}
"#,
  );

  env
    .kiln_cmd()
    .args(["build", "--push"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("the registry is read-only"));

  assert!(!env.build_path("ran.txt").exists());
}

#[test]
fn missing_required_param_is_structural() {
  let env = TestEnv::with_module(
    r#"
kiln.require_param("version")
kiln.target { name = "build", run = function() end }
"#,
  );

  env
    .kiln_cmd()
    .assert()
    .code(2)
    .stderr(predicate::str::contains("-Pversion=<value>"));

  env.kiln_cmd().arg("-Pversion=1.2.0").assert().success();
}

#[test]
fn cycle_is_rejected_before_anything_runs() {
  let env = TestEnv::with_module(
    r#"
local fs = kiln.load("fs")
kiln.target { name = "prepare", run = function() fs.write(kiln.build_dir .. "/ran.txt", "yes") end }
kiln.target { name = "a", deps = { "prepare", "b" }, run = function() end }
kiln.target { name = "b", deps = { "a" }, run = function() end }
"#,
  );

  env
    .kiln_cmd()
    .arg("a")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("circular dependency"));

  assert!(!env.build_path("ran.txt").exists());
}

#[cfg(unix)]
#[test]
fn command_target_runs_in_module_root() {
  let env = TestEnv::with_module(
    r#"
kiln.target { name = "build", cmd = "mkdir -p build && echo built > build/marker" }
"#,
  );

  env.kiln_cmd().assert().success();

  let marker = std::fs::read_to_string(env.build_path("marker")).unwrap();
  assert_eq!(marker.trim(), "built");
}

#[cfg(unix)]
#[test]
fn failing_command_target_exits_with_one() {
  let env = TestEnv::with_module(
    r#"
kiln.target { name = "build", cmd = "echo broken >&2; exit 3" }
"#,
  );

  env
    .kiln_cmd()
    .assert()
    .code(1)
    .stderr(predicate::str::contains("exited with"));
}

#[test]
fn clean_removes_build_dir() {
  let env = TestEnv::with_module("");
  env.write_file("build/stale.txt", "old");

  env.kiln_cmd().arg("clean").assert().success();

  assert!(!env.root().join("build").exists());
}
