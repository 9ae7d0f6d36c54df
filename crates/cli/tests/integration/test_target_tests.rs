//! The built-in `test` target through the binary.

use predicates::prelude::*;

use super::common::TestEnv;

const NOOP_BUILD_MODULE: &str = r#"
kiln.module { name = "svc" }
kiln.target { name = "build", run = function() end }
"#;

#[test]
fn passing_and_failing_files() {
  let env = TestEnv::with_module(NOOP_BUILD_MODULE);
  env.write_file(
    "tests/ok.lua",
    r#"
function test_adds() assert(1 + 1 == 2) end
"#,
  );
  env.write_file(
    "tests/smoke.lua",
    r#"
function test_starts() end
function test_responds() error("expected 200") end
"#,
  );

  env
    .kiln_cmd()
    .arg("test")
    .assert()
    .code(1)
    .stdout(predicate::str::contains("PASS ok.lua"))
    .stdout(predicate::str::contains("FAIL smoke.lua"))
    .stdout(predicate::str::contains("FAIL responds: "))
    .stdout(predicate::str::contains("Suites: 2 total, 1 passed, 1 failed, 0 skipped"))
    .stdout(predicate::str::contains("Failed suites:\n  smoke.lua (1 case(s) failed)"))
    .stderr(predicate::str::contains("test suite(s)"));

  assert!(env.build_path("test-report.txt").is_file());
  let json: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(env.build_path("test-report.json")).unwrap()).unwrap();
  assert_eq!(json["suites"]["failed"], 1);
  assert_eq!(json["cases"]["passed"], 2);
}

#[test]
fn no_test_files_succeeds() {
  let env = TestEnv::with_module(NOOP_BUILD_MODULE);

  env
    .kiln_cmd()
    .arg("test")
    .assert()
    .success()
    .stdout(predicate::str::contains("Suites: 0 total"));
}

#[test]
fn exclude_overrides_include() {
  let env = TestEnv::with_module(NOOP_BUILD_MODULE);
  env.write_file("tests/api/fast.lua", "function test_fast() end\n");
  env.write_file("tests/api/slow.lua", "function test_slow() error('too slow') end\n");

  env
    .kiln_cmd()
    .args(["test", "-Ptest.include=^api/", "-Ptest.exclude=slow"])
    .assert()
    .success()
    .stdout(predicate::str::contains("PASS api/fast.lua"))
    .stdout(predicate::str::contains("SKIP api/slow.lua"));
}

#[test]
fn invalid_filter_fails_the_target() {
  let env = TestEnv::with_module(NOOP_BUILD_MODULE);
  env.write_file("tests/a.lua", "function test_a() end\n");

  env
    .kiln_cmd()
    .args(["test", "-Ptest.include=("])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("-Ptest.include"));
}

#[test]
fn keep_test_files_preserves_scratch() {
  let env = TestEnv::with_module(NOOP_BUILD_MODULE);
  env.write_file(
    "tests/writes.lua",
    r#"
local fs = kiln.load("fs")
function test_writes() fs.write("artifact.txt", "data") end
"#,
  );

  env.kiln_cmd().arg("test").assert().success();
  assert!(!env.build_path("tests/writes.lua").exists());

  env.kiln_cmd().args(["test", "--keep-test-files"]).assert().success();
  let artifact = env.build_path("tests/writes.lua/artifact.txt");
  assert_eq!(std::fs::read_to_string(artifact).unwrap(), "data");
}

#[test]
fn build_runs_before_test_when_requested() {
  let env = TestEnv::with_module(
    r#"
local fs = kiln.load("fs")
kiln.target {
  name = "build",
  run = function() fs.write(kiln.build_dir .. "/artifact", "built") end,
}
"#,
  );
  env.write_file(
    "tests/artifact.lua",
    r#"
local fs = kiln.load("fs")
function test_artifact_exists()
  assert(fs.exists(kiln.build_dir .. "/artifact"), "build did not run first")
end
"#,
  );

  env.kiln_cmd().args(["build", "test"]).assert().success();
  env.kiln_cmd().arg("clean").assert().success();
  env.kiln_cmd().arg("test").assert().success();
}

#[test]
fn builtin_build_blocks_explicit_test() {
  let env = TestEnv::with_module("");
  env.write_file("tests/a.lua", "function test_a() end\n");

  env
    .kiln_cmd()
    .arg("test")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("target 'build' is not implemented"));
  assert!(!env.build_path("test-report.txt").exists());
}

#[test]
fn transitive_test_does_not_build() {
  let env = TestEnv::with_module(
    r#"
kiln.target { name = "build", run = function() error("build should not run") end }
kiln.target { name = "ci", deps = { "test" }, run = function() end }
"#,
  );
  env.write_file("tests/a.lua", "function test_a() end\n");

  env
    .kiln_cmd()
    .arg("ci")
    .assert()
    .success()
    .stdout(predicate::str::contains("PASS a.lua"));
}

#[cfg(unix)]
#[test]
fn timeout_option_limits_commands() {
  let env = TestEnv::with_module(NOOP_BUILD_MODULE);
  env.write_file(
    "tests/slow.lua",
    r#"
local sh = kiln.load("sh")
function test_sleeps()
  local result = sh.run("sleep 5")
  assert(result.timed_out, "expected a timeout")
end
"#,
  );

  env
    .kiln_cmd()
    .args(["--test-timeout", "200ms", "test"])
    .assert()
    .success();
}

#[test]
fn zero_timeout_is_an_argument_error() {
  let env = TestEnv::with_module(NOOP_BUILD_MODULE);

  env
    .kiln_cmd()
    .args(["--test-timeout", "0s", "test"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("greater than zero"));
  assert!(!env.build_path("test-report.txt").exists());
}
