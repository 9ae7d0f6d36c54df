//! The built-in `test` target: isolation, lifecycle and reporting.

use kiln_lib::target::{BodyError, ExecuteError};
use kiln_lib::testing::{FailureKind, Verdict};
use kiln_lib::{Engine, EngineError};

use super::common::{TestModule, run};

const MODULE: &str = r#"
kiln.module { name = "svc" }
kiln.target { name = "build", run = function() end }
"#;

fn tests_failed(err: &EngineError) -> bool {
  matches!(
    err,
    EngineError::Execute(ExecuteError::TargetFailed {
      source: BodyError::TestsFailed { .. },
      ..
    })
  )
}

mod lifecycle {
  use super::*;

  #[test]
  fn setup_cases_teardown() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/lifecycle.lua",
      r#"
local fs = kiln.load("fs")
function setup() fs.write("order.txt", "setup") end
function test_a() fs.write("order.txt", fs.read("order.txt") .. " a") end
function test_b()
  fs.write("order.txt", fs.read("order.txt") .. " b")
  error("b broke")
end
function teardown()
  fs.write(kiln.build_dir .. "/order.txt", fs.read("order.txt") .. " teardown")
end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    assert!(tests_failed(&result.unwrap_err()));

    let report = observer.file("lifecycle.lua");
    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(report.failure, Some(FailureKind::CaseFailed));
    let verdicts: Vec<_> = report.cases.iter().map(|c| (c.name.as_str(), c.verdict)).collect();
    assert_eq!(verdicts, vec![("test_a", Verdict::Passed), ("test_b", Verdict::Failed)]);
    assert!(report.cases[1].message.as_deref().unwrap_or_default().contains("b broke"));

    assert_eq!(module.read_build_file("order.txt"), "setup a b teardown");

    let json = module.json_report();
    assert_eq!(json["cases"]["total"], 2);
    assert_eq!(json["cases"]["passed"], 1);
    assert_eq!(json["cases"]["failed"], 1);
    assert_eq!(json["suites"]["failed"], 1);
  }

  #[test]
  fn failing_setup_skips_cases_and_teardown() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/broken.lua",
      r#"
local fs = kiln.load("fs")
function setup() error("no database") end
function test_never() fs.write(kiln.build_dir .. "/case-ran", "") end
function teardown() fs.write(kiln.build_dir .. "/teardown-ran", "") end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    assert!(tests_failed(&result.unwrap_err()));

    let report = observer.file("broken.lua");
    assert_eq!(report.failure, Some(FailureKind::SetupFailed));
    assert!(report.cases.is_empty());
    assert!(!module.build_path("case-ran").exists());
    assert!(!module.build_path("teardown-ran").exists());
  }

  #[test]
  fn test_main_is_exclusive() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/main.lua",
      r#"
local fs = kiln.load("fs")
function setup() fs.write(kiln.build_dir .. "/setup-ran", "") end
function test_ignored() fs.write(kiln.build_dir .. "/case-ran", "") end
function test_main() return true end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    result.unwrap();

    let report = observer.file("main.lua");
    assert_eq!(report.verdict, Verdict::Passed);
    assert!(report.cases.is_empty());
    assert!(!module.build_path("setup-ran").exists());
    assert!(!module.build_path("case-ran").exists());
  }

  #[test]
  fn test_main_returning_false_fails_the_suite() {
    let module = TestModule::new(MODULE);
    module.write_file("tests/main.lua", "function test_main() return false end");

    let (result, observer) = run(&module, &["test"]);
    assert!(tests_failed(&result.unwrap_err()));
    assert_eq!(observer.file("main.lua").failure, Some(FailureKind::MainFailed));
  }

  #[test]
  fn cases_run_in_definition_order() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/order.lua",
      r#"
function test_zeta() end
local function test_hidden() error("locals are not cases") end
function test_alpha() end
function helper() end
function test_zeta() end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    result.unwrap();
    let names: Vec<_> = observer
      .file("order.lua")
      .cases
      .into_iter()
      .map(|c| c.label)
      .collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
  }

  #[test]
  fn load_error_fails_the_suite() {
    let module = TestModule::new(MODULE);
    module.write_file("tests/syntax.lua", "function test_a( end");
    module.write_file("tests/ok.lua", "function test_ok() end");

    let (result, observer) = run(&module, &["test"]);
    assert!(tests_failed(&result.unwrap_err()));
    assert_eq!(observer.file("syntax.lua").failure, Some(FailureKind::LoadError));
    assert_eq!(observer.file("ok.lua").verdict, Verdict::Passed);
  }

  #[test]
  fn teardown_failure_keeps_verdict() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/flaky.lua",
      r#"
function test_fine() end
function teardown() error("cleanup failed") end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    result.unwrap();
    assert_eq!(observer.file("flaky.lua").verdict, Verdict::Passed);
  }
}

mod skipping {
  use super::*;

  #[test]
  fn skipped_case_is_neither_pass_nor_fail() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/mixed.lua",
      r#"
function test_runs() end
function test_needs_gpu() kiln.skip("no gpu") end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    result.unwrap();

    let report = observer.file("mixed.lua");
    assert_eq!(report.verdict, Verdict::Passed);
    assert_eq!(report.cases[1].verdict, Verdict::Skipped);
    assert_eq!(report.cases[1].message.as_deref(), Some("no gpu"));

    let json = module.json_report();
    assert_eq!(json["cases"]["skipped"], 1);
    assert_eq!(json["cases"]["passed"], 1);
  }

  #[test]
  fn all_cases_skipped_still_passes() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/gpu.lua",
      r#"
function test_cuda() kiln.skip("no gpu") end
function test_rocm() kiln.skip("no gpu") end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    result.unwrap();

    let report = observer.file("gpu.lua");
    assert_eq!(report.verdict, Verdict::Passed);
    assert!(report.cases.iter().all(|c| c.verdict == Verdict::Skipped));

    let json = module.json_report();
    assert_eq!(json["suites"]["passed"], 1);
    assert_eq!(json["suites"]["skipped"], 0);
    assert_eq!(json["cases"]["skipped"], 2);
  }

  #[test]
  fn file_level_skip_skips_the_suite() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/linux_only.lua",
      r#"
kiln.skip("linux only")
function test_never() error("should not run") end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    result.unwrap();
    let report = observer.file("linux_only.lua");
    assert_eq!(report.verdict, Verdict::Skipped);
    assert_eq!(report.message.as_deref(), Some("linux only"));
  }

  #[test]
  fn skip_in_setup_still_runs_teardown() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/setup_skip.lua",
      r#"
local fs = kiln.load("fs")
function setup() kiln.skip("no registry") end
function test_never() fs.write(kiln.build_dir .. "/case-ran", "") end
function teardown() fs.write(kiln.build_dir .. "/teardown-ran", "") end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    result.unwrap();
    assert_eq!(observer.file("setup_skip.lua").verdict, Verdict::Skipped);
    assert!(module.build_path("teardown-ran").exists());
    assert!(!module.build_path("case-ran").exists());
  }
}

mod isolation {
  use super::*;

  #[test]
  fn files_do_not_share_state() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/a.lua",
      r#"
leaked = "from a"
function test_sets_env()
  kiln.setenv("KILN_TEST_LEAK", "a")
  kiln.chdir("..")
end
"#,
    );
    module.write_file(
      "tests/b.lua",
      r#"
function test_sees_nothing()
  assert(leaked == nil, "global leaked")
  assert(test_sets_env == nil, "function leaked")
  assert(kiln.getenv("KILN_TEST_LEAK") == nil, "env leaked")
  assert(kiln.workdir():match("tests[/\\]b%.lua$"), "unexpected workdir " .. kiln.workdir())
end
"#,
    );

    let (result, observer) = run(&module, &["test"]);
    result.unwrap();
    assert_eq!(observer.file("b.lua").verdict, Verdict::Passed);
    assert!(std::env::var_os("KILN_TEST_LEAK").is_none());
  }

  #[test]
  fn scratch_dirs_are_removed_unless_kept() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/nested/writes.lua",
      r#"
local fs = kiln.load("fs")
function test_writes() fs.write("out/data.txt", "payload") end
"#,
    );

    let (result, _) = run(&module, &["test"]);
    result.unwrap();
    assert!(!module.build_path("tests").exists());

    let (result, _) = run(&module, &["test", "--keep-test-files"]);
    result.unwrap();
    assert_eq!(module.read_build_file("tests/nested/writes.lua/out/data.txt"), "payload");

    let (result, _) = run(&module, &["test"]);
    result.unwrap();
    assert!(!module.build_path("tests/nested").exists());
  }

  #[test]
  fn params_set_in_one_file_do_not_leak() {
    let module = TestModule::new(MODULE);
    module.write_file(
      "tests/a.lua",
      r#"function test_sets() kiln.set_param("arch", "riscv") end"#,
    );
    module.write_file(
      "tests/b.lua",
      r#"function test_reads() assert(kiln.param("arch") == "amd64") end"#,
    );

    let (result, _) = run(&module, &["test", "-Parch=amd64"]);
    result.unwrap();
  }
}

mod filters_and_reports {
  use super::*;

  #[test]
  fn empty_run_succeeds_with_zero_totals() {
    let module = TestModule::new(MODULE);

    let (result, _) = run(&module, &["test"]);
    result.unwrap();

    let json = module.json_report();
    assert_eq!(json["suites"]["total"], 0);
    assert_eq!(json["cases"]["total"], 0);
    assert!(module.read_build_file("test-report.txt").contains("Suites: 0 total"));
  }

  #[test]
  fn exclusion_overrides_inclusion() {
    let module = TestModule::new(MODULE);
    module.write_file("tests/api/users.lua", "function test_users() end");
    module.write_file("tests/api/slow_export.lua", "function test_export() error('slow') end");
    module.write_file("tests/cli/flags.lua", "function test_flags() error('not selected') end");

    let (result, observer) = run(&module, &["test", "-Ptest.include=^api/", "-Ptest.exclude=slow"]);
    result.unwrap();

    assert_eq!(observer.file("api/users.lua").verdict, Verdict::Passed);
    let excluded = observer.file("api/slow_export.lua");
    assert_eq!(excluded.verdict, Verdict::Skipped);
    assert_eq!(excluded.message.as_deref(), Some("excluded by test.exclude"));
    assert_eq!(
      observer.file("cli/flags.lua").message.as_deref(),
      Some("not matched by test.include")
    );
  }

  #[test]
  fn invalid_pattern_fails_the_target() {
    let module = TestModule::new(MODULE);

    let (result, _) = run(&module, &["test", "-Ptest.exclude=[unclosed"]);
    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("-Ptest.exclude"), "{}", err);
  }

  #[test]
  fn report_is_written_on_failure() {
    let module = TestModule::new(MODULE);
    module.write_file("tests/bad.lua", "function test_bad() return false end");

    let engine = Engine::load(
      module.path(),
      &["test"],
      std::rc::Rc::new(kiln_lib::observer::NoopObserver),
    )
    .unwrap();
    assert!(engine.run().is_err());

    let summary = engine.test_summary().unwrap();
    assert!(!summary.success());
    assert!(summary.render_summary().contains("  bad.lua (1 case(s) failed)"));

    let text = module.read_build_file("test-report.txt");
    assert!(text.contains("FAIL bad.lua"));
    assert!(text.contains("    FAIL bad: returned false"));
  }
}
