//! Shared names and defaults.

/// Application name, used for the user config directory.
pub const APP_NAME: &str = "kiln";

/// File that marks a directory as a module.
pub const MODULE_FILE: &str = "module.lua";

/// Default build output directory, relative to the module root.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Default test directory, relative to the module root.
pub const DEFAULT_TEST_DIR: &str = "tests";

/// Module-local extension directory, relative to the module root.
pub const EXTENSION_DIR: &str = "extensions";

/// Scratch directories for test files live under `<build>/<TEST_SCRATCH_DIR>`.
pub const TEST_SCRATCH_DIR: &str = "tests";

/// Human-readable test report, inside the build directory.
pub const TEXT_REPORT_FILE: &str = "test-report.txt";

/// Machine-readable test report, inside the build directory.
pub const JSON_REPORT_FILE: &str = "test-report.json";

/// Target run when none is requested.
pub const DEFAULT_TARGET: &str = "build";

/// Built-in target names.
pub const CLEAN_TARGET: &str = "clean";
pub const BUILD_TARGET: &str = "build";
pub const TEST_TARGET: &str = "test";

/// Prefix marking a test case function.
pub const TEST_CASE_PREFIX: &str = "test_";

/// Flag that preserves per-file scratch directories.
pub const KEEP_TEST_FILES_FLAG: &str = "keep-test-files";

/// Parameters read by the test runner.
pub const TEST_INCLUDE_PARAM: &str = "test.include";
pub const TEST_EXCLUDE_PARAM: &str = "test.exclude";
pub const TEST_TIMEOUT_PARAM: &str = "test.timeout";

/// Environment variable with extra extension directories.
pub const EXTENSION_PATH_ENV: &str = "KILN_EXTENSION_PATH";

/// Exit status for target and test failures.
pub const EXIT_FAILURE: u8 = 1;

/// Exit status for structural errors (bad arguments, cycles, unknown targets, disabled flags).
pub const EXIT_STRUCTURAL: u8 = 2;
