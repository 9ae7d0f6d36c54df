mod run_tests;
mod test_target_tests;
