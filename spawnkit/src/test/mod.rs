mod spawn;

/// Wire the log facade to the test harness once.
fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
