mod test_align;
mod test_inference;

/// Route `log` output through the test harness; safe to call from every test.
pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
