//! Logging setup for the binary.

/// Initialize `env_logger`. Library code only uses the `log` macros; the
/// binary (or embedding application) decides where the output goes.
pub fn setup_logging() {
    env_logger::init();
    log::info!("Logging initialized");
}
