use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber for binaries and tests.
///
/// Filtering defaults to `info` for this crate and can be overridden with
/// `RUST_LOG`. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wrenchcloud_import=info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
