use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber on stderr, filtered by `RUST_LOG`. Calling it
/// twice is harmless.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
