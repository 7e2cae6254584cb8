//! Log subscriber setup.

/// Install a `RUST_LOG`-filtered fmt subscriber unless the embedding
/// application already set one.
///
/// Thread names are printed so lines from the `calc-worker-{id}` threads can
/// be told apart from submit-path logs on the tokio runtime.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
