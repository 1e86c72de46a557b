use tracing_subscriber::EnvFilter;

/// Installs a stderr fmt subscriber. `RUST_LOG` overrides the default
/// `info` filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

pub fn init_tracing_with_default(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
