use tracing_subscriber::EnvFilter;

/// Install the `fmt` subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; only the first call installs anything. The libretro core
/// calls this on every load because a frontend may load content repeatedly.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
