use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Installs the global fmt subscriber.
///
/// The filter comes from `RUST_LOG` when it is set and parses, then from
/// `fallback` (the configured `log_filter`, or `debug` under `--verbose`),
/// and finally plain `info`.
pub fn init_tracing(fallback: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    Registry::default().with(env_filter).with(fmt_layer).init();
}
