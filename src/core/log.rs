use tracing_subscriber::{
    EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Filter used when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose { "ratekeeper=debug" } else { "off" }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` always wins, so `RUST_LOG=ratekeeper=info ratekeeper serve` logs
/// refreshes and fallbacks without `--verbose`. Otherwise output is off unless
/// `verbose` is set, which enables debug output for this crate only.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(fmt::layer().pretty().without_time())
        .with(filter)
        .init();
}
