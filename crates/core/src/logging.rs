//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,fivemapper=debug";

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (RUST_LOG), falling back to
///   [`DEFAULT_LOG_FILTER`]
/// - Target and thread ids on every line
///
/// # Panics
///
/// Panics if a global subscriber is already installed. Use
/// [`try_init_logging`] where that can happen.
///
/// # Example
/// ```
/// fivemapper_core::init_logging();
/// tracing::info!("FiveMapper starting");
/// ```
pub fn init_logging() {
    subscriber().init();
}

/// Like [`init_logging`], but returns `false` instead of panicking when a
/// subscriber is already installed.
pub fn try_init_logging() -> bool {
    subscriber().try_init().is_ok()
}

fn subscriber() -> impl tracing_subscriber::util::SubscriberInitExt {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
}
