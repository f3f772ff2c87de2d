//! Tracing setup.
//!
//! The subscriber is installed once at startup with a provisional level so
//! config loading itself gets logged; after the configuration is parsed,
//! [`apply_logging_level`] swaps the filter in place through a reload
//! handle.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing_with_level(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (filter_layer, handle) = reload::Layer::new(filter);
    let _ = RELOAD_HANDLE.set(handle);

    // try_init: a second call (tests) leaves the existing subscriber alone.
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer())
        .try_init();
}

/// Replaces the active filter with `level`. No-op before `init_tracing`.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = RELOAD_HANDLE.get() {
        let _ = handle.modify(|filter| *filter = EnvFilter::new(level));
    }
}
