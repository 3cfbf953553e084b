//! Logging setup.
//!
//! All modules log through the `tracing` macros. The subscriber installed here
//! prints to stderr and honours `RUST_LOG` (default: `info`).

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Installs the global tracing subscriber. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_target(true),
        );

        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Failed to set global default subscriber: {e}");
        }

        tracing::debug!("Logger initialized");
    });
}
