//! Logging initialization for the CLI.
//!
//! Logging is owned by the CLI crate to keep the core library quiet. Output
//! goes to stderr so the diagnostic stdout/stderr contract stays clean.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `--debug` raises the `peerlint` directive to DEBUG; `RUST_LOG` is honored
/// for everything else.
///
/// # Panics
/// Panics if the subscriber cannot be initialized (e.g., called twice).
pub fn init(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::WARN };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(format!("peerlint={level}").parse().unwrap())
        .add_directive(format!("peerlint_core={level}").parse().unwrap());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
