//! Tracing subscriber setup for the command-line binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to whoever hosts it.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter for a `-v` count. `RUST_LOG` wins when set.
pub fn filter_for(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install a stderr subscriber. Safe to call more than once.
pub fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for(verbose, quiet)));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
