//! Tracing initialization for the workspace binaries.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter, e.g.
/// `HEXMASS_LOG=hexmass_core=debug,info`.
pub const LOG_ENV: &str = "HEXMASS_LOG";

/// Initialize the global subscriber. Output goes to stderr so tables can be
/// piped from stdout. Falls back to `info` when `HEXMASS_LOG` is unset or
/// invalid. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .init();
    });
}
