//! Log subscriber setup for the command-line tool.
//!
//! Logs go to stderr so that listings and digests on stdout stay pipeable.
//! `RUST_LOG` controls the filter; `--verbose` overrides it with debug
//! output for both the tool and the container engine.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "msixzip=info,msix_zip=info";
const VERBOSE_FILTER: &str = "msixzip=debug,msix_zip=debug";

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(verbose)
            .compact(),
    );

    // Already set when tests initialize logging more than once.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
