#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Installs the stderr diagnostics subscriber. Progress lines go to stdout
/// separately, so `-q` only silences diagnostics.
pub fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(build_filter(verbose, quiet))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .context("installing log subscriber")
}

fn build_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    }
}
