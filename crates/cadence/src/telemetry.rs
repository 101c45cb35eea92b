//! Tracing setup for binaries embedding Cadence.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::CadenceError;

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_filter` (for example `"info,cadence_cycle=debug"`)
/// when `RUST_LOG` is unset or unparsable.
///
/// # Errors
/// [`CadenceError::Telemetry`] if a global subscriber is already set.
pub fn init_tracing(default_filter: &str) -> Result<(), CadenceError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()?;
    Ok(())
}
