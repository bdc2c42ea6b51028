#![forbid(unsafe_code)]

//! JSON log output for production builds.
//!
//! Available with the `tracing-json` feature. Filtering follows `RUST_LOG`;
//! without it, `warn` and above are emitted, which covers unknown-member
//! fallbacks and pool exhaustion.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::BindError;

const DEFAULT_FILTER: &str = "warn";

/// Install a global JSON subscriber.
///
/// # Errors
///
/// [`BindError::Config`] if the filter directive is invalid or a global
/// subscriber is already installed.
pub fn init_json_logging() -> Result<(), BindError> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::try_new(directives),
        Err(_) => EnvFilter::try_new(DEFAULT_FILTER),
    }
    .map_err(|err| BindError::Config(format!("invalid log filter: {err}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_current_span(false))
        .try_init()
        .map_err(|err| BindError::Config(format!("logging already initialized: {err}")))
}
