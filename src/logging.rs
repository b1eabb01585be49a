//! Tracing setup for the `ephemeral-chat` binary.
//!
//! Logs go to stderr; stdout carries the chat transcript.

use crate::error::{AppError, AppResult};
use tracing_subscriber::{fmt, EnvFilter};

/// Used when `RUST_LOG` is unset. Burn and read activity logs at `info`.
pub const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";

pub fn init_tracing() -> AppResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Config(format!("tracing already initialised: {e}")))
}
