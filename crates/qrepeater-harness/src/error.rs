//! Harness errors.

use qrepeater_core::{ConfigError, RuntimeError};
use thiserror::Error;

/// Failure to assemble or run a chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Parameters rejected before assembly
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Wiring or run failure
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
