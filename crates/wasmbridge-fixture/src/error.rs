//! Fixture builder errors.

use thiserror::Error;

/// Errors that can occur while building the demo module.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The generated module failed validation.
    #[error("WASM validation failed: {0}")]
    ValidationFailed(String),

    /// The options asked for something the module cannot express.
    #[error("unsupported fixture option: {0}")]
    Unsupported(String),
}

/// Fixture result type alias.
pub type FixtureResult<T> = Result<T, FixtureError>;
