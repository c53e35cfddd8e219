use thiserror::Error;

/// Errors raised while interpreting Atlas domain values.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid online status: {0}")]
    InvalidStatus(String),
}
