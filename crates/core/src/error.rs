use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("{0}")]
    Other(String),
}

impl PulseError {
    /// Shorthand for a validation failure with a formatted reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }
}
