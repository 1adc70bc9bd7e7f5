//! Engine error types.

use thiserror::Error;

/// Opaque error type returned by host capability implementations.
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for the auth engine.
#[derive(Debug, Error)]
pub enum AuthMechError {
    /// Invalid construction options
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Command precondition violated; recoverable by retrying with corrected input
    #[error("{0}")]
    Validation(String),

    /// Credential re-proof rejected by the provider
    #[error("re-authentication rejected: {0}")]
    Reauthentication(String),

    /// Document store fault
    #[error("document store fault: {0}")]
    Store(String),

    /// Provider-reported failure
    #[error("provider error: {0}")]
    Provider(String),
}

impl AuthMechError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn provider(error: CapabilityError) -> Self {
        Self::Provider(error.to_string())
    }

    pub(crate) fn store(error: CapabilityError) -> Self {
        Self::Store(error.to_string())
    }

    /// Returns true when the caller can retry the command with corrected input.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Reauthentication(_))
    }
}

/// Result type alias using [`AuthMechError`].
pub type AuthResult<T> = Result<T, AuthMechError>;
