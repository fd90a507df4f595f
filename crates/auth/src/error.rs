use thiserror::Error;

/// Errors that can occur while loading credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// None of the accepted environment variables is set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A key is empty or contains whitespace.
    #[error("Invalid {0} format")]
    InvalidKeyFormat(&'static str),
}
