use thiserror::Error;

/// Errors from the envelope model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvelopeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("envelope buffer has been closed")]
    BufferClosed,

    #[error("invalid uri: {0}")]
    InvalidUri(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;
