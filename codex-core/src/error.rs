use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodexError {
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("Decompression failure: {0}")]
    DecompressionFailure(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Incompatible hash lengths: {left} vs {right} hex characters")]
    IncompatibleHashLengths { left: usize, right: usize },

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Invalid grid size {0}: must be even and between 2 and 64")]
    InvalidGridSize(u32),

    #[error("Invalid pixel buffer: {0}")]
    InvalidPixelBuffer(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("No embedded Codex payload found")]
    NoEmbeddedPayload,

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[cfg(feature = "network")]
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CodexError>;
