//! Error types for character calls

use thiserror::Error;

/// Result type alias for call operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running a call
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone could not be acquired (permission denied, device busy)
    #[error("media access error: {0}")]
    MediaAccess(String),

    /// Output device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Handshake failure, transport error or missing credential
    #[error("connection error: {0}")]
    Connection(String),

    /// Server message could not be understood
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed inbound audio
    #[error("decode error: {0}")]
    Decode(String),

    /// Story store error
    #[error("story error: {0}")]
    Story(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error means the microphone was never acquired
    #[must_use]
    pub const fn is_media_access(&self) -> bool {
        matches!(self, Self::MediaAccess(_))
    }
}
