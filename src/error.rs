//! Embedder error types

use thiserror::Error;

/// Errors reported by the key event and vsync plumbing
#[derive(Error, Debug)]
pub enum EmbedderError {
    /// The platform vblank client could not be initialized
    #[error("vblank client is not available")]
    VblankUnavailable,

    /// A vblank wait request was rejected by the platform
    #[error("vblank wait failed: {0}")]
    VblankWait(String),

    /// The vsync worker thread could not be started
    #[error("failed to spawn the vsync worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// A legacy key event message could not be encoded
    #[error("failed to encode key event message: {0}")]
    MessageEncode(#[source] serde_json::Error),

    /// A legacy key event reply could not be decoded
    #[error("failed to decode key event reply: {0}")]
    MessageDecode(#[source] serde_json::Error),

    /// A method call named a method this channel does not implement
    #[error("method not implemented: {0}")]
    NotImplemented(String),

    /// A host passed a null pointer where a valid one was required
    #[error("null pointer passed for {0}")]
    NullPointer(&'static str),
}

/// Result type for embedder operations
pub type Result<T> = std::result::Result<T, EmbedderError>;
