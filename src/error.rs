//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror.

use thiserror::Error;

/// Failure of the single remote background-removal call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request to remote service failed: {0}")]
    Transport(String),

    #[error("remote service returned an empty body")]
    EmptyBody,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Background removal failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Discarded stale response for generation {generation} (current {current})")]
    StaleResponseDiscarded { generation: u64, current: u64 },

    #[error("Unknown or already revoked asset handle: {0}")]
    UnknownAsset(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

pub type Result<T> = std::result::Result<T, Error>;
