//! Background remover - sends an image to a remote background-removal
//! service and keeps a before/after comparison of the result.
//!
//! The orchestrator owns the request state machine; previews are generated
//! locally, results are exposed through revocable handles, and stale remote
//! responses are discarded by request generation.

pub mod assets;
pub mod download;
pub mod error;
pub mod image;
pub mod models;
pub mod orchestrator;
pub mod removal;
pub mod session;
pub mod slider;

pub use error::{Error, RemoteError, Result};
