//! Remote background removal
//!
//! Wraps the one external call: the raw upload goes out as multipart form
//! data, and the processed image (or a classified failure) comes back.

pub mod client;
pub mod mock;

pub use client::RemoveBgClient;
pub use mock::{MockRemovalClient, MockReply, RecordedRequest};

use crate::models::{RemovalOptions, ResultPayload, SourceImage};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RemovalService: Send + Sync {
    /// Make exactly one attempt to remove the background from `image`.
    async fn remove(&self, image: &SourceImage, options: &RemovalOptions) -> Result<ResultPayload>;
}
