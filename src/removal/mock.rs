use super::RemovalService;
use crate::error::RemoteError;
use crate::models::{RemovalOptions, ResultPayload, SourceImage};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum MockReply {
    Success(Vec<u8>),
    Failure(RemoteError),
}

/// What the mock was asked to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub options: RemovalOptions,
}

#[derive(Clone)]
pub struct MockRemovalClient {
    replies: Arc<Mutex<VecDeque<(MockReply, Duration)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockRemovalClient {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_success(self, bytes: Vec<u8>) -> Self {
        self.with_reply_after(MockReply::Success(bytes), Duration::ZERO)
    }

    pub fn with_status_failure(self, status: u16) -> Self {
        self.with_reply_after(
            MockReply::Failure(RemoteError::Status {
                status,
                body: format!("mock status {}", status),
            }),
            Duration::ZERO,
        )
    }

    /// Queue a reply that is delivered only after `delay` has elapsed.
    pub fn with_reply_after(self, reply: MockReply, delay: Duration) -> Self {
        self.replies.lock().unwrap().push_back((reply, delay));
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockRemovalClient {
    fn default() -> Self {
        Self::new()
    }
}

fn transparent_pixel_png() -> Result<Vec<u8>> {
    let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 0]));
    let mut bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Png,
    )?;
    Ok(bytes)
}

#[async_trait]
impl RemovalService for MockRemovalClient {
    async fn remove(&self, image: &SourceImage, options: &RemovalOptions) -> Result<ResultPayload> {
        *self.call_count.lock().unwrap() += 1;
        self.requests.lock().unwrap().push(RecordedRequest {
            filename: image.filename().to_string(),
            bytes: image.bytes().to_vec(),
            options: *options,
        });

        let scripted = self.replies.lock().unwrap().pop_front();
        let (reply, delay) = match scripted {
            Some(scripted) => scripted,
            None => (MockReply::Success(transparent_pixel_png()?), Duration::ZERO),
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            MockReply::Success(bytes) => {
                let media_type = crate::image::detect_image_mime(&bytes);
                Ok(ResultPayload::new(bytes, media_type))
            }
            MockReply::Failure(err) => Err(Error::Remote(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceImage {
        SourceImage::new(b"raw".to_vec(), "image/png", "dog.png")
    }

    #[tokio::test]
    async fn test_mock_default_reply_is_png() {
        let client = MockRemovalClient::new();

        let payload = client
            .remove(&source(), &RemovalOptions::default())
            .await
            .unwrap();

        assert_eq!(payload.media_type, "image/png");
        assert!(image::load_from_memory(&payload.bytes).is_ok());
        assert_eq!(client.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_replies_in_order() {
        let client = MockRemovalClient::new()
            .with_success(vec![0x89, 0x50, 0x4E, 0x47])
            .with_status_failure(503);

        assert!(client
            .remove(&source(), &RemovalOptions::default())
            .await
            .is_ok());

        let err = client
            .remove(&source(), &RemovalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Remote(RemoteError::Status { status: 503, .. })
        ));
        assert_eq!(client.get_call_count(), 2);
    }

    #[test]
    fn test_mock_records_requests() {
        let client = MockRemovalClient::new();
        tokio_test::block_on(client.remove(&source(), &RemovalOptions::default())).unwrap();

        let requests = client.get_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].filename, "dog.png");
        assert_eq!(requests[0].bytes, b"raw");
    }
}
