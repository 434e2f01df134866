use super::RemovalService;
use crate::error::RemoteError;
use crate::image::detect_image_mime;
use crate::models::{Config, RemovalOptions, ResultPayload, SourceImage, DEFAULT_ENDPOINT};
use crate::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;

const API_KEY_HEADER: &str = "X-Api-Key";

pub struct RemoveBgClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl RemoveBgClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(api_key, client))
    }

    pub fn new_with_client(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(
            Self::new(config.api_key.clone(), Duration::from_secs(config.timeout_secs))?
                .with_endpoint(config.endpoint.clone()),
        )
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn build_form(image: &SourceImage, options: &RemovalOptions) -> Result<Form> {
        let file_part = || {
            Part::bytes(image.bytes().to_vec()).file_name(image.filename().to_string())
        };

        // Drops of unknown files report an empty type; the upload still goes out.
        let part = match file_part().mime_str(image.media_type()) {
            Ok(part) => part,
            Err(_) => {
                let sniffed = detect_image_mime(image.bytes());
                tracing::warn!(
                    "{} declares unusable media type '{}', sending as {}",
                    image.filename(),
                    image.media_type(),
                    sniffed
                );
                file_part()
                    .mime_str(sniffed)
                    .map_err(|e| RemoteError::Transport(format!("Invalid media type: {}", e)))?
            }
        };

        Ok(Form::new()
            .part("image_file", part)
            .text("format", options.format.as_str())
            .text("resolution", options.resolution.as_str()))
    }
}

/// Media type of a response body: the declared `Content-Type` without
/// parameters, or sniffed from the payload when absent.
fn response_media_type(content_type: Option<&str>, body: &[u8]) -> String {
    content_type
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| detect_image_mime(body).to_string())
}

#[async_trait]
impl RemovalService for RemoveBgClient {
    async fn remove(&self, image: &SourceImage, options: &RemovalOptions) -> Result<ResultPayload> {
        let form = Self::build_form(image, options)?;

        tracing::debug!(
            "Sending {} ({} bytes, format {}, resolution {}) for background removal",
            image.filename(),
            image.len(),
            options.format,
            options.resolution
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to background removal service: {}", e);
                RemoteError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                "Background removal API error (status {}): {}",
                status,
                body
            );
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|e| {
            tracing::error!("Failed to read background removal response: {}", e);
            RemoteError::Transport(e.to_string())
        })?;

        if body.is_empty() {
            tracing::error!("Background removal service returned an empty body");
            return Err(RemoteError::EmptyBody.into());
        }

        let media_type = response_media_type(content_type.as_deref(), &body);
        tracing::info!(
            "Received {} bytes ({}) for {}",
            body.len(),
            media_type,
            image.filename()
        );

        Ok(ResultPayload::new(body.to_vec(), media_type))
    }
}
