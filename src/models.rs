//! Data models and structures
//!
//! Defines the images flowing through the pipeline, the options sent to the
//! remote service, the request state machine's phases, and configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Raw image as acquired from the picker or a drop, never mutated.
#[derive(Debug, Clone)]
pub struct SourceImage {
    bytes: Arc<[u8]>,
    media_type: String,
    filename: String,
}

impl SourceImage {
    pub fn new(
        bytes: impl Into<Arc<[u8]>>,
        media_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
            filename: filename.into(),
        }
    }

    /// Build from bytes with no declared type, sniffing it from the header.
    pub fn sniffed(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        let media_type = crate::image::detect_image_mime(&bytes);
        Self::new(bytes, media_type, filename)
    }

    /// Read an image from disk, as the file picker does.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::sniffed(bytes, filename))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Downscaled JPEG rendition of a [`SourceImage`], used only for display.
#[derive(Debug, Clone)]
pub struct PreviewAsset {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Target dimensions before rounding to whole pixels.
    pub exact_width: f64,
    pub exact_height: f64,
}

impl PreviewAsset {
    pub const MEDIA_TYPE: &'static str = "image/jpeg";

    pub fn data_url(&self) -> String {
        use base64::Engine as _;
        format!(
            "data:{};base64,{}",
            Self::MEDIA_TYPE,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Processed image returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPayload {
    pub bytes: Arc<[u8]>,
    pub media_type: String,
}

impl ResultPayload {
    pub fn new(bytes: impl Into<Arc<[u8]>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Auto,
    Png,
    Jpg,
    Zip,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Auto => "auto",
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Zip => "zip",
        }
    }

    /// Extension used for downloads; `auto` results are saved as PNG.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Auto => "png",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(OutputFormat::Auto),
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpg),
            "zip" => Ok(OutputFormat::Zip),
            other => Err(Error::Config(format!(
                "Unknown output format '{}'. Expected one of: auto, png, jpg, zip",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "preview")]
    Preview,
    #[default]
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "50MP")]
    FiftyMegapixel,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Preview => "preview",
            Resolution::Full => "full",
            Resolution::FiftyMegapixel => "50MP",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preview" => Ok(Resolution::Preview),
            "full" => Ok(Resolution::Full),
            "50mp" => Ok(Resolution::FiftyMegapixel),
            other => Err(Error::Config(format!(
                "Unknown resolution '{}'. Expected one of: preview, full, 50MP",
                other
            ))),
        }
    }
}

/// Optional knobs forwarded to the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemovalOptions {
    pub format: OutputFormat,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    #[default]
    Idle,
    Preprocessing,
    AwaitingRemoteResult,
    Succeeded,
    Failed,
}

impl RequestState {
    /// Whether no request is outstanding for the current image.
    pub fn is_settled(&self) -> bool {
        matches!(self, RequestState::Succeeded | RequestState::Failed)
    }
}

/// Where an ingested image came from. Both paths are handled identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOrigin {
    FilePicker,
    DragDrop,
}

impl fmt::Display for IngestOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestOrigin::FilePicker => f.write_str("file picker"),
            IngestOrigin::DragDrop => f.write_str("drag and drop"),
        }
    }
}

// Configuration
pub const DEFAULT_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub options: RemovalOptions,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an explicit env file. Its values take precedence over the
    /// process environment, which is left untouched.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let vars = dotenvy::from_path_iter(path)?.collect::<std::result::Result<
            std::collections::HashMap<String, String>,
            dotenvy::Error,
        >>()?;
        Self::from_lookup(|key| vars.get(key).cloned().or_else(|| std::env::var(key).ok()))
    }

    fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("REMOVE_BG_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config("REMOVE_BG_API_KEY not set".to_string()))?;

        let timeout_secs = match lookup("REMOVE_BG_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("Invalid REMOVE_BG_TIMEOUT_SECS '{}'", raw))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let format = lookup("REMOVE_BG_FORMAT")
            .map(|raw| raw.parse::<OutputFormat>())
            .transpose()?
            .unwrap_or_default();
        let resolution = lookup("REMOVE_BG_RESOLUTION")
            .map(|raw| raw.parse::<Resolution>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            api_key,
            endpoint: lookup("REMOVE_BG_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout_secs,
            options: RemovalOptions { format, resolution },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_options() {
        let options = RemovalOptions::default();
        assert_eq!(options.format, OutputFormat::Auto);
        assert_eq!(options.resolution, Resolution::Full);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("PNG".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("jpeg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpg);
        assert!("gif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_resolution_wire_strings() {
        assert_eq!("50MP".parse::<Resolution>().unwrap(), Resolution::FiftyMegapixel);
        assert_eq!(Resolution::FiftyMegapixel.to_string(), "50MP");
        let json = serde_json::to_string(&Resolution::FiftyMegapixel).unwrap();
        assert_eq!(json, "\"50MP\"");
    }

    #[test]
    fn test_download_extension() {
        assert_eq!(OutputFormat::Auto.extension(), "png");
        assert_eq!(OutputFormat::Jpg.extension(), "jpg");
        assert_eq!(OutputFormat::Zip.extension(), "zip");
    }

    #[test]
    fn test_config_requires_api_key() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("REMOVE_BG_API_KEY"));
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let config = Config::from_lookup(lookup_from(&[("REMOVE_BG_API_KEY", "secret")])).unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.options, RemovalOptions::default());

        let config = Config::from_lookup(lookup_from(&[
            ("REMOVE_BG_API_KEY", "secret"),
            ("REMOVE_BG_TIMEOUT_SECS", "5"),
            ("REMOVE_BG_FORMAT", "zip"),
            ("REMOVE_BG_RESOLUTION", "preview"),
        ]))
        .unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.options.format, OutputFormat::Zip);
        assert_eq!(config.options.resolution, Resolution::Preview);
    }

    #[test]
    fn test_config_rejects_bad_timeout() {
        let err = Config::from_lookup(lookup_from(&[
            ("REMOVE_BG_API_KEY", "secret"),
            ("REMOVE_BG_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_from_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("removebg.env");
        std::fs::write(
            &path,
            "# remove.bg account\nREMOVE_BG_API_KEY=from-file\nREMOVE_BG_FORMAT=jpg\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.api_key, "from-file");
        assert_eq!(config.options.format, OutputFormat::Jpg);
    }

    #[test]
    fn test_config_missing_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("absent.env")).unwrap_err();
        assert!(matches!(err, Error::EnvVar(_)));
    }

    #[test]
    fn test_source_image_sniffs_media_type() {
        let image = SourceImage::sniffed(vec![0xFF, 0xD8, 0xFF, 0xE0], "cat.jpg");
        assert_eq!(image.media_type(), "image/jpeg");
        assert_eq!(image.filename(), "cat.jpg");
        assert_eq!(image.len(), 4);
    }

    #[test]
    fn test_request_state_serializes_snake_case() {
        let json = serde_json::to_string(&RequestState::AwaitingRemoteResult).unwrap();
        assert_eq!(json, "\"awaiting_remote_result\"");
        assert!(RequestState::Failed.is_settled());
        assert!(!RequestState::Preprocessing.is_settled());
    }
}
