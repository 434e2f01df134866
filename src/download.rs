//! Export of the processed image under a name derived from the upload.

use crate::models::OutputFormat;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

const FALLBACK_STEM: &str = "processed-image";

/// Final path component of a reported filename. Drops may carry a full path
/// in either separator style.
fn base_name(name: &str) -> Option<&str> {
    match name.rsplit(['/', '\\']).next().map(str::trim) {
        Some("" | "." | "..") | None => None,
        other => other,
    }
}

/// `<original-name-without-extension>-removedbg.<ext>`
pub fn download_filename(original: Option<&str>, format: OutputFormat) -> String {
    let stem = original
        .and_then(base_name)
        .map(|name| match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        })
        .unwrap_or(FALLBACK_STEM);

    format!("{}-removedbg.{}", stem, format.extension())
}

/// Write `bytes` into `dir` as `filename`, returning the full path.
pub fn save_download(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    if base_name(filename) != Some(filename) {
        return Err(Error::Generic(format!(
            "Refusing to save '{}': not a plain file name",
            filename
        )));
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    fs::write(&path, bytes)?;
    tracing::info!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}
