//! Request orchestration for the single active image.
//!
//! [`UploadOrchestrator`] owns everything the presentation layer reads: the
//! current phase, the source image, its preview, the processed result and the
//! comparison slider. Every mutation goes through its operations.
//!
//! The remote call is split out of the orchestrator so it can run while the
//! orchestrator keeps accepting input. [`UploadOrchestrator::ingest`] hands
//! back a [`RemovalTicket`] stamped with the request generation; running the
//! ticket yields a [`RemovalCompletion`] that
//! [`UploadOrchestrator::complete`] commits only if no newer `ingest` or
//! `reset` happened in between.
//!
//! Preview generation can be detached the same way: `begin_ingest` returns a
//! [`PreviewJob`] for a blocking thread and `finish_ingest` commits its
//! [`PreparedPreview`] under the same generation rule.

use crate::assets::{AssetHandle, AssetLedger, AssetSlot, LedgerProbe, ResultAssetManager};
use crate::download::{download_filename, save_download};
use crate::image::{mime::is_gif, ImageNormalizer, PreviewBounds, PreviewService};
use crate::models::{
    IngestOrigin, PreviewAsset, RemovalOptions, RequestState, ResultPayload, SourceImage,
};
use crate::removal::RemovalService;
use crate::slider::ComparisonSlider;
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The only failure text shown to users, whatever the cause.
pub const FAILURE_MESSAGE: &str = "Failed to process image. Please try again.";

/// Injectable service bundle used to construct [`UploadOrchestrator`].
pub struct OrchestratorServices {
    pub remover: Arc<dyn RemovalService>,
    pub normalizer: Arc<dyn PreviewService>,
}

/// Preview generation for one request generation, detached from the orchestrator.
pub struct PreviewJob {
    generation: u64,
    image: SourceImage,
    bounds: PreviewBounds,
    normalizer: Arc<dyn PreviewService>,
}

impl PreviewJob {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn image(&self) -> &SourceImage {
        &self.image
    }

    /// Decode and downscale. CPU bound, so callers on a runtime should use
    /// `spawn_blocking`.
    pub fn run(self) -> PreparedPreview {
        let outcome = self.normalizer.normalize(&self.image, self.bounds);
        PreparedPreview {
            generation: self.generation,
            image: self.image,
            outcome,
        }
    }
}

/// Outcome of a [`PreviewJob`], waiting to be committed.
pub struct PreparedPreview {
    generation: u64,
    image: SourceImage,
    outcome: Result<PreviewAsset>,
}

impl PreparedPreview {
    pub fn new(generation: u64, image: SourceImage, outcome: Result<PreviewAsset>) -> Self {
        Self {
            generation,
            image,
            outcome,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A remote call for one request generation, detached from the orchestrator.
pub struct RemovalTicket {
    generation: u64,
    image: SourceImage,
    options: RemovalOptions,
    remover: Arc<dyn RemovalService>,
}

impl RemovalTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn run(self) -> RemovalCompletion {
        let outcome = self.remover.remove(&self.image, &self.options).await;
        RemovalCompletion {
            generation: self.generation,
            outcome,
        }
    }
}

/// Outcome of a [`RemovalTicket`], waiting to be committed.
pub struct RemovalCompletion {
    generation: u64,
    outcome: Result<ResultPayload>,
}

impl RemovalCompletion {
    pub fn new(generation: u64, outcome: Result<ResultPayload>) -> Self {
        Self {
            generation,
            outcome,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Everything the presentation layer needs to render one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub state: RequestState,
    pub generation: u64,
    pub error: Option<String>,
    pub source_name: Option<String>,
    pub preview_url: Option<String>,
    pub preview_size: Option<(u32, u32)>,
    pub result_url: Option<String>,
    pub result_media_type: Option<String>,
    pub slider_position: u8,
    pub clip_path: String,
    pub download_name: Option<String>,
    pub options: RemovalOptions,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct UploadOrchestrator {
    remover: Arc<dyn RemovalService>,
    normalizer: Arc<dyn PreviewService>,
    assets: ResultAssetManager,
    options: RemovalOptions,
    bounds: PreviewBounds,
    state: RequestState,
    generation: u64,
    source: Option<SourceImage>,
    request_options: RemovalOptions,
    preview: Option<PreviewAsset>,
    result: Option<ResultPayload>,
    error: Option<String>,
    failure_cause: Option<String>,
    slider: ComparisonSlider,
}

impl UploadOrchestrator {
    /// Build an orchestrator from concrete service dependencies.
    pub fn with_services(services: OrchestratorServices) -> Self {
        Self {
            remover: services.remover,
            normalizer: services.normalizer,
            assets: ResultAssetManager::new(),
            options: RemovalOptions::default(),
            bounds: PreviewBounds::default(),
            state: RequestState::Idle,
            generation: 0,
            source: None,
            request_options: RemovalOptions::default(),
            preview: None,
            result: None,
            error: None,
            failure_cause: None,
            slider: ComparisonSlider::new(),
        }
    }

    /// Orchestrator using the real preview generator.
    pub fn new(remover: Arc<dyn RemovalService>) -> Self {
        Self::with_services(OrchestratorServices {
            remover,
            normalizer: Arc::new(ImageNormalizer::new()),
        })
    }

    pub fn with_options(mut self, options: RemovalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_preview_bounds(mut self, bounds: PreviewBounds) -> Self {
        self.bounds = bounds;
        self
    }

    fn transition(&mut self, next: RequestState) {
        debug!(
            "Request state {:?} -> {:?} [generation {}]",
            self.state, next, self.generation
        );
        self.state = next;
    }

    /// Drop the current image and everything derived from it.
    fn discard_image(&mut self) {
        self.assets.retire_all();
        self.source = None;
        self.preview = None;
        self.result = None;
        self.error = None;
        self.failure_cause = None;
    }

    /// Accept a new image from the picker or a drop.
    ///
    /// Any outstanding request is superseded. The preview is generated
    /// inline; if that fails the remote call still goes ahead because it is
    /// sent the original bytes.
    pub fn ingest(&mut self, source: SourceImage, origin: IngestOrigin) -> RemovalTicket {
        let prepared = self.begin_ingest(source, origin).run();
        self.attach_preview(prepared)
    }

    /// First half of [`ingest`](Self::ingest): supersede the current image and
    /// enter `Preprocessing`, leaving preview generation to the caller.
    pub fn begin_ingest(&mut self, source: SourceImage, origin: IngestOrigin) -> PreviewJob {
        self.generation += 1;

        if self.state == RequestState::AwaitingRemoteResult {
            debug!(
                "Superseding outstanding request with generation {}",
                self.generation
            );
        }
        info!(
            "Ingested {} ({} bytes, {}) via {}",
            source.filename(),
            source.len(),
            source.media_type(),
            origin
        );
        if is_gif(source.bytes()) {
            warn!(
                "{} is a GIF; the removal service does not support GIF images",
                source.filename()
            );
        }

        self.discard_image();
        self.source = Some(source.clone());
        self.request_options = self.options;
        self.transition(RequestState::Preprocessing);

        PreviewJob {
            generation: self.generation,
            image: source,
            bounds: self.bounds,
            normalizer: Arc::clone(&self.normalizer),
        }
    }

    /// Second half of [`ingest`](Self::ingest): commit a preview and hand out
    /// the remote call, unless a newer image has arrived meanwhile.
    pub fn finish_ingest(&mut self, prepared: PreparedPreview) -> Result<RemovalTicket> {
        if prepared.generation != self.generation || self.state != RequestState::Preprocessing {
            debug!(
                "Discarding preview for generation {} (current {}, {:?})",
                prepared.generation, self.generation, self.state
            );
            return Err(Error::StaleResponseDiscarded {
                generation: prepared.generation,
                current: self.generation,
            });
        }
        Ok(self.attach_preview(prepared))
    }

    fn attach_preview(&mut self, prepared: PreparedPreview) -> RemovalTicket {
        let PreparedPreview {
            generation,
            image,
            outcome,
        } = prepared;

        match outcome {
            Ok(preview) => {
                self.assets.publish(
                    AssetSlot::Preview,
                    Arc::from(preview.bytes.as_slice()),
                    PreviewAsset::MEDIA_TYPE,
                );
                self.preview = Some(preview);
            }
            Err(e) => warn!(
                "Preview generation failed for {}: {}; continuing with remote request",
                image.filename(),
                e
            ),
        }

        self.transition(RequestState::AwaitingRemoteResult);

        RemovalTicket {
            generation,
            image,
            options: self.request_options,
            remover: Arc::clone(&self.remover),
        }
    }

    /// Commit a finished remote call, unless it has been superseded.
    pub fn complete(&mut self, completion: RemovalCompletion) -> Result<RequestState> {
        if completion.generation != self.generation
            || self.state != RequestState::AwaitingRemoteResult
        {
            debug!(
                "Discarding response for generation {} (current {}, {:?})",
                completion.generation, self.generation, self.state
            );
            return Err(Error::StaleResponseDiscarded {
                generation: completion.generation,
                current: self.generation,
            });
        }

        match completion.outcome {
            Ok(payload) => {
                self.assets.publish(
                    AssetSlot::Result,
                    Arc::clone(&payload.bytes),
                    payload.media_type.clone(),
                );
                info!(
                    "Background removed for {} ({} bytes, {})",
                    self.source_name().unwrap_or_default(),
                    payload.bytes.len(),
                    payload.media_type
                );
                self.result = Some(payload);
                self.transition(RequestState::Succeeded);
            }
            Err(e) => {
                error!(
                    "Background removal failed for {}: {}",
                    self.source_name().unwrap_or_default(),
                    e
                );
                self.error = Some(FAILURE_MESSAGE.to_string());
                self.failure_cause = Some(e.to_string());
                self.transition(RequestState::Failed);
            }
        }

        Ok(self.state)
    }

    /// Ingest, call the remote service and commit, with nothing in between.
    pub async fn process(
        &mut self,
        source: SourceImage,
        origin: IngestOrigin,
    ) -> Result<RequestState> {
        let ticket = self.ingest(source, origin);
        let completion = ticket.run().await;
        self.complete(completion)
    }

    /// Return to `Idle` with no image selected ("upload new image").
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            RequestState::Idle => Ok(()),
            RequestState::Succeeded | RequestState::Failed => {
                self.generation += 1;
                self.discard_image();
                self.transition(RequestState::Idle);
                Ok(())
            }
            other => Err(Error::InvalidTransition(format!(
                "cannot reset while {:?}",
                other
            ))),
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// User-facing failure message, set only while `Failed`.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Underlying reason for the last failure, for logs and diagnostics.
    pub fn failure_cause(&self) -> Option<&str> {
        self.failure_cause.as_deref()
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(SourceImage::filename)
    }

    pub fn preview(&self) -> Option<&PreviewAsset> {
        self.preview.as_ref()
    }

    pub fn preview_handle(&self) -> Option<&AssetHandle> {
        self.assets.current(AssetSlot::Preview)
    }

    pub fn result_handle(&self) -> Option<&AssetHandle> {
        self.assets.current(AssetSlot::Result)
    }

    pub fn resolve(&self, handle: &AssetHandle) -> Option<&[u8]> {
        self.assets.resolve(handle)
    }

    pub fn result_bytes(&self) -> Option<&[u8]> {
        self.result_handle().and_then(|h| self.assets.resolve(h))
    }

    pub fn options(&self) -> RemovalOptions {
        self.options
    }

    /// Options for the next request; an outstanding one keeps its own.
    pub fn set_options(&mut self, options: RemovalOptions) {
        self.options = options;
    }

    pub fn slider(&self) -> &ComparisonSlider {
        &self.slider
    }

    pub fn set_slider_position(&mut self, position: i64) -> u8 {
        self.slider.set_position(position)
    }

    pub fn set_slider_from_input(&mut self, raw: &str) -> u8 {
        self.slider.set_from_input(raw)
    }

    pub fn asset_ledger(&self) -> AssetLedger {
        self.assets.ledger()
    }

    pub fn ledger_probe(&self) -> LedgerProbe {
        self.assets.ledger_probe()
    }

    /// Name the live result would be saved under.
    pub fn download_filename(&self) -> Option<String> {
        self.result_handle()?;
        Some(download_filename(
            self.source_name(),
            self.request_options.format,
        ))
    }

    /// Save the live result into `dir`.
    pub fn export_result(&self, dir: &Path) -> Result<PathBuf> {
        let (Some(bytes), Some(filename)) = (self.result_bytes(), self.download_filename()) else {
            return Err(Error::InvalidTransition(
                "no processed image available for download".to_string(),
            ));
        };
        save_download(dir, &filename, bytes)
    }

    pub fn snapshot(&self) -> Snapshot {
        let result_handle = self.result_handle();
        Snapshot {
            state: self.state,
            generation: self.generation,
            error: self.error.clone(),
            source_name: self.source_name().map(str::to_string),
            preview_url: self.preview_handle().map(AssetHandle::url),
            preview_size: self.preview.as_ref().map(|p| (p.width, p.height)),
            result_url: result_handle.map(AssetHandle::url),
            result_media_type: result_handle
                .and_then(|h| self.assets.media_type(h))
                .map(str::to_string),
            slider_position: self.slider.position(),
            clip_path: self.slider.clip_region().css_polygon(),
            download_name: self.download_filename(),
            options: self.options,
        }
    }
}
