//! Event loop driving an [`UploadOrchestrator`].
//!
//! UI events arrive over an mpsc channel and are applied one at a time.
//! Preview generation runs on the blocking pool and remote calls run as
//! spawned tasks; both report back into the same loop, so the orchestrator
//! only ever has one mutator. Presentation snapshots are published on a
//! watch channel after every event.

use crate::models::{IngestOrigin, RemovalOptions, SourceImage};
use crate::orchestrator::{PreparedPreview, RemovalCompletion, Snapshot, UploadOrchestrator};
use crate::{Error, Result};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_QUEUE_DEPTH: usize = 32;

pub enum UiEvent {
    Ingest {
        image: SourceImage,
        origin: IngestOrigin,
        ack: oneshot::Sender<u64>,
    },
    SliderInput(String),
    OptionsChanged(RemovalOptions),
    NewImage,
    Download {
        dir: PathBuf,
        reply: oneshot::Sender<Result<PathBuf>>,
    },
    Shutdown,
}

pub struct SessionHandle {
    events: mpsc::Sender<UiEvent>,
    snapshots: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

/// Move `orchestrator` onto its own task and return a handle to drive it.
pub fn spawn(orchestrator: UploadOrchestrator) -> SessionHandle {
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let (snapshots_tx, snapshots_rx) = watch::channel(orchestrator.snapshot());
    let task = tokio::spawn(run_loop(orchestrator, events_rx, snapshots_tx));

    SessionHandle {
        events: events_tx,
        snapshots: snapshots_rx,
        task,
    }
}

impl SessionHandle {
    async fn send(&self, event: UiEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| Error::Generic("session is closed".to_string()))
    }

    async fn ingest(&self, image: SourceImage, origin: IngestOrigin) -> Result<u64> {
        let (ack, generation) = oneshot::channel();
        self.send(UiEvent::Ingest { image, origin, ack }).await?;
        generation
            .await
            .map_err(|_| Error::Generic("session closed before ingest".to_string()))
    }

    /// Ingest an image chosen in the file picker, returning its generation.
    pub async fn pick_file(&self, image: SourceImage) -> Result<u64> {
        self.ingest(image, IngestOrigin::FilePicker).await
    }

    /// Ingest a dropped image, returning its generation.
    pub async fn drop_file(&self, image: SourceImage) -> Result<u64> {
        self.ingest(image, IngestOrigin::DragDrop).await
    }

    pub async fn move_slider(&self, raw: &str) -> Result<()> {
        self.send(UiEvent::SliderInput(raw.to_string())).await
    }

    pub async fn set_options(&self, options: RemovalOptions) -> Result<()> {
        self.send(UiEvent::OptionsChanged(options)).await
    }

    pub async fn new_image(&self) -> Result<()> {
        self.send(UiEvent::NewImage).await
    }

    pub async fn download(&self, dir: PathBuf) -> Result<PathBuf> {
        let (reply, response) = oneshot::channel();
        self.send(UiEvent::Download { dir, reply }).await?;
        response
            .await
            .map_err(|_| Error::Generic("session closed before download".to_string()))?
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Wait until the request for `generation` settles or is superseded.
    pub async fn wait_until_settled(&self, generation: u64) -> Result<Snapshot> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|s| {
                s.generation > generation || (s.generation == generation && s.state.is_settled())
            })
            .await
            .map_err(|_| Error::Generic("session closed while waiting".to_string()))?;
        Ok(snapshot.clone())
    }

    /// Stop the loop and wait for it to release its assets.
    pub async fn shutdown(self) -> Result<()> {
        // The loop may already be gone; joining below still succeeds.
        let _ = self.events.send(UiEvent::Shutdown).await;
        self.task
            .await
            .map_err(|e| Error::Generic(format!("session task join error: {}", e)))
    }
}

async fn run_loop(
    mut orchestrator: UploadOrchestrator,
    mut events: mpsc::Receiver<UiEvent>,
    snapshots: watch::Sender<Snapshot>,
) {
    let (prepared_tx, mut prepared_rx) = mpsc::unbounded_channel::<PreparedPreview>();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<RemovalCompletion>();
    let mut in_flight: Option<JoinHandle<()>> = None;

    info!("Session started");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    UiEvent::Ingest { image, origin, ack } => {
                        if let Some(previous) = in_flight.take() {
                            previous.abort();
                        }
                        let job = orchestrator.begin_ingest(image, origin);
                        let generation = job.generation();
                        let image = job.image().clone();
                        let _ = ack.send(generation);

                        let prepared = prepared_tx.clone();
                        in_flight = Some(tokio::spawn(async move {
                            let ready = tokio::task::spawn_blocking(move || job.run())
                                .await
                                .unwrap_or_else(|e| {
                                    let cause = format!("preview task failed: {}", e);
                                    PreparedPreview::new(generation, image, Err(Error::Generic(cause)))
                                });
                            let _ = prepared.send(ready);
                        }));
                    }
                    UiEvent::SliderInput(raw) => {
                        orchestrator.set_slider_from_input(&raw);
                    }
                    UiEvent::OptionsChanged(options) => orchestrator.set_options(options),
                    UiEvent::NewImage => {
                        if let Err(e) = orchestrator.reset() {
                            warn!("Ignoring new image request: {}", e);
                        }
                    }
                    UiEvent::Download { dir, reply } => {
                        let _ = reply.send(orchestrator.export_result(&dir));
                    }
                    UiEvent::Shutdown => break,
                }
            }
            Some(prepared) = prepared_rx.recv() => {
                match orchestrator.finish_ingest(prepared) {
                    Ok(ticket) => {
                        let done = done_tx.clone();
                        in_flight = Some(tokio::spawn(async move {
                            let _ = done.send(ticket.run().await);
                        }));
                    }
                    Err(Error::StaleResponseDiscarded { generation, current }) => {
                        debug!("Dropped stale preview {} (current {})", generation, current);
                    }
                    Err(e) => warn!("Failed to commit preview: {}", e),
                }
            }
            Some(completion) = done_rx.recv() => {
                match orchestrator.complete(completion) {
                    Ok(state) => {
                        debug!("Request settled as {:?}", state);
                        in_flight = None;
                    }
                    Err(Error::StaleResponseDiscarded { generation, current }) => {
                        debug!("Dropped stale response {} (current {})", generation, current);
                    }
                    Err(e) => warn!("Failed to commit response: {}", e),
                }
            }
        }

        snapshots.send_replace(orchestrator.snapshot());
    }

    if let Some(task) = in_flight.take() {
        task.abort();
    }
    let ledger = orchestrator.asset_ledger();
    drop(orchestrator);
    info!(
        "Session closed ({} handles published, {} live at teardown)",
        ledger.published,
        ledger.live()
    );
}
