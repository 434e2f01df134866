use background_remover::{
    assets::AssetLedger,
    image::{ImageNormalizer, MockImageNormalizer, PreviewBounds, PreviewService},
    models::{IngestOrigin, OutputFormat, RemovalOptions, RequestState, SourceImage},
    orchestrator::{OrchestratorServices, UploadOrchestrator, FAILURE_MESSAGE},
    removal::{MockRemovalClient, MockReply, RemoveBgClient},
    session, Error,
};
use image::ImageFormat;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn png_source(name: &str, width: u32, height: u32) -> SourceImage {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([20, 120, 220, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    SourceImage::sniffed(bytes, name)
}

fn orchestrator_with(remover: MockRemovalClient) -> UploadOrchestrator {
    UploadOrchestrator::new(Arc::new(remover))
}

#[tokio::test]
async fn test_large_image_is_previewed_and_processed() {
    let processed = b"processed bytes".to_vec();
    let remover = MockRemovalClient::new().with_success(processed.clone());
    let mut orchestrator = orchestrator_with(remover.clone());
    let source = png_source("landscape.png", 1600, 1200);
    let original = source.bytes().to_vec();

    let state = orchestrator
        .process(source, IngestOrigin::FilePicker)
        .await
        .unwrap();

    assert_eq!(state, RequestState::Succeeded);

    let preview = orchestrator.preview().unwrap();
    assert_eq!((preview.width, preview.height), (800, 600));

    let handle = orchestrator.result_handle().unwrap();
    assert_eq!(orchestrator.resolve(handle), Some(processed.as_slice()));
    assert_eq!(orchestrator.slider().position(), 50);

    // The service receives the original upload, not the preview.
    assert_eq!(remover.get_requests()[0].bytes, original);
}

#[tokio::test]
async fn test_remote_503_leaves_source_and_no_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/removebg"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&server)
        .await;

    let client = RemoveBgClient::new("key".to_string(), Duration::from_secs(5))
        .unwrap()
        .with_endpoint(format!("{}/v1.0/removebg", server.uri()));
    let mut orchestrator = UploadOrchestrator::new(Arc::new(client));

    let state = orchestrator
        .process(png_source("cat.png", 64, 64), IngestOrigin::DragDrop)
        .await
        .unwrap();

    assert_eq!(state, RequestState::Failed);
    assert!(!orchestrator.error_message().unwrap().is_empty());
    assert_eq!(orchestrator.error_message(), Some(FAILURE_MESSAGE));
    assert_eq!(orchestrator.source().unwrap().filename(), "cat.png");
    assert!(orchestrator.result_handle().is_none());
    assert_eq!(orchestrator.asset_ledger().published, 1);
}

#[tokio::test]
async fn test_drop_without_declared_type_is_still_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/removebg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"cutout".to_vec(), "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let client = RemoveBgClient::new("key".to_string(), Duration::from_secs(5))
        .unwrap()
        .with_endpoint(format!("{}/v1.0/removebg", server.uri()));
    let mut orchestrator = UploadOrchestrator::new(Arc::new(client));

    let source = png_source("photo.png", 32, 32);
    let blank = SourceImage::new(source.bytes().to_vec(), "", "photo.png");
    let state = orchestrator
        .process(blank, IngestOrigin::DragDrop)
        .await
        .unwrap();

    assert_eq!(state, RequestState::Succeeded);
    assert_eq!(orchestrator.failure_cause(), None);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_undecodable_upload_still_reaches_service() {
    let remover = MockRemovalClient::new();
    let mut orchestrator = orchestrator_with(remover.clone());

    let state = orchestrator
        .process(
            SourceImage::new(b"not really a png".to_vec(), "image/png", "odd.png"),
            IngestOrigin::FilePicker,
        )
        .await
        .unwrap();

    assert_eq!(state, RequestState::Succeeded);
    assert!(orchestrator.preview().is_none());
    assert_eq!(remover.get_call_count(), 1);
}

#[tokio::test]
async fn test_late_response_for_superseded_image_is_ignored() {
    let remover = MockRemovalClient::new()
        .with_success(b"old".to_vec())
        .with_status_failure(500);
    let mut orchestrator = UploadOrchestrator::with_services(OrchestratorServices {
        remover: Arc::new(remover),
        normalizer: Arc::new(MockImageNormalizer::new()),
    });

    let old = orchestrator.ingest(png_source("old.png", 10, 10), IngestOrigin::FilePicker);
    let new = orchestrator.ingest(png_source("new.png", 10, 10), IngestOrigin::DragDrop);
    let old_done = old.run().await;

    assert_eq!(
        orchestrator.complete(new.run().await).unwrap(),
        RequestState::Failed
    );
    let before = orchestrator.snapshot();

    assert!(matches!(
        orchestrator.complete(old_done),
        Err(Error::StaleResponseDiscarded { .. })
    ));
    assert_eq!(orchestrator.snapshot(), before);
    assert!(orchestrator.result_handle().is_none());
}

#[tokio::test]
async fn test_every_handle_is_revoked_exactly_once() {
    let mut orchestrator = UploadOrchestrator::with_services(OrchestratorServices {
        remover: Arc::new(MockRemovalClient::new()),
        normalizer: Arc::new(MockImageNormalizer::new()),
    });
    let probe = orchestrator.ledger_probe();

    for name in ["a.png", "b.png", "c.png"] {
        orchestrator
            .process(png_source(name, 4, 4), IngestOrigin::FilePicker)
            .await
            .unwrap();
        let ledger = orchestrator.asset_ledger();
        assert_eq!(ledger.live(), 2, "only the current preview and result are live");
    }

    orchestrator.reset().unwrap();
    orchestrator
        .process(png_source("d.png", 4, 4), IngestOrigin::DragDrop)
        .await
        .unwrap();
    drop(orchestrator);

    assert_eq!(
        probe.snapshot(),
        AssetLedger {
            published: 8,
            revoked: 8
        }
    );
}

#[tokio::test]
async fn test_session_drop_replaces_pending_pick() {
    let remover = MockRemovalClient::new()
        .with_reply_after(
            MockReply::Success(b"slow".to_vec()),
            Duration::from_millis(250),
        )
        .with_success(b"quick".to_vec());
    let orchestrator =
        UploadOrchestrator::new(Arc::new(remover.clone())).with_options(RemovalOptions {
            format: OutputFormat::Png,
            ..RemovalOptions::default()
        });
    let session = session::spawn(orchestrator);

    let picked = session
        .pick_file(png_source("picked.png", 900, 300))
        .await
        .unwrap();
    // Let the first request reach the service before it is superseded.
    while remover.get_call_count() < 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let dropped = session
        .drop_file(png_source("dropped.jpg", 300, 900))
        .await
        .unwrap();
    assert_eq!(dropped, picked + 1);

    let snapshot = session.wait_until_settled(dropped).await.unwrap();
    assert_eq!(snapshot.state, RequestState::Succeeded);
    assert_eq!(snapshot.preview_size, Some((267, 800)));
    assert_eq!(snapshot.download_name.as_deref(), Some("dropped-removedbg.png"));

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(session.snapshot(), snapshot);

    let dir = tempfile::tempdir().unwrap();
    let saved = session.download(dir.path().to_path_buf()).await.unwrap();
    assert_eq!(std::fs::read(saved).unwrap(), b"quick");

    session.shutdown().await.unwrap();
}

#[test]
fn test_normalizer_respects_custom_bounds() {
    let preview = ImageNormalizer::new()
        .normalize(
            &png_source("wide.png", 1000, 500),
            PreviewBounds {
                max_width: 400,
                max_height: 400,
            },
        )
        .unwrap();

    assert_eq!((preview.width, preview.height), (400, 200));
}
