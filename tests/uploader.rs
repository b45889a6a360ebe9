//! Client pipeline against a live server on an ephemeral port: threshold
//! routing, chunked end-to-end transfer, retry exhaustion, and failure
//! classification.

mod common;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::post,
};
use bytes::Bytes;
use common::{setup, sha256};
use keepsake::client::UploadError;
use keepsake::client::chunked::{ChunkUploadOptions, ChunkedUploader, ProgressFn};
use keepsake::client::compression::UploadFile;
use keepsake::client::uploader::GalleryClient;
use keepsake::routes::routes::routes;
use rand::Rng;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

const MIB: usize = 1024 * 1024;

/// Serve `app` on 127.0.0.1:0 and return its base URL.
async fn spawn_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

/// Options tuned so a test run does not sit in pacing and backoff sleeps.
fn fast_options() -> ChunkUploadOptions {
    ChunkUploadOptions {
        retry_base_delay: Duration::from_millis(10),
        inter_chunk_delay: Duration::from_millis(1),
        ..ChunkUploadOptions::default()
    }
}

fn random_bytes(len: usize) -> Bytes {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill(&mut buf[..]);
    Bytes::from(buf)
}

#[tokio::test]
async fn chunked_upload_end_to_end() {
    let env = setup().await;
    let base = spawn_router(routes().with_state(env.service.clone())).await;

    // 11 MiB clears the single-file threshold, so the client must chunk.
    let data = random_bytes(11 * MIB);
    let expected_sha = sha256(&data);
    let file = UploadFile::new("first-dance.mp4", "video/mp4", data);

    let observed: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let progress: ProgressFn = Arc::new(move |pct| sink.lock().unwrap().push(pct));

    let client = GalleryClient::new(&base).with_options(fast_options());
    let report = client
        .upload_batch(vec![file], "Priya", "the first dance", Some(progress))
        .await;

    assert!(report.all_succeeded(), "report: {}", report.message);
    let items = report.items();
    assert_eq!(items.len(), 1);
    let item = items[0];
    assert_eq!(item.size_bytes, (11 * MIB) as i64);
    assert_eq!(item.uploaded_by, "Priya");
    assert_eq!(item.caption, "the first dance");

    // Progress only ever moves forward and lands on 100.
    let observed = observed.lock().unwrap();
    assert!(!observed.is_empty());
    assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    assert!((observed.last().unwrap() - 100.0).abs() < 1e-9);

    // The streamed file matches what went in, byte for byte.
    let resp = reqwest::get(format!("{base}/media/{}", item.public_id))
        .await
        .expect("stream request");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("video/mp4")
    );
    let streamed = resp.bytes().await.expect("stream body");
    assert_eq!(sha256(&streamed), expected_sha);
}

#[tokio::test]
async fn small_batch_goes_direct_and_lists() {
    let env = setup().await;
    let base = spawn_router(routes().with_state(env.service.clone())).await;

    let files = vec![
        UploadFile::new("cake.jpg", "image/jpeg", random_bytes(100 * 1024)),
        UploadFile::new("toast.png", "image/png", random_bytes(100 * 1024)),
    ];

    let client = GalleryClient::new(&base);
    let report = client.upload_batch(files, "", "", None).await;
    assert!(report.all_succeeded(), "report: {}", report.message);
    assert_eq!(report.items().len(), 2);
    assert!(report.items().iter().all(|i| i.uploaded_by == "guest"));

    let listing = env
        .service
        .list_media(keepsake::services::media_service::ListMediaParams {
            limit: 10,
            before: None,
        })
        .await
        .unwrap();
    assert_eq!(listing.items.len(), 2);
}

async fn always_failing_chunk(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::INTERNAL_SERVER_ERROR
}

#[tokio::test]
async fn chunk_retries_are_bounded_then_abort() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/media/chunk", post(always_failing_chunk))
        .with_state(hits.clone());
    let base = spawn_router(app).await;

    let options = ChunkUploadOptions {
        chunk_size: 1024,
        max_retries: 3,
        retry_base_delay: Duration::from_millis(5),
        inter_chunk_delay: Duration::from_millis(1),
        ..ChunkUploadOptions::default()
    };
    let uploader = ChunkedUploader::new(reqwest::Client::new(), &base, options);
    let file = UploadFile::new("doomed.jpg", "image/jpeg", random_bytes(10));

    let err = uploader.upload(&file, None, None, None).await.unwrap_err();
    match err {
        UploadError::ChunkExhausted {
            index,
            attempts,
            reason,
        } => {
            assert_eq!(index, 0);
            assert_eq!(attempts, 3);
            assert!(reason.contains("500"), "reason: {reason}");
        }
        other => panic!("expected ChunkExhausted, got {other:?}"),
    }
    // Exactly the retry budget, no more.
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

async fn echo_ok(_body: Bytes) -> StatusCode {
    StatusCode::OK
}

#[tokio::test]
async fn oversized_request_reads_as_payload_too_large() {
    // A 1 KiB ceiling stands in for the platform's request limit.
    let app = Router::new()
        .route("/api/media", post(echo_ok))
        .layer(DefaultBodyLimit::max(1024));
    let base = spawn_router(app).await;

    let client = GalleryClient::new(&base);
    let report = client
        .upload_batch(
            vec![UploadFile::new("big.jpg", "image/jpeg", random_bytes(64 * 1024))],
            "guest",
            "",
            None,
        )
        .await;

    assert!(!report.all_succeeded());
    let outcome = report.results[0].outcome.as_ref().unwrap_err();
    assert!(matches!(outcome, UploadError::PayloadTooLarge));
    // The message tells the guest what to do about it.
    assert!(report.message.contains("fewer photos"), "message: {}", report.message);
}

async fn stalled(_body: Bytes) -> StatusCode {
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK
}

#[tokio::test]
async fn stalled_server_reads_as_timeout() {
    let app = Router::new().route("/api/media", post(stalled));
    let base = spawn_router(app).await;

    let options = ChunkUploadOptions {
        assemble_timeout: Duration::from_millis(50),
        ..ChunkUploadOptions::default()
    };
    let client = GalleryClient::new(&base).with_options(options);
    let report = client
        .upload_batch(
            vec![UploadFile::new("slow.jpg", "image/jpeg", random_bytes(1024))],
            "guest",
            "",
            None,
        )
        .await;

    assert!(!report.all_succeeded());
    let outcome = report.results[0].outcome.as_ref().unwrap_err();
    assert!(matches!(outcome, UploadError::Timeout), "got {outcome:?}");
}
