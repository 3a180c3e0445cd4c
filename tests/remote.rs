//! Remote tier against a local HTTP stub.

mod common;

use common::*;
use pdfsalvage::diagnostic::method;
use pdfsalvage::{extract, ErrorKind, ItemSource, TierKind};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ── Stub server ──────────────────────────────────────────────────────────────

struct Stub {
    url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Stub {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Answer every request with `status` and `body` after `delay`.
async fn spawn_stub(status: u16, body: serde_json::Value, delay: Duration) -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let body = body.to_string();

    let (task_hits, task_requests) = (Arc::clone(&hits), Arc::clone(&requests));
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let (hits, requests, body) =
                (Arc::clone(&task_hits), Arc::clone(&task_requests), body.clone());
            tokio::spawn(async move {
                serve(stream, status, &body, delay, &hits, &requests).await;
            });
        }
    });

    Stub {
        url: format!("http://{addr}/api/extract"),
        hits,
        requests,
    }
}

async fn serve(
    mut stream: TcpStream,
    status: u16,
    body: &str,
    delay: Duration,
    hits: &AtomicUsize,
    requests: &Mutex<Vec<String>>,
) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    hits.fetch_add(1, Ordering::SeqCst);
    requests.lock().unwrap().push(request);

    tokio::time::sleep(delay).await;
    let response = format!(
        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let body_len = buf.len() - header_end - 4;
        let complete = match content_length(&head) {
            Some(len) => body_len >= len,
            None if head.contains("transfer-encoding: chunked") => buf.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            return Some(String::from_utf8_lossy(&buf).into_owned());
        }
    }
}

fn content_length(head: &str) -> Option<usize> {
    head.lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse().ok())
}

fn one_image() -> serde_json::Value {
    json!({
        "success": true,
        "images": [
            { "data": "data:image/png;base64,aGVsbG8=", "format": "png", "width": 4, "height": 2, "pageNumber": 2 }
        ],
        "diagnostic": { "pageCount": 4, "sessionId": "remote-side" }
    })
}

fn tiers_entered(record: &pdfsalvage::DiagnosticRecord) -> Vec<String> {
    record
        .attempts()
        .iter()
        .filter(|a| a.method.starts_with("tier_") && a.success)
        .map(|a| a.method.clone())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn remote_succeeds_after_local_environment_failure() {
    let stub = spawn_stub(200, one_image(), Duration::ZERO).await;
    let engine = Arc::new(ScriptedEngine::photos(4).failing_first_opens(6));
    let config = builder_for(&engine).remote_endpoint(&stub.url).build().unwrap();

    let result = extract(valid_pdf(), "scan.pdf", &config).await.unwrap();

    assert_eq!(result.tier, TierKind::Remote);
    assert_eq!(result.items.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.source, ItemSource::Remote);
    assert_eq!(item.page_number, 2);
    assert_eq!(item.data, b"hello");
    assert_eq!(result.page_count, 4);
    assert_eq!(stub.hits(), 1);
    assert_eq!(engine.open_calls(), 6);

    let record = &result.diagnostic;
    assert_eq!(
        tiers_entered(record),
        vec![method::TIER_LOCAL, method::TIER_REMOTE]
    );
    let remote = record.last_attempt(method::REMOTE_EXTRACTION).unwrap();
    assert!(remote.success);
    assert_eq!(
        remote.details.as_ref().unwrap()["remoteDiagnostic"]["sessionId"],
        "remote-side"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_content_verdict_ends_the_run() {
    let body = json!({
        "success": false,
        "error": "document has 900 pages",
        "diagnostic": { "errorCode": "TOO_MANY_PAGES" }
    });
    let stub = spawn_stub(413, body, Duration::ZERO).await;
    let engine = Arc::new(ScriptedEngine::photos(1).failing_first_opens(6));
    let config = builder_for(&engine).remote_endpoint(&stub.url).build().unwrap();

    let err = extract(valid_pdf(), "huge.pdf", &config).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::TooManyPages);
    assert!(err.message.contains("document has 900 pages"));
    assert!(err
        .diagnostic
        .last_attempt(method::TIER_DEGRADED_LOCAL)
        .is_none());
    assert_eq!(engine.open_calls(), 6);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_advances_to_degraded_tier() {
    let stub = spawn_stub(500, json!({ "error": "out of memory" }), Duration::ZERO).await;
    let engine = Arc::new(ScriptedEngine::photos(2).failing_first_opens(6));
    let config = builder_for(&engine).remote_endpoint(&stub.url).build().unwrap();

    let result = extract(valid_pdf(), "a.pdf", &config).await.unwrap();

    assert_eq!(result.tier, TierKind::DegradedLocal);
    assert_eq!(result.items.len(), 2);
    assert_eq!(stub.hits(), 1);
    let remote = result
        .diagnostic
        .last_attempt(method::REMOTE_EXTRACTION)
        .unwrap();
    assert!(!remote.success);
    assert!(remote.error.as_deref().unwrap().contains("500"));
    assert_eq!(
        tiers_entered(&result.diagnostic),
        vec![
            method::TIER_LOCAL,
            method::TIER_REMOTE,
            method::TIER_DEGRADED_LOCAL
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_remote_times_out_and_advances() {
    let stub = spawn_stub(200, one_image(), Duration::from_secs(4)).await;
    let engine = Arc::new(ScriptedEngine::photos(1).failing_first_opens(6));
    let config = builder_for(&engine)
        .remote_endpoint(&stub.url)
        .remote_timeout_secs(1)
        .build()
        .unwrap();

    let result = extract(valid_pdf(), "a.pdf", &config).await.unwrap();

    assert_eq!(result.tier, TierKind::DegradedLocal);
    let remote = result
        .diagnostic
        .last_attempt(method::REMOTE_EXTRACTION)
        .unwrap();
    assert!(!remote.success);
    assert!(remote.duration_ms < 4000);
}

#[tokio::test(flavor = "multi_thread")]
async fn content_failure_never_contacts_remote() {
    let stub = spawn_stub(200, one_image(), Duration::ZERO).await;
    let engine = Arc::new(ScriptedEngine {
        encrypted: true,
        ..ScriptedEngine::photos(1)
    });
    let config = builder_for(&engine).remote_endpoint(&stub.url).build().unwrap();

    let err = extract(valid_pdf(), "locked.pdf", &config).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::PdfEncrypted);
    assert_eq!(stub.hits(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn several_images_from_one_page_keep_distinct_names() {
    let image = json!({
        "data": "data:image/png;base64,aGVsbG8=",
        "width": 4,
        "height": 2,
        "pageNumber": 1
    });
    let body = json!({ "success": true, "images": [image.clone(), image] });
    let stub = spawn_stub(200, body, Duration::ZERO).await;
    let engine = Arc::new(ScriptedEngine::photos(1).failing_first_opens(6));
    let config = builder_for(&engine).remote_endpoint(&stub.url).build().unwrap();

    let result = extract(valid_pdf(), "scan.pdf", &config).await.unwrap();

    let names: Vec<&str> = result.items.iter().map(|i| i.filename.as_str()).collect();
    assert_eq!(names, vec!["scan_page001.png", "scan_page001_2.png"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_is_multipart_with_session_id() {
    let stub = spawn_stub(200, one_image(), Duration::ZERO).await;
    let engine = Arc::new(ScriptedEngine::photos(1).failing_first_opens(6));
    let config = builder_for(&engine).remote_endpoint(&stub.url).build().unwrap();

    let result = extract(valid_pdf(), "scan.pdf", &config).await.unwrap();

    let requests = stub.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.starts_with("POST /api/extract"));
    assert!(request.to_ascii_lowercase().contains("multipart/form-data"));
    assert!(request.contains("name=\"pdf\""));
    assert!(request.contains("filename=\"scan.pdf\""));
    assert!(request.contains("application/pdf"));
    assert!(request.contains("name=\"sessionId\""));
    assert!(request.contains(&result.diagnostic.session_id));
    assert!(request.contains("%PDF-1.7"));
}
