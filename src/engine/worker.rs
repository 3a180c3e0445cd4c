//! Background-worker execution of a [`PdfEngine`].
//!
//! In worker mode the document is opened *and kept* on a dedicated thread.
//! The calling thread drives it through a [`LoadedDocument`] proxy that
//! forwards each call over a channel, so the native handle never crosses a
//! thread boundary. Dropping the proxy closes the request channel; the worker
//! then leaves the engine's scope (releasing the document) and exits.
//!
//! Anything that prevents this arrangement from working (thread spawn
//! failure, the engine refusing per-thread setup, the worker dying or not
//! answering in time) is reported as [`EngineError::WorkerUnavailable`], which
//! the load-strategy chain treats as an environment problem and answers by
//! falling back to inline parsing.

use super::{EngineError, LoadedDocument, PageSize, PdfEngine, Strictness};
use image::DynamicImage;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

enum Request {
    PageSize(usize),
    ImageOps(usize),
    Render { index: usize, scale: f32 },
}

enum Reply {
    Ready(DocumentInfo),
    Failed(EngineError),
    PageSize(Result<PageSize, EngineError>),
    ImageOps(Result<usize, EngineError>),
    Render(Result<DynamicImage, EngineError>),
}

#[derive(Debug, Clone)]
struct DocumentInfo {
    page_count: usize,
    version: Option<String>,
    encrypted: bool,
}

/// Open `bytes` on a background worker thread and run `f` against it.
///
/// `startup_timeout` bounds how long the worker may take to report that the
/// document is open. A worker that misses the deadline is detached.
pub fn with_document_in_worker<T>(
    engine: Arc<dyn PdfEngine>,
    bytes: Arc<[u8]>,
    strictness: Strictness,
    startup_timeout: Duration,
    f: impl FnOnce(&mut dyn LoadedDocument) -> T,
) -> Result<T, EngineError> {
    let (request_tx, request_rx) = mpsc::channel::<Request>();
    let (reply_tx, reply_rx) = mpsc::channel::<Reply>();

    let handle = thread::Builder::new()
        .name("pdf-worker".into())
        .spawn(move || worker_main(engine, bytes, strictness, request_rx, reply_tx))
        .map_err(|e| {
            EngineError::WorkerUnavailable(format!("could not spawn worker thread: {e}"))
        })?;

    let info = match reply_rx.recv_timeout(startup_timeout) {
        Ok(Reply::Ready(info)) => info,
        Ok(Reply::Failed(err)) => {
            let _ = handle.join();
            return Err(err);
        }
        Ok(_) => {
            return Err(EngineError::WorkerUnavailable(
                "worker sent an unexpected message during startup".into(),
            ))
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "pdf worker did not report ready within {}ms; detaching it",
                startup_timeout.as_millis()
            );
            return Err(EngineError::WorkerUnavailable(format!(
                "worker did not start within {}ms",
                startup_timeout.as_millis()
            )));
        }
        Err(RecvTimeoutError::Disconnected) => {
            let detail = match handle.join() {
                Err(panic) => panic_text(panic.as_ref()),
                Ok(()) => "worker exited without opening the document".to_string(),
            };
            return Err(EngineError::WorkerUnavailable(detail));
        }
    };

    debug!("pdf worker ready: {} pages", info.page_count);

    let mut proxy = WorkerDocument {
        info,
        requests: request_tx,
        replies: reply_rx,
    };
    let output = f(&mut proxy);
    drop(proxy);

    if handle.join().is_err() {
        warn!("pdf worker thread panicked");
    }
    Ok(output)
}

fn worker_main(
    engine: Arc<dyn PdfEngine>,
    bytes: Arc<[u8]>,
    strictness: Strictness,
    requests: Receiver<Request>,
    replies: Sender<Reply>,
) {
    if let Err(err) = engine.prepare_worker() {
        let _ = replies.send(Reply::Failed(err));
        return;
    }

    let outcome = engine.open(&bytes, strictness, &mut |doc: &mut dyn LoadedDocument| {
        let info = DocumentInfo {
            page_count: doc.page_count(),
            version: doc.version(),
            encrypted: doc.is_encrypted(),
        };
        if replies.send(Reply::Ready(info)).is_err() {
            return;
        }
        // Ends when the proxy is dropped.
        for request in requests.iter() {
            let reply = match request {
                Request::PageSize(index) => Reply::PageSize(doc.page_size(index)),
                Request::ImageOps(index) => Reply::ImageOps(doc.image_operator_count(index)),
                Request::Render { index, scale } => Reply::Render(doc.render_page(index, scale)),
            };
            if replies.send(reply).is_err() {
                break;
            }
        }
    });

    if let Err(err) = outcome {
        let _ = replies.send(Reply::Failed(err));
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

/// Calling-thread view of a document owned by the worker.
struct WorkerDocument {
    info: DocumentInfo,
    requests: Sender<Request>,
    replies: Receiver<Reply>,
}

impl WorkerDocument {
    fn call(&self, request: Request) -> Result<Reply, EngineError> {
        self.requests
            .send(request)
            .map_err(|_| EngineError::WorkerUnavailable("worker has exited".into()))?;
        self.replies
            .recv()
            .map_err(|_| EngineError::WorkerUnavailable("worker stopped responding".into()))
    }
}

fn protocol_error() -> EngineError {
    EngineError::WorkerUnavailable("worker replied out of order".into())
}

impl LoadedDocument for WorkerDocument {
    fn page_count(&self) -> usize {
        self.info.page_count
    }

    fn version(&self) -> Option<String> {
        self.info.version.clone()
    }

    fn is_encrypted(&self) -> bool {
        self.info.encrypted
    }

    fn page_size(&mut self, index: usize) -> Result<PageSize, EngineError> {
        match self.call(Request::PageSize(index))? {
            Reply::PageSize(result) => result,
            _ => Err(protocol_error()),
        }
    }

    fn image_operator_count(&mut self, index: usize) -> Result<usize, EngineError> {
        match self.call(Request::ImageOps(index))? {
            Reply::ImageOps(result) => result,
            _ => Err(protocol_error()),
        }
    }

    fn render_page(&mut self, index: usize, scale: f32) -> Result<DynamicImage, EngineError> {
        match self.call(Request::Render { index, scale })? {
            Reply::Render(result) => result,
            _ => Err(protocol_error()),
        }
    }
}
