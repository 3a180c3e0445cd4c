//! Client for the remote extraction service (tier 2).
//!
//! The request is a multipart form with a `pdf` file part and a `sessionId`
//! text part. Responses fall into three buckets:
//!
//! * success with images → items;
//! * a content classification (200 with `success: false`, 400, 413) → the
//!   remote's verdict, which ends the run;
//! * anything else (unreachable, timeout, 404, 5xx, undecodable body) →
//!   unavailable, and the controller moves on.

use super::encode::decode_data_uri;
use crate::error::ErrorKind;
use crate::output::{ExtractedItem, ImageFormat, ItemNamer, ItemSource};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the remote tier produced.
#[derive(Debug, Clone)]
pub enum RemoteOutcome {
    Extracted {
        items: Vec<ExtractedItem>,
        page_count: Option<usize>,
        /// The service's own diagnostic record, verbatim.
        diagnostic: Option<Value>,
    },
    Rejected {
        kind: ErrorKind,
        message: String,
        diagnostic: Option<Value>,
    },
    Unavailable {
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    images: Vec<RemoteImage>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    diagnostic: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteImage {
    data: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default = "first_page")]
    page_number: usize,
}

fn first_page() -> usize {
    1
}

/// POST `bytes` to `endpoint` and classify the reply.
pub async fn extract_remote(
    endpoint: &str,
    bytes: &[u8],
    filename: &str,
    session_id: &str,
    timeout: Duration,
    namer: &mut ItemNamer,
) -> RemoteOutcome {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            return RemoteOutcome::Unavailable {
                reason: format!("could not build HTTP client: {e}"),
            }
        }
    };

    let part = match Part::bytes(bytes.to_vec())
        .file_name(filename.to_string())
        .mime_str("application/pdf")
    {
        Ok(part) => part,
        Err(e) => {
            return RemoteOutcome::Unavailable {
                reason: format!("could not build upload: {e}"),
            }
        }
    };
    let form = Form::new()
        .part("pdf", part)
        .text("sessionId", session_id.to_string());

    info!("Uploading {} bytes to remote extraction service", bytes.len());
    let response = match client.post(endpoint).multipart(form).send().await {
        Ok(response) => response,
        Err(e) => {
            let reason = if e.is_timeout() {
                format!("request timed out after {}s", timeout.as_secs())
            } else {
                format!("request failed: {e}")
            };
            warn!("Remote tier unavailable: {reason}");
            return RemoteOutcome::Unavailable { reason };
        }
    };

    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return RemoteOutcome::Unavailable {
                reason: format!("could not read response body (HTTP {status}): {e}"),
            }
        }
    };
    debug!("Remote service replied HTTP {status} ({} bytes)", body.len());
    interpret_response(status, &body, namer)
}

/// Classify a remote reply. Pure, so the wire contract is testable without
/// a server.
pub fn interpret_response(status: u16, body: &str, namer: &mut ItemNamer) -> RemoteOutcome {
    if status == 404 {
        return RemoteOutcome::Unavailable {
            reason: "remote endpoint not found (HTTP 404)".into(),
        };
    }
    if status >= 500 {
        let detail = serde_json::from_str::<Envelope>(body)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| "server error".into());
        return RemoteOutcome::Unavailable {
            reason: format!("HTTP {status}: {detail}"),
        };
    }

    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return RemoteOutcome::Unavailable {
                reason: format!("undecodable response (HTTP {status}): {e}"),
            }
        }
    };
    let reported_kind = envelope
        .diagnostic
        .as_ref()
        .and_then(|d| d.get("errorCode"))
        .and_then(Value::as_str)
        .and_then(ErrorKind::from_code);
    let message = envelope.error.clone();

    match status {
        200 if envelope.success => {
            let page_count = envelope
                .diagnostic
                .as_ref()
                .and_then(|d| d.get("pageCount"))
                .and_then(Value::as_u64)
                .map(|n| n as usize);
            let items = decode_images(envelope.images, namer);
            if items.is_empty() {
                return RemoteOutcome::Rejected {
                    kind: ErrorKind::NoImages,
                    message: "remote service returned no decodable images".into(),
                    diagnostic: envelope.diagnostic,
                };
            }
            RemoteOutcome::Extracted {
                items,
                page_count,
                diagnostic: envelope.diagnostic,
            }
        }
        200 => RemoteOutcome::Rejected {
            kind: reported_kind
                .filter(ErrorKind::is_content_related)
                .unwrap_or(ErrorKind::NoImages),
            message: message.unwrap_or_else(|| "no images found".into()),
            diagnostic: envelope.diagnostic,
        },
        400 | 413 => {
            let fallback = if status == 400 {
                ErrorKind::InvalidPdf
            } else {
                ErrorKind::FileTooLarge
            };
            match reported_kind.unwrap_or(fallback) {
                kind if kind.is_content_related() => RemoteOutcome::Rejected {
                    kind,
                    message: message.unwrap_or_else(|| kind.user_message().into()),
                    diagnostic: envelope.diagnostic,
                },
                kind => RemoteOutcome::Unavailable {
                    reason: format!("HTTP {status} with non-content error {kind}"),
                },
            }
        }
        other => RemoteOutcome::Unavailable {
            reason: format!("unexpected HTTP {other}"),
        },
    }
}

fn decode_images(images: Vec<RemoteImage>, namer: &mut ItemNamer) -> Vec<ExtractedItem> {
    let mut items = Vec::with_capacity(images.len());
    for image in images {
        let Some((data, uri_format)) = decode_data_uri(&image.data) else {
            warn!("Skipping undecodable remote image for page {}", image.page_number);
            continue;
        };
        let format = image
            .format
            .as_deref()
            .and_then(ImageFormat::parse)
            .or(uri_format)
            .unwrap_or(ImageFormat::Png);
        let (id, filename) = namer.assign(image.page_number, format, ItemSource::Remote);
        items.push(ExtractedItem {
            id,
            page_number: image.page_number,
            width: image.width,
            height: image.height,
            format,
            data,
            filename,
            source: ItemSource::Remote,
        });
    }
    items
}
