//! Export request endpoint – `{ markdown }` in, PDF payload or a structured
//! generic failure out.
//!
//! The service bounds input size and the number of exports in flight, since
//! every request provisions its own engine process. Failures are logged with
//! their cause; the response body only ever carries [`GENERIC_FAILURE`].

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::document::{ExportedPdf, DEFAULT_FILE_NAME};
use crate::error::{RenderError, Result, GENERIC_FAILURE};
use crate::native::{EngineLauncher, NativePrint};

/// Body of an export request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub markdown: String,
}

/// Body of a failed export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Response to an [`ExportRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ExportResponse {
    fn pdf(pdf: ExportedPdf) -> Self {
        Self {
            status: 200,
            headers: vec![
                ("Content-Type".to_string(), ExportedPdf::CONTENT_TYPE.to_string()),
                (
                    "Content-Disposition".to_string(),
                    format!("attachment; filename={}", pdf.file_name),
                ),
            ],
            body: pdf.bytes,
        }
    }

    fn failure(status: u16) -> Self {
        let body = serde_json::to_vec(&ErrorBody { error: GENERIC_FAILURE.to_string() })
            .unwrap_or_default();
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

fn status_for(err: &RenderError) -> u16 {
    match err {
        RenderError::InputTooLarge { .. } => 413,
        RenderError::Busy { .. } => 503,
        _ => 500,
    }
}

/// Holds one in-flight slot; released on drop.
struct Permit<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> Permit<'a> {
    fn acquire(in_flight: &'a AtomicUsize, limit: usize) -> Result<Self> {
        in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .map_err(|_| RenderError::Busy { limit })?;
        Ok(Self { in_flight })
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Serves export requests through the native print pipeline.
pub struct ExportService<L: EngineLauncher> {
    printer: NativePrint<L>,
    limits: Limits,
    in_flight: AtomicUsize,
}

impl<L: EngineLauncher> ExportService<L> {
    pub fn new(printer: NativePrint<L>, limits: Limits) -> Self {
        Self { printer, limits, in_flight: AtomicUsize::new(0) }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one export, returning the typed result.
    pub fn export(&self, request: &ExportRequest) -> Result<ExportedPdf> {
        let len = request.markdown.len();
        if len > self.limits.max_markdown_bytes {
            return Err(RenderError::InputTooLarge { len, limit: self.limits.max_markdown_bytes });
        }
        let _permit = Permit::acquire(&self.in_flight, self.limits.max_concurrent_exports)?;
        self.printer.export_markdown(&request.markdown, Some(DEFAULT_FILE_NAME))
    }

    /// Handle a request, mapping every failure to the generic response.
    pub fn handle(&self, request: &ExportRequest) -> ExportResponse {
        match self.export(request) {
            Ok(pdf) => ExportResponse::pdf(pdf),
            Err(e) => {
                log::error!("PDF generation error: {e}");
                ExportResponse::failure(status_for(&e))
            }
        }
    }

    /// Handle a raw JSON body; malformed JSON is a 400.
    pub fn handle_json(&self, body: &[u8]) -> ExportResponse {
        match serde_json::from_slice::<ExportRequest>(body) {
            Ok(request) => self.handle(&request),
            Err(e) => {
                log::error!("Malformed export request: {e}");
                ExportResponse::failure(400)
            }
        }
    }
}
