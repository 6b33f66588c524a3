//! Error kinds shared by both export pipelines.
//!
//! Sanitizing never fails, so there is no variant for it. Every other stage
//! maps onto exactly one variant; the request/action boundary turns all of
//! them into the same generic user-facing message ([`GENERIC_FAILURE`]).

use std::time::Duration;

use thiserror::Error;

/// The message shown to users for any failed export, whatever the cause.
pub const GENERIC_FAILURE: &str = "Failed to generate PDF";

/// Failure of a single export invocation.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The browser engine process could not be started.
    #[error("browser engine failed to launch: {0}")]
    EngineLaunchFailure(String),

    /// The engine started but loading, polling or printing failed.
    #[error("browser engine failure: {0}")]
    EngineFailure(String),

    /// The content container never populated within the readiness timeout.
    #[error("content container was not populated within {0:?}")]
    Timeout(Duration),

    /// The rendered surface could not be cloned, attached or captured.
    #[error("capture failed: {0}")]
    CaptureFailure(String),

    /// A page could not be appended or the document could not be finalized.
    #[error("PDF assembly failed: {0}")]
    AssemblyFailure(String),

    /// Markdown input exceeds the configured request size limit.
    #[error("markdown input is {len} bytes, limit is {limit}")]
    InputTooLarge { len: usize, limit: usize },

    /// The concurrent export ceiling is reached.
    #[error("too many exports in flight (limit {limit})")]
    Busy { limit: usize },

    /// The export trigger fired while a previous export was still running.
    #[error("an export is already in progress")]
    ExportInProgress,

    /// Invalid or unreadable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Map a browser-side error into [`RenderError::EngineFailure`], keeping
    /// the context of the step that failed.
    pub fn engine(step: &str, cause: impl std::fmt::Display) -> Self {
        RenderError::EngineFailure(format!("{step}: {cause}"))
    }

    pub fn capture(step: &str, cause: impl std::fmt::Display) -> Self {
        RenderError::CaptureFailure(format!("{step}: {cause}"))
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_helper_keeps_step_and_cause() {
        let err = RenderError::engine("print", "socket closed");
        assert_eq!(err.to_string(), "browser engine failure: print: socket closed");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RenderError = io.into();
        assert!(matches!(err, RenderError::Io(_)));
    }
}
