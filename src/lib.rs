//! # md-forge – Markdown → PDF through two export strategies
//!
//! Both strategies share the same front half:
//!
//! 1. **Model** – Markdown text with a derived title ([`document`])
//! 2. **Sanitize** – neutralise `<script>` tokens ([`sanitize`])
//! 3. **Render** – Markdown → styled HTML ([`html`])
//!
//! and then diverge:
//!
//! - **Native print** – a browser engine paginates and prints ([`native`])
//! - **Raster slice** – the rendered preview is captured and laid over A4
//!   pages image by image ([`raster`] on top of [`assembler`])
//!
//! [`strategy`] picks one per deployment, [`service`] exposes the native path
//! as a request handler and [`controller`] is the user-facing export action.

pub mod assembler;
pub mod chrome;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod html;
pub mod native;
pub mod raster;
pub mod sanitize;
pub mod service;
pub mod strategy;

// Re-exports for convenience
pub use config::ExportConfig;
pub use document::{ExportedPdf, MarkdownDocument};
pub use error::{RenderError, Result};
pub use sanitize::sanitize;
pub use strategy::{build_exporter, PdfExporter, StrategyKind};
