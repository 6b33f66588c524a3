//! Native print pipeline – hand the sanitized, rendered document to a full
//! browser engine and let it paginate and print to PDF itself.
//!
//! One engine instance is launched per export and shut down on every exit
//! path by [`EngineSession`]. Nothing is pooled or reused across requests.

use std::thread;
use std::time::{Duration, Instant};

use crate::assembler::PageSize;
use crate::document::{ExportedPdf, DEFAULT_FILE_NAME};
use crate::error::{RenderError, Result};
use crate::html::{self, CONTENT_SELECTOR};
use crate::sanitize::sanitize;

/// Default readiness timeout.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between readiness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

const CSS_PX_PER_INCH: f64 = 96.0;
const MM_PER_INCH: f64 = 25.4;

/// Page margins in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Options for the engine's paginated PDF export.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    pub page_size: PageSize,
    pub margins_px: Margins,
    pub print_background: bool,
    /// Let a CSS `@page { size }` rule win over `page_size`.
    pub prefer_css_page_size: bool,
}

impl PrintOptions {
    /// A4 with 20px top/bottom and 30px left/right margins.
    pub fn a4() -> Self {
        Self {
            page_size: PageSize::A4,
            margins_px: Margins { top: 20.0, right: 30.0, bottom: 20.0, left: 30.0 },
            print_background: true,
            prefer_css_page_size: true,
        }
    }

    /// Paper `(width, height)` in inches.
    pub fn paper_inches(&self) -> (f64, f64) {
        let (w, h) = self.page_size.dimensions_mm();
        (w / MM_PER_INCH, h / MM_PER_INCH)
    }

    /// Margins `(top, right, bottom, left)` in inches.
    pub fn margin_inches(&self) -> (f64, f64, f64, f64) {
        let m = self.margins_px;
        (
            m.top / CSS_PX_PER_INCH,
            m.right / CSS_PX_PER_INCH,
            m.bottom / CSS_PX_PER_INCH,
            m.left / CSS_PX_PER_INCH,
        )
    }
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self::a4()
    }
}

/// A running, exclusively owned browser engine instance.
pub trait Engine {
    /// Load a complete HTML document into a page context.
    fn load_html(&mut self, html: &str) -> Result<()>;

    /// Whether the element matching `selector` has non-empty content.
    fn content_populated(&mut self, selector: &str) -> Result<bool>;

    fn print_to_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>>;

    /// Stop the engine process. Must be safe to call more than once.
    fn shutdown(&mut self);
}

/// Starts isolated engine instances.
pub trait EngineLauncher {
    type Engine: Engine;

    fn launch(&self) -> Result<Self::Engine>;
}

/// An engine scoped to one export; shut down when dropped.
pub struct EngineSession<E: Engine> {
    engine: E,
}

impl<E: Engine> EngineSession<E> {
    pub fn open<L: EngineLauncher<Engine = E>>(launcher: &L) -> Result<Self> {
        let engine = launcher.launch().map_err(|e| match e {
            RenderError::EngineLaunchFailure(_) => e,
            other => RenderError::EngineLaunchFailure(other.to_string()),
        })?;
        Ok(Self { engine })
    }

    pub fn engine(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Block until `selector` has content, polling every `poll_interval`.
    pub fn wait_until_populated(
        &mut self,
        selector: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        let mut polls = 0u32;
        loop {
            polls += 1;
            if self.engine.content_populated(selector)? {
                log::debug!("'{selector}' populated after {polls} poll(s), {:?}", started.elapsed());
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(RenderError::Timeout(elapsed));
            }
            thread::sleep(poll_interval.min(timeout - elapsed));
        }
    }
}

impl<E: Engine> Drop for EngineSession<E> {
    fn drop(&mut self) {
        self.engine.shutdown();
        log::debug!("Engine session closed");
    }
}

/// Readiness polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self { timeout: DEFAULT_READINESS_TIMEOUT, poll_interval: DEFAULT_POLL_INTERVAL }
    }
}

/// The server-side export strategy.
pub struct NativePrint<L: EngineLauncher> {
    launcher: L,
    readiness: Readiness,
    print: PrintOptions,
}

impl<L: EngineLauncher> NativePrint<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher, readiness: Readiness::default(), print: PrintOptions::a4() }
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_print_options(mut self, print: PrintOptions) -> Self {
        self.print = print;
        self
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Sanitize, render, load, wait for content and print.
    pub fn export_bytes(&self, markdown: &str) -> Result<Vec<u8>> {
        let document = html::render(&sanitize(markdown));

        let mut session = EngineSession::open(&self.launcher)?;
        session.engine().load_html(&document)?;
        session.wait_until_populated(
            CONTENT_SELECTOR,
            self.readiness.timeout,
            self.readiness.poll_interval,
        )?;
        let bytes = session.engine().print_to_pdf(&self.print)?;
        if bytes.is_empty() {
            return Err(RenderError::EngineFailure("engine returned an empty PDF".to_string()));
        }
        log::info!("Native export: {} bytes of Markdown -> {} bytes of PDF", markdown.len(), bytes.len());
        Ok(bytes)
    }

    /// [`export_bytes`](Self::export_bytes) wrapped with the response file
    /// name (`document.pdf` unless one is given).
    pub fn export_markdown(&self, markdown: &str, file_name: Option<&str>) -> Result<ExportedPdf> {
        let bytes = self.export_bytes(markdown)?;
        Ok(ExportedPdf {
            file_name: file_name.unwrap_or(DEFAULT_FILE_NAME).to_string(),
            bytes,
            page_count: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        live: AtomicUsize,
        polls: AtomicUsize,
    }

    struct StubEngine {
        counters: Arc<Counters>,
        ready_after: Option<usize>,
        running: bool,
    }

    impl Engine for StubEngine {
        fn load_html(&mut self, html: &str) -> Result<()> {
            assert!(html.contains("id=\"content\""));
            Ok(())
        }

        fn content_populated(&mut self, _selector: &str) -> Result<bool> {
            let n = self.counters.polls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(self.ready_after.is_some_and(|after| n >= after))
        }

        fn print_to_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>> {
            assert!(options.print_background);
            Ok(b"%PDF-1.4 stub".to_vec())
        }

        fn shutdown(&mut self) {
            if self.running {
                self.running = false;
                self.counters.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    struct StubLauncher {
        counters: Arc<Counters>,
        ready_after: Option<usize>,
    }

    impl EngineLauncher for StubLauncher {
        type Engine = StubEngine;

        fn launch(&self) -> Result<StubEngine> {
            self.counters.live.fetch_add(1, Ordering::SeqCst);
            Ok(StubEngine {
                counters: self.counters.clone(),
                ready_after: self.ready_after,
                running: true,
            })
        }
    }

    fn fast() -> Readiness {
        Readiness { timeout: Duration::from_millis(30), poll_interval: Duration::from_millis(1) }
    }

    #[test]
    fn a4_margins_in_inches() {
        let opts = PrintOptions::a4();
        let (w, h) = opts.paper_inches();
        assert!((w - 8.2677).abs() < 1e-3);
        assert!((h - 11.6929).abs() < 1e-3);
        let (top, right, _, _) = opts.margin_inches();
        assert!((top - 20.0 / 96.0).abs() < 1e-9);
        assert!((right - 30.0 / 96.0).abs() < 1e-9);
    }

    #[test]
    fn waits_for_content_then_prints() {
        let counters = Arc::new(Counters::default());
        let printer = NativePrint::new(StubLauncher { counters: counters.clone(), ready_after: Some(3) })
            .with_readiness(fast());
        let pdf = printer.export_markdown("# T\n\nbody", None).unwrap();
        assert_eq!(pdf.file_name, "document.pdf");
        assert!(pdf.bytes.starts_with(b"%PDF-"));
        assert_eq!(counters.polls.load(Ordering::SeqCst), 3);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn never_populated_times_out_and_shuts_down() {
        let counters = Arc::new(Counters::default());
        let printer = NativePrint::new(StubLauncher { counters: counters.clone(), ready_after: None })
            .with_readiness(fast());
        let err = printer.export_bytes("# T").unwrap_err();
        assert!(matches!(err, RenderError::Timeout(_)));
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }
}
