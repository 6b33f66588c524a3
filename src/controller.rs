//! Export trigger – the user-initiated action that runs a strategy against
//! the current document and title, then saves the result locally.
//!
//! Progress and outcome go through a [`Notifier`]. Whatever fails, the user
//! sees the same generic failure message; the cause is logged.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use crate::document::{resolve_file_name, MarkdownDocument};
use crate::error::{RenderError, Result};
use crate::strategy::PdfExporter;

/// Notification surface for export progress and outcome.
pub trait Notifier {
    fn progress(&self, title: &str, description: &str);
    fn success(&self, title: &str, description: &str);
    fn failure(&self, title: &str, description: &str);
}

/// [`Notifier`] that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn progress(&self, title: &str, description: &str) {
        log::info!("{title} {description}");
    }

    fn success(&self, title: &str, description: &str) {
        log::info!("{title}: {description}");
    }

    fn failure(&self, title: &str, description: &str) {
        log::error!("{title}: {description}");
    }
}

/// Single-flight export action.
pub struct ExportController<N: Notifier> {
    exporter: Mutex<Box<dyn PdfExporter + Send>>,
    notifier: N,
    download_dir: PathBuf,
    exporting: AtomicBool,
}

/// Clears the in-progress flag on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<N: Notifier> ExportController<N> {
    pub fn new(
        exporter: Box<dyn PdfExporter + Send>,
        notifier: N,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            exporter: Mutex::new(exporter),
            notifier,
            download_dir: download_dir.into(),
            exporting: AtomicBool::new(false),
        }
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting.load(Ordering::Acquire)
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Export `doc` and write it into the download directory.
    ///
    /// `title_override` is the title-input value, if the user typed one.
    /// Returns the written path. A trigger while another export runs is
    /// rejected with [`RenderError::ExportInProgress`] and does nothing.
    pub fn export(&self, doc: &MarkdownDocument, title_override: Option<&str>) -> Result<PathBuf> {
        let file_name = resolve_file_name(doc, title_override);
        // Keep the name a single path component.
        let path = self.download_dir.join(file_name.replace(['/', '\\'], "_"));
        self.trigger(doc, &file_name, path)
    }

    /// Export `doc` to exactly `path`, which also names the document.
    pub fn export_to(&self, doc: &MarkdownDocument, path: &Path) -> Result<PathBuf> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .unwrap_or_else(|| doc.file_name());
        self.trigger(doc, &file_name, path.to_path_buf())
    }

    fn trigger(&self, doc: &MarkdownDocument, file_name: &str, path: PathBuf) -> Result<PathBuf> {
        if self
            .exporting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RenderError::ExportInProgress);
        }

        self.notifier
            .progress("Generating PDF...", "Please wait while we prepare your document.");

        let result = {
            let _flight = InFlight(&self.exporting);
            self.run(doc, file_name, &path).map(|()| path)
        };

        match &result {
            Ok(path) => {
                log::info!("Saved '{}'", path.display());
                self.notifier.success("Success", "PDF has been generated and downloaded.");
            }
            Err(e) => {
                log::error!("PDF generation failed: {e}");
                self.notifier.failure("Error", "Failed to generate PDF. Please try again.");
            }
        }
        result
    }

    fn run(&self, doc: &MarkdownDocument, file_name: &str, path: &Path) -> Result<()> {
        let pdf = {
            let mut exporter = self.exporter.lock().unwrap_or_else(|p| p.into_inner());
            exporter.export(doc, file_name)?
        };
        save(path, &pdf.bytes)
    }
}

/// Write `bytes` to `path` through a temporary sibling, so `path` either
/// holds the complete PDF or is left untouched.
fn save(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_writes_the_exact_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.PDF");
        save(&path, b"%PDF-").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn save_replaces_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        fs::write(&path, b"old").unwrap();
        save(&path, b"%PDF-new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-new");
    }

    #[test]
    fn failed_save_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in the way makes the final rename fail.
        let path = dir.path().join("x.pdf");
        fs::create_dir(&path).unwrap();
        assert!(save(&path, b"%PDF-").is_err());
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(entries, vec![path.clone()]);
        assert!(path.is_dir());
    }
}
