//! Export strategies – one interface over the native print and raster slice
//! pipelines, picked by deployment configuration.

use serde::{Deserialize, Serialize};

use crate::assembler::PrintPdfAssembler;
use crate::chrome::{ChromeLauncher, ChromePreview, ElementId};
use crate::config::ExportConfig;
use crate::document::{ExportedPdf, MarkdownDocument};
use crate::error::Result;
use crate::html;
use crate::native::{EngineLauncher, NativePrint};
use crate::raster::{export_raster, DisplayTree, RasterOptions};
use crate::sanitize::sanitize;

/// Which pipeline produces the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Browser-native pagination and print.
    #[default]
    NativePrint,
    /// Capture the rendered preview and slice it over pages.
    RasterSlice,
}

/// A PDF export strategy.
pub trait PdfExporter {
    fn kind(&self) -> StrategyKind;

    /// Export `doc`, naming the result `file_name`.
    fn export(&mut self, doc: &MarkdownDocument, file_name: &str) -> Result<ExportedPdf>;
}

impl<L: EngineLauncher> PdfExporter for NativePrint<L> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NativePrint
    }

    fn export(&mut self, doc: &MarkdownDocument, file_name: &str) -> Result<ExportedPdf> {
        self.export_markdown(doc.text(), Some(file_name))
    }
}

/// Something that can show a rendered preview and hand back its element.
pub trait PreviewHost {
    type Tree: DisplayTree;

    fn show(&self, preview_html: &str) -> Result<(Self::Tree, <Self::Tree as DisplayTree>::Node)>;
}

impl PreviewHost for ChromeLauncher {
    type Tree = ChromePreview;

    fn show(&self, preview_html: &str) -> Result<(ChromePreview, ElementId)> {
        let preview = ChromePreview::open(self, preview_html)?;
        let element = preview.preview_element();
        Ok((preview, element))
    }
}

/// The client-side strategy: render the preview, then rasterize it.
pub struct RasterSlice<H: PreviewHost> {
    host: H,
    options: RasterOptions,
}

impl<H: PreviewHost> RasterSlice<H> {
    pub fn new(host: H, options: RasterOptions) -> Self {
        Self { host, options }
    }
}

impl<H: PreviewHost> PdfExporter for RasterSlice<H> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RasterSlice
    }

    fn export(&mut self, doc: &MarkdownDocument, file_name: &str) -> Result<ExportedPdf> {
        let preview = html::render_preview(&sanitize(doc.text()));
        let (mut tree, element) = self.host.show(&preview)?;
        export_raster::<PrintPdfAssembler, _>(&mut tree, &element, file_name, &self.options)
    }
}

/// Build the exporter `config` selects, backed by headless Chrome.
pub fn build_exporter(config: &ExportConfig) -> Box<dyn PdfExporter + Send> {
    let launcher = ChromeLauncher::new(config.chrome.clone(), config.idle_timeout());
    match config.strategy {
        StrategyKind::NativePrint => {
            Box::new(NativePrint::new(launcher).with_readiness(config.readiness()))
        }
        StrategyKind::RasterSlice => Box::new(RasterSlice::new(launcher, config.raster_options())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialise_kebab_case() {
        assert_eq!(serde_json::to_string(&StrategyKind::RasterSlice).unwrap(), "\"raster-slice\"");
        assert_eq!(
            serde_json::from_str::<StrategyKind>("\"native-print\"").unwrap(),
            StrategyKind::NativePrint
        );
    }

    #[test]
    fn builder_follows_config() {
        let mut cfg = ExportConfig::default();
        assert_eq!(build_exporter(&cfg).kind(), StrategyKind::NativePrint);
        cfg.strategy = StrategyKind::RasterSlice;
        assert_eq!(build_exporter(&cfg).kind(), StrategyKind::RasterSlice);
    }
}
