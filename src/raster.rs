//! Rasterization pipeline – capture an already-rendered preview as one
//! bitmap and lay it out over as many A4 pages as its height needs.
//!
//! Handles:
//! - Cloning the preview out of the live display tree with a capture-only
//!   style, so capture never disturbs what the user sees
//! - Guaranteed detachment of the clone, even when capture fails
//! - Pagination by re-placing the whole image once per page, shifted up by
//!   one page height each time; the page edge clips the visible band
//!
//! Pagination cannot reflow content, so an element may be cut at a page
//! boundary. That is a known limitation of this strategy.

use std::io::Cursor;

use crate::assembler::{ImageFormat, Orientation, PageSize, PdfAssembler, Unit};
use crate::document::ExportedPdf;
use crate::error::{RenderError, Result};

/// Downscale factor applied when capturing the preview.
pub const RASTER_SCALE: f64 = 0.75;

/// Padding applied to the capture clone, in CSS px.
pub const CAPTURE_PADDING_PX: u32 = 20;

// ---------------------------------------------------------------------------
// Pagination math
// ---------------------------------------------------------------------------

/// A vertical band of the captured surface shown on one output page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSlice {
    pub source_offset_y: f64,
    pub height: f64,
    pub page_index: usize,
}

/// Vertical offsets at which the full image is placed, one per page.
///
/// The first page shows the image at `0`; each following page shifts it up
/// by another `page_height`. Always returns at least one offset, so empty
/// content still produces a page. The count is `ceil(image / page)`, never
/// accumulated, so fractional heights cannot gain a stray page. Non-positive
/// page heights are treated as a single page.
pub fn page_offsets(image_height: f64, page_height: f64) -> Vec<f64> {
    if !(page_height > 0.0) || !(image_height > 0.0) {
        return vec![0.0];
    }
    let pages = ((image_height / page_height).ceil() as usize).max(1);
    (0..pages).map(|i| 0.0 - i as f64 * page_height).collect()
}

/// Bands of a surface of height `height` revealed by each page of height
/// `page_height`.
///
/// The bands partition `[0, height)` without gaps or overlaps and none is
/// taller than `page_height`. An empty surface yields one zero-height band,
/// matching the single blank page the pipeline emits for it.
pub fn page_slices(height: f64, page_height: f64) -> Vec<PageSlice> {
    page_offsets(height, page_height)
        .into_iter()
        .enumerate()
        .map(|(page_index, offset)| {
            let start = -offset;
            PageSlice {
                source_offset_y: start,
                height: (height - start).clamp(0.0, page_height.max(0.0)),
                page_index,
            }
        })
        .collect()
}

/// Page layout of one captured bitmap, in millimetres.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayout {
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    /// Image height after scaling the capture to the page width.
    pub image_height_mm: f64,
    /// Placement offset per page; `offsets.len()` is the page count.
    pub offsets: Vec<f64>,
}

impl RasterLayout {
    /// Fit a `width_px` × `height_px` capture to the width of `page`.
    pub fn new(width_px: u32, height_px: u32, page: PageSize) -> Result<Self> {
        if width_px == 0 {
            return Err(RenderError::CaptureFailure("captured surface has zero width".to_string()));
        }
        let (page_width_mm, page_height_mm) = page.oriented_mm(Orientation::Portrait);
        let image_height_mm = height_px as f64 * page_width_mm / width_px as f64;
        let offsets = page_offsets(image_height_mm, page_height_mm);
        Ok(Self { page_width_mm, page_height_mm, image_height_mm, offsets })
    }

    pub fn page_count(&self) -> usize {
        self.offsets.len()
    }

    /// Bands of the image, in millimetres, revealed by each page.
    pub fn slices(&self) -> Vec<PageSlice> {
        page_slices(self.image_height_mm, self.page_height_mm)
    }
}

// ---------------------------------------------------------------------------
// Display tree seam
// ---------------------------------------------------------------------------

/// Capture-only style override applied to the clone.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureStyle {
    pub padding_px: u32,
    /// Pin the clone's width to the source's natural content width.
    pub natural_width: bool,
    /// Wrap and break long tokens instead of overflowing the capture width.
    pub break_long_words: bool,
}

impl Default for CaptureStyle {
    fn default() -> Self {
        Self { padding_px: CAPTURE_PADDING_PX, natural_width: true, break_long_words: true }
    }
}

impl CaptureStyle {
    /// CSS declarations for the clone. `content_width_px` is the source's
    /// natural width; placement (`top`/`left`) is chosen by the tree.
    pub fn declarations(&self, content_width_px: Option<u32>) -> Vec<(&'static str, String)> {
        let mut decls = vec![
            ("padding", format!("{}px", self.padding_px)),
            ("height", "auto".to_string()),
            ("position", "absolute".to_string()),
            ("z-index", "-1".to_string()),
            ("box-sizing", "content-box".to_string()),
            ("overflow", "visible".to_string()),
        ];
        if self.natural_width {
            if let Some(w) = content_width_px {
                decls.push(("width", format!("{w}px")));
            }
        }
        if self.break_long_words {
            decls.push(("word-wrap", "break-word".to_string()));
            decls.push(("word-break", "break-word".to_string()));
        }
        decls
    }

    /// Declarations joined as an inline `style` value.
    pub fn to_css(&self, content_width_px: Option<u32>) -> String {
        self.declarations(content_width_px)
            .into_iter()
            .map(|(k, v)| format!("{k}: {v};"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A PNG capture with its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CapturedImage {
    /// Wrap PNG bytes, reading the dimensions from the header.
    pub fn from_png(png: Vec<u8>) -> Result<Self> {
        let reader = ::image::ImageReader::with_format(Cursor::new(&png), ::image::ImageFormat::Png);
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| RenderError::capture("reading capture dimensions", e))?;
        Ok(Self { png, width, height })
    }
}

/// The live display tree a rendered preview lives in.
pub trait DisplayTree {
    type Node: Clone + std::fmt::Debug;

    /// Deep-copy `source`, apply `style`, and return the clone unattached.
    fn clone_node(&mut self, source: &Self::Node, style: &CaptureStyle) -> Result<Self::Node>;

    /// Insert a clone into the tree where it can be laid out but not seen.
    fn attach(&mut self, node: &Self::Node) -> Result<()>;

    /// Remove a clone from the tree and discard it.
    fn detach(&mut self, node: &Self::Node) -> Result<()>;

    /// Rasterize an attached node at `scale`, loading cross-origin images.
    fn capture(&mut self, node: &Self::Node, scale: f64) -> Result<CapturedImage>;

    /// Whether `node` is currently part of the tree.
    fn contains(&mut self, node: &Self::Node) -> Result<bool>;
}

/// A capture clone attached to a [`DisplayTree`] for the guard's lifetime.
///
/// Dropping the guard detaches the clone on every exit path. A failed detach
/// is logged and never replaces the error that caused the unwind.
pub struct CaptureClone<'a, T: DisplayTree> {
    tree: &'a mut T,
    node: T::Node,
}

impl<'a, T: DisplayTree> CaptureClone<'a, T> {
    pub fn attach(tree: &'a mut T, source: &T::Node, style: &CaptureStyle) -> Result<Self> {
        let node = tree.clone_node(source, style)?;
        tree.attach(&node)?;
        log::debug!("Attached capture clone {node:?}");
        Ok(Self { tree, node })
    }

    pub fn capture(&mut self, scale: f64) -> Result<CapturedImage> {
        self.tree.capture(&self.node, scale)
    }

    pub fn node(&self) -> &T::Node {
        &self.node
    }
}

impl<T: DisplayTree> Drop for CaptureClone<'_, T> {
    fn drop(&mut self) {
        match self.tree.detach(&self.node) {
            Ok(()) => log::debug!("Detached capture clone {:?}", self.node),
            Err(e) => log::warn!("Failed to detach capture clone {:?}: {e}", self.node),
        }
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Raster pipeline knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    pub scale: f64,
    pub style: CaptureStyle,
    pub page_size: PageSize,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self { scale: RASTER_SCALE, style: CaptureStyle::default(), page_size: PageSize::A4 }
    }
}

/// Capture a clone of `element`, detaching it however the capture ends.
pub fn capture_element<T: DisplayTree>(
    tree: &mut T,
    element: &T::Node,
    options: &RasterOptions,
) -> Result<CapturedImage> {
    let mut clone = CaptureClone::attach(tree, element, &options.style)?;
    clone.capture(options.scale)
}

/// Place `capture` over as many pages as its height needs.
pub fn assemble_pages<A: PdfAssembler>(
    capture: &CapturedImage,
    title: &str,
    page_size: PageSize,
) -> Result<(Vec<u8>, usize)> {
    let layout = RasterLayout::new(capture.width, capture.height, page_size)?;
    log::debug!(
        "Raster layout: {}x{} px -> {:.1} mm tall, {} page(s)",
        capture.width,
        capture.height,
        layout.image_height_mm,
        layout.page_count()
    );

    let mut doc = A::create(Orientation::Portrait, Unit::Mm, page_size);
    doc.set_title(title);
    for (idx, offset) in layout.offsets.iter().enumerate() {
        if idx > 0 {
            doc.add_page()?;
        }
        if layout.image_height_mm > 0.0 {
            doc.add_image(
                &capture.png,
                ImageFormat::Png,
                0.0,
                *offset,
                layout.page_width_mm,
                layout.image_height_mm,
            )?;
        }
    }
    let pages = doc.page_count();
    Ok((doc.finalize()?, pages))
}

/// Export an already-rendered preview element to a multi-page PDF.
pub fn export_raster<A: PdfAssembler, T: DisplayTree>(
    tree: &mut T,
    element: &T::Node,
    file_name: &str,
    options: &RasterOptions,
) -> Result<ExportedPdf> {
    let capture = capture_element(tree, element, options)?;
    let title = file_name.strip_suffix(".pdf").unwrap_or(file_name);
    let (bytes, pages) = assemble_pages::<A>(&capture, title, options.page_size)?;
    log::info!("Raster export '{file_name}': {pages} page(s), {} bytes", bytes.len());
    Ok(ExportedPdf { file_name: file_name.to_string(), bytes, page_count: Some(pages) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_for_two_pages() {
        let offsets = page_offsets(525.0, 297.0);
        assert_eq!(offsets, vec![0.0, -297.0]);
    }

    #[test]
    fn exact_multiple_does_not_add_a_blank_page() {
        assert_eq!(page_offsets(594.0, 297.0).len(), 2);
        assert_eq!(page_offsets(297.0, 297.0).len(), 1);
    }

    #[test]
    fn empty_content_still_gets_a_page() {
        assert_eq!(page_offsets(0.0, 297.0), vec![0.0]);
        let slices = page_slices(0.0, 297.0);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].height, 0.0);
    }

    #[test]
    fn fractional_heights_do_not_drift() {
        assert_eq!(page_offsets(1.0, 0.1).len(), 10);
        assert_eq!(page_offsets(0.3, 0.1).len(), 3);
        let offsets = page_offsets(612.4, 215.9);
        assert_eq!(offsets.len(), 3);
        assert_eq!(offsets[2], -2.0 * 215.9);
    }

    #[test]
    fn offsets_step_by_page_height() {
        let offsets = page_offsets(1000.0, 297.0);
        assert_eq!(offsets, vec![0.0, -297.0, -594.0, -891.0]);
    }

    #[test]
    fn slices_partition_the_surface() {
        let slices = page_slices(1000.0, 297.0);
        assert_eq!(slices.len(), 4);
        let mut cursor = 0.0;
        for (i, s) in slices.iter().enumerate() {
            assert_eq!(s.page_index, i);
            assert_eq!(s.source_offset_y, cursor);
            assert!(s.height <= 297.0);
            cursor += s.height;
        }
        assert_eq!(cursor, 1000.0);
        assert_eq!(slices[3].height, 109.0);
    }

    #[test]
    fn layout_for_800_by_2000_capture() {
        let layout = RasterLayout::new(800, 2000, PageSize::A4).unwrap();
        assert!((layout.image_height_mm - 525.0).abs() < 1e-9);
        assert_eq!(layout.page_count(), 2);
    }

    #[test]
    fn zero_width_capture_is_a_capture_failure() {
        let err = RasterLayout::new(0, 10, PageSize::A4).unwrap_err();
        assert!(matches!(err, RenderError::CaptureFailure(_)));
    }

    #[test]
    fn capture_css_contains_overrides() {
        let css = CaptureStyle::default().to_css(Some(640));
        assert!(css.contains("padding: 20px;"));
        assert!(css.contains("width: 640px;"));
        assert!(css.contains("height: auto;"));
        assert!(css.contains("word-break: break-word;"));
        assert!(css.contains("position: absolute;"));
    }
}
