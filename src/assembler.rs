//! PDF assembler – the page/image surface both pipelines write to, plus the
//! `printpdf` (v0.8 ops-based API) implementation.
//!
//! Coordinates passed to [`PdfAssembler::add_image`] use a top-left origin in
//! the unit chosen at creation time. The conversion to PDF's bottom-left
//! origin happens at finalize.

use std::collections::HashMap;

use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, XObjectTransform,
};

use crate::error::{RenderError, Result};

const MM_TO_PT: f32 = 72.0 / 25.4;
const PT_TO_MM: f32 = 0.352778;
const PX_TO_PT: f32 = 0.75; // CSS px at 96 dpi

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Unit for all coordinates given to an assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    #[default]
    Mm,
    Pt,
    /// CSS pixel, 1/96 inch.
    Px,
}

impl Unit {
    pub fn to_pt(self, value: f64) -> f32 {
        let v = value as f32;
        match self {
            Unit::Mm => v * MM_TO_PT,
            Unit::Pt => v,
            Unit::Px => v * PX_TO_PT,
        }
    }
}

/// Physical page size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSize {
    #[default]
    A4,
    Custom { width_mm: f64, height_mm: f64 },
}

impl PageSize {
    /// Portrait `(width, height)` in millimetres.
    pub fn dimensions_mm(self) -> (f64, f64) {
        match self {
            PageSize::A4 => (210.0, 297.0),
            PageSize::Custom { width_mm, height_mm } => (width_mm, height_mm),
        }
    }

    /// `(width, height)` in millimetres after applying `orientation`.
    pub fn oriented_mm(self, orientation: Orientation) -> (f64, f64) {
        let (w, h) = self.dimensions_mm();
        match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

/// Encoding of image bytes handed to [`PdfAssembler::add_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    fn matches(self, detected: ::image::ImageFormat) -> bool {
        matches!(
            (self, detected),
            (ImageFormat::Png, ::image::ImageFormat::Png)
                | (ImageFormat::Jpeg, ::image::ImageFormat::Jpeg)
        )
    }
}

/// Contract shared by every PDF producer used by the raster pipeline.
///
/// An assembler starts with one empty page. [`finalize`](Self::finalize)
/// consumes it, so no page can change afterwards.
pub trait PdfAssembler: Sized {
    fn create(orientation: Orientation, unit: Unit, page_size: PageSize) -> Self;

    /// Title embedded in the document metadata.
    fn set_title(&mut self, title: &str);

    /// Place an image on the current (last) page. The top-left corner sits at
    /// `(x, y)`; negative offsets move the image above the page edge.
    #[allow(clippy::too_many_arguments)]
    fn add_image(
        &mut self,
        image: &[u8],
        format: ImageFormat,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<()>;

    /// Append a new empty page and make it current.
    fn add_page(&mut self) -> Result<()>;

    fn page_count(&self) -> usize;

    fn finalize(self) -> Result<Vec<u8>>;
}

/// A decoded image together with the pixel dimensions of the source.
struct ImageResource {
    raw: RawImage,
    px_width: u32,
    px_height: u32,
}

/// One image placement in PDF points, top-left origin.
#[derive(Debug, Clone, Copy)]
struct Placement {
    image: usize,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// [`PdfAssembler`] backed by `printpdf`.
///
/// Identical image bytes are registered once and shared by every page that
/// places them.
pub struct PrintPdfAssembler {
    title: String,
    unit: Unit,
    page_width_pt: f32,
    page_height_pt: f32,
    images: Vec<ImageResource>,
    /// Registered images keyed by their encoded bytes.
    image_index: HashMap<Vec<u8>, usize>,
    pages: Vec<Vec<Placement>>,
}

impl PrintPdfAssembler {
    fn register_image(&mut self, bytes: &[u8], format: ImageFormat) -> Result<usize> {
        if let Some(&idx) = self.image_index.get(bytes) {
            return Ok(idx);
        }

        let detected = ::image::guess_format(bytes)
            .map_err(|e| RenderError::AssemblyFailure(format!("unrecognised image data: {e}")))?;
        if !format.matches(detected) {
            return Err(RenderError::AssemblyFailure(format!(
                "image declared as {format:?} but data is {detected:?}"
            )));
        }

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let raw = RawImage::decode_from_bytes(bytes, &mut warnings)
            .map_err(|e| RenderError::AssemblyFailure(format!("image decode error: {e}")))?;
        for w in &warnings {
            log::debug!("printpdf image warning: {w:?}");
        }

        let idx = self.images.len();
        self.images.push(ImageResource {
            px_width: raw.width as u32,
            px_height: raw.height as u32,
            raw,
        });
        self.image_index.insert(bytes.to_vec(), idx);
        Ok(idx)
    }
}

impl PdfAssembler for PrintPdfAssembler {
    fn create(orientation: Orientation, unit: Unit, page_size: PageSize) -> Self {
        let (w_mm, h_mm) = page_size.oriented_mm(orientation);
        Self {
            title: crate::document::DEFAULT_TITLE.to_string(),
            unit,
            page_width_pt: Unit::Mm.to_pt(w_mm),
            page_height_pt: Unit::Mm.to_pt(h_mm),
            images: Vec::new(),
            image_index: HashMap::new(),
            pages: vec![Vec::new()],
        }
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn add_image(
        &mut self,
        image: &[u8],
        format: ImageFormat,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<()> {
        if !(width > 0.0 && height > 0.0) {
            return Err(RenderError::AssemblyFailure(format!(
                "image placement must have a positive size, got {width}x{height}"
            )));
        }
        let image = self.register_image(image, format)?;
        let placement = Placement {
            image,
            x: self.unit.to_pt(x),
            y: self.unit.to_pt(y),
            width: self.unit.to_pt(width),
            height: self.unit.to_pt(height),
        };
        match self.pages.last_mut() {
            Some(page) => {
                page.push(placement);
                Ok(())
            }
            None => Err(RenderError::AssemblyFailure("no current page".to_string())),
        }
    }

    fn add_page(&mut self) -> Result<()> {
        self.pages.push(Vec::new());
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn finalize(self) -> Result<Vec<u8>> {
        let mut doc = PdfDocument::new(&self.title);
        let xobj_ids: Vec<_> = self.images.iter().map(|img| doc.add_image(&img.raw)).collect();

        let page_w = Mm(self.page_width_pt * PT_TO_MM);
        let page_h = Mm(self.page_height_pt * PT_TO_MM);

        let pages: Vec<PdfPage> = self
            .pages
            .iter()
            .map(|placements| {
                let ops = placements
                    .iter()
                    .map(|p| {
                        let res = &self.images[p.image];
                        // At dpi=72 printpdf renders 1 px = 1 pt.
                        let scale_x = p.width / res.px_width.max(1) as f32;
                        let scale_y = p.height / res.px_height.max(1) as f32;
                        Op::UseXobject {
                            id: xobj_ids[p.image].clone(),
                            transform: XObjectTransform {
                                translate_x: Some(Pt(p.x)),
                                translate_y: Some(Pt(self.page_height_pt - p.y - p.height)),
                                dpi: Some(72.0),
                                scale_x: Some(scale_x),
                                scale_y: Some(scale_y),
                                rotate: None,
                            },
                        }
                    })
                    .collect();
                PdfPage::new(page_w, page_h, ops)
            })
            .collect();

        doc.with_pages(pages);
        let mut warnings = Vec::new();
        let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if bytes.is_empty() {
            return Err(RenderError::AssemblyFailure("printpdf produced no output".to_string()));
        }
        log::debug!(
            "Finalized '{}': {} page(s), {} image(s), {} bytes",
            self.title,
            self.pages.len(),
            self.images.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ::image::RgbImage::from_pixel(width, height, ::image::Rgb([200, 10, 10]));
        let mut buf = Vec::new();
        ::image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ::image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn a4_landscape_swaps_dimensions() {
        assert_eq!(PageSize::A4.oriented_mm(Orientation::Landscape), (297.0, 210.0));
    }

    #[test]
    fn units_convert_to_points() {
        assert!((Unit::Mm.to_pt(25.4) - 72.0).abs() < 1e-3);
        assert!((Unit::Px.to_pt(96.0) - 72.0).abs() < 1e-3);
        assert_eq!(Unit::Pt.to_pt(10.0), 10.0);
    }

    #[test]
    fn starts_with_one_page() {
        let asm = PrintPdfAssembler::create(Orientation::Portrait, Unit::Mm, PageSize::A4);
        assert_eq!(asm.page_count(), 1);
    }

    #[test]
    fn empty_document_finalizes() {
        let asm = PrintPdfAssembler::create(Orientation::Portrait, Unit::Mm, PageSize::A4);
        let bytes = asm.finalize().unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn same_image_is_registered_once() {
        let data = png(4, 8);
        let mut asm = PrintPdfAssembler::create(Orientation::Portrait, Unit::Mm, PageSize::A4);
        asm.add_image(&data, ImageFormat::Png, 0.0, 0.0, 210.0, 420.0).unwrap();
        asm.add_page().unwrap();
        asm.add_image(&data, ImageFormat::Png, 0.0, -297.0, 210.0, 420.0).unwrap();
        assert_eq!(asm.images.len(), 1);
        assert_eq!(asm.page_count(), 2);
        let bytes = asm.finalize().unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn distinct_images_keep_their_own_dimensions() {
        let tall = png(4, 8);
        let wide = png(8, 4);
        let mut asm = PrintPdfAssembler::create(Orientation::Portrait, Unit::Mm, PageSize::A4);
        asm.add_image(&tall, ImageFormat::Png, 0.0, 0.0, 10.0, 20.0).unwrap();
        asm.add_image(&wide, ImageFormat::Png, 0.0, 30.0, 20.0, 10.0).unwrap();
        asm.add_image(&tall, ImageFormat::Png, 0.0, 50.0, 10.0, 20.0).unwrap();
        assert_eq!(asm.images.len(), 2);
        let dims: Vec<_> = asm.images.iter().map(|i| (i.px_width, i.px_height)).collect();
        assert_eq!(dims, vec![(4, 8), (8, 4)]);
        let placed: Vec<_> = asm.pages[0].iter().map(|p| p.image).collect();
        assert_eq!(placed, vec![0, 1, 0]);
    }

    #[test]
    fn mismatched_format_is_rejected() {
        let data = png(2, 2);
        let mut asm = PrintPdfAssembler::create(Orientation::Portrait, Unit::Mm, PageSize::A4);
        let err = asm.add_image(&data, ImageFormat::Jpeg, 0.0, 0.0, 10.0, 10.0).unwrap_err();
        assert!(matches!(err, RenderError::AssemblyFailure(_)));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let mut asm = PrintPdfAssembler::create(Orientation::Portrait, Unit::Mm, PageSize::A4);
        let err = asm.add_image(b"not an image", ImageFormat::Png, 0.0, 0.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, RenderError::AssemblyFailure(_)));
    }
}
