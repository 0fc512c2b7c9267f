//! Document backend capability boundary
//!
//! The compositor only talks to PDFs through this trait, so the underlying
//! library can be swapped and the compositor can be tested against a fake.

use crate::annotation::Rgb;
use crate::coords::{PageBox, PdfRect};
use crate::error::{AnnotationError, ExportError};
use crate::metrics::StandardFont;

/// A single line of text to draw, baseline-anchored at `(x, y)` in PDF space
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun<'a> {
    pub text: &'a str,
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    pub color: Rgb,
}

pub trait DocumentBackend {
    /// Parsed source document
    type Source;
    /// Output document under construction
    type Output;
    /// Handle to a font embedded in an output document
    type Font: Clone;

    fn parse(&self, bytes: &[u8]) -> Result<Self::Source, ExportError>;

    fn create_output(&self) -> Self::Output;

    /// Copy every source page into `output`, in order.
    /// Returns the media box of each copied page.
    fn copy_pages(
        &self,
        source: &Self::Source,
        output: &mut Self::Output,
    ) -> Result<Vec<PageBox>, ExportError>;

    fn embed_font(
        &self,
        output: &mut Self::Output,
        font: StandardFont,
    ) -> Result<Self::Font, ExportError>;

    /// Rendered width of `text` in points
    fn measure_text(
        &self,
        font: &Self::Font,
        text: &str,
        font_size: f64,
    ) -> Result<f64, AnnotationError>;

    fn draw_rect(
        &self,
        output: &mut Self::Output,
        page_index: u32,
        rect: PdfRect,
        fill: Rgb,
    ) -> Result<(), AnnotationError>;

    fn draw_text(
        &self,
        output: &mut Self::Output,
        page_index: u32,
        font: &Self::Font,
        run: &TextRun<'_>,
    ) -> Result<(), AnnotationError>;

    /// Draw an encoded PNG scaled into `rect`
    fn draw_image(
        &self,
        output: &mut Self::Output,
        page_index: u32,
        png: &[u8],
        rect: PdfRect,
    ) -> Result<(), AnnotationError>;

    fn serialize(&self, output: Self::Output) -> Result<Vec<u8>, ExportError>;
}
