//! Resolution-independent annotation positions
//!
//! A position is stored as a page index plus fractional offsets into that
//! page's rendered box (top-left origin). Fractions survive zoom and container
//! resizes; pixels and PDF points are derived on demand.

use serde::{Deserialize, Serialize};

/// Clamp a fraction into `[0, 1]`. NaN collapses to 0.
pub fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub page_index: u32,
    pub x_fraction: f64,
    pub y_fraction: f64,
}

impl Position {
    pub fn new(page_index: u32, x_fraction: f64, y_fraction: f64) -> Self {
        Self {
            page_index,
            x_fraction: clamp_fraction(x_fraction),
            y_fraction: clamp_fraction(y_fraction),
        }
    }

    /// Project onto a PDF page (bottom-left origin, points)
    pub fn to_pdf(&self, page: &PageBox) -> (f64, f64) {
        let x = page.x + self.x_fraction * page.width;
        let y = page.y + (1.0 - self.y_fraction) * page.height;
        (x, y)
    }

    /// Recover a position from PDF coordinates on the given page
    pub fn from_pdf(page_index: u32, pdf_x: f64, pdf_y: f64, page: &PageBox) -> Self {
        let x_fraction = if page.width > 0.0 {
            (pdf_x - page.x) / page.width
        } else {
            0.0
        };
        let y_fraction = if page.height > 0.0 {
            1.0 - (pdf_y - page.y) / page.height
        } else {
            0.0
        };
        Self::new(page_index, x_fraction, y_fraction)
    }
}

/// A page's media box in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    /// US Letter, used when a page carries no usable MediaBox
    pub const LETTER: PageBox = PageBox {
        x: 0.0,
        y: 0.0,
        width: 612.0,
        height: 792.0,
    };

    /// Build from a `[llx, lly, urx, ury]` MediaBox array
    pub fn from_media_box(media_box: [f64; 4]) -> Self {
        let [x0, y0, x1, y1] = media_box;
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}
