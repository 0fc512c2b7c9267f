//! Pointer-to-annotation mapping
//!
//! Converts a pointer event over the stacked page display into a fractional
//! position. All pages are assumed to share the same rendered height, so the
//! container is split into `page_count` equal bands.

use serde::{Deserialize, Serialize};

use crate::coords::{clamp_fraction, Position};

/// Client-space pointer coordinates (CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub client_x: f64,
    pub client_y: f64,
}

/// Geometry of the document display container for a single interaction.
///
/// Rebuilt for every event; zoom and container size may change between clicks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    /// Page count reported by the render surface; 0 means unknown
    #[serde(default)]
    pub page_count: u32,
}

impl PageGeometry {
    pub fn new(left: f64, top: f64, width: f64, height: f64, page_count: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
            page_count,
        }
    }

    /// Page count with the unknown case collapsed to a single page
    pub fn effective_page_count(&self) -> u32 {
        self.page_count.max(1)
    }

    /// Pixel height allotted to each page
    pub fn page_height_px(&self) -> f64 {
        self.height / self.effective_page_count() as f64
    }
}

/// Divide, treating degenerate denominators as "no extent" rather than NaN
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator.is_finite() && denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Map a pointer event to a fractional position.
///
/// Returns `None` when no document is loaded.
pub fn map_pointer(
    event: PointerEvent,
    geometry: &PageGeometry,
    document_loaded: bool,
) -> Option<Position> {
    if !document_loaded {
        return None;
    }

    let offset_x = event.client_x - geometry.left;
    let offset_y = event.client_y - geometry.top;

    let page_count = geometry.effective_page_count();
    let page_height_px = geometry.page_height_px();

    let raw_page = ratio(offset_y, page_height_px).floor();
    let page_index = if raw_page.is_nan() || raw_page < 0.0 {
        0
    } else {
        (raw_page as u64).min(page_count as u64 - 1) as u32
    };

    let y_fraction = clamp_fraction(ratio(
        offset_y - page_index as f64 * page_height_px,
        page_height_px,
    ));
    let x_fraction = clamp_fraction(ratio(offset_x, geometry.width));

    Some(Position::new(page_index, x_fraction, y_fraction))
}
