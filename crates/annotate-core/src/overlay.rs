//! Overlay rendering for annotations on top of the displayed document
//!
//! Converts stored fractional positions back into container pixels. This is
//! the exact inverse of [`crate::mapper::map_pointer`] for a given geometry.

use serde::Serialize;

use crate::annotation::{Annotation, AnnotationContent, AnnotationId, TextStyle};
use crate::mapper::{PageGeometry, PointerEvent};

/// A positioned marker ready to be drawn over the document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayMarker {
    pub id: AnnotationId,
    pub page_index: u32,
    /// Container-relative pixels
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: u32,
    pub color: String,
    pub label: String,
}

impl OverlayMarker {
    fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }
}

/// Container-relative pixel position for an annotation
pub fn marker_position(annotation: &Annotation, geometry: &PageGeometry) -> (f64, f64) {
    let position = annotation.position();
    let page_height_px = geometry.page_height_px();
    let left = position.x_fraction * geometry.width;
    let top = position.page_index as f64 * page_height_px + position.y_fraction * page_height_px;
    (left, top)
}

/// Approximate on-screen extent of the marker's label
fn marker_extent(annotation: &Annotation) -> (f64, f64) {
    match &annotation.content {
        AnnotationContent::Image { width, height, .. } => (*width, *height),
        AnnotationContent::Text { text } => {
            let size = TextStyle::clamp_font_size(annotation.style.font_size) as f64;
            let width = annotation
                .style
                .standard_font()
                .text_width(text, size)
                // Unencodable text still needs a clickable box on screen
                .unwrap_or_else(|_| text.chars().count() as f64 * size * 0.5);
            (width, size)
        }
    }
}

/// Build overlay markers in insertion (z) order.
///
/// `visible_pages` restricts output to the listed pages; `None` shows all.
pub fn render_overlay(
    annotations: &[Annotation],
    geometry: &PageGeometry,
    visible_pages: Option<&[u32]>,
) -> Vec<OverlayMarker> {
    annotations
        .iter()
        .filter(|a| visible_pages.map_or(true, |pages| pages.contains(&a.page_index)))
        .map(|a| {
            let (left, top) = marker_position(a, geometry);
            let (width, height) = marker_extent(a);
            OverlayMarker {
                id: a.id.clone(),
                page_index: a.page_index,
                left,
                top,
                width,
                height,
                font_size: a.style.font_size,
                color: a.style.font_color.clone(),
                label: a.label().to_string(),
            }
        })
        .collect()
}

/// Find the top-most annotation under the pointer
pub fn hit_test(
    annotations: &[Annotation],
    geometry: &PageGeometry,
    event: PointerEvent,
) -> Option<AnnotationId> {
    let x = event.client_x - geometry.left;
    let y = event.client_y - geometry.top;
    render_overlay(annotations, geometry, None)
        .into_iter()
        .rev()
        .find(|marker| marker.contains(x, y))
        .map(|marker| marker.id)
}
