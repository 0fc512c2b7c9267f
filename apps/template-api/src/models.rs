//! Request and response bodies

use annotate_core::{Annotation, PageGeometry, PointerEvent, Position, Template};
use serde::{Deserialize, Serialize};

/// Create a template, optionally with its source document
#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub document: Option<DocumentUpload>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentUpload {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// File bytes, base64-encoded
    pub data_base64: String,
}

fn default_content_type() -> String {
    "application/pdf".to_string()
}

#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub session_id: String,
    /// Pages in the attached PDF, when there is one
    pub page_count: Option<u32>,
    pub template: Template,
}

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    #[serde(flatten)]
    pub event: PointerEvent,
    pub geometry: PageGeometry,
}

#[derive(Debug, Deserialize)]
pub struct AddImageRequest {
    pub position: Position,
    /// PNG as base64 or a data URL
    pub data: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Serialize)]
pub struct AnnotationIdResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAnnotationRequest {
    pub text: String,
    pub font_size: u32,
    #[serde(default)]
    pub font_family: Option<String>,
    pub font_color: String,
}

#[derive(Debug, Serialize)]
pub struct AnnotationResponse {
    pub annotation: Annotation,
}

#[derive(Debug, Deserialize)]
pub struct OverlayRequest {
    pub geometry: PageGeometry,
    #[serde(default)]
    pub visible_pages: Option<Vec<u32>>,
}

#[derive(Debug, Serialize)]
pub struct SaveTemplateResponse {
    pub id: String,
}
