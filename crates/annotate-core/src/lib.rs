//! PDF template annotation
//!
//! This crate places text and image annotations on PDF templates and bakes them
//! into exported documents using lopdf.
//!
//! - [`coords`] / [`mapper`]: fractional positions and pointer mapping
//! - [`overlay`] / [`editor`]: the interactive marker layer and edit flow
//! - [`compositor`] / [`lopdf_backend`]: drawing annotations into a copy of the source
//! - [`delivery`]: the export gate, download and optional save-to-storage

pub mod annotation;
pub mod backend;
pub mod compositor;
pub mod coords;
pub mod delivery;
pub mod editor;
pub mod error;
pub mod lopdf_backend;
pub mod mapper;
pub mod metrics;
pub mod overlay;
pub mod storage;
pub mod template;

pub use annotation::{Annotation, AnnotationContent, AnnotationId, Rgb, TextStyle};
pub use backend::DocumentBackend;
pub use compositor::{AnnotationFailure, Composition, Compositor, ExportOptions};
pub use coords::{PageBox, PdfRect, Position};
pub use delivery::{ExportGate, ExportJob, ExportOutcome, ExportRequest, SaveOutcome, SavedFile};
pub use editor::{persist_template, EditDraft, TemplateEditor};
pub use error::{AnnotationError, EditError, ExportError, PersistError, StorageError};
pub use lopdf_backend::LopdfBackend;
pub use mapper::{map_pointer, PageGeometry, PointerEvent};
pub use overlay::{hit_test, render_overlay, OverlayMarker};
pub use storage::{FileRecord, MemoryMetadata, MemoryStorage, MetadataStore, Storage};
pub use template::{Attachment, Template};

/// Parse PDF bytes and return page count
pub fn page_count(bytes: &[u8]) -> Result<u32, ExportError> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| ExportError::DocumentParse(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}
