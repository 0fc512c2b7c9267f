use thiserror::Error;

/// Fatal export failures. Any of these aborts the export and no bytes are produced.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to fetch source document: {0}")]
    SourceFetch(String),

    #[error("Failed to parse PDF: {0}")]
    DocumentParse(String),

    #[error("Template has no attachment to export")]
    NoAttachment,

    #[error("Attachment of kind '{0}' cannot carry annotations")]
    UnsupportedAttachment(&'static str),

    #[error("An export is already in progress")]
    ExportInProgress,

    #[error("Failed to build output document: {0}")]
    Compose(String),

    #[error("Failed to serialize PDF: {0}")]
    Serialize(String),
}

/// Per-annotation failures. The compositor records these and keeps going.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotationError {
    #[error("Page index {page_index} is out of range (document has {page_count} pages)")]
    PageIndexOutOfRange { page_index: u32, page_count: u32 },

    #[error("Failed to draw annotation: {0}")]
    AnnotationDraw(String),
}

/// Failures while handing exported bytes to the storage collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Could not resolve public URL: {0}")]
    PublicUrl(String),

    #[error("Failed to record file metadata: {0}")]
    Metadata(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("Annotation not found: {0}")]
    NotFound(String),

    #[error("Annotation text must not be empty")]
    EmptyText,

    #[error("No document is loaded")]
    NoDocument,

    #[error("Invalid color: {0}")]
    InvalidColor(String),
}

/// Failures reported by the storage and metadata collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}
