//! Export pipeline and result delivery
//!
//! An export is admitted through the editor's [`ExportGate`], works on a
//! snapshot of the annotation list, and produces bytes for the local download.
//! Saving a copy to storage is optional and its failure never invalidates the
//! download.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::annotation::Annotation;
use crate::backend::DocumentBackend;
use crate::compositor::{AnnotationFailure, Compositor};
use crate::error::{ExportError, PersistError};
use crate::storage::{FileRecord, MetadataStore, Storage, PDF_CONTENT_TYPE};

/// Admission flag guarding a single in-flight export per editor
#[derive(Debug, Clone, Default)]
pub struct ExportGate {
    busy: Arc<AtomicBool>,
}

impl ExportGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Take the gate, or fail if an export is already running
    pub fn try_acquire(&self) -> Result<ExportPermit, ExportError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ExportError::ExportInProgress)?;
        Ok(ExportPermit {
            busy: Arc::clone(&self.busy),
        })
    }
}

/// Held for the lifetime of an export; releases the gate on drop
#[derive(Debug)]
pub struct ExportPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for ExportPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    /// Also store the result as a new file
    pub save_copy: bool,
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedFile {
    pub storage_path: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    NotRequested,
    Saved(SavedFile),
    Failed(PersistError),
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub page_count: u32,
    pub drawn: usize,
    pub failures: Vec<AnnotationFailure>,
    pub save: SaveOutcome,
}

impl ExportOutcome {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }

    /// User-facing notes; render warnings and save failures are reported separately
    pub fn messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        if !self.failures.is_empty() {
            messages.push(format!(
                "{} of {} annotations failed to render",
                self.failures.len(),
                self.drawn + self.failures.len()
            ));
        }
        if let SaveOutcome::Failed(e) = &self.save {
            messages.push(format!("File exported but not saved to storage: {}", e));
        }
        messages
    }
}

/// A snapshot of everything an export needs, detached from the editor
#[derive(Debug)]
pub struct ExportJob {
    pub(crate) _permit: ExportPermit,
    pub(crate) template_id: Option<String>,
    pub(crate) template_name: String,
    pub(crate) source_url: String,
    pub(crate) annotations: Vec<Annotation>,
}

impl ExportJob {
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Fetch, compose and deliver. The gate is released when this returns.
    pub async fn run<B, S, M>(
        mut self,
        compositor: &Arc<Compositor<B>>,
        storage: &S,
        metadata: &M,
        request: &ExportRequest,
    ) -> Result<ExportOutcome, ExportError>
    where
        B: DocumentBackend + Send + Sync + 'static,
        S: Storage + ?Sized,
        M: MetadataStore + ?Sized,
    {
        info!(
            "Exporting '{}' with {} annotations",
            self.template_name,
            self.annotations.len()
        );

        let source = storage
            .fetch(&self.source_url)
            .await
            .map_err(|e| ExportError::SourceFetch(e.to_string()))?;

        // Parsing, deflate and serialization are CPU-bound
        let compositor = Arc::clone(compositor);
        let annotations = std::mem::take(&mut self.annotations);
        let composition =
            tokio::task::spawn_blocking(move || compositor.compose(&source, &annotations))
                .await
                .map_err(|e| ExportError::Compose(format!("compose task failed: {}", e)))??;
        if let Some(summary) = composition.summary() {
            warn!("{}", summary);
        }

        let file_name = export_file_name(&self.template_name);
        let save = if request.save_copy {
            match self
                .save_copy(storage, metadata, request, &file_name, &composition.bytes)
                .await
            {
                Ok(saved) => {
                    info!("Saved exported copy to {}", saved.storage_path);
                    SaveOutcome::Saved(saved)
                }
                Err(e) => {
                    error!("Exported file could not be saved: {}", e);
                    SaveOutcome::Failed(e)
                }
            }
        } else {
            SaveOutcome::NotRequested
        };

        Ok(ExportOutcome {
            bytes: composition.bytes,
            file_name,
            page_count: composition.page_count,
            drawn: composition.drawn,
            failures: composition.failures,
            save,
        })
    }

    async fn save_copy<S, M>(
        &self,
        storage: &S,
        metadata: &M,
        request: &ExportRequest,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<SavedFile, PersistError>
    where
        S: Storage + ?Sized,
        M: MetadataStore + ?Sized,
    {
        // Always a fresh path: the original attachment is never overwritten
        let path = format!(
            "exports/{}/{}.pdf",
            self.template_id.as_deref().unwrap_or("unsaved"),
            Uuid::new_v4()
        );
        let storage_path = storage
            .upload(&path, bytes.to_vec(), PDF_CONTENT_TYPE)
            .await
            .map_err(|e| PersistError::Upload(e.to_string()))?;
        let url = storage
            .public_url(&storage_path)
            .await
            .map_err(|e| PersistError::PublicUrl(e.to_string()))?;

        metadata
            .record_file(FileRecord {
                owner_id: request.owner_id.clone().unwrap_or_default(),
                filename: file_name.to_string(),
                storage_path: storage_path.clone(),
                content_type: PDF_CONTENT_TYPE.to_string(),
                size: bytes.len() as u64,
            })
            .await
            .map_err(|e| PersistError::Metadata(e.to_string()))?;

        Ok(SavedFile { storage_path, url })
    }
}

/// Download name derived from the template name, restricted to ASCII so it
/// fits in a `Content-Disposition` header
pub fn export_file_name(template_name: &str) -> String {
    let stem: String = template_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let stem = stem.trim_matches('-');
    if stem.is_empty() {
        "template-annotated.pdf".to_string()
    } else {
        format!("{}-annotated.pdf", stem)
    }
}
