//! Interactive editing of a template's annotations
//!
//! Owns the in-memory [`Template`] for one editor instance. Clicks create
//! annotations, edits replace them in place, and exports run against a
//! snapshot so editing can continue while an export is in flight.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::annotation::{Annotation, AnnotationContent, AnnotationId, Rgb, TextStyle};
use crate::coords::Position;
use crate::delivery::{ExportGate, ExportJob};
use crate::error::{EditError, ExportError, StorageError};
use crate::mapper::{map_pointer, PageGeometry, PointerEvent};
use crate::overlay::{hit_test, render_overlay, OverlayMarker};
use crate::storage::MetadataStore;
use crate::template::{Attachment, Template};

/// Values shown in the edit surface, pre-populated from the annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditDraft {
    pub id: AnnotationId,
    pub text: String,
    pub font_size: u32,
    #[serde(default)]
    pub font_family: Option<String>,
    pub font_color: String,
}

impl EditDraft {
    fn from_annotation(annotation: &Annotation) -> Self {
        Self {
            id: annotation.id.clone(),
            text: annotation.label().to_string(),
            font_size: annotation.style.font_size,
            font_family: annotation.style.font_family.clone(),
            font_color: annotation.style.font_color.clone(),
        }
    }
}

pub struct TemplateEditor {
    template: Template,
    gate: ExportGate,
    editing: Option<EditDraft>,
}

impl TemplateEditor {
    pub fn new(template: Template) -> Self {
        Self {
            template,
            gate: ExportGate::new(),
            editing: None,
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn into_template(self) -> Template {
        self.template
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.template.annotations
    }

    /// Replace the attachment. Existing annotations are kept; any that point
    /// past the new page count are skipped at export.
    pub fn set_attachment(&mut self, attachment: Attachment) {
        info!("Attached {} file {}", attachment.kind(), attachment.storage_path());
        self.template.attachment = Some(attachment);
    }

    /// Only PDF attachments accept annotations
    pub fn document_loaded(&self) -> bool {
        matches!(self.template.attachment, Some(Attachment::Pdf { .. }))
    }

    /// Create a text annotation at the pointer and open it for editing
    pub fn click(
        &mut self,
        event: PointerEvent,
        geometry: &PageGeometry,
    ) -> Result<EditDraft, EditError> {
        let position =
            map_pointer(event, geometry, self.document_loaded()).ok_or(EditError::NoDocument)?;
        let annotation = Annotation::at(position);
        debug!(
            "Created annotation {} on page {} at ({:.4}, {:.4})",
            annotation.id, position.page_index, position.x_fraction, position.y_fraction
        );
        let draft = EditDraft::from_annotation(&annotation);
        self.template.annotations.push(annotation);
        self.editing = Some(draft.clone());
        Ok(draft)
    }

    /// Clicking a marker edits it; clicking empty space creates a new annotation
    pub fn click_or_select(
        &mut self,
        event: PointerEvent,
        geometry: &PageGeometry,
    ) -> Result<EditDraft, EditError> {
        if !self.document_loaded() {
            return Err(EditError::NoDocument);
        }
        match hit_test(&self.template.annotations, geometry, event) {
            Some(id) => self.open_edit(&id),
            None => self.click(event, geometry),
        }
    }

    pub fn add_image(
        &mut self,
        position: Position,
        data: impl Into<String>,
        width: f64,
        height: f64,
    ) -> Result<AnnotationId, EditError> {
        if !self.document_loaded() {
            return Err(EditError::NoDocument);
        }
        let annotation = Annotation::image(position, data, width, height);
        let id = annotation.id.clone();
        self.template.annotations.push(annotation);
        Ok(id)
    }

    pub fn open_edit(&mut self, id: &str) -> Result<EditDraft, EditError> {
        let annotation = self
            .template
            .annotation(id)
            .ok_or_else(|| EditError::NotFound(id.to_string()))?;
        let draft = EditDraft::from_annotation(annotation);
        self.editing = Some(draft.clone());
        Ok(draft)
    }

    pub fn current_edit(&self) -> Option<&EditDraft> {
        self.editing.as_ref()
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Replace the annotation's editable fields, keeping its id and position
    pub fn save_edit(&mut self, draft: EditDraft) -> Result<&Annotation, EditError> {
        if Rgb::from_hex(&draft.font_color).is_none() {
            return Err(EditError::InvalidColor(draft.font_color));
        }
        let annotation = self
            .template
            .annotation_mut(&draft.id)
            .ok_or_else(|| EditError::NotFound(draft.id.clone()))?;

        if let AnnotationContent::Text { text } = &mut annotation.content {
            if draft.text.trim().is_empty() {
                return Err(EditError::EmptyText);
            }
            *text = draft.text;
        }
        annotation.style = TextStyle {
            font_size: TextStyle::clamp_font_size(draft.font_size),
            font_family: draft.font_family.filter(|f| !f.trim().is_empty()),
            font_color: draft.font_color,
        };

        if self.editing.as_ref().is_some_and(|e| e.id == draft.id) {
            self.editing = None;
        }
        debug!("Saved edit for annotation {}", draft.id);

        // Re-borrow immutably for the caller
        self.template
            .annotation(&draft.id)
            .ok_or(EditError::NotFound(draft.id))
    }

    pub fn delete(&mut self, id: &str) -> Result<Annotation, EditError> {
        let pos = self
            .template
            .annotations
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| EditError::NotFound(id.to_string()))?;
        if self.editing.as_ref().is_some_and(|e| e.id == id) {
            self.editing = None;
        }
        debug!("Deleted annotation {}", id);
        Ok(self.template.annotations.remove(pos))
    }

    pub fn overlay(
        &self,
        geometry: &PageGeometry,
        visible_pages: Option<&[u32]>,
    ) -> Vec<OverlayMarker> {
        render_overlay(&self.template.annotations, geometry, visible_pages)
    }

    pub fn is_exporting(&self) -> bool {
        self.gate.is_busy()
    }

    /// Admit an export and snapshot what it needs.
    ///
    /// Fails with [`ExportError::ExportInProgress`] while another export holds the gate.
    pub fn begin_export(&self) -> Result<ExportJob, ExportError> {
        let source_url = match &self.template.attachment {
            Some(Attachment::Pdf { url, .. }) => url.clone(),
            Some(other) => return Err(ExportError::UnsupportedAttachment(other.kind())),
            None => return Err(ExportError::NoAttachment),
        };
        let permit = self.gate.try_acquire()?;
        Ok(ExportJob {
            _permit: permit,
            template_id: self.template.id.clone(),
            template_name: self.template.name.clone(),
            source_url,
            annotations: self.template.annotations.clone(),
        })
    }

    /// Snapshot of the template for saving. A new template gets its id here
    /// so the stored JSON carries it.
    pub fn prepare_save(&mut self) -> Template {
        self.template
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string());
        self.template.clone()
    }

    /// Record the id the metadata store assigned
    pub fn saved_as(&mut self, id: String) {
        self.template.id = Some(id);
    }

    /// Persist the template (annotations included) through the metadata store.
    pub async fn save<M>(&mut self, metadata: &M) -> Result<String, StorageError>
    where
        M: MetadataStore + ?Sized,
    {
        let snapshot = self.prepare_save();
        let id = persist_template(&snapshot, metadata).await?;
        self.saved_as(id.clone());
        Ok(id)
    }
}

/// Write a template snapshot taken with [`TemplateEditor::prepare_save`]
pub async fn persist_template<M>(template: &Template, metadata: &M) -> Result<String, StorageError>
where
    M: MetadataStore + ?Sized,
{
    let data =
        serde_json::to_value(template).map_err(|e| StorageError::Backend(e.to_string()))?;
    let id = metadata
        .save_template(template.id.as_deref(), &template.name, &data)
        .await?;
    info!("Saved template '{}' as {}", template.name, id);
    Ok(id)
}
