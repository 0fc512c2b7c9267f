//! HTTP handlers for Template API

use std::sync::Arc;

use annotate_core::{
    persist_template, Attachment, EditDraft, ExportRequest, OverlayMarker, SaveOutcome, Template,
    TemplateEditor,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

fn template_response(
    session_id: String,
    editor: &TemplateEditor,
    page_count: Option<u32>,
) -> TemplateResponse {
    TemplateResponse {
        session_id,
        page_count,
        template: editor.template().clone(),
    }
}

/// Upload a document and build the attachment pointing at it.
///
/// PDFs are parsed once here so a broken upload is rejected before anyone
/// starts annotating it.
async fn upload_document(
    state: &AppState,
    session_id: &str,
    upload: DocumentUpload,
) -> Result<(Attachment, Option<u32>), ApiError> {
    let bytes = BASE64
        .decode(upload.data_base64.trim())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid document base64: {}", e)))?;

    let filename = upload
        .filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|f| !f.is_empty())
        .unwrap_or("document")
        .to_string();
    if filename.chars().all(|c| c == '.') {
        return Err(ApiError::InvalidRequest(format!(
            "Invalid document filename: {}",
            upload.filename
        )));
    }
    let kind_hint = format!("{} {}", upload.content_type, filename);

    let page_count = if kind_hint.to_lowercase().contains("pdf") {
        Some(annotate_core::page_count(&bytes)?)
    } else {
        None
    };

    let path = format!("uploads/{}/{}", session_id, filename);
    let storage_path = state
        .storage
        .upload(&path, bytes, &upload.content_type)
        .await?;
    let url = state.storage.public_url(&storage_path).await?;

    let attachment = Attachment::from_content_type(&kind_hint, url, storage_path).ok_or_else(
        || ApiError::InvalidRequest(format!("Unsupported document type: {}", upload.content_type)),
    )?;
    Ok((attachment, page_count))
}

/// Open a new editor session
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<TemplateResponse>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("Template name is required".into()));
    }
    let session_id = Uuid::new_v4().to_string();
    let mut editor = TemplateEditor::new(Template::new(req.name));

    let mut page_count = None;
    if let Some(upload) = req.document {
        let (attachment, pages) = upload_document(&state, &session_id, upload).await?;
        editor.set_attachment(attachment);
        page_count = pages;
    }

    let response = template_response(session_id.clone(), &editor, page_count);
    state.editors.write().await.insert(session_id.clone(), editor);
    tracing::info!("Opened editor session: {}", session_id);

    Ok((StatusCode::CREATED, Json(response)))
}

/// Reopen a previously saved template (the JSON written by save).
///
/// The attachment URL is rebuilt from its storage path; client-supplied
/// URLs are never fetched.
pub async fn open_template(
    State(state): State<Arc<AppState>>,
    Json(mut template): Json<Template>,
) -> Result<(StatusCode, Json<TemplateResponse>), ApiError> {
    if let Some(attachment) = template.attachment.as_mut() {
        let url = state
            .storage
            .public_url(attachment.storage_path())
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid attachment: {}", e)))?;
        attachment.set_url(url);
    }
    let session_id = Uuid::new_v4().to_string();
    let editor = TemplateEditor::new(template);
    let response = template_response(session_id.clone(), &editor, None);
    state.editors.write().await.insert(session_id.clone(), editor);
    tracing::info!(
        "Reopened template {:?} as session {}",
        response.template.id,
        session_id
    );
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let editors = state.editors.read().await;
    let editor = editors
        .get(&id)
        .ok_or_else(|| ApiError::SessionNotFound(id.clone()))?;
    Ok(Json(template_response(id.clone(), editor, None)))
}

/// Replace the session's attachment
pub async fn attach_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(upload): Json<DocumentUpload>,
) -> Result<Json<TemplateResponse>, ApiError> {
    if !state.editors.read().await.contains_key(&id) {
        return Err(ApiError::SessionNotFound(id));
    }
    let (attachment, page_count) = upload_document(&state, &id, upload).await?;
    let response = state
        .with_editor(&id, |editor| {
            editor.set_attachment(attachment);
            Ok(template_response(id.clone(), editor, page_count))
        })
        .await?;
    Ok(Json(response))
}

/// Click on the document: edits the marker under the pointer or creates a new annotation
pub async fn click(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ClickRequest>,
) -> Result<Json<EditDraft>, ApiError> {
    let draft = state
        .with_editor(&id, |editor| {
            Ok(editor.click_or_select(req.event, &req.geometry)?)
        })
        .await?;
    Ok(Json(draft))
}

pub async fn add_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddImageRequest>,
) -> Result<(StatusCode, Json<AnnotationIdResponse>), ApiError> {
    if !(req.width > 0.0 && req.height > 0.0) {
        return Err(ApiError::InvalidRequest(
            "Image width and height must be positive".into(),
        ));
    }
    let annotation_id = state
        .with_editor(&id, |editor| {
            Ok(editor.add_image(req.position, req.data, req.width, req.height)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(AnnotationIdResponse { id: annotation_id })))
}

pub async fn open_edit(
    State(state): State<Arc<AppState>>,
    Path((id, annotation_id)): Path<(String, String)>,
) -> Result<Json<EditDraft>, ApiError> {
    let draft = state
        .with_editor(&id, |editor| Ok(editor.open_edit(&annotation_id)?))
        .await?;
    Ok(Json(draft))
}

pub async fn update_annotation(
    State(state): State<Arc<AppState>>,
    Path((id, annotation_id)): Path<(String, String)>,
    Json(req): Json<UpdateAnnotationRequest>,
) -> Result<Json<AnnotationResponse>, ApiError> {
    let draft = EditDraft {
        id: annotation_id,
        text: req.text,
        font_size: req.font_size,
        font_family: req.font_family,
        font_color: req.font_color,
    };
    let annotation = state
        .with_editor(&id, |editor| Ok(editor.save_edit(draft)?.clone()))
        .await?;
    Ok(Json(AnnotationResponse { annotation }))
}

pub async fn delete_annotation(
    State(state): State<Arc<AppState>>,
    Path((id, annotation_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .with_editor(&id, |editor| Ok(editor.delete(&annotation_id)?))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Marker positions for the current container geometry
pub async fn overlay(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<OverlayRequest>,
) -> Result<Json<Vec<OverlayMarker>>, ApiError> {
    let editors = state.editors.read().await;
    let editor = editors
        .get(&id)
        .ok_or_else(|| ApiError::SessionNotFound(id.clone()))?;
    Ok(Json(
        editor.overlay(&req.geometry, req.visible_pages.as_deref()),
    ))
}

/// Persist the template and its annotations
pub async fn save_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SaveTemplateResponse>, ApiError> {
    let snapshot = state
        .with_editor(&id, |editor| Ok(editor.prepare_save()))
        .await?;
    let template_id = persist_template(&snapshot, state.metadata.as_ref()).await?;

    // The session may have closed while the store was writing
    let saved = template_id.clone();
    if let Err(e) = state
        .with_editor(&id, |editor| {
            editor.saved_as(saved);
            Ok(())
        })
        .await
    {
        tracing::warn!("Saved template {} but {}", template_id, e);
    }
    Ok(Json(SaveTemplateResponse { id: template_id }))
}

fn header_value(value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(value).ok()
}

/// Export the annotated PDF as a download.
///
/// Render warnings and save results travel in `X-` headers so the body stays
/// the raw PDF.
pub async fn export(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<ExportRequest>>,
) -> Result<Response, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    // Snapshot under the lock, then release it so editing can continue
    let job = {
        let editors = state.editors.read().await;
        let editor = editors
            .get(&id)
            .ok_or_else(|| ApiError::SessionNotFound(id.clone()))?;
        editor.begin_export()?
    };

    let mut outcome = job
        .run(
            &state.compositor,
            state.storage.as_ref(),
            state.metadata.as_ref(),
            &request,
        )
        .await?;

    let mut response = Response::new(Body::from(std::mem::take(&mut outcome.bytes)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    if let Some(value) =
        header_value(&format!("attachment; filename=\"{}\"", outcome.file_name))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        HeaderName::from_static("x-annotations-skipped"),
        HeaderValue::from(outcome.skipped()),
    );
    for message in outcome.messages() {
        if let Some(value) = header_value(&message) {
            headers.append(HeaderName::from_static("x-export-warning"), value);
        }
    }
    match &outcome.save {
        SaveOutcome::NotRequested => {}
        SaveOutcome::Saved(saved) => {
            if let Some(value) = header_value(&saved.url) {
                headers.insert(HeaderName::from_static("x-saved-file-url"), value);
            }
        }
        SaveOutcome::Failed(e) => {
            let value = header_value(&e.to_string())
                .unwrap_or_else(|| HeaderValue::from_static("save failed"));
            headers.insert(HeaderName::from_static("x-save-error"), value);
        }
    }

    Ok(response.into_response())
}
