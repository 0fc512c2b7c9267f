//! Application state for Template API

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use annotate_core::{
    Compositor, ExportOptions, LopdfBackend, MetadataStore, Storage, TemplateEditor,
};
use anyhow::Result;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::storage::{LocalStorage, SqliteMetadata};

pub struct AppState {
    /// Open editor sessions keyed by session id
    pub editors: RwLock<HashMap<String, TemplateEditor>>,
    pub storage: Arc<dyn Storage>,
    pub metadata: Arc<dyn MetadataStore>,
    pub compositor: Arc<Compositor<LopdfBackend>>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        metadata: Arc<dyn MetadataStore>,
        options: ExportOptions,
    ) -> Self {
        Self {
            editors: RwLock::new(HashMap::new()),
            storage,
            metadata,
            compositor: Arc::new(Compositor::with_options(LopdfBackend::new(), options)),
        }
    }

    pub async fn from_config(
        storage_dir: &Path,
        public_base_url: &str,
        allowed_fetch_hosts: &[String],
        database_url: &str,
        options: ExportOptions,
    ) -> Result<Self> {
        let storage = LocalStorage::new(storage_dir, public_base_url)?
            .with_allowed_hosts(allowed_fetch_hosts.iter().cloned());
        let metadata = SqliteMetadata::connect(database_url, 5).await?;
        tracing::info!(
            "Serving stored files from {} at {}",
            storage_dir.display(),
            public_base_url
        );
        Ok(Self::new(Arc::new(storage), Arc::new(metadata), options))
    }

    /// Run `f` against the session's editor
    pub async fn with_editor<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut TemplateEditor) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut editors = self.editors.write().await;
        let editor = editors
            .get_mut(session_id)
            .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
        f(editor)
    }
}
