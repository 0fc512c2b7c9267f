//! Storage and metadata collaborator interfaces
//!
//! The core only consumes these operations; bucket and table management
//! belong to the implementations.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `bytes` at `path`, returning the storage path actually used
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn public_url(&self, storage_path: &str) -> Result<String, StorageError>;

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub owner_id: String,
    pub filename: String,
    pub storage_path: String,
    pub content_type: String,
    pub size: u64,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn record_file(&self, record: FileRecord) -> Result<(), StorageError>;

    /// Insert or update a template; returns its id
    async fn save_template(
        &self,
        id: Option<&str>,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<String, StorageError>;
}

/// In-process object store keyed by storage path
pub struct MemoryStorage {
    base_url: String,
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn content_type(&self, storage_path: &str) -> Option<String> {
        let objects = self.objects.lock().ok()?;
        objects.get(storage_path).map(|(_, ct)| ct.clone())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, String)>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Backend("storage lock poisoned".into()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("memory://files")
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let path = path.trim_start_matches('/').to_string();
        self.lock()?
            .insert(path.clone(), (bytes, content_type.to_string()));
        Ok(path)
    }

    async fn public_url(&self, storage_path: &str) -> Result<String, StorageError> {
        Ok(format!("{}/{}", self.base_url, storage_path))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let path = url
            .strip_prefix(&self.base_url)
            .map(|p| p.trim_start_matches('/'))
            .unwrap_or(url);
        self.lock()?
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(url.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTemplate {
    pub name: String,
    pub data: serde_json::Value,
}

#[derive(Default)]
pub struct MemoryMetadata {
    files: Mutex<Vec<FileRecord>>,
    templates: Mutex<HashMap<String, StoredTemplate>>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<FileRecord> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn template(&self, id: &str) -> Option<StoredTemplate> {
        self.templates.lock().ok()?.get(id).cloned()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadata {
    async fn record_file(&self, record: FileRecord) -> Result<(), StorageError> {
        self.files
            .lock()
            .map_err(|_| StorageError::Backend("metadata lock poisoned".into()))?
            .push(record);
        Ok(())
    }

    async fn save_template(
        &self,
        id: Option<&str>,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<String, StorageError> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.templates
            .lock()
            .map_err(|_| StorageError::Backend("metadata lock poisoned".into()))?
            .insert(
                id.clone(),
                StoredTemplate {
                    name: name.to_string(),
                    data: data.clone(),
                },
            );
        Ok(id)
    }
}
