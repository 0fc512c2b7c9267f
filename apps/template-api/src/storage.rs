//! Filesystem storage and SQLite metadata

use std::path::{Component, Path, PathBuf};

use annotate_core::{FileRecord, MetadataStore, Storage, StorageError};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

/// Files live under `root`; public URLs are `public_base_url/<storage path>`.
/// Remote `http(s)` URLs outside the base are fetched with reqwest, but only
/// from hosts in `allowed_hosts`.
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
    allowed_hosts: Vec<String>,
    http: reqwest::Client,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            allowed_hosts: Vec::new(),
            http: reqwest::Client::new(),
        })
    }

    pub fn with_allowed_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.allowed_hosts = hosts
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        self
    }

    fn remote_allowed(&self, url: &str) -> bool {
        reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .map_or(false, |host| self.allowed_hosts.contains(&host))
    }

    fn resolve(&self, storage_path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(storage_path.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || relative.as_os_str().is_empty() {
            return Err(StorageError::Backend(format!(
                "invalid storage path: {}",
                storage_path
            )));
        }
        Ok(self.root.join(relative))
    }

    async fn read_local(&self, storage_path: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(storage_path)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(storage_path.to_string()),
            _ => StorageError::Backend(e.to_string()),
        })
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(url.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        tracing::debug!("Stored {} bytes at {}", bytes.len(), target.display());
        Ok(path.trim_start_matches('/').to_string())
    }

    async fn public_url(&self, storage_path: &str) -> Result<String, StorageError> {
        self.resolve(storage_path)?;
        Ok(format!(
            "{}/{}",
            self.public_base_url,
            storage_path.trim_start_matches('/')
        ))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        if let Some(rest) = url.strip_prefix(&self.public_base_url) {
            return self.read_local(rest).await;
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            if !self.remote_allowed(url) {
                tracing::warn!("Refusing to fetch from untrusted host: {}", url);
                return Err(StorageError::Backend(format!(
                    "host not allowed for fetch: {}",
                    url
                )));
            }
            return self.fetch_remote(url).await;
        }
        self.read_local(url).await
    }
}

/// Metadata tables in SQLite
pub struct SqliteMetadata {
    pool: SqlitePool,
}

impl SqliteMetadata {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        tracing::info!("Connecting to database: {}", database_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                content_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner_id)
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    #[cfg(test)]
    pub async fn template_data(&self, id: &str) -> Option<(String, String)> {
        sqlx::query_as("SELECT name, data FROM templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
    }

    #[cfg(test)]
    pub async fn file_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0)
    }
}

fn db_error(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

#[async_trait]
impl MetadataStore for SqliteMetadata {
    async fn record_file(&self, record: FileRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO files (id, owner_id, filename, storage_path, content_type, size, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.owner_id)
        .bind(&record.filename)
        .bind(&record.storage_path)
        .bind(&record.content_type)
        .bind(record.size as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
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
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO templates (id, name, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(data.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(id)
    }
}
