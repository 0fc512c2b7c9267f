//! Persisted template aggregate

use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;

/// Reference to the file attached to a template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Attachment {
    Pdf { url: String, storage_path: String },
    Word { url: String, storage_path: String },
    Excel { url: String, storage_path: String },
}

impl Attachment {
    pub fn kind(&self) -> &'static str {
        match self {
            Attachment::Pdf { .. } => "pdf",
            Attachment::Word { .. } => "word",
            Attachment::Excel { .. } => "excel",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Attachment::Pdf { url, .. }
            | Attachment::Word { url, .. }
            | Attachment::Excel { url, .. } => url,
        }
    }

    pub fn storage_path(&self) -> &str {
        match self {
            Attachment::Pdf { storage_path, .. }
            | Attachment::Word { storage_path, .. }
            | Attachment::Excel { storage_path, .. } => storage_path,
        }
    }

    pub fn set_url(&mut self, new_url: impl Into<String>) {
        match self {
            Attachment::Pdf { url, .. }
            | Attachment::Word { url, .. }
            | Attachment::Excel { url, .. } => *url = new_url.into(),
        }
    }

    /// Pick the attachment kind from a MIME type or file extension
    pub fn from_content_type(
        content_type: &str,
        url: impl Into<String>,
        storage_path: impl Into<String>,
    ) -> Option<Self> {
        let (url, storage_path) = (url.into(), storage_path.into());
        let lower = content_type.to_lowercase();
        if lower.contains("pdf") {
            Some(Attachment::Pdf { url, storage_path })
        } else if lower.contains("word") || lower.ends_with("docx") || lower.ends_with("doc") {
            Some(Attachment::Word { url, storage_path })
        } else if lower.contains("excel")
            || lower.contains("spreadsheet")
            || lower.ends_with("xlsx")
            || lower.ends_with("xls")
        {
            Some(Attachment::Excel { url, storage_path })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Template {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// Insertion order doubles as z-order: later entries draw on top
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Table and header layout owned by other editor panels
    #[serde(default)]
    pub layout: serde_json::Value,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn annotation(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn annotation_mut(&mut self, id: &str) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    pub fn annotations_for_page(&self, page_index: u32) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.page_index == page_index)
            .collect()
    }

    pub fn remove_annotation(&mut self, id: &str) -> bool {
        if let Some(pos) = self.annotations.iter().position(|a| a.id == id) {
            self.annotations.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
