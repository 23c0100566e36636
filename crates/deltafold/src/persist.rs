//! Document persistence collaborator.
//!
//! The processor calls the store when an artifact finishes. Store failures are
//! reported as diagnostics and never touch in-memory artifact state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use deltafold_protocol::ArtifactState;

use crate::error::{PersistError, PersistResult};

/// What gets persisted for a finished artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub document_id: String,
    pub title: String,
    pub kind: String,
    pub content: String,
}

impl DocumentRecord {
    /// `None` when the artifact never received an `id`.
    pub fn from_artifact(state: &ArtifactState) -> Option<Self> {
        Some(Self {
            document_id: state.document_id.clone()?,
            title: state.title.clone(),
            kind: state.kind.clone(),
            content: state.content.clone(),
        })
    }
}

/// Receives finished documents.
pub trait DocumentStore: Send + Sync {
    fn save(&self, document: &DocumentRecord) -> PersistResult<()>;
}

// ============================================================================
// File store
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredDocument<'a> {
    #[serde(flatten)]
    document: &'a DocumentRecord,
    saved_at: DateTime<Utc>,
}

/// Writes each document to `<dir>/<document_id>.json`, overwriting older saves.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    dir: PathBuf,
}

impl FileDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a document ID is stored under.
    pub fn path_for(&self, document_id: &str) -> PersistResult<PathBuf> {
        let valid = !document_id.is_empty()
            && !document_id.starts_with('.')
            && document_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(PersistError::InvalidId(document_id.to_string()));
        }
        Ok(self.dir.join(format!("{document_id}.json")))
    }
}

impl DocumentStore for FileDocumentStore {
    fn save(&self, document: &DocumentRecord) -> PersistResult<()> {
        let path = self.path_for(&document.document_id)?;
        fs::create_dir_all(&self.dir)?;
        let body = serde_json::to_vec_pretty(&StoredDocument {
            document,
            saved_at: Utc::now(),
        })?;
        fs::write(&path, body)?;
        Ok(())
    }
}

// ============================================================================
// Memory store
// ============================================================================

/// Keeps every save in order. Useful for tests and inspection.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    saved: Mutex<Vec<DocumentRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<DocumentRecord> {
        match self.saved.lock() {
            Ok(saved) => saved.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn save(&self, document: &DocumentRecord) -> PersistResult<()> {
        self.saved
            .lock()
            .map_err(|_| PersistError::Backend("memory store lock poisoned".to_string()))?
            .push(document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> DocumentRecord {
        DocumentRecord {
            document_id: id.to_string(),
            title: "Notes".to_string(),
            kind: "text".to_string(),
            content: "hello".to_string(),
        }
    }

    #[test]
    fn test_record_requires_document_id() {
        let mut state = ArtifactState::default();
        assert!(DocumentRecord::from_artifact(&state).is_none());

        state.document_id = Some("doc_1".into());
        state.content = "body".into();
        let record = DocumentRecord::from_artifact(&state).unwrap();
        assert_eq!(record.document_id, "doc_1");
        assert_eq!(record.content, "body");
    }

    #[test]
    fn test_file_store_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path().join("docs"));
        store.save(&record("doc_1")).unwrap();

        let raw = fs::read_to_string(dir.path().join("docs/doc_1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["documentId"], "doc_1");
        assert_eq!(value["content"], "hello");
        assert!(value["savedAt"].is_string());
    }

    #[test]
    fn test_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path());
        for id in ["", "../escape", "a/b", ".hidden"] {
            assert!(
                matches!(store.save(&record(id)), Err(PersistError::InvalidId(_))),
                "accepted {id:?}"
            );
        }
    }

    #[test]
    fn test_memory_store_keeps_order() {
        let store = MemoryDocumentStore::new();
        store.save(&record("a")).unwrap();
        store.save(&record("b")).unwrap();
        let ids: Vec<String> = store.saved().into_iter().map(|r| r.document_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
