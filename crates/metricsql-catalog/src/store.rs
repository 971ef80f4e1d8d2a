//! Artifact store for declared metrics views and sources
//!
//! Artifacts are keyed by kind and case-insensitive name. Two insert
//! semantics are supported:
//! - bulk load from a persisted snapshot, where a later duplicate silently
//!   overwrites an earlier one (with a warning)
//! - incremental `save`, where a duplicate is rejected
//!
//! ## Usage
//!
//! ```rust,ignore
//! use metricsql_catalog::{Artifact, ArtifactKind, ArtifactStore, InMemoryArtifactStore};
//!
//! let store = InMemoryArtifactStore::new();
//! store.save(Artifact::new(ArtifactKind::MetricsView, "sales", ddl))?;
//!
//! let found = store.get(ArtifactKind::MetricsView, "SALES");
//! ```

use metricsql_core::{Diagnostic, DiagnosticCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Kind of stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    MetricsView,
    Source,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MetricsView => write!(f, "METRICS_VIEW"),
            Self::Source => write!(f, "SOURCE"),
        }
    }
}

/// A persisted definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,

    /// Name as declared
    pub name: String,

    /// Canonical DDL of the definition
    pub payload: String,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            payload: payload.into(),
        }
    }

    fn key(&self) -> (ArtifactKind, String) {
        (self.kind, self.name.to_lowercase())
    }
}

/// Serialized form of a whole store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// Storage for artifacts
///
/// Implementations must serialize mutations; reads may run concurrently.
pub trait ArtifactStore: Send + Sync {
    /// Insert a new artifact, failing if one with the same kind and name exists
    fn save(&self, artifact: Artifact) -> Result<(), StoreError>;

    /// Look up an artifact by kind and case-insensitive name
    fn get(&self, kind: ArtifactKind, name: &str) -> Option<Artifact>;

    /// Declared names of every artifact of a kind
    fn names_of_kind(&self, kind: ArtifactKind) -> BTreeSet<String>;
}

/// In-memory artifact store
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Arc<RwLock<HashMap<(ArtifactKind, String), Artifact>>>,
}

impl InMemoryArtifactStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load artifacts; a later duplicate overwrites an earlier one
    pub fn from_artifacts(artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        let mut map = HashMap::new();

        for artifact in artifacts {
            if let Some(previous) = map.insert(artifact.key(), artifact) {
                tracing::warn!(
                    kind = %previous.kind,
                    name = %previous.name,
                    "duplicate artifact in catalog snapshot, keeping the later definition"
                );
            }
        }

        Self {
            artifacts: Arc::new(RwLock::new(map)),
        }
    }

    /// Bulk-load from a JSON snapshot
    pub fn from_snapshot_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: StoreSnapshot =
            serde_json::from_str(json).map_err(|e| StoreError::InvalidSnapshot(e.to_string()))?;

        Ok(Self::from_artifacts(snapshot.artifacts))
    }

    /// Current contents, ordered by kind then name
    pub fn snapshot(&self) -> StoreSnapshot {
        let artifacts = self.artifacts.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Artifact> = artifacts.values().cloned().collect();
        list.sort_by_key(|artifact| artifact.key());

        StoreSnapshot { artifacts: list }
    }

    /// Serialize the current contents
    pub fn to_snapshot_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| StoreError::InvalidSnapshot(e.to_string()))
    }

    /// Insert or overwrite, returning the previous artifact
    pub fn replace(&self, artifact: Artifact) -> Option<Artifact> {
        let mut artifacts = self.artifacts.write().unwrap_or_else(PoisonError::into_inner);
        artifacts.insert(artifact.key(), artifact)
    }

    /// Number of stored artifacts
    pub fn len(&self) -> usize {
        self.artifacts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn save(&self, artifact: Artifact) -> Result<(), StoreError> {
        let mut artifacts = self.artifacts.write().unwrap_or_else(PoisonError::into_inner);
        let key = artifact.key();

        if artifacts.contains_key(&key) {
            return Err(StoreError::DuplicateArtifact {
                kind: artifact.kind,
                name: artifact.name,
            });
        }

        tracing::info!(kind = %artifact.kind, name = %artifact.name, "saved artifact");
        artifacts.insert(key, artifact);
        Ok(())
    }

    fn get(&self, kind: ArtifactKind, name: &str) -> Option<Artifact> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, name.to_lowercase()))
            .cloned()
    }

    fn names_of_kind(&self, kind: ArtifactKind) -> BTreeSet<String> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|artifact| artifact.kind == kind)
            .map(|artifact| artifact.name.clone())
            .collect()
    }
}

/// Errors raised by artifact stores
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} [{name}] already exists")]
    DuplicateArtifact { kind: ArtifactKind, name: String },

    #[error("Invalid catalog snapshot: {0}")]
    InvalidSnapshot(String),
}

impl StoreError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::DuplicateArtifact { name, .. } => {
                Diagnostic::error(DiagnosticCode::CatalogDuplicateArtifact, self.to_string())
                    .with_subject(name.clone())
            }
            Self::InvalidSnapshot(_) => {
                Diagnostic::error(DiagnosticCode::CatalogDocumentInvalid, self.to_string())
            }
        }
    }
}
