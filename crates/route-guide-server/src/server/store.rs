//! Immutable, process-wide feature dataset.
//!
//! [`FeatureStore`] is built exactly once before the server binds its socket
//! and is then shared by every call through a cheap [`Clone`]. It is never
//! mutated afterwards, so no lock guards it.

use route_guide_core::proto::Feature;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Snapshot compiled into the binary, served when no path is configured.
const EMBEDDED_SNAPSHOT: &[u8] = include_bytes!("../../testdata/route_guide_db.json");

/// Reasons a snapshot cannot become a [`FeatureStore`]. All of them are fatal
/// at startup.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read feature snapshot {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed feature snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("feature snapshot contains no features")]
    Empty,
}

/// Ordered, read-only sequence of features.
///
/// The order is the one found in the snapshot and is exactly the order in
/// which features are streamed.
#[derive(Clone, Debug)]
pub struct FeatureStore {
    features: Arc<[Feature]>,
}

impl FeatureStore {
    /// Deserializes a JSON array of features.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Malformed`] if the bytes are not a JSON array of
    ///   feature objects.
    /// - [`StoreError::Empty`] if the array has no elements.
    pub fn load(snapshot: &[u8]) -> Result<Self, StoreError> {
        let features: Vec<Feature> = serde_json::from_slice(snapshot)?;
        if features.is_empty() {
            return Err(StoreError::Empty);
        }

        Ok(Self {
            features: features.into(),
        })
    }

    /// Reads and deserializes the snapshot at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let snapshot = std::fs::read(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(&snapshot)
    }

    /// Loads the dataset compiled into the binary.
    pub fn embedded() -> Result<Self, StoreError> {
        Self::load(EMBEDDED_SNAPSHOT)
    }

    /// Loads from `path` when given, otherwise falls back to the embedded
    /// dataset.
    pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::embedded(),
        }
    }

    pub fn all(&self) -> &[Feature] {
        &self.features
    }

    /// Shared handle to the features, for tasks that outlive the borrow of the
    /// store.
    pub fn shared(&self) -> Arc<[Feature]> {
        Arc::clone(&self.features)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<Vec<Feature>> for FeatureStore {
    fn from(features: Vec<Feature>) -> Self {
        Self {
            features: features.into(),
        }
    }
}
