//! Directory service boundary.
//!
//! The reconciler consumes desired state through [`DirectoryService`]; each
//! call returns a point-in-time snapshot, never a live reference. The
//! shipped implementation reads a YAML snapshot file maintained by whatever
//! fetches the remote directory — the HTTP client itself lives outside this
//! daemon.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use swarmkeeper_core::Environment;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse directory snapshot at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Source of the desired environment list.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn list_environments(&self) -> Result<Vec<Environment>, DirectoryError>;
}

/// YAML snapshot file (`environments.yaml`: a sequence of environments).
#[derive(Debug, Clone)]
pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DirectoryService for FileDirectory {
    async fn list_environments(&self) -> Result<Vec<Environment>, DirectoryError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| DirectoryError::Io {
                    path: self.path.clone(),
                    source,
                })?;
        serde_yaml::from_str(&contents).map_err(|source| DirectoryError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}
