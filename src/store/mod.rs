//! Tabular store adapter.
//!
//! A [`TableStore`] moves raw spreadsheet bytes in and out of some backing
//! storage; [`crate::sheet`] turns those bytes into a [`crate::table::Table`].
//! Backends are chosen once at startup from [`StoreConfig`].

mod drive;
mod local;

pub use drive::DriveStore;
pub use local::LocalStore;

use crate::config::StoreConfig;
use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file {0} not found")]
    NotFound(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("persist failed: {0}")]
    Persist(String),
}

/// A downloaded file. `name` carries the extension used to pick a codec.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Reference to a persisted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub link: String,
}

pub trait TableStore: Send + Sync {
    fn fetch(&self, file_id: &str) -> Result<FetchedFile, StoreError>;

    /// Store `bytes` as `name`, inside `folder` when given.
    fn persist(
        &self,
        name: &str,
        content_type: &str,
        bytes: &[u8],
        folder: Option<&str>,
    ) -> Result<StoredFile, StoreError>;
}

pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn TableStore>> {
    match config {
        StoreConfig::Local(local) => Ok(Arc::new(LocalStore::new(&local.root))),
        StoreConfig::Drive(drive) => Ok(Arc::new(DriveStore::new(drive)?)),
    }
}
