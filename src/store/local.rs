//! Directory-backed store: file ids are paths relative to the root.
use super::{FetchedFile, StoreError, StoredFile, TableStore};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a relative id onto the root; absolute ids and `..` are refused.
    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }
}

impl TableStore for LocalStore {
    fn fetch(&self, file_id: &str) -> Result<FetchedFile, StoreError> {
        let path = self
            .resolve(file_id)
            .filter(|path| path != &self.root)
            .ok_or_else(|| StoreError::Transfer(format!("invalid file id {file_id:?}")))?;
        let bytes = fs::read(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(file_id.to_string()),
            _ => StoreError::Transfer(format!("read {}: {err}", path.display())),
        })?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(file_id)
            .to_string();
        tracing::debug!(file_id, bytes = bytes.len(), "read local file");
        Ok(FetchedFile { name, bytes })
    }

    fn persist(
        &self,
        name: &str,
        _content_type: &str,
        bytes: &[u8],
        folder: Option<&str>,
    ) -> Result<StoredFile, StoreError> {
        let start = Instant::now();
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| *n == name)
            .ok_or_else(|| StoreError::Persist(format!("invalid file name {name:?}")))?;
        let folder = folder.unwrap_or("");
        let dir = self
            .resolve(folder)
            .ok_or_else(|| StoreError::Persist(format!("invalid folder {folder:?}")))?;
        fs::create_dir_all(&dir)
            .map_err(|err| StoreError::Persist(format!("create {}: {err}", dir.display())))?;

        let dest = dir.join(file_name);
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|err| StoreError::Persist(format!("create temp file: {err}")))?;
        tmp.write_all(bytes)
            .map_err(|err| StoreError::Persist(format!("write temp file: {err}")))?;
        tmp.persist(&dest)
            .map_err(|err| StoreError::Persist(format!("publish {}: {err}", dest.display())))?;

        let absolute = fs::canonicalize(&dest).unwrap_or_else(|_| dest.clone());
        let id = Path::new(folder).join(file_name).to_string_lossy().into_owned();
        tracing::info!(
            path = %dest.display(),
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "stored file locally"
        );
        Ok(StoredFile {
            id,
            link: format!("file://{}", absolute.display()),
        })
    }
}
