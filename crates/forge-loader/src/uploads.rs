//! The upload directory: validated saves, listing and deletion.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::IngestError;
use crate::format::{file_extension, FileKind};

/// Metadata for a file in the upload directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    pub name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    /// `tabular`, `document` or `image`.
    pub kind: String,
}

/// Flat directory of uploaded files, keyed by file name.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
    allowed_extensions: Vec<String>,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize, allowed_extensions: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Check name, extension and size, then write the file, replacing any
    /// file of the same name.
    pub fn save(&self, name: &str, bytes: &[u8]) -> Result<StoredFile, IngestError> {
        let kind = self.check(name, bytes.len())?;

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        std::fs::write(&path, bytes)?;
        info!(file = name, size = bytes.len(), "Upload saved");

        stored_file(&path, name, kind)
    }

    /// Validate an upload without writing it.
    pub fn check(&self, name: &str, size: usize) -> Result<FileKind, IngestError> {
        validate_name(name)?;
        let kind = self.check_extension(name)?;
        if size > self.max_bytes {
            return Err(IngestError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(kind)
    }

    /// Current bytes of a stored file, or `None` when there is no such file.
    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>, IngestError> {
        let path = self.path_of(name)?;
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(&path)?))
    }

    /// Files in the upload directory, most recently modified first.
    pub fn list(&self) -> Result<Vec<StoredFile>, IngestError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Ok(kind) = FileKind::detect(&name) else {
                debug!(file = %name, "Skipping unsupported file in upload directory");
                continue;
            };
            files.push(stored_file(&entry.path(), &name, kind)?);
        }

        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(files)
    }

    /// The most recently modified upload, if any.
    pub fn latest(&self) -> Result<Option<StoredFile>, IngestError> {
        Ok(self.list()?.into_iter().next())
    }

    pub fn delete(&self, name: &str) -> Result<(), IngestError> {
        let path = self.path_of(name)?;
        if !path.is_file() {
            return Err(IngestError::NotFound(name.to_string()));
        }
        std::fs::remove_file(&path)?;
        info!(file = name, "Upload deleted");
        Ok(())
    }

    /// Full path for a stored file name. The file need not exist.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, IngestError> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    fn check_extension(&self, name: &str) -> Result<FileKind, IngestError> {
        let ext = file_extension(name);
        if !self.allowed_extensions.iter().any(|a| *a == ext) {
            return Err(IngestError::UnsupportedFormat(if ext.is_empty() {
                name.to_string()
            } else {
                ext
            }));
        }
        FileKind::detect(name)
    }
}

/// Reject names that would escape the upload directory or hide from listings.
fn validate_name(name: &str) -> Result<(), IngestError> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.contains("..");
    if invalid {
        return Err(IngestError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

fn stored_file(path: &Path, name: &str, kind: FileKind) -> Result<StoredFile, IngestError> {
    let meta = std::fs::metadata(path)?;
    Ok(StoredFile {
        name: name.to_string(),
        size_bytes: meta.len(),
        modified: meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now()),
        kind: kind.label().to_string(),
    })
}
