use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directories owned by one service instance: uploaded assets and generated
/// archives.
#[derive(Clone, Debug)]
pub struct StorageLayout {
    templates_dir: PathBuf,
    output_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(templates_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.templates_folder.clone(), config.output_folder.clone())
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.templates_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Path of a previously uploaded file. The name must be a bare file name.
    pub fn resolve_upload(&self, filename: &str) -> Result<PathBuf, StorageError> {
        validate_file_name(filename)?;
        Ok(self.templates_dir.join(filename))
    }

    /// Stores an upload under its original name, replacing any earlier file.
    pub fn store_upload(&self, filename: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.resolve_upload(filename)?;
        std::fs::write(&path, content)?;
        tracing::debug!("Stored upload {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(run_id)
    }
}

pub fn generate_run_id() -> String {
    format!(
        "{}_{}",
        Utc::now().format("%Y%m%d"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

fn validate_file_name(filename: &str) -> Result<(), StorageError> {
    let invalid = filename.trim().is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0');
    if invalid {
        return Err(StorageError::InvalidFileName(filename.to_string()));
    }
    Ok(())
}
