use thiserror::Error;

use crate::data::DataLoadError;
use crate::render::RenderError;
use crate::storage::StorageError;

/// Why a generation run was aborted. Every variant fails the whole batch.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported template format: {0}. Use PNG, JPG, JPEG or PDF")]
    UnsupportedFormat(String),

    #[error("Error reading data file: {0}")]
    DataLoad(#[from] DataLoadError),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Row {row} has no column {field:?}")]
    FieldMissing { row: usize, field: String },

    #[error("Error generating certificate for {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: RenderError,
    },

    #[error("Error creating ZIP archive: {0}")]
    Archive(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<zip::result::ZipError> for GenerationError {
    fn from(err: zip::result::ZipError) -> Self {
        GenerationError::Archive(err.to_string())
    }
}

impl From<std::io::Error> for GenerationError {
    fn from(err: std::io::Error) -> Self {
        GenerationError::Storage(StorageError::Io(err))
    }
}
