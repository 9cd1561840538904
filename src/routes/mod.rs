mod api;
pub mod error;

pub use api::{generate_handler, upload_handler, UploadResponse, GENERATION_ID_HEADER};
pub use error::ApiError;
