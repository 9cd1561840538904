use axum::{
    body::Body,
    extract::{Multipart, Query, State},
    http::header,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::generator::{GenerationRequest, ARCHIVE_FILE_NAME};
use crate::routes::error::ApiError;
use crate::state::AppState;

pub const GENERATION_ID_HEADER: &str = "x-generation-id";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub mensaje: String,
    pub template: String,
    pub datos: String,
}

struct UploadedFile {
    filename: String,
    content: Vec<u8>,
}

pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut template: Option<UploadedFile> = None;
    let mut datos: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != "template" && name != "datos" {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request(format!("Field {:?} must be a file", name)))?;
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Error reading {:?}: {}", name, e)))?
            .to_vec();

        let file = Some(UploadedFile { filename, content });
        if name == "template" {
            template = file;
        } else {
            datos = file;
        }
    }

    let template = template.ok_or_else(|| ApiError::bad_request("Missing file field \"template\""))?;
    let datos = datos.ok_or_else(|| ApiError::bad_request("Missing file field \"datos\""))?;

    let storage = state.generator.layout();
    storage.store_upload(&template.filename, &template.content)?;
    storage.store_upload(&datos.filename, &datos.content)?;
    tracing::info!("Uploaded template {} and data {}", template.filename, datos.filename);

    Ok(Json(UploadResponse {
        mensaje: "Archivos subidos correctamente".to_string(),
        template: template.filename,
        datos: datos.filename,
    }))
}

fn default_name_field() -> String {
    "nombre".to_string()
}

fn default_offset() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    template_nombre: String,
    datos_nombre: String,
    #[serde(default = "default_name_field")]
    campo_nombre: String,
    #[serde(default = "default_offset")]
    x: i64,
    #[serde(default = "default_offset")]
    y: i64,
    color_texto: Option<String>,
    tamano_fuente: Option<i64>,
}

impl From<GenerateParams> for GenerationRequest {
    fn from(params: GenerateParams) -> Self {
        GenerationRequest {
            template_name: params.template_nombre,
            data_name: params.datos_nombre,
            name_field: params.campo_nombre,
            x: params.x,
            y: params.y,
            color: params.color_texto,
            font_size: params.tamano_fuente,
        }
    }
}

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GenerateParams>,
) -> Result<Response, ApiError> {
    let request = GenerationRequest::from(params);
    let generator = state.generator.clone();

    let outcome = tokio::task::spawn_blocking(move || generator.run(&request))
        .await
        .map_err(|e| ApiError::internal_error(format!("Generation task failed: {}", e)))??;

    let content = tokio::fs::read(&outcome.archive_path)
        .await
        .map_err(|e| ApiError::internal_error(format!("Error reading ZIP archive: {}", e)))?;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", ARCHIVE_FILE_NAME),
        )
        .header(GENERATION_ID_HEADER, outcome.run_id.as_str())
        .body(Body::from(content))
        .map_err(|e| ApiError::internal_error(e.to_string()))
}
