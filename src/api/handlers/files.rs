use crate::AppState;
use crate::api::error::AppError;
use crate::models::FileRecord;
use crate::services::publish::RecordCommand;
use crate::utils::multipart::{self, Attachment, MultipartForm};
use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, header},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Serialize, ToSchema)]
pub struct IngestResponse {
    pub ok: bool,
    pub id: String,
    pub slug: String,
    pub path: String,
    pub public_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct ReplaceResponse {
    pub ok: bool,
    pub file: FileRecord,
    pub previous_path: String,
    /// Whether the superseded blob was removed. Absent when cleanup is disabled.
    pub previous_deleted: Option<bool>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct InitUploadRequest {
    #[validate(length(min = 1, max = 255, message = "project_id is required"))]
    pub project_id: String,
    #[validate(length(min = 1, max = 255, message = "filename is required"))]
    pub filename: String,
}

#[derive(Serialize, ToSchema)]
pub struct InitUploadResponse {
    pub ok: bool,
    pub slug: String,
    pub path: String,
    #[serde(rename = "signedUrl")]
    pub signed_url: String,
    pub bucket: String,
}

#[derive(Serialize, ToSchema)]
pub struct RecordFileResponse {
    pub ok: bool,
    pub id: String,
    pub slug: String,
    pub path: String,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct DeleteRequest {
    #[validate(length(min = 1, message = "file_id is required"))]
    pub file_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub ok: bool,
    pub id: String,
    pub blob_deleted: bool,
}

/// Buffers the raw body and decodes it as `multipart/form-data`.
fn decode_form(state: &AppState, headers: &HeaderMap, body: &Bytes) -> Result<MultipartForm, AppError> {
    if body.len() > state.config.max_file_size + 1024 * 1024 {
        return Err(AppError::PayloadTooLarge(format!(
            "Body exceeds {} bytes",
            state.config.max_file_size
        )));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Content-Type".to_string()))?;

    if !content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        return Err(AppError::BadRequest(
            "Expected multipart/form-data".to_string(),
        ));
    }

    Ok(multipart::decode(body, content_type)?)
}

fn check_document(state: &AppState, file: &Attachment) -> Result<(), AppError> {
    if file.data.len() > state.config.max_file_size {
        return Err(AppError::PayloadTooLarge(format!(
            "Document is {} bytes, limit is {}",
            file.data.len(),
            state.config.max_file_size
        )));
    }

    // Parts without a type, or typed generically, are taken as PDFs.
    if let Some(declared) = file.content_type.as_deref() {
        let parsed: mime::Mime = declared
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid content type '{}'", declared)))?;
        if parsed.essence_str() != mime::APPLICATION_PDF.essence_str()
            && parsed.essence_str() != mime::APPLICATION_OCTET_STREAM.essence_str()
        {
            return Err(AppError::BadRequest(format!(
                "Expected a PDF document, got {}",
                parsed.essence_str()
            )));
        }
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/ingest",
    request_body(content = String, content_type = "multipart/form-data", description = "`project_id` text field and a `file` PDF part"),
    responses(
        (status = 200, description = "Provisional document stored under a new slug", body = IngestResponse),
        (status = 400, description = "Malformed multipart body or missing field"),
        (status = 404, description = "Unknown project"),
        (status = 500, description = "Storage or record failure")
    ),
    tag = "files"
)]
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let form = decode_form(&state, &headers, &body)?;
    let project_id = form.require_text("project_id")?;
    let file = form.require_attachment("file")?;
    check_document(&state, file)?;

    let receipt = state
        .publisher
        .publish_provisional(project_id, &file.filename, file.data.clone())
        .await?;

    Ok(Json(IngestResponse {
        ok: true,
        id: receipt.id,
        slug: receipt.slug,
        path: receipt.storage_path,
        public_url: receipt.public_url,
    }))
}

#[utoipa::path(
    post,
    path = "/api/replace",
    request_body(content = String, content_type = "multipart/form-data", description = "`file_id` text field and a `file` PDF part"),
    responses(
        (status = 200, description = "Record now serves the new document; slug unchanged", body = ReplaceResponse),
        (status = 400, description = "Malformed multipart body or missing field"),
        (status = 404, description = "Unknown file id"),
        (status = 500, description = "Storage or record failure")
    ),
    tag = "files"
)]
pub async fn replace(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReplaceResponse>, AppError> {
    let form = decode_form(&state, &headers, &body)?;
    let file_id = form.require_text("file_id")?;
    let file = form.require_attachment("file")?;
    check_document(&state, file)?;

    let receipt = state
        .publisher
        .replace(file_id, &file.filename, file.data.clone())
        .await?;

    Ok(Json(ReplaceResponse {
        ok: true,
        previous_deleted: receipt.cleanup.as_ref().map(|c| c.is_deleted()),
        previous_path: receipt.previous_path,
        file: receipt.record,
    }))
}

#[utoipa::path(
    post,
    path = "/api/init-upload",
    request_body = InitUploadRequest,
    responses(
        (status = 200, description = "Slug reserved and upload URL signed", body = InitUploadResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Unknown project")
    ),
    tag = "files"
)]
pub async fn init_upload(
    State(state): State<AppState>,
    payload: Result<Json<InitUploadRequest>, JsonRejection>,
) -> Result<Json<InitUploadResponse>, AppError> {
    let Json(req) = payload?;
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let ticket = state
        .publisher
        .init_direct_upload(req.project_id.trim(), &req.filename)
        .await?;

    Ok(Json(InitUploadResponse {
        ok: true,
        slug: ticket.slug,
        path: ticket.path,
        signed_url: ticket.signed_url,
        bucket: ticket.bucket,
    }))
}

#[utoipa::path(
    post,
    path = "/api/record-file",
    request_body = RecordCommand,
    responses(
        (status = 200, description = "Record inserted or repointed", body = RecordFileResponse),
        (status = 400, description = "Unknown action, invalid slug, or foreign path"),
        (status = 404, description = "Unknown file, project, or uploaded object")
    ),
    tag = "files"
)]
pub async fn record_file(
    State(state): State<AppState>,
    payload: Result<Json<RecordCommand>, JsonRejection>,
) -> Result<Json<RecordFileResponse>, AppError> {
    let Json(command) = payload?;
    let record = state.publisher.commit(command).await?;

    Ok(Json(RecordFileResponse {
        ok: true,
        id: record.id,
        slug: record.slug,
        path: record.storage_path,
    }))
}

#[utoipa::path(
    post,
    path = "/api/delete",
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Record removed; blob removal is best-effort", body = DeleteResponse),
        (status = 404, description = "Unknown file id")
    ),
    tag = "files"
)]
pub async fn delete(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>, AppError> {
    let Json(req) = payload?;
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let receipt = state.publisher.delete(req.file_id.trim()).await?;

    Ok(Json(DeleteResponse {
        ok: true,
        id: receipt.record.id,
        blob_deleted: receipt.cleanup.is_deleted(),
    }))
}
