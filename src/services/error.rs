use crate::utils::multipart::MultipartError;
use thiserror::Error;

/// Failure of a single publish, replace, delete, or resolve operation.
///
/// None of these are fatal to the process; each one is scoped to the request
/// that produced it. Orphaned blobs are not errors and never show up here.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The blob write did not complete; no row was touched.
    #[error("Storage write failed: {0}")]
    StorageWriteFailure(String),

    /// The row insert/update/delete failed after any blob write succeeded.
    /// The previously committed row, if any, is unchanged.
    #[error("Record write failed: {0}")]
    RecordWriteFailure(String),

    #[error("Storage lookup failed: {0}")]
    StorageReadFailure(String),

    #[error("Record lookup failed: {0}")]
    RecordReadFailure(String),

    /// The caller-supplied renderer could not produce the final document.
    #[error("Rendering failed: {0}")]
    RenderFailure(String),

    #[error("Failed to sign URL: {0}")]
    SigningFailure(String),

    #[error("No unused slug found after {0} attempts")]
    SlugSpaceExhausted(u32),
}

impl From<MultipartError> for ServiceError {
    fn from(err: MultipartError) -> Self {
        ServiceError::MalformedRequest(err.to_string())
    }
}

impl ServiceError {
    /// Short machine-readable tag for logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::MalformedRequest(_) => "malformed_request",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::StorageWriteFailure(_) => "storage_write_failure",
            ServiceError::RecordWriteFailure(_) => "record_write_failure",
            ServiceError::StorageReadFailure(_) => "storage_read_failure",
            ServiceError::RecordReadFailure(_) => "record_read_failure",
            ServiceError::RenderFailure(_) => "render_failure",
            ServiceError::SigningFailure(_) => "signing_failure",
            ServiceError::SlugSpaceExhausted(_) => "slug_space_exhausted",
        }
    }
}
