use crate::models::FileRecord;
use crate::services::ServiceError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where a publish attempt stands. Only `ProvisionalUploaded` and `Published`
/// are ever visible to readers of `/r/{slug}`; both resolve to a complete blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Unpublished,
    ProvisionalUploaded,
    Republished,
    Published,
    Failed,
}

/// Result of the first publish phase: the slug now exists and resolves.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PublishReceipt {
    pub id: String,
    pub project_id: String,
    pub slug: String,
    pub storage_path: String,
    pub public_url: String,
}

/// Result of pointing an existing record at a newly written blob.
#[derive(Debug, Clone, PartialEq)]
pub struct RepointReceipt {
    pub record: FileRecord,
    pub previous_path: String,
    /// `None` when superseded blobs are kept.
    pub cleanup: Option<CleanupReport>,
}

#[derive(Debug)]
pub enum PublishOutcome {
    /// The QR-bearing rendering is live.
    Published {
        record: FileRecord,
        cleanup: Option<CleanupReport>,
    },
    /// The second phase failed. `record` still serves the provisional blob.
    ProvisionalOnly {
        record: FileRecord,
        error: ServiceError,
    },
}

impl PublishOutcome {
    pub fn record(&self) -> &FileRecord {
        match self {
            PublishOutcome::Published { record, .. } => record,
            PublishOutcome::ProvisionalOnly { record, .. } => record,
        }
    }

    pub fn state(&self) -> PublishState {
        match self {
            PublishOutcome::Published { .. } => PublishState::Published,
            PublishOutcome::ProvisionalOnly { .. } => PublishState::Failed,
        }
    }
}

/// Reserved slug and path plus a signed PUT URL. No record exists yet.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DirectUploadTicket {
    pub slug: String,
    pub path: String,
    #[serde(rename = "signedUrl")]
    pub signed_url: String,
    pub bucket: String,
}

/// Record writes a client may request after uploading through a signed URL.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RecordCommand {
    Insert {
        project_id: String,
        slug: String,
        path: String,
    },
    Update {
        file_id: String,
        path: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CleanupOutcome {
    Deleted,
    Failed(String),
}

/// Outcome of a best-effort blob deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupReport {
    pub path: String,
    pub outcome: CleanupOutcome,
}

impl CleanupReport {
    pub fn is_deleted(&self) -> bool {
        self.outcome == CleanupOutcome::Deleted
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteReceipt {
    pub record: FileRecord,
    pub cleanup: CleanupReport,
}
