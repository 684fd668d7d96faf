use crate::entities::files;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    pub id: String,
    pub project_id: String,
    pub slug: String,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<files::Model> for FileRecord {
    fn from(model: files::Model) -> Self {
        Self {
            id: model.id,
            project_id: model.project_id,
            slug: model.slug,
            storage_path: model.storage_path,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Fields supplied by the caller when a slug is first registered.
/// `id` and the timestamps are assigned by the record store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFileRecord {
    pub project_id: String,
    pub slug: String,
    pub storage_path: String,
}

/// Display data shown next to a public report.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
}
