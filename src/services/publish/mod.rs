//! Two-phase publish protocol.
//!
//! Every path through this module follows one order: write the new blob, then
//! point a row at it, then (optionally) delete the blob the row used to point
//! at. A failure at any step leaves the last committed row untouched, so a slug
//! that resolved before an operation still resolves after it. Blobs written by a
//! failed step are left behind as orphans for the sweep.

use crate::config::AppConfig;
use crate::models::FileRecord;
use crate::services::records::RecordStore;
use crate::services::resolver::PublicLinks;
use crate::services::slug::{Allocation, SlugAllocator};
use crate::services::storage::{ObjectSummary, StorageService};
use crate::services::{ServiceError, with_timeout};
use crate::utils::validation::validate_path_segment;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod cleanup;
pub mod direct;
pub mod provisional;
pub mod repoint;
pub mod types;

pub use types::{
    CleanupOutcome, CleanupReport, DeleteReceipt, DirectUploadTicket, PublishOutcome,
    PublishReceipt, PublishState, RecordCommand, RepointReceipt,
};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

pub struct PublishCoordinator {
    records: Arc<dyn RecordStore>,
    storage: Arc<dyn StorageService>,
    allocator: SlugAllocator,
    links: PublicLinks,
    config: AppConfig,
}

impl PublishCoordinator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageService>,
        links: PublicLinks,
        config: AppConfig,
    ) -> Self {
        Self {
            records,
            storage,
            allocator: SlugAllocator::new(config.upload_prefix.clone()),
            links,
            config,
        }
    }

    pub fn with_allocator(mut self, allocator: SlugAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn allocator(&self) -> &SlugAllocator {
        &self.allocator
    }

    pub fn links(&self) -> &PublicLinks {
        &self.links
    }

    async fn load_record(&self, file_id: &str) -> Result<FileRecord, ServiceError> {
        with_timeout(
            self.config.operation_timeout,
            "record lookup",
            self.records.get_by_id(file_id),
        )
        .await
        .map_err(|e| ServiceError::RecordReadFailure(e.to_string()))?
        .ok_or_else(|| ServiceError::NotFound(format!("File {} not found", file_id)))
    }

    async fn ensure_project(&self, project_id: &str) -> Result<(), ServiceError> {
        validate_path_segment("project_id", project_id).map_err(ServiceError::MalformedRequest)?;

        let exists = with_timeout(
            self.config.operation_timeout,
            "project lookup",
            self.records.project_exists(project_id),
        )
        .await
        .map_err(|e| ServiceError::RecordReadFailure(e.to_string()))?;

        if exists {
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!(
                "Project {} not found",
                project_id
            )))
        }
    }

    /// Draws slugs until one is not already registered.
    ///
    /// The check and the later insert are not atomic; the unique index on
    /// `files.slug` rejects the insert if another publish wins the race.
    async fn reserve_slug(
        &self,
        project_id: &str,
        filename: &str,
        now: DateTime<Utc>,
    ) -> Result<Allocation, ServiceError> {
        let attempts = self.config.slug_max_attempts.max(1);
        for attempt in 1..=attempts {
            let allocation = self.allocator.allocate(project_id, filename, now);
            let taken = with_timeout(
                self.config.operation_timeout,
                "slug lookup",
                self.records.slug_exists(&allocation.slug),
            )
            .await
            .map_err(|e| ServiceError::RecordReadFailure(e.to_string()))?;

            if !taken {
                return Ok(allocation);
            }
            tracing::warn!(
                "⚠️ Slug collision on '{}' (attempt {}/{})",
                allocation.slug,
                attempt,
                attempts
            );
        }
        Err(ServiceError::SlugSpaceExhausted(attempts))
    }

    async fn write_blob(&self, path: &str, data: Bytes) -> Result<(), ServiceError> {
        let size = data.len();
        with_timeout(
            self.config.operation_timeout,
            "blob write",
            self.storage.upload_file(path, data, PDF_CONTENT_TYPE),
        )
        .await
        .map_err(|e| {
            tracing::error!("❌ Blob write failed for {}: {}", path, e);
            ServiceError::StorageWriteFailure(e.to_string())
        })?;

        tracing::info!("☁️  Wrote {} bytes to {}", size, path);
        Ok(())
    }

    async fn head_blob(&self, path: &str) -> Result<Option<ObjectSummary>, ServiceError> {
        with_timeout(
            self.config.operation_timeout,
            "blob lookup",
            self.storage.head_object(path),
        )
        .await
        .map_err(|e| ServiceError::StorageReadFailure(format!("cannot verify {}: {}", path, e)))
    }
}

fn require_content(data: &Bytes) -> Result<(), ServiceError> {
    if data.is_empty() {
        return Err(ServiceError::MalformedRequest(
            "Uploaded document is empty".to_string(),
        ));
    }
    Ok(())
}
