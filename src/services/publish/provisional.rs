use super::types::{PublishOutcome, PublishReceipt, PublishState};
use super::{PublishCoordinator, require_content};
use crate::models::{FileRecord, NewFileRecord};
use crate::services::{ServiceError, with_timeout};
use bytes::Bytes;
use chrono::Utc;
use std::future::Future;

impl PublishCoordinator {
    /// Unpublished → Provisional-Uploaded.
    ///
    /// Writes the QR-less rendering under a freshly reserved slug, then inserts
    /// the record. If the insert fails the blob stays behind unreferenced.
    pub async fn publish_provisional(
        &self,
        project_id: &str,
        filename: &str,
        data: Bytes,
    ) -> Result<PublishReceipt, ServiceError> {
        let record = self.insert_provisional(project_id, filename, data).await?;
        Ok(self.receipt(&record))
    }

    /// Drives both phases when the final document can be rendered server-side.
    ///
    /// `render_final` receives the receipt of the provisional upload, including
    /// the public URL to embed as a QR code. Failures after the provisional
    /// record exists are reported as [`PublishOutcome::ProvisionalOnly`]: the
    /// slug keeps resolving to the provisional blob.
    pub async fn publish_two_phase<R, Fut>(
        &self,
        project_id: &str,
        filename: &str,
        provisional: Bytes,
        render_final: R,
    ) -> Result<PublishOutcome, ServiceError>
    where
        R: FnOnce(PublishReceipt) -> Fut,
        Fut: Future<Output = anyhow::Result<Bytes>>,
    {
        let record = self
            .insert_provisional(project_id, filename, provisional)
            .await?;

        let rendered = match render_final(self.receipt(&record)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    slug = %record.slug,
                    state = ?PublishState::Failed,
                    "⚠️ Final rendering failed, slug keeps serving the provisional upload: {}",
                    e
                );
                return Ok(PublishOutcome::ProvisionalOnly {
                    record,
                    error: ServiceError::RenderFailure(e.to_string()),
                });
            }
        };

        match self.republish_record(&record, filename, rendered).await {
            Ok(receipt) => Ok(PublishOutcome::Published {
                record: receipt.record,
                cleanup: receipt.cleanup,
            }),
            Err(error) => {
                tracing::warn!(
                    slug = %record.slug,
                    state = ?PublishState::Failed,
                    "⚠️ Republish failed, slug keeps serving the provisional upload: {}",
                    error
                );
                Ok(PublishOutcome::ProvisionalOnly { record, error })
            }
        }
    }

    async fn insert_provisional(
        &self,
        project_id: &str,
        filename: &str,
        data: Bytes,
    ) -> Result<FileRecord, ServiceError> {
        require_content(&data)?;
        self.ensure_project(project_id).await?;

        let allocation = self.reserve_slug(project_id, filename, Utc::now()).await?;
        self.write_blob(&allocation.storage_path, data).await?;

        let new_record = NewFileRecord {
            project_id: project_id.to_string(),
            slug: allocation.slug.clone(),
            storage_path: allocation.storage_path.clone(),
        };
        let record = with_timeout(
            self.config.operation_timeout,
            "record insert",
            self.records.insert(new_record),
        )
        .await
        .map_err(|e| {
            tracing::warn!(
                "🧟 Record insert failed, blob {} left unreferenced: {}",
                allocation.storage_path,
                e
            );
            ServiceError::RecordWriteFailure(e.to_string())
        })?;

        tracing::info!(
            slug = %record.slug,
            file_id = %record.id,
            state = ?PublishState::ProvisionalUploaded,
            "📄 Provisional upload registered at {}",
            record.storage_path
        );
        Ok(record)
    }

    fn receipt(&self, record: &FileRecord) -> PublishReceipt {
        PublishReceipt {
            id: record.id.clone(),
            project_id: record.project_id.clone(),
            slug: record.slug.clone(),
            storage_path: record.storage_path.clone(),
            public_url: self.links.public_url(&record.slug),
        }
    }
}
