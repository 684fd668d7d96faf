use super::types::{PublishState, RepointReceipt};
use super::{PublishCoordinator, require_content};
use crate::models::FileRecord;
use crate::services::{ServiceError, with_timeout};
use bytes::Bytes;
use chrono::Utc;

impl PublishCoordinator {
    /// Replaces the document behind an existing record. The slug and id stay
    /// the same; only `storage_path` moves to a newly written blob.
    pub async fn replace(
        &self,
        file_id: &str,
        filename: &str,
        data: Bytes,
    ) -> Result<RepointReceipt, ServiceError> {
        require_content(&data)?;
        let record = self.load_record(file_id).await?;
        let receipt = self.repoint(&record, filename, data).await?;

        tracing::info!(
            slug = %receipt.record.slug,
            file_id = %receipt.record.id,
            "🔁 Replaced {} -> {}",
            receipt.previous_path,
            receipt.record.storage_path
        );
        Ok(receipt)
    }

    /// Provisional-Uploaded → Published: swaps in the rendering that carries
    /// the slug's own QR code.
    pub async fn republish(
        &self,
        file_id: &str,
        filename: &str,
        data: Bytes,
    ) -> Result<RepointReceipt, ServiceError> {
        require_content(&data)?;
        let record = self.load_record(file_id).await?;
        self.republish_record(&record, filename, data).await
    }

    pub(super) async fn republish_record(
        &self,
        record: &FileRecord,
        filename: &str,
        data: Bytes,
    ) -> Result<RepointReceipt, ServiceError> {
        let receipt = self.repoint(record, filename, data).await?;
        tracing::info!(
            slug = %receipt.record.slug,
            state = ?PublishState::Published,
            "✅ Published {}",
            receipt.record.storage_path
        );
        Ok(receipt)
    }

    /// write new blob → repoint row → delete previous blob.
    async fn repoint(
        &self,
        record: &FileRecord,
        filename: &str,
        data: Bytes,
    ) -> Result<RepointReceipt, ServiceError> {
        let new_path = self.allocator.next_path(
            &record.project_id,
            &record.slug,
            filename,
            &record.storage_path,
            Utc::now(),
        );

        self.write_blob(&new_path, data).await?;

        let updated = with_timeout(
            self.config.operation_timeout,
            "record update",
            self.records.update_path(&record.id, &new_path),
        )
        .await
        .map_err(|e| {
            tracing::warn!(
                slug = %record.slug,
                "🧟 Repoint failed, {} still served and {} left unreferenced: {}",
                record.storage_path,
                new_path,
                e
            );
            ServiceError::RecordWriteFailure(e.to_string())
        })?;

        tracing::debug!(
            slug = %updated.slug,
            state = ?PublishState::Republished,
            "Record now points at {}",
            updated.storage_path
        );

        let cleanup = if self.config.delete_replaced_blobs {
            Some(self.cleanup_blob(&record.storage_path).await)
        } else {
            None
        };

        Ok(RepointReceipt {
            record: updated,
            previous_path: record.storage_path.clone(),
            cleanup,
        })
    }
}
