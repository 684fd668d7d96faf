use super::PublishCoordinator;
use super::types::{CleanupOutcome, CleanupReport, DeleteReceipt};
use crate::services::{ServiceError, with_timeout};

impl PublishCoordinator {
    /// Removes a published document.
    ///
    /// The row goes first so no reader can resolve the slug to a blob that is
    /// already gone. If the blob deletion then fails the blob is orphaned and
    /// left to the sweep; the delete itself still succeeds.
    pub async fn delete(&self, file_id: &str) -> Result<DeleteReceipt, ServiceError> {
        let record = self.load_record(file_id).await?;

        with_timeout(
            self.config.operation_timeout,
            "record delete",
            self.records.delete(&record.id),
        )
        .await
        .map_err(|e| ServiceError::RecordWriteFailure(e.to_string()))?;

        tracing::info!(
            slug = %record.slug,
            file_id = %record.id,
            "🗑️  Deleted file record"
        );

        let cleanup = self.cleanup_blob(&record.storage_path).await;
        Ok(DeleteReceipt { record, cleanup })
    }

    /// Best-effort deletion of a blob no record points at any more.
    /// Never fails the caller; the outcome is reported and logged.
    pub async fn cleanup_blob(&self, path: &str) -> CleanupReport {
        let outcome = match with_timeout(
            self.config.operation_timeout,
            "blob delete",
            self.storage.delete_file(path),
        )
        .await
        {
            Ok(()) => {
                tracing::info!("🧹 Deleted blob {}", path);
                CleanupOutcome::Deleted
            }
            Err(e) => {
                tracing::warn!("⚠️ Could not delete blob {}, leaving it orphaned: {}", path, e);
                CleanupOutcome::Failed(e.to_string())
            }
        };

        CleanupReport {
            path: path.to_string(),
            outcome,
        }
    }
}
