use super::types::{DirectUploadTicket, RecordCommand, RepointReceipt};
use super::{PDF_CONTENT_TYPE, PublishCoordinator};
use crate::models::{FileRecord, NewFileRecord};
use crate::services::slug::is_valid_slug;
use crate::services::{ServiceError, with_timeout};
use chrono::{DateTime, Utc};

impl PublishCoordinator {
    /// Reserves a slug and path and signs a PUT URL for it. Nothing is recorded
    /// until the client calls [`PublishCoordinator::commit`] after uploading.
    pub async fn init_direct_upload(
        &self,
        project_id: &str,
        filename: &str,
    ) -> Result<DirectUploadTicket, ServiceError> {
        self.ensure_project(project_id).await?;
        let allocation = self.reserve_slug(project_id, filename, Utc::now()).await?;

        let signed_url = with_timeout(
            self.config.operation_timeout,
            "upload signing",
            self.storage.presigned_put_url(
                &allocation.storage_path,
                self.upload_ttl(),
                PDF_CONTENT_TYPE,
            ),
        )
        .await
        .map_err(|e| ServiceError::SigningFailure(e.to_string()))?;

        tracing::info!(
            "✍️  Signed direct upload for slug {} at {}",
            allocation.slug,
            allocation.storage_path
        );

        Ok(DirectUploadTicket {
            slug: allocation.slug,
            path: allocation.storage_path,
            signed_url,
            bucket: self.storage.bucket().to_string(),
        })
    }

    /// Signed upload URLs never outlive the window in which the upload can
    /// still be committed.
    pub fn upload_ttl(&self) -> std::time::Duration {
        self.config.signed_upload_ttl.min(self.config.commit_window())
    }

    /// Applies a record write requested after a direct upload.
    ///
    /// The referenced blob must already exist, must live under the slug's own
    /// key prefix and must be younger than [`AppConfig::commit_window`];
    /// otherwise nothing is written.
    ///
    /// [`AppConfig::commit_window`]: crate::config::AppConfig::commit_window
    pub async fn commit(&self, command: RecordCommand) -> Result<FileRecord, ServiceError> {
        match command {
            RecordCommand::Insert {
                project_id,
                slug,
                path,
            } => self.commit_insert(&project_id, &slug, &path).await,
            RecordCommand::Update { file_id, path } => self
                .commit_update(&file_id, &path)
                .await
                .map(|receipt| receipt.record),
        }
    }

    pub async fn commit_insert(
        &self,
        project_id: &str,
        slug: &str,
        path: &str,
    ) -> Result<FileRecord, ServiceError> {
        let started = Utc::now();
        self.ensure_project(project_id).await?;
        if !is_valid_slug(slug) {
            return Err(ServiceError::MalformedRequest(format!(
                "Invalid slug '{}'",
                slug
            )));
        }
        self.check_owned_path(project_id, slug, path)?;

        let taken = with_timeout(
            self.config.operation_timeout,
            "slug lookup",
            self.records.slug_exists(slug),
        )
        .await
        .map_err(|e| ServiceError::RecordReadFailure(e.to_string()))?;
        if taken {
            return Err(ServiceError::MalformedRequest(format!(
                "Slug {} is already registered",
                slug
            )));
        }

        self.check_committable(path, started).await?;

        let record = with_timeout(
            self.config.operation_timeout,
            "record insert",
            self.records.insert(NewFileRecord {
                project_id: project_id.to_string(),
                slug: slug.to_string(),
                storage_path: path.to_string(),
            }),
        )
        .await
        .map_err(|e| ServiceError::RecordWriteFailure(e.to_string()))?;

        tracing::info!(
            slug = %record.slug,
            file_id = %record.id,
            "📄 Direct upload registered at {}",
            record.storage_path
        );
        Ok(record)
    }

    /// Points an existing record at a directly uploaded blob. Committing the
    /// path the record already uses is a no-op, so retries are harmless.
    pub async fn commit_update(
        &self,
        file_id: &str,
        path: &str,
    ) -> Result<RepointReceipt, ServiceError> {
        let started = Utc::now();
        let record = self.load_record(file_id).await?;
        self.check_owned_path(&record.project_id, &record.slug, path)?;

        if record.storage_path == path {
            return Ok(RepointReceipt {
                previous_path: record.storage_path.clone(),
                record,
                cleanup: None,
            });
        }

        self.check_committable(path, started).await?;

        let updated = with_timeout(
            self.config.operation_timeout,
            "record update",
            self.records.update_path(&record.id, path),
        )
        .await
        .map_err(|e| ServiceError::RecordWriteFailure(e.to_string()))?;

        tracing::info!(
            slug = %updated.slug,
            "🔁 Direct upload replaced {} -> {}",
            record.storage_path,
            updated.storage_path
        );

        let cleanup = if self.config.delete_replaced_blobs {
            Some(self.cleanup_blob(&record.storage_path).await)
        } else {
            None
        };

        Ok(RepointReceipt {
            record: updated,
            previous_path: record.storage_path,
            cleanup,
        })
    }

    /// Refuses blobs that are missing or old enough for the orphan sweep to
    /// reclaim before the commit's row write lands.
    async fn check_committable(
        &self,
        path: &str,
        started: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let object = self
            .head_blob(path)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No uploaded object at {}", path)))?;

        // Objects without a timestamp are never swept.
        let Some(modified) = object.last_modified else {
            return Ok(());
        };
        let window = chrono::Duration::from_std(self.config.commit_window())
            .unwrap_or_else(|_| chrono::Duration::zero());
        if started - modified >= window {
            tracing::warn!(
                "⏳ Refusing commit of {}: uploaded at {}, outside the {}s commit window",
                path,
                modified,
                window.num_seconds()
            );
            return Err(ServiceError::MalformedRequest(format!(
                "Upload at {} is too old to commit; request a new upload URL",
                path
            )));
        }
        Ok(())
    }

    fn check_owned_path(&self, project_id: &str, slug: &str, path: &str) -> Result<(), ServiceError> {
        let prefix = self.allocator.slug_prefix(project_id, slug);
        let owned = path
            .strip_prefix(&prefix)
            .is_some_and(|name| !name.is_empty() && !name.contains('/') && name != "..");
        if owned {
            Ok(())
        } else {
            Err(ServiceError::MalformedRequest(format!(
                "Path must be a file directly under {}",
                prefix
            )))
        }
    }
}
