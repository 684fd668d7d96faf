use crate::config::AppConfig;
use crate::services::records::RecordStore;
use crate::services::storage::StorageService;
use crate::services::with_timeout;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub referenced: usize,
    pub deleted: usize,
    pub skipped_recent: usize,
    pub failed: usize,
}

/// Reclaims blobs under the upload prefix that no record points at.
pub struct OrphanSweeper {
    records: Arc<dyn RecordStore>,
    storage: Arc<dyn StorageService>,
    config: AppConfig,
}

impl OrphanSweeper {
    pub fn new(
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageService>,
        config: AppConfig,
    ) -> Self {
        Self {
            records,
            storage,
            config,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Objects are listed before the referenced paths are read. A blob written
    /// and committed in between is therefore seen as referenced; one written
    /// but not yet committed is younger than the grace period and skipped.
    /// Commits that land after the snapshot only accept blobs younger than
    /// [`AppConfig::commit_window`], which this pass never deletes.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let prefix = format!("{}/", self.config.upload_prefix);
        let objects = with_timeout(
            self.config.operation_timeout,
            "blob listing",
            self.storage.list_objects(&prefix),
        )
        .await?;
        let referenced = with_timeout(
            self.config.operation_timeout,
            "path listing",
            self.records.storage_paths(),
        )
        .await?;

        let grace = chrono::Duration::from_std(self.config.orphan_grace)?;
        let mut report = SweepReport {
            scanned: objects.len(),
            ..Default::default()
        };

        for object in objects {
            if referenced.contains(&object.key) {
                report.referenced += 1;
                continue;
            }

            let old_enough = object
                .last_modified
                .is_some_and(|modified| now - modified >= grace);
            if !old_enough {
                report.skipped_recent += 1;
                continue;
            }

            match with_timeout(
                self.config.operation_timeout,
                "blob delete",
                self.storage.delete_file(&object.key),
            )
            .await
            {
                Ok(()) => {
                    tracing::info!("🧹 Removed orphaned blob {}", object.key);
                    report.deleted += 1;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to remove orphaned blob {}: {}", object.key, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

pub struct BackgroundWorker {
    sweeper: OrphanSweeper,
    interval: std::time::Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageService>,
        config: AppConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let interval = config.orphan_sweep_interval;
        Self {
            sweeper: OrphanSweeper::new(records, storage, config),
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    async fn perform_cleanup(&self) {
        tracing::info!("🧹 Running orphan sweep...");

        match self.sweeper.sweep().await {
            Ok(report) => tracing::info!(
                scanned = report.scanned,
                deleted = report.deleted,
                skipped = report.skipped_recent,
                failed = report.failed,
                "✅ Orphan sweep completed"
            ),
            Err(e) => tracing::error!("❌ Orphan sweep failed: {}", e),
        }
    }
}
