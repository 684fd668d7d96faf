use crate::entities::{prelude::*, *};
use crate::models::{FileRecord, NewFileRecord, ProjectSummary};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::{Set, Unchanged};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect,
};
use std::collections::HashSet;
use uuid::Uuid;

/// File-record capability. Every write touches exactly one row and is visible
/// to the next read once it returns; there are no multi-row transactions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord>;
    async fn update_path(&self, id: &str, storage_path: &str) -> Result<FileRecord>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<FileRecord>>;
    async fn get_by_id(&self, id: &str) -> Result<Option<FileRecord>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn slug_exists(&self, slug: &str) -> Result<bool>;
    async fn project_exists(&self, project_id: &str) -> Result<bool>;
    async fn project_summary(&self, project_id: &str) -> Result<Option<ProjectSummary>>;
    /// Every `storage_path` currently referenced by a record.
    async fn storage_paths(&self) -> Result<HashSet<String>>;
    async fn ping(&self) -> Result<()>;
}

pub struct SeaOrmRecordStore {
    db: DatabaseConnection,
}

impl SeaOrmRecordStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for SeaOrmRecordStore {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord> {
        let now = Utc::now();
        let model = files::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            project_id: Set(record.project_id),
            slug: Set(record.slug),
            storage_path: Set(record.storage_path),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        Ok(model.into())
    }

    async fn update_path(&self, id: &str, storage_path: &str) -> Result<FileRecord> {
        // Only the path and timestamp are written; slug, project and id stay as stored.
        let model = files::ActiveModel {
            id: Unchanged(id.to_string()),
            storage_path: Set(storage_path.to_string()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&self.db)
        .await?;

        Ok(model.into())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<FileRecord>> {
        let model = Files::find()
            .filter(files::Column::Slug.eq(slug))
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<FileRecord>> {
        let model = Files::find_by_id(id.to_string()).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let res = Files::delete_by_id(id.to_string()).exec(&self.db).await?;
        if res.rows_affected == 0 {
            return Err(anyhow!("No file record with id {}", id));
        }
        Ok(())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count = Files::find()
            .filter(files::Column::Slug.eq(slug))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn project_exists(&self, project_id: &str) -> Result<bool> {
        let count = Projects::find_by_id(project_id.to_string())
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn project_summary(&self, project_id: &str) -> Result<Option<ProjectSummary>> {
        let found = Projects::find_by_id(project_id.to_string())
            .find_also_related(Customers)
            .one(&self.db)
            .await?;

        Ok(found.map(|(project, customer)| ProjectSummary {
            id: project.id,
            name: project.name,
            customer_id: project.customer_id,
            customer_name: customer.map(|c| c.name),
        }))
    }

    async fn storage_paths(&self) -> Result<HashSet<String>> {
        let paths: Vec<String> = Files::find()
            .select_only()
            .column(files::Column::StoragePath)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(paths.into_iter().collect())
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}
