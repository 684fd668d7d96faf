use crate::config::AppConfig;
use crate::models::FileRecord;
use crate::services::records::RecordStore;
use crate::services::storage::StorageService;
use crate::services::{ServiceError, with_timeout};
use anyhow::{Result, anyhow};
use serde::Serialize;
use std::sync::Arc;
use url::Url;
use utoipa::ToSchema;

/// Builds the permanent public links that QR codes encode.
#[derive(Debug, Clone)]
pub struct PublicLinks {
    base: Url,
}

impl PublicLinks {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| anyhow!("Invalid public base URL '{}': {}", base, e))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("Public base URL '{}' cannot carry a path", base));
        }
        Ok(Self { base })
    }

    /// `{base}/r/{slug}`. Stable for the lifetime of the record.
    pub fn public_url(&self, slug: &str) -> String {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("r").push(slug);
        }
        url.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLink {
    pub slug: String,
    pub storage_path: String,
    pub signed_url: String,
    /// Seconds until `signed_url` stops working.
    pub expires_in: u64,
}

/// Everything the public viewer shows for a slug.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewerPage {
    #[serde(flatten)]
    pub link: ResolvedLink,
    pub project_id: String,
    pub project_name: String,
    pub customer_name: String,
    pub inspect_path: String,
}

/// Read side of the service: slug → short-lived signed URL.
///
/// Every call reads the current row, so a replace is visible to the very next
/// resolve. Nothing is cached here.
pub struct Resolver {
    records: Arc<dyn RecordStore>,
    storage: Arc<dyn StorageService>,
    config: AppConfig,
}

impl Resolver {
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

    pub async fn resolve(&self, slug: &str) -> Result<ResolvedLink, ServiceError> {
        let record = self.lookup(slug).await?;
        self.sign(record).await
    }

    /// Resolves the slug and adds the project/customer names for display.
    /// Missing names render as empty strings rather than failing the page.
    pub async fn view(&self, slug: &str) -> Result<ViewerPage, ServiceError> {
        let record = self.lookup(slug).await?;
        let project_id = record.project_id.clone();
        let link = self.sign(record).await?;

        let summary = match with_timeout(
            self.config.operation_timeout,
            "project lookup",
            self.records.project_summary(&project_id),
        )
        .await
        {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("⚠️ Could not load project {}: {}", project_id, e);
                None
            }
        };

        let (project_name, customer_name) = summary
            .map(|s| (s.name, s.customer_name.unwrap_or_default()))
            .unwrap_or_default();

        Ok(ViewerPage {
            inspect_path: inspect_path(&project_id),
            project_id,
            project_name,
            customer_name,
            link,
        })
    }

    async fn lookup(&self, slug: &str) -> Result<FileRecord, ServiceError> {
        with_timeout(
            self.config.operation_timeout,
            "slug lookup",
            self.records.get_by_slug(slug),
        )
        .await
        .map_err(|e| ServiceError::RecordReadFailure(e.to_string()))?
        .ok_or_else(|| ServiceError::NotFound(format!("Unknown link '{}'", slug)))
    }

    async fn sign(&self, record: FileRecord) -> Result<ResolvedLink, ServiceError> {
        let ttl = self.config.signed_url_ttl;
        let signed_url = with_timeout(
            self.config.operation_timeout,
            "url signing",
            self.storage.presigned_get_url(&record.storage_path, ttl),
        )
        .await
        .map_err(|e| {
            tracing::error!(
                "❌ Failed to sign {} for slug {}: {}",
                record.storage_path,
                record.slug,
                e
            );
            ServiceError::SigningFailure(e.to_string())
        })?;

        tracing::debug!(slug = %record.slug, "🔗 Resolved to {}", record.storage_path);

        Ok(ResolvedLink {
            slug: record.slug,
            storage_path: record.storage_path,
            signed_url,
            expires_in: ttl.as_secs(),
        })
    }
}

fn inspect_path(project_id: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("project_id", project_id)
        .finish();
    format!("/inspect?{}", query)
}
