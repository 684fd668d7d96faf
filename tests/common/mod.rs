#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use report_publisher::AppState;
use report_publisher::config::AppConfig;
use report_publisher::entities::{customers, projects};
use report_publisher::infrastructure::database;
use report_publisher::models::{FileRecord, NewFileRecord, ProjectSummary};
use report_publisher::services::publish::PublishCoordinator;
use report_publisher::services::records::{RecordStore, SeaOrmRecordStore};
use report_publisher::services::resolver::{PublicLinks, Resolver};
use report_publisher::services::storage::{ObjectSummary, StorageService};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PROJECT_ID: &str = "p1";
pub const CUSTOMER_ID: &str = "c1";
pub const BASE_URL: &str = "https://reports.example.com";

/// Ordered log of blob and row writes shared by the mocks.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub async fn setup_test_db() -> DatabaseConnection {
    // One connection so every query sees the same in-memory database.
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

pub async fn seed_project(db: &DatabaseConnection, project_id: &str, name: &str) {
    if customers::Entity::find_by_id(CUSTOMER_ID.to_string())
        .one(db)
        .await
        .unwrap()
        .is_none()
    {
        customers::ActiveModel {
            id: Set(CUSTOMER_ID.to_string()),
            name: Set("Acme Industrial".to_string()),
            created_at: Set(Some(Utc::now())),
        }
        .insert(db)
        .await
        .unwrap();
    }

    projects::ActiveModel {
        id: Set(project_id.to_string()),
        customer_id: Set(CUSTOMER_ID.to_string()),
        name: Set(name.to_string()),
        created_at: Set(Some(Utc::now())),
    }
    .insert(db)
    .await
    .unwrap();
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

pub struct MockStorageService {
    objects: Mutex<HashMap<String, StoredObject>>,
    journal: Journal,
    pub fail_writes: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_signing: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
    presign_calls: AtomicUsize,
}

impl MockStorageService {
    pub fn new(journal: Journal) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            journal,
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_signing: AtomicBool::new(false),
            write_delay: Mutex::new(None),
            presign_calls: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Places an object directly, as a client holding a signed PUT URL would.
    pub fn put_direct(&self, key: &str, data: &[u8], last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                content_type: "application/pdf".to_string(),
                last_modified,
            },
        );
    }

    pub fn set_last_modified(&self, key: &str, at: DateTime<Utc>) {
        if let Some(obj) = self.objects.lock().unwrap().get_mut(key) {
            obj.last_modified = at;
        }
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    pub fn presign_calls(&self) -> usize {
        self.presign_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn upload_file(&self, key: &str, data: Bytes, content_type: &str) -> anyhow::Result<()> {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected write failure"));
        }
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        self.journal.lock().unwrap().push(format!("blob.write {}", key));
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected delete failure"));
        }
        self.objects.lock().unwrap().remove(key);
        self.journal.lock().unwrap().push(format!("blob.delete {}", key));
        Ok(())
    }

    async fn head_object(&self, key: &str) -> anyhow::Result<Option<ObjectSummary>> {
        Ok(self.get(key).map(|obj| ObjectSummary {
            key: key.to_string(),
            last_modified: Some(obj.last_modified),
        }))
    }

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> anyhow::Result<String> {
        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected signing failure"));
        }
        let n = self.presign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "https://mock-bucket.local/{}?X-Amz-Expires={}&X-Amz-Signature=sig{}",
            key,
            expires_in.as_secs(),
            n
        ))
    }

    async fn presigned_put_url(
        &self,
        key: &str,
        expires_in: Duration,
        _content_type: &str,
    ) -> anyhow::Result<String> {
        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected signing failure"));
        }
        let n = self.presign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "https://mock-bucket.local/{}?X-Amz-Expires={}&X-Amz-Method=PUT&sig{}",
            key,
            expires_in.as_secs(),
            n
        ))
    }

    async fn list_objects(&self, prefix: &str) -> anyhow::Result<Vec<ObjectSummary>> {
        let objects = self.objects.lock().unwrap();
        let mut listed: Vec<ObjectSummary> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectSummary {
                key: key.clone(),
                last_modified: Some(obj.last_modified),
            })
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }

    fn bucket(&self) -> &str {
        "mock-bucket"
    }
}

type Hook = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Real sea-orm store with switchable write failures.
pub struct FlakyRecordStore {
    inner: SeaOrmRecordStore,
    journal: Journal,
    pub fail_inserts: AtomicBool,
    pub fail_updates: AtomicBool,
    pub fail_deletes: AtomicBool,
    storage_paths_hook: Mutex<Option<Hook>>,
}

impl FlakyRecordStore {
    pub fn new(db: DatabaseConnection, journal: Journal) -> Self {
        Self {
            inner: SeaOrmRecordStore::new(db),
            journal,
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            storage_paths_hook: Mutex::new(None),
        }
    }

    /// Runs `hook` once, right after the next `storage_paths` snapshot is taken.
    pub fn after_storage_paths(&self, hook: impl Future<Output = ()> + Send + 'static) {
        *self.storage_paths_hook.lock().unwrap() = Some(Box::pin(hook));
    }
}

#[async_trait]
impl RecordStore for FlakyRecordStore {
    async fn insert(&self, record: NewFileRecord) -> anyhow::Result<FileRecord> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected insert failure"));
        }
        let path = record.storage_path.clone();
        let inserted = self.inner.insert(record).await?;
        self.journal.lock().unwrap().push(format!("row.insert {}", path));
        Ok(inserted)
    }

    async fn update_path(&self, id: &str, storage_path: &str) -> anyhow::Result<FileRecord> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected update failure"));
        }
        let updated = self.inner.update_path(id, storage_path).await?;
        self.journal
            .lock()
            .unwrap()
            .push(format!("row.update {}", storage_path));
        Ok(updated)
    }

    async fn get_by_slug(&self, slug: &str) -> anyhow::Result<Option<FileRecord>> {
        self.inner.get_by_slug(slug).await
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<FileRecord>> {
        self.inner.get_by_id(id).await
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected delete failure"));
        }
        self.inner.delete(id).await?;
        self.journal.lock().unwrap().push(format!("row.delete {}", id));
        Ok(())
    }

    async fn slug_exists(&self, slug: &str) -> anyhow::Result<bool> {
        self.inner.slug_exists(slug).await
    }

    async fn project_exists(&self, project_id: &str) -> anyhow::Result<bool> {
        self.inner.project_exists(project_id).await
    }

    async fn project_summary(&self, project_id: &str) -> anyhow::Result<Option<ProjectSummary>> {
        self.inner.project_summary(project_id).await
    }

    async fn storage_paths(&self) -> anyhow::Result<HashSet<String>> {
        let paths = self.inner.storage_paths().await?;
        let hook = self.storage_paths_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook.await;
        }
        Ok(paths)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.inner.ping().await
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        public_base_url: BASE_URL.to_string(),
        operation_timeout: Duration::from_secs(5),
        ..AppConfig::default()
    }
}

pub struct Harness {
    pub db: DatabaseConnection,
    pub records: Arc<FlakyRecordStore>,
    pub storage: Arc<MockStorageService>,
    pub journal: Journal,
    pub config: AppConfig,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let db = setup_test_db().await;
        seed_project(&db, PROJECT_ID, "Boiler inspection").await;

        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        Self {
            records: Arc::new(FlakyRecordStore::new(db.clone(), journal.clone())),
            storage: Arc::new(MockStorageService::new(journal.clone())),
            db,
            journal,
            config,
        }
    }

    pub fn publisher(&self) -> PublishCoordinator {
        PublishCoordinator::new(
            self.records.clone(),
            self.storage.clone(),
            PublicLinks::new(&self.config.public_base_url).unwrap(),
            self.config.clone(),
        )
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.records.clone(), self.storage.clone(), self.config.clone())
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.config.clone(), self.records.clone(), self.storage.clone()).unwrap()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().unwrap().clear();
    }
}

pub fn pdf(label: &str) -> Bytes {
    Bytes::from(format!("%PDF-1.7\n% {}\n%%EOF\n", label))
}

/// Builds a `multipart/form-data` body with text fields and one file part.
pub fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((name, filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
                boundary, name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}
