pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::publish::PublishCoordinator;
use crate::services::records::RecordStore;
use crate::services::resolver::{PublicLinks, Resolver};
use crate::services::storage::StorageService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::files::ingest,
        api::handlers::files::replace,
        api::handlers::files::init_upload,
        api::handlers::files::record_file,
        api::handlers::files::delete,
        api::handlers::links::resolve_link,
        api::handlers::links::redirect_slug,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::FileRecord,
            services::publish::RecordCommand,
            services::resolver::ResolvedLink,
            services::resolver::ViewerPage,
            api::handlers::files::IngestResponse,
            api::handlers::files::ReplaceResponse,
            api::handlers::files::InitUploadRequest,
            api::handlers::files::InitUploadResponse,
            api::handlers::files::RecordFileResponse,
            api::handlers::files::DeleteRequest,
            api::handlers::files::DeleteResponse,
            api::handlers::links::ResolveResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "files", description = "Publishing and replacing reports"),
        (name = "links", description = "Public slug resolution"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub storage: Arc<dyn StorageService>,
    pub publisher: Arc<PublishCoordinator>,
    pub resolver: Arc<Resolver>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageService>,
    ) -> anyhow::Result<Self> {
        let links = PublicLinks::new(&config.public_base_url)?;
        let publisher = PublishCoordinator::new(
            records.clone(),
            storage.clone(),
            links,
            config.clone(),
        );
        let resolver = Resolver::new(records.clone(), storage.clone(), config.clone());

        Ok(Self {
            records,
            storage,
            publisher: Arc::new(publisher),
            resolver: Arc::new(resolver),
            config,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/api/ingest", post(api::handlers::files::ingest))
        .route("/api/replace", post(api::handlers::files::replace))
        .route("/api/init-upload", post(api::handlers::files::init_upload))
        .route("/api/record-file", post(api::handlers::files::record_file))
        .route("/api/delete", post(api::handlers::files::delete))
        .route("/api/resolve/:slug", get(api::handlers::links::resolve_link))
        .route("/r/:slug", get(api::handlers::links::redirect_slug))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        // Extra room for multipart framing around the document itself.
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_file_size + 1024 * 1024,
        ))
        .with_state(state)
}
