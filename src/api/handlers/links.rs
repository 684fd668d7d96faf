use crate::AppState;
use crate::api::error::AppError;
use crate::services::resolver::ViewerPage;
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ResolveResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub page: ViewerPage,
}

#[utoipa::path(
    get,
    path = "/api/resolve/{slug}",
    params(("slug" = String, Path, description = "Public report slug")),
    responses(
        (status = 200, description = "Fresh signed URL for the current document", body = ResolveResponse),
        (status = 404, description = "Unknown slug")
    ),
    tag = "links"
)]
pub async fn resolve_link(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ResolveResponse>, AppError> {
    let page = state.resolver.view(&slug).await?;
    Ok(Json(ResolveResponse { ok: true, page }))
}

/// Target of the QR code. Redirects to a freshly signed URL on every hit.
#[utoipa::path(
    get,
    path = "/r/{slug}",
    params(("slug" = String, Path, description = "Public report slug")),
    responses(
        (status = 307, description = "Redirect to the signed document URL"),
        (status = 404, description = "Unknown slug")
    ),
    tag = "links"
)]
pub async fn redirect_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let link = state.resolver.resolve(&slug).await?;

    Ok((
        StatusCode::TEMPORARY_REDIRECT,
        [
            (header::LOCATION, link.signed_url),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response())
}
