use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;

/// Routes whose last segment is a public slug.
const SLUG_ROUTES: [&str; 2] = ["/r/:slug", "/api/resolve/:slug"];

/// Logs one `request_completed` event per request on the `metrics` target,
/// labelled with the route template rather than the raw URI. Slug lookups also
/// carry the slug and whether it resolved, which is what QR scans show up as.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let slug = slug_of(&route, req.uri().path()).map(str::to_string);

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();

    match slug {
        Some(slug) => info!(
            target: "metrics",
            method = %method,
            route = %route,
            slug = %slug,
            resolved = status.is_success() || status.is_redirection(),
            status = %status.as_u16(),
            latency_ms = %latency.as_millis(),
            "request_completed"
        ),
        None => info!(
            target: "metrics",
            method = %method,
            route = %route,
            status = %status.as_u16(),
            latency_ms = %latency.as_millis(),
            "request_completed"
        ),
    }

    response
}

fn slug_of<'a>(route: &str, path: &'a str) -> Option<&'a str> {
    if !SLUG_ROUTES.contains(&route) {
        return None;
    }
    path.rsplit('/').next().filter(|segment| !segment.is_empty())
}
