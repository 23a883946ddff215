//! HTTP routes
//!
//! Two endpoints are proxied:
//! - `GET /users/suggestions/{slug}` → `users/suggestions/<slug>`, always with
//!   `include_entities=true`; the inbound query is ignored. Slugs other than
//!   `[A-Za-z0-9_-]+` answer 404 without reaching upstream.
//! - `GET /statuses/user_timeline` → `statuses/user_timeline` with the inbound
//!   query string.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;

use crate::cache::{CacheOrchestrator, Params};

/// Builds the proxy router
pub fn build_router(cache: CacheOrchestrator) -> Router {
    Router::new()
        .route("/users/suggestions/{slug}", get(users_suggestions))
        .route("/statuses/user_timeline", get(user_timeline))
        .with_state(cache)
}

/// Serves `router` until Ctrl-C
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn users_suggestions(
    State(cache): State<CacheOrchestrator>,
    Path(slug): Path<String>,
) -> Response {
    tracing::debug!(%slug, "users suggestions request");
    if !is_valid_slug(&slug) {
        tracing::debug!(%slug, "rejecting suggestion category");
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"errors": [{"message": "unknown suggestion category"}]})),
        )
            .into_response();
    }
    let mut params = Params::new();
    params.insert("include_entities".to_string(), "true".to_string());
    pass_through(&cache, &format!("users/suggestions/{}", slug), &params).await
}

/// Suggestion category slugs are plain words; anything else could change
/// which upstream path is requested
fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn user_timeline(
    State(cache): State<CacheOrchestrator>,
    Query(params): Query<Params>,
) -> Response {
    tracing::debug!("user timeline request");
    pass_through(&cache, "statuses/user_timeline", &params).await
}

/// Answers from the cache, or with the upstream's status and body on failure
///
/// The cache write handle is dropped so the response is not held up by it.
async fn pass_through(cache: &CacheOrchestrator, endpoint: &str, params: &Params) -> Response {
    match cache.serve(endpoint, params).await {
        Ok(served) => {
            tracing::debug!(endpoint, origin = ?served.origin, "returning data");
            Json(served.payload).into_response()
        }
        Err(e) => {
            let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(e.body())).into_response()
        }
    }
}
