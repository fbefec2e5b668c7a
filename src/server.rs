//! HTTP transport for [`RequestHandler`].
//!
//! `/query` accepts every method and lets the handler answer non-POST
//! requests with its 405 envelope. `/health` reports the backend the adapter
//! would currently pick.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::RequestContext;
use crate::config::ServerConfig;
use crate::handler::{HandlerRequest, HandlerResponse, RequestHandler};

/// Header carrying the caller's comma-separated namespace allow-list.
pub const ALLOWED_NAMESPACES_HEADER: &str = "x-allowed-namespaces";

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type AppState = Arc<RequestHandler>;

/// Serves `handler` on `config`'s address until Ctrl-C, then disposes the
/// primary backend once no connection holds the handler any more.
pub async fn serve(
    config: &ServerConfig,
    mut handler: Arc<RequestHandler>,
) -> Result<(), ServerError> {
    let app = build_router(handler.clone(), &config.allow_origins);
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(
        %addr,
        operations = handler.registry().len(),
        allow_origins = ?config.allow_origins,
        "shapeline listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match Arc::get_mut(&mut handler).map(|handler| handler.dispose()) {
        Some(true) => tracing::info!("engine adapter disposed"),
        _ => tracing::debug!("engine adapter still shared; skipping dispose"),
    }
    Ok(())
}

/// Router exposing `handler`; CORS is enabled when `allow_origins` is
/// non-empty.
pub fn build_router(handler: Arc<RequestHandler>, allow_origins: &[String]) -> Router {
    let mut router = Router::new()
        .route("/query", any(query_handler))
        .route("/health", get(health_handler));

    if let Some(layer) = build_cors_layer(allow_origins) {
        router = router.layer(layer);
    }

    router.with_state(handler).layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let trimmed = origin.trim().trim_end_matches('/');
            match HeaderValue::from_str(trimmed) {
                Ok(value) if !trimmed.is_empty() => Some(value),
                _ => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                ACCEPT,
                CONTENT_TYPE,
                HeaderName::from_static(ALLOWED_NAMESPACES_HEADER),
            ]),
    )
}

async fn query_handler(
    State(handler): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = HandlerRequest {
        method,
        body,
        context: context_from_headers(&headers),
    };
    handler.handle(request).await.into_response()
}

/// Request context derived from transport headers.
///
/// `x-allowed-namespaces` can only narrow the policy's configured allow-list.
pub fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let mut context = RequestContext::new();
    if let Some(raw) = headers
        .get(ALLOWED_NAMESPACES_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        context.allowed_namespaces = Some(RequestContext::parse_namespace_list(raw));
    }
    context
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    engine: Option<&'static str>,
}

async fn health_handler(State(handler): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        engine: handler.adapter().active_engine_name().await,
    })
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}
