//! HTTP surface.
//!
//! The dispatcher is mounted as the router's fallback so a protocol response
//! is recognized no matter which path the IdP delivers it to — strict mode,
//! not the route table, decides whether it is processed. A request that
//! matches no route falls through to a plain 404, the host's normal
//! behavior.

use axum::{
    Json, Router,
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::get,
};
use http::{Method, StatusCode, header};
use serde::Serialize;

use crate::{
    AppState, dispatcher, handlers,
    request::{RequestContext, RequestSnapshot, classify_response},
    url_util,
};

/// Largest form body the dispatcher will buffer. SAML POST bindings carry
/// whole assertions, so this is well above typical OIDC form posts.
const MAX_FORM_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .fallback(dispatch)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Classify the request and run the selected flow handler, at most once.
async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let query_pairs = parts
        .uri
        .query()
        .map(parse_pairs)
        .unwrap_or_default();

    let form_pairs = if parts.method == Method::POST && is_form(&parts.headers) {
        match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => parse_pairs(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read form body");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let mut snapshot = RequestSnapshot::from_parts(query_pairs, form_pairs);
    let mut ctx = RequestContext::new();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let current_url =
        url_util::current_url(&parts.headers, path_and_query, &state.config.server.base_url);

    if let Err(error) = classify_response(&snapshot, &mut ctx, &state.config) {
        tracing::error!(error = %error, "Rejected authentication response");
        return handlers::goodbye(&state.config, error.error_code());
    }

    let route = dispatcher::classify(
        &mut snapshot,
        &mut ctx,
        &state.config,
        &state.services,
        current_url.as_deref(),
    );

    match route {
        Some(route) => {
            tracing::debug!(route = ?route, "Route selected");
            handlers::execute(
                route,
                &snapshot,
                &mut ctx,
                &state.config,
                &state.services,
                current_url.as_deref(),
            )
            .await
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn is_form(headers: &http::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn parse_pairs(input: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
