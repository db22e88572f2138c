mod html;
mod images;
mod nodes;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::HeaderError;
use crate::metrics;
use crate::state::AppState;

pub use nodes::{BindRequest, BindingInfo, BindingListResponse, NodeListResponse, BINDING_STATUS};

/// Routes registered under the configured prefix, as shown on the index page.
const PREFIXED_ROUTES: &[(&str, &str)] = &[
    ("GET", "/"),
    ("GET", "/api/nodes/"),
    ("GET", "/api/node/"),
    ("GET", "/api/node/{coordinate}"),
    ("PUT", "/api/node/{coordinate}"),
    ("GET", "/node/"),
    ("GET", "/node/{coordinate}"),
    ("GET", "/image/"),
    ("GET", "/image/{name}"),
];

pub fn router(state: AppState) -> Router {
    let prefix = state.config().url_prefix.clone();
    let at = |path: &str| format!("{prefix}{path}");

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_handler))
        .route(&at("/"), get(html::index))
        .route(&at("/api/nodes/"), get(nodes::list_nodes))
        .route(&at("/api/node/"), get(nodes::list_bindings))
        .route(
            &at("/api/node/*coordinate"),
            get(nodes::get_binding).put(nodes::bind_node),
        )
        .route(&at("/node/"), get(html::node_index))
        .route(&at("/node/*coordinate"), get(html::node_detail))
        .route(&at("/image/"), get(images::image_index))
        .route(&at("/image/:name"), get(images::download_image))
        .layer(middleware::from_fn_with_state(state.clone(), api_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn route_table(prefix: &str) -> Vec<String> {
    PREFIXED_ROUTES
        .iter()
        .map(|(method, path)| format!("{method} {prefix}{path}"))
        .collect()
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime_secs(),
        "nodes": state.registry().len(),
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}

/// Enforces the `Accept: application/json; version=<n>` contract on API
/// paths and tags every response's content type with the API version.
async fn api_version(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let want = state.config().api_version;
    let mut response = if request.uri().path().contains("/api/") {
        match check_accept(request.headers(), want) {
            Ok(()) => next.run(request).await,
            Err(err) => err.into_response(),
        }
    } else {
        next.run(request).await
    };
    append_version(response.headers_mut(), want);
    response
}

pub(crate) fn check_accept(headers: &HeaderMap, want: f64) -> Result<(), HeaderError> {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !accept.contains("application/json") {
        return Err(HeaderError::NotJson);
    }
    let got = accept
        .split(';')
        .filter(|elem| elem.contains("version"))
        .find_map(|elem| elem.rsplit('=').next()?.trim().parse::<f64>().ok())
        .filter(|version| *version >= 0.0)
        .ok_or(HeaderError::MissingVersion)?;
    if got != want {
        return Err(HeaderError::BadVersion { got, want });
    }
    Ok(())
}

fn append_version(headers: &mut HeaderMap, version: f64) {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return;
    };
    if let Ok(tagged) = HeaderValue::from_str(&format!("{content_type};version={version:?}")) {
        headers.insert(header::CONTENT_TYPE, tagged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_matching_json_version() {
        assert!(check_accept(&accept("application/json; version=1.0"), 1.0).is_ok());
        assert!(check_accept(&accept("application/json;version=1"), 1.0).is_ok());
    }

    #[test]
    fn rejects_missing_json_or_version() {
        assert!(matches!(
            check_accept(&HeaderMap::new(), 1.0),
            Err(HeaderError::NotJson)
        ));
        assert!(matches!(
            check_accept(&accept("text/html; version=1.0"), 1.0),
            Err(HeaderError::NotJson)
        ));
        assert!(matches!(
            check_accept(&accept("application/json"), 1.0),
            Err(HeaderError::MissingVersion)
        ));
        assert!(matches!(
            check_accept(&accept("application/json; version=abc"), 1.0),
            Err(HeaderError::MissingVersion)
        ));
    }

    #[test]
    fn rejects_other_versions() {
        assert!(matches!(
            check_accept(&accept("application/json; version=2.0"), 1.0),
            Err(HeaderError::BadVersion { got, .. }) if got == 2.0
        ));
    }

    #[test]
    fn content_type_gets_version_suffix() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        append_version(&mut headers, 1.0);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json;version=1.0");

        let mut bare = HeaderMap::new();
        append_version(&mut bare, 1.0);
        assert!(bare.get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn route_table_uses_prefix() {
        let table = route_table("/manifesting");
        assert!(table.contains(&"PUT /manifesting/api/node/{coordinate}".to_string()));
        assert_eq!(table.len(), PREFIXED_ROUTES.len());
    }
}
