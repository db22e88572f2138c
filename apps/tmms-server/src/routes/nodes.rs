use std::collections::BTreeMap;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::builder::BuildOutcome;
use crate::error::BindError;
use crate::metrics::BIND_REQUESTS;
use crate::state::AppState;

/// Placeholder build status reported for every binding; no build state is
/// tracked yet.
pub const BINDING_STATUS: &str = "Unknown";

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeListResponse {
    pub nodes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BindingInfo {
    pub manifest: String,
    pub status: String,
    /// The manifest's comment; `None` when the bound manifest no longer
    /// resolves.
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BindingListResponse {
    pub mappings: BTreeMap<String, BindingInfo>,
}

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    pub manifest: String,
}

/// GET /api/nodes/ - every coordinate known to the topology.
pub async fn list_nodes(State(state): State<AppState>) -> Json<NodeListResponse> {
    Json(NodeListResponse {
        nodes: state
            .registry()
            .coordinates()
            .map(|coordinate| coordinate.to_string())
            .collect(),
    })
}

/// GET /api/node/ - all current bindings.
pub async fn list_bindings(State(state): State<AppState>) -> Response {
    let snapshot: Vec<(String, String)> = {
        let bindings = state.bindings().lock().await;
        bindings
            .all()
            .map(|(coordinate, manifest)| (coordinate.to_string(), manifest.to_string()))
            .collect()
    };
    if snapshot.is_empty() {
        debug!("there are no manifests associated with any nodes");
        return StatusCode::NO_CONTENT.into_response();
    }

    let mappings = snapshot
        .into_iter()
        .map(|(coordinate, manifest)| {
            let message = state.manifests().lookup(&manifest).map(|m| m.comment);
            let info = BindingInfo {
                manifest,
                status: BINDING_STATUS.to_string(),
                message,
            };
            (coordinate, info)
        })
        .collect();
    Json(BindingListResponse { mappings }).into_response()
}

/// GET /api/node/{coordinate} - the binding for one node.
pub async fn get_binding(
    State(state): State<AppState>,
    Path(coordinate): Path<String>,
) -> Response {
    if !state.registry().contains(&coordinate) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "Not Found": "The specified node does not exist." })),
        )
            .into_response();
    }

    let bound = state
        .bindings()
        .lock()
        .await
        .get(&coordinate)
        .map(str::to_string);
    let Some(manifest_ref) = bound else {
        debug!(%coordinate, "there is no manifest associated with the node");
        return StatusCode::NO_CONTENT.into_response();
    };
    let Some(manifest) = state.manifests().lookup(&manifest_ref) else {
        warn!(%coordinate, manifest = %manifest_ref, "bound manifest no longer resolves");
        return StatusCode::NO_CONTENT.into_response();
    };

    Json(BindingInfo {
        manifest: manifest_ref,
        status: BINDING_STATUS.to_string(),
        message: Some(manifest.comment),
    })
    .into_response()
}

/// PUT /api/node/{coordinate} - bind a node to a manifest and build its image.
pub async fn bind_node(
    State(state): State<AppState>,
    Path(coordinate): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<BuildOutcome, BindError> {
    let result = bind(&state, &coordinate, &headers, body).await;
    match &result {
        Ok(outcome) => {
            BIND_REQUESTS
                .with_label_values(&[outcome.metric_label()])
                .inc();
            info!(%coordinate, status = outcome.status().as_u16(), "node bound");
        }
        Err(err) => {
            BIND_REQUESTS.with_label_values(&[err.metric_label()]).inc();
            warn!(%coordinate, status = err.status().as_u16(), error = %err, "bind request failed");
        }
    }
    result
}

async fn bind(
    state: &AppState,
    coordinate: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<BuildOutcome, BindError> {
    let limit = state.config().max_bind_body_bytes;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|length| length >= limit) {
        return Err(BindError::PayloadTooLarge);
    }
    let bytes = axum::body::to_bytes(body, limit.saturating_sub(1))
        .await
        .map_err(|_| BindError::PayloadTooLarge)?;

    let request: BindRequest = serde_json::from_slice(&bytes)
        .map_err(|err| BindError::BadRequest(format!("Malformed request body: {err}")))?;

    let manifest = state.manifests().lookup(&request.manifest);
    let node = state.registry().get(coordinate);
    let (Some(manifest), Some(node)) = (manifest, node) else {
        debug!(
            %coordinate,
            manifest = %request.manifest,
            node_known = node.is_some(),
            "bind target missing"
        );
        return Err(BindError::NotFound);
    };

    state
        .bindings()
        .lock()
        .await
        .set(node.coordinate.clone(), manifest.binding_ref());

    Ok(state.builder().build_node(&manifest, node).await?)
}
