use std::fmt::Write as _;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use super::route_table;
use crate::state::AppState;

const NO_BINDING: &str = "(no binding)";

pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
<body><h1>{title}</h1>\n{body}</body></html>\n",
        title = escape(title),
    ))
}

/// GET / - server summary and route list.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let cfg = state.config();
    let mut body = String::new();
    let _ = writeln!(body, "<p>API version: {:?}</p>", cfg.api_version);
    let _ = writeln!(body, "<p>L4TM mirror: {}</p>", escape(&cfg.l4tm_mirror));
    body.push_str("<ul>\n");
    for rule in route_table(&cfg.url_prefix) {
        let _ = writeln!(body, "<li><code>{}</code></li>", escape(&rule));
    }
    body.push_str("</ul>\n");
    page("The Machine Manifesting Server", &body)
}

/// GET /node/ - table of every node in the topology.
pub async fn node_index(State(state): State<AppState>) -> Html<String> {
    let prefix = &state.config().url_prefix;
    let bindings = state.bindings().lock().await;
    let mut body = String::from(
        "<table>\n<tr><th>Coordinate</th><th>Hostname</th><th>MAC</th><th>Manifest</th></tr>\n",
    );
    for node in state.registry().nodes() {
        let coordinate = node.coordinate.as_str();
        let _ = writeln!(
            body,
            "<tr><td><a href=\"{prefix}/node/{href}\">{coord}</a></td><td>{host}</td><td>{mac}</td><td>{manifest}</td></tr>",
            href = escape(coordinate),
            coord = escape(coordinate),
            host = escape(&node.hostname),
            mac = escape(&node.mac),
            manifest = escape(bindings.get(coordinate).unwrap_or(NO_BINDING)),
        );
    }
    body.push_str("</table>\n");
    page("TM Nodes", &body)
}

/// GET /node/{coordinate} - detail for one node.
pub async fn node_detail(
    State(state): State<AppState>,
    Path(coordinate): Path<String>,
) -> Response {
    let Some(node) = state.registry().get(&coordinate) else {
        return (StatusCode::NOT_FOUND, page("Not Found", "<p>No such node.</p>")).into_response();
    };
    let manifest = state
        .bindings()
        .lock()
        .await
        .get(&coordinate)
        .unwrap_or(NO_BINDING)
        .to_string();
    let body = format!(
        "<dl>\n<dt>Coordinate</dt><dd>{}</dd>\n<dt>Hostname</dt><dd>{}</dd>\n\
<dt>MAC</dt><dd>{}</dd>\n<dt>Manifest</dt><dd>{}</dd>\n</dl>\n",
        escape(node.coordinate.as_str()),
        escape(&node.hostname),
        escape(&node.mac),
        escape(&manifest),
    );
    page(&format!("TM Node {}", node.hostname), &body).into_response()
}
