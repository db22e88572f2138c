use std::fmt::Write as _;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use super::html::{escape, page};
use crate::state::AppState;

/// GET /image/ - downloadable filesystem tarballs.
pub async fn image_index(State(state): State<AppState>) -> Html<String> {
    let prefix = &state.config().url_prefix;
    let mut body = String::from("<ul>\n");
    for name in state.images().names() {
        let _ = writeln!(
            body,
            "<li><a href=\"{prefix}/image/{href}\">{label}</a></li>",
            href = escape(name),
            label = escape(name),
        );
    }
    body.push_str("</ul>\n");
    page("L4TM images", &body)
}

/// GET /image/{name} - stream one tarball as an attachment.
pub async fn download_image(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Some(path) = state.images().lookup(&name) else {
        return (StatusCode::NOT_FOUND, page("Not Found", "<p>No such image.</p>")).into_response();
    };
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            error!(image = %name, path = %path.display(), error = %err, "failed to open image");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    info!(image = %name, "serving image download");
    let headers = [
        (header::CONTENT_TYPE, "application/x-tar".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", name.replace('"', "")),
        ),
    ];
    (headers, Body::from_stream(ReaderStream::new(file))).into_response()
}
