use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Failures while preparing or running a node image build.
///
/// All of these are server-side: the request was fine, the host was not.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Can not customize image for node \"{coordinate}\"! No \"Golden Image\" found!")]
    GoldenImageMissing { coordinate: String },
    #[error("Failed to create \"{}\" folder!", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Customize(String),
}

impl BuildError {
    pub fn metric_label(&self) -> &'static str {
        match self {
            BuildError::GoldenImageMissing { .. } => "golden_missing",
            BuildError::CreateDir { .. } => "mkdir_failed",
            BuildError::Customize(_) => "customize_failed",
        }
    }
}

/// Outcome of a rejected bind request, rendered as a single-key JSON body.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Too big")]
    PayloadTooLarge,
    #[error("{0}")]
    BadRequest(String),
    /// Unknown node and unknown manifest are deliberately reported the same way.
    #[error("The specified node or manifest does not exist.")]
    NotFound,
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl BindError {
    pub fn status(&self) -> StatusCode {
        match self {
            BindError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            BindError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BindError::NotFound => StatusCode::NOT_FOUND,
            BindError::Build(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            BindError::PayloadTooLarge => "too_large",
            BindError::BadRequest(_) => "bad_request",
            BindError::NotFound => "not_found",
            BindError::Build(err) => err.metric_label(),
        }
    }

    fn body(&self) -> Value {
        let message = self.to_string();
        match self {
            BindError::PayloadTooLarge | BindError::BadRequest(_) => json!({ "error": message }),
            BindError::NotFound => json!({ "Not Found": message }),
            BindError::Build(_) => json!({ "Internal Server Error": message }),
        }
    }
}

impl IntoResponse for BindError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Rejection produced by the API version check before any handler runs.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("I see no JSON here. Did you forget \"application/json\" in request header?")]
    NotJson,
    #[error("I see no version here. Did you forget \"version\" in request header?")]
    MissingVersion,
    #[error("Bad version: {got:?} != {want:?}")]
    BadVersion { got: f64, want: f64 },
}

impl IntoResponse for HeaderError {
    fn into_response(self) -> Response {
        let status = match self {
            HeaderError::NotJson => StatusCode::NOT_ACCEPTABLE,
            HeaderError::MissingVersion | HeaderError::BadVersion { .. } => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_errors_share_the_server_error_class() {
        let golden = BindError::from(BuildError::GoldenImageMissing {
            coordinate: "R1-E1-N1".into(),
        });
        let mkdir = BindError::from(BuildError::CreateDir {
            path: PathBuf::from("/var/lib/tmms/sys-images/node01"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(golden.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(mkdir.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_ne!(golden.to_string(), mkdir.to_string());
        assert_eq!(
            mkdir.body(),
            json!({ "Internal Server Error": "Failed to create \"/var/lib/tmms/sys-images/node01\" folder!" })
        );
    }

    #[test]
    fn client_errors_use_the_error_key() {
        assert_eq!(BindError::PayloadTooLarge.body(), json!({ "error": "Too big" }));
        assert_eq!(
            BindError::NotFound.body(),
            json!({ "Not Found": "The specified node or manifest does not exist." })
        );
        assert_eq!(BindError::NotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bad_version_message_keeps_decimal_point() {
        let err = HeaderError::BadVersion { got: 2.0, want: 1.0 };
        assert_eq!(err.to_string(), "Bad version: 2.0 != 1.0");
    }
}
