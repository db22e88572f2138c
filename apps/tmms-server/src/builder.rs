//! Build trigger: turns a bound manifest into a node boot image.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tmms_core::{Manifest, Node};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::customize::{BuildRequest, ImageCustomizer};
use crate::error::BuildError;
use crate::metrics::BUILDS;

const CREATED_MESSAGE: &str = "The manifest for the specified node has been set. \
This means the build process for a fresh filesystem image has been started.";
const UPDATED_MESSAGE: &str = "The manifest for the specified node has been changed. \
This means the build process for a fresh filesystem image has been started.";

/// How a successful bind is reported. Presentation only: both paths run the
/// same build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// No boot images existed for the node yet.
    Created,
    /// Boot images already existed and are being replaced.
    Updated,
}

impl BuildOutcome {
    pub fn status(self) -> StatusCode {
        match self {
            BuildOutcome::Created => StatusCode::CREATED,
            BuildOutcome::Updated => StatusCode::OK,
        }
    }

    pub fn metric_label(self) -> &'static str {
        match self {
            BuildOutcome::Created => "created",
            BuildOutcome::Updated => "updated",
        }
    }
}

impl IntoResponse for BuildOutcome {
    fn into_response(self) -> Response {
        let body = match self {
            BuildOutcome::Created => json!({ "Created": CREATED_MESSAGE }),
            BuildOutcome::Updated => json!({ "OK": UPDATED_MESSAGE }),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Filesystem layout used by the build.
#[derive(Debug, Clone)]
pub struct BuildPaths {
    pub golden_image: PathBuf,
    /// Per-node build directories live here, named by hostname.
    pub filesystem_images: PathBuf,
    /// Per-node delivery directories live here, named by hostname.
    pub tftp_images: PathBuf,
}

impl BuildPaths {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            golden_image: cfg.golden_image(),
            filesystem_images: cfg.filesystem_images(),
            tftp_images: cfg.tftp_images_dir(),
        }
    }

    pub fn build_dir(&self, node: &Node) -> PathBuf {
        self.filesystem_images.join(&node.hostname)
    }

    pub fn delivery_dir(&self, node: &Node) -> PathBuf {
        self.tftp_images.join(&node.hostname)
    }
}

pub struct BuildTrigger {
    paths: BuildPaths,
    dry_run: bool,
    customizer: Arc<dyn ImageCustomizer>,
    // Builds run one at a time.
    serial: Mutex<()>,
}

impl BuildTrigger {
    pub fn new(paths: BuildPaths, dry_run: bool, customizer: Arc<dyn ImageCustomizer>) -> Self {
        Self {
            paths,
            dry_run,
            customizer,
            serial: Mutex::new(()),
        }
    }

    /// Builds the image for `node` from `manifest`.
    ///
    /// The Created/Updated framing is decided before any work. Dry runs stop
    /// after the framing and never touch the filesystem.
    pub async fn build_node(&self, manifest: &Manifest, node: &Node) -> Result<BuildOutcome, BuildError> {
        let result = self.run(manifest, node).await;
        let label = match &result {
            Ok(outcome) => outcome.metric_label(),
            Err(err) => err.metric_label(),
        };
        BUILDS.with_label_values(&[label]).inc();
        result
    }

    async fn run(&self, manifest: &Manifest, node: &Node) -> Result<BuildOutcome, BuildError> {
        if !tokio::fs::try_exists(&self.paths.golden_image).await.unwrap_or(false) {
            warn!(
                coordinate = %node.coordinate,
                golden = %self.paths.golden_image.display(),
                "golden image missing"
            );
            return Err(BuildError::GoldenImageMissing {
                coordinate: node.coordinate.to_string(),
            });
        }

        let build_dir = self.paths.build_dir(node);
        let delivery_dir = self.paths.delivery_dir(node);
        let outcome = if has_boot_images(&delivery_dir).await {
            BuildOutcome::Updated
        } else {
            BuildOutcome::Created
        };

        if self.dry_run {
            info!(
                coordinate = %node.coordinate,
                hostname = %node.hostname,
                manifest = %manifest.binding_ref(),
                outcome = outcome.metric_label(),
                "dry run; skipping image build"
            );
            return Ok(outcome);
        }

        let _serial = self.serial.lock().await;

        tokio::fs::create_dir_all(&build_dir)
            .await
            .map_err(|source| BuildError::CreateDir {
                path: build_dir.clone(),
                source,
            })?;

        let working_copy = self
            .customizer
            .untar(&self.paths.golden_image, &build_dir.join("untar"))
            .await
            .map_err(|err| BuildError::Customize(err.to_string()))?;
        debug!(working_copy = %working_copy.display(), "working copy ready");

        let status = self
            .customizer
            .execute(&BuildRequest {
                working_copy,
                hostname: node.hostname.clone(),
                tftp_dir: delivery_dir,
                packages: manifest.packages.clone(),
            })
            .await;
        if status.is_server_error() {
            return Err(BuildError::Customize(status.message));
        }

        info!(
            coordinate = %node.coordinate,
            hostname = %node.hostname,
            manifest = %manifest.binding_ref(),
            outcome = outcome.metric_label(),
            "node image build finished"
        );
        Ok(outcome)
    }
}

/// True when the delivery dir already holds a `*.cpio` boot image.
pub async fn has_boot_images(delivery_dir: &Path) -> bool {
    let Ok(mut entries) = tokio::fs::read_dir(delivery_dir).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry
            .file_type()
            .await
            .map(|kind| kind.is_file())
            .unwrap_or(false);
        if is_file && entry.file_name().to_string_lossy().ends_with(".cpio") {
            return true;
        }
    }
    false
}
