#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, Response},
    Router,
};
use tempfile::TempDir;
use tmms_core::{Node, NodeRegistry};
use tmms_server::config::AppConfig;
use tmms_server::customize::{BuildRequest, BuildStatus, CustomizeError, ImageCustomizer};
use tmms_server::routes;
use tmms_server::state::AppState;
use tower::util::ServiceExt;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const ACCEPT_JSON: &str = "application/json; version=1.0";

/// Writes a `<hostname>.cpio` into the delivery dir like a real build would.
#[derive(Default)]
pub struct RecordingCustomizer {
    pub calls: Mutex<Vec<BuildRequest>>,
}

impl RecordingCustomizer {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageCustomizer for RecordingCustomizer {
    async fn untar(&self, _golden: &Path, destination: &Path) -> Result<PathBuf, CustomizeError> {
        fs::create_dir_all(destination).map_err(|source| CustomizeError::Prepare {
            path: destination.to_path_buf(),
            source,
        })?;
        Ok(destination.to_path_buf())
    }

    async fn execute(&self, request: &BuildRequest) -> BuildStatus {
        fs::create_dir_all(&request.tftp_dir).unwrap();
        fs::write(
            request.tftp_dir.join(format!("{}.cpio", request.hostname)),
            b"cpio",
        )
        .unwrap();
        self.calls.lock().unwrap().push(request.clone());
        BuildStatus::ok("built")
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub cfg: AppConfig,
    pub customizer: Arc<RecordingCustomizer>,
}

impl Fixture {
    pub fn new(dry_run: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig {
            manifesting_root: dir.path().to_path_buf(),
            dry_run,
            ..AppConfig::default()
        };
        fs::create_dir_all(cfg.manifest_uploads()).unwrap();
        let fixture = Self {
            dir,
            cfg,
            customizer: Arc::new(RecordingCustomizer::default()),
        };
        fixture.write_manifest(
            "base-manifest",
            serde_json::json!({ "_comment": "Minimal node", "packages": ["vim", "openssh-server"] }),
        );
        fixture.write_manifest(
            "lab/compute",
            serde_json::json!({ "_comment": "Compute node", "packages": ["gcc"] }),
        );
        fixture
    }

    pub fn with_golden(self) -> Self {
        let golden = self.cfg.golden_image();
        fs::create_dir_all(golden.parent().unwrap()).unwrap();
        fs::write(golden, b"golden").unwrap();
        self
    }

    pub fn write_manifest(&self, name: &str, body: serde_json::Value) {
        let path = self.cfg.manifest_uploads().join(format!("{name}.json"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body.to_string()).unwrap();
    }

    pub fn registry() -> NodeRegistry {
        NodeRegistry::from_nodes(vec![
            Node {
                coordinate: "R1-E1-N1".into(),
                hostname: "node01".into(),
                mac: "52:54:00:00:01:01".into(),
            },
            Node {
                coordinate: "R1-E1-N2".into(),
                hostname: "node02".into(),
                mac: "52:54:00:00:01:02".into(),
            },
        ])
        .unwrap()
    }

    /// A fresh router over the fixture's directories; bindings are reloaded
    /// from disk each time.
    pub fn app(&self) -> Router {
        let state = AppState::from_config(
            self.cfg.clone(),
            Self::registry(),
            self.customizer.clone(),
        );
        routes::router(state)
    }

    pub fn build_dir(&self, hostname: &str) -> PathBuf {
        self.cfg.filesystem_images().join(hostname)
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("accept", ACCEPT_JSON)
        .body(Body::empty())
        .unwrap()
}

pub fn put_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("accept", ACCEPT_JSON)
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = body::to_bytes(response.into_body(), 1024 * 64).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn text_body(response: Response<Body>) -> String {
    let bytes = body::to_bytes(response.into_body(), 1024 * 64).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
