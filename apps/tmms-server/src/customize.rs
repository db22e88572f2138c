//! Image customization: unpack the golden image and apply a package list.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Status code a customizer reports on success.
pub const STATUS_OK: u16 = 200;
/// Status code a customizer reports when the build could not be completed.
pub const STATUS_FAILED: u16 = 500;

const STDERR_TAIL_BYTES: usize = 512;

#[derive(Debug, Error)]
pub enum CustomizeError {
    #[error("failed to prepare {}: {source}", .path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("untar of {} failed: {stderr}", .golden.display())]
    Untar { golden: PathBuf, stderr: String },
}

/// Everything the customization step needs for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub working_copy: PathBuf,
    pub hostname: String,
    pub tftp_dir: PathBuf,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStatus {
    pub status: u16,
    pub message: String,
}

impl BuildStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_FAILED,
            message: message.into(),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

#[async_trait]
pub trait ImageCustomizer: Send + Sync {
    /// Unpacks `golden` into a fresh working copy at `destination`.
    async fn untar(&self, golden: &Path, destination: &Path) -> Result<PathBuf, CustomizeError>;

    /// Applies the package list and delivers boot images to the TFTP dir.
    async fn execute(&self, request: &BuildRequest) -> BuildStatus;
}

/// Production customizer: `tar` for unpacking, an external command for the
/// package step.
#[derive(Debug, Clone)]
pub struct TarCustomizer {
    command: Option<PathBuf>,
    mirror: String,
    release: String,
    areas: Vec<String>,
}

impl TarCustomizer {
    pub fn new(command: Option<PathBuf>, mirror: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            command,
            mirror: mirror.into(),
            release: release.into(),
            areas: Vec::new(),
        }
    }

    /// Archive areas enabled on the mirror in addition to `main`.
    pub fn with_areas(mut self, areas: Vec<String>) -> Self {
        self.areas = areas;
        self
    }

    fn command_for(&self, program: &Path, request: &BuildRequest) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("--hostname")
            .arg(&request.hostname)
            .arg("--tftp")
            .arg(&request.tftp_dir)
            .arg("--mirror")
            .arg(&self.mirror)
            .arg("--release")
            .arg(&self.release);
        for area in &self.areas {
            cmd.arg("--area").arg(area);
        }
        for package in &request.packages {
            cmd.arg("--package").arg(package);
        }
        cmd.arg(&request.working_copy);
        cmd
    }
}

#[async_trait]
impl ImageCustomizer for TarCustomizer {
    async fn untar(&self, golden: &Path, destination: &Path) -> Result<PathBuf, CustomizeError> {
        if tokio::fs::try_exists(destination).await.unwrap_or(false) {
            debug!(path = %destination.display(), "removing previous working copy");
            tokio::fs::remove_dir_all(destination)
                .await
                .map_err(|source| CustomizeError::Prepare {
                    path: destination.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|source| CustomizeError::Prepare {
                path: destination.to_path_buf(),
                source,
            })?;

        let started = Instant::now();
        let output = Command::new("tar")
            .arg("-xf")
            .arg(golden)
            .arg("-C")
            .arg(destination)
            .output()
            .await
            .map_err(|source| CustomizeError::Spawn {
                program: "tar".into(),
                source,
            })?;
        if !output.status.success() {
            return Err(CustomizeError::Untar {
                golden: golden.to_path_buf(),
                stderr: stderr_tail(&output),
            });
        }
        info!(
            golden = %golden.display(),
            destination = %destination.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "golden image unpacked"
        );
        Ok(destination.to_path_buf())
    }

    async fn execute(&self, request: &BuildRequest) -> BuildStatus {
        let Some(program) = &self.command else {
            warn!(hostname = %request.hostname, "no customize_command configured");
            return BuildStatus::failed("No image customization command configured");
        };
        if let Err(err) = tokio::fs::create_dir_all(&request.tftp_dir).await {
            return BuildStatus::failed(format!(
                "Failed to create \"{}\" folder! {err}",
                request.tftp_dir.display()
            ));
        }

        let started = Instant::now();
        let output = match self.command_for(program, request).output().await {
            Ok(output) => output,
            Err(err) => {
                warn!(program = %program.display(), error = %err, "failed to spawn customize command");
                return BuildStatus::failed(format!(
                    "Failed to run \"{}\": {err}",
                    program.display()
                ));
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if output.status.success() {
            info!(hostname = %request.hostname, elapsed_ms, "node image customized");
            BuildStatus::ok(format!("Image for \"{}\" built.", request.hostname))
        } else {
            let stderr = stderr_tail(&output);
            warn!(
                hostname = %request.hostname,
                status = %output.status,
                elapsed_ms,
                stderr = %stderr,
                "customize command failed"
            );
            BuildStatus::failed(format!(
                "Image customization for \"{}\" failed ({}): {stderr}",
                request.hostname, output.status
            ))
        }
    }
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    let mut start = trimmed.len().saturating_sub(STDERR_TAIL_BYTES);
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}
