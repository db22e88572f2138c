//! Server configuration.
//!
//! Settings come from an optional TOML file and `TMMS__*` environment
//! variables (for example `TMMS__PORT=31179`); command line flags are applied
//! on top by the binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid listen address {addr}: {source}")]
    ListenAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Cluster topology file.
    #[serde(default = "default_tmconfig")]
    pub tmconfig: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Top-level directory for server state and images.
    #[serde(default = "default_manifesting_root")]
    pub manifesting_root: PathBuf,
    /// Root of the TFTP tree served for PXE boot. Defaults to `<root>/tftp`.
    #[serde(default)]
    pub tftp_root: Option<PathBuf>,
    /// Subdirectory of `tftp_root` holding per-node boot images.
    #[serde(default = "default_tftp_images")]
    pub tftp_images: String,
    /// Where prebuilt `*.tar` images are offered for download. Defaults to
    /// the filesystem images directory.
    #[serde(default)]
    pub system_images_dir: Option<PathBuf>,
    #[serde(default = "default_api_version")]
    pub api_version: f64,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default = "default_max_bind_body_bytes")]
    pub max_bind_body_bytes: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub log_filter: Option<String>,
    /// External program that applies a package list to an unpacked image.
    #[serde(default)]
    pub customize_command: Option<PathBuf>,
    #[serde(default = "default_l4tm_mirror")]
    pub l4tm_mirror: String,
    #[serde(default = "default_l4tm_release")]
    pub l4tm_release: String,
    #[serde(default = "default_l4tm_areas")]
    pub l4tm_areas: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            tmconfig: default_tmconfig(),
            host: default_host(),
            port: default_port(),
            manifesting_root: default_manifesting_root(),
            tftp_root: None,
            tftp_images: default_tftp_images(),
            system_images_dir: None,
            api_version: default_api_version(),
            url_prefix: default_url_prefix(),
            max_bind_body_bytes: default_max_bind_body_bytes(),
            dry_run: false,
            verbose: false,
            log_filter: None,
            customize_command: None,
            l4tm_mirror: default_l4tm_mirror(),
            l4tm_release: default_l4tm_release(),
            l4tm_areas: default_l4tm_areas(),
        }
        .normalize()
    }
}

impl AppConfig {
    /// Loads the optional config file, then `TMMS__*` environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let cfg: AppConfig = builder
            .add_source(
                config::Environment::with_prefix("TMMS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(cfg.normalize())
    }

    fn normalize(mut self) -> Self {
        self.log_filter = normalize_opt(self.log_filter.take());
        self.customize_command = self
            .customize_command
            .take()
            .filter(|path| !path.as_os_str().is_empty());
        let prefix = self.url_prefix.trim().trim_matches('/');
        self.url_prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("/{prefix}")
        };
        self
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|source| ConfigError::ListenAddr { addr, source })
    }

    /// JSON file holding all node to manifest bindings.
    pub fn node_binding(&self) -> PathBuf {
        self.manifesting_root.join("node_binding")
    }

    pub fn filesystem_images(&self) -> PathBuf {
        self.manifesting_root.join("sys-images")
    }

    pub fn manifest_uploads(&self) -> PathBuf {
        self.manifesting_root.join("manifest_uploads")
    }

    pub fn golden_image(&self) -> PathBuf {
        self.filesystem_images().join("golden").join("golden.arm.tar")
    }

    pub fn tftp_root(&self) -> PathBuf {
        self.tftp_root
            .clone()
            .unwrap_or_else(|| self.manifesting_root.join("tftp"))
    }

    /// Per-node boot images live in `<tftp_images_dir>/<hostname>`.
    pub fn tftp_images_dir(&self) -> PathBuf {
        self.tftp_root()
            .join(self.tftp_images.trim_start_matches('/'))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.system_images_dir
            .clone()
            .unwrap_or_else(|| self.filesystem_images())
    }

    pub fn tracing_filter(&self) -> String {
        match &self.log_filter {
            Some(filter) => filter.clone(),
            None if self.verbose => "debug".to_string(),
            None => "info".to_string(),
        }
    }
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn default_tmconfig() -> PathBuf {
    PathBuf::from("/etc/tmconfig")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    31178
}

fn default_manifesting_root() -> PathBuf {
    PathBuf::from("/var/lib/tmms")
}

fn default_tftp_images() -> String {
    "arm64".to_string()
}

fn default_api_version() -> f64 {
    1.0
}

fn default_url_prefix() -> String {
    "/manifesting".to_string()
}

fn default_max_bind_body_bytes() -> usize {
    200
}

fn default_l4tm_mirror() -> String {
    "http://hlinux-deejay.us.rdlabs.hpecorp.net/l4tm".to_string()
}

fn default_l4tm_release() -> String {
    "catapult".to_string()
}

fn default_l4tm_areas() -> Vec<String> {
    vec!["contrib".to_string(), "non-free".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_follow_the_manifesting_root() {
        let cfg = AppConfig {
            manifesting_root: PathBuf::from("/srv/tmms"),
            ..AppConfig::default()
        };
        assert_eq!(cfg.node_binding(), PathBuf::from("/srv/tmms/node_binding"));
        assert_eq!(
            cfg.golden_image(),
            PathBuf::from("/srv/tmms/sys-images/golden/golden.arm.tar")
        );
        assert_eq!(cfg.manifest_uploads(), PathBuf::from("/srv/tmms/manifest_uploads"));
        assert_eq!(cfg.tftp_images_dir(), PathBuf::from("/srv/tmms/tftp/arm64"));
        assert_eq!(cfg.images_dir(), PathBuf::from("/srv/tmms/sys-images"));
    }

    #[test]
    fn loads_values_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tmms.toml");
        std::fs::write(
            &path,
            r#"
port = 40000
manifesting_root = "/tmp/tmms"
tftp_root = "/srv/tftp"
tftp_images = "/images"
url_prefix = "provision/"
log_filter = "  "
"#,
        )
        .unwrap();

        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.port, 40000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.url_prefix, "/provision");
        assert_eq!(cfg.tftp_images_dir(), PathBuf::from("/srv/tftp/images"));
        assert!(cfg.log_filter.is_none());
        assert_eq!(cfg.max_bind_body_bytes, 200);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.url_prefix, "/manifesting");
        assert_eq!(cfg.api_version, 1.0);
        assert_eq!(cfg.listen_addr().unwrap().port(), cfg.port);
    }

    #[test]
    fn tracing_filter_prefers_explicit_filter() {
        let mut cfg = AppConfig {
            verbose: true,
            ..AppConfig::default()
        };
        assert_eq!(cfg.tracing_filter(), "debug");
        cfg.log_filter = Some("warn,tmms_server=trace".into());
        assert_eq!(cfg.tracing_filter(), "warn,tmms_server=trace");
    }
}
