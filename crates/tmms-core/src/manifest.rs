//! Manifest resolution.
//!
//! A manifest is a named package list plus a descriptive comment. Names may
//! carry a path segment (`"team/base"`); the part before the last `/` is the
//! prefix and the rest is the basename.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

/// A resolved manifest. Never mutated by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub prefix: String,
    pub basename: String,
    pub packages: Vec<String>,
    pub comment: String,
}

impl Manifest {
    /// The `prefix/basename` form stored in node bindings.
    pub fn binding_ref(&self) -> String {
        if self.prefix.is_empty() {
            self.basename.clone()
        } else {
            format!("{}/{}", self.prefix, self.basename)
        }
    }
}

/// Resolves a manifest name into a [`Manifest`].
pub trait ManifestResolver: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Manifest>;
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    packages: Vec<String>,
    #[serde(rename = "_comment", default)]
    comment: String,
}

/// Manifests stored as JSON files under an upload directory.
///
/// Files are read on every lookup so uploads made after startup resolve.
#[derive(Debug, Clone)]
pub struct ManifestCatalog {
    root: PathBuf,
}

impl ManifestCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn manifest_path(&self, prefix: &str, basename: &str) -> PathBuf {
        let file_name = if basename.ends_with(".json") {
            basename.to_string()
        } else {
            format!("{basename}.json")
        };
        self.root.join(prefix).join(file_name)
    }
}

/// Splits a manifest name into `(prefix, basename)`, refusing anything that
/// could escape the catalog root.
fn split_name(name: &str) -> Option<(String, String)> {
    let trimmed = name.trim().trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let safe = Path::new(trimmed)
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !safe {
        return None;
    }
    match trimmed.rsplit_once('/') {
        Some((prefix, basename)) if !basename.is_empty() => {
            Some((prefix.trim_end_matches('/').to_string(), basename.to_string()))
        }
        Some(_) => None,
        None => Some((String::new(), trimmed.to_string())),
    }
}

impl ManifestResolver for ManifestCatalog {
    fn lookup(&self, name: &str) -> Option<Manifest> {
        let (prefix, basename) = split_name(name)?;
        let path = self.manifest_path(&prefix, &basename);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                debug!(manifest = %name, path = %path.display(), error = %err, "manifest not readable");
                return None;
            }
        };
        match serde_json::from_str::<ManifestFile>(&content) {
            Ok(file) => Some(Manifest {
                name: name.to_string(),
                prefix,
                basename,
                packages: file.packages,
                comment: file.comment,
            }),
            Err(err) => {
                warn!(manifest = %name, path = %path.display(), error = %err, "manifest failed to parse");
                None
            }
        }
    }
}
