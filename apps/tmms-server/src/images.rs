//! Prebuilt filesystem tarballs offered for download.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// `*.tar` files found under the images directory, keyed by file name.
///
/// Scanned once at startup. When two directories hold the same file name the
/// last one walked wins.
#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    images: BTreeMap<String, PathBuf>,
}

impl ImageCatalog {
    pub fn scan(root: &Path) -> Self {
        let mut images = BTreeMap::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %root.display(), error = %err, "skipping unreadable image path");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(".tar") {
                images.insert(name.into_owned(), entry.path().to_path_buf());
            }
        }
        debug!(root = %root.display(), count = images.len(), "scanned image tarballs");
        Self { images }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn lookup(&self, name: &str) -> Option<&Path> {
        self.images.get(name).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
