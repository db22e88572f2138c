//! Node to manifest bindings.
//!
//! The full map lives in memory and is rewritten to a JSON file on every
//! change (write `<file>.new`, then rename over `<file>`).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tmms_core::NodeCoordinate;
use tracing::{debug, error, warn};

use crate::metrics::BINDING_PERSIST_ERRORS;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to serialize bindings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Owned binding store. At most one manifest per coordinate; last write wins.
///
/// Not synchronised: callers share it behind a mutex so the
/// update-then-persist cycle of one bind never interleaves with another.
#[derive(Debug)]
pub struct BindingStore {
    path: PathBuf,
    bindings: BTreeMap<NodeCoordinate, String>,
}

impl BindingStore {
    /// An empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bindings: BTreeMap::new(),
        }
    }

    /// Hydrates the store from `path`. A missing or unreadable file yields an
    /// empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::empty(path);
        let content = match fs::read_to_string(&store.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %store.path.display(), "no node binding file yet; starting empty");
                return store;
            }
            Err(err) => {
                error!(path = %store.path.display(), error = %err, "couldn't load node bindings");
                return store;
            }
        };
        match serde_json::from_str(&content) {
            Ok(bindings) => store.bindings = bindings,
            Err(err) => {
                error!(path = %store.path.display(), error = %err, "node binding file is not valid JSON");
            }
        }
        debug!(path = %store.path.display(), count = store.bindings.len(), "loaded node bindings");
        store
    }

    pub fn get(&self, coordinate: &str) -> Option<&str> {
        self.bindings.get(coordinate).map(String::as_str)
    }

    /// Binds `coordinate` to `manifest_ref` and persists the whole map.
    ///
    /// A failed write is logged and counted; the in-memory binding stands.
    pub fn set(&mut self, coordinate: NodeCoordinate, manifest_ref: String) {
        self.bindings.insert(coordinate, manifest_ref);
        if let Err(err) = self.persist() {
            BINDING_PERSIST_ERRORS.inc();
            error!(path = %self.path.display(), error = %err, "couldn't save node bindings");
        }
    }

    /// All bindings ordered by coordinate.
    pub fn all(&self) -> impl Iterator<Item = (&NodeCoordinate, &str)> {
        self.bindings
            .iter()
            .map(|(coordinate, manifest)| (coordinate, manifest.as_str()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn persist(&self) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(&self.bindings)?;
        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".new");
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content).map_err(|source| PersistError::Write {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|source| PersistError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_binding");

        let mut store = BindingStore::load(&path);
        assert!(store.is_empty());
        store.set("R1-E1-N1".into(), "base-manifest".into());
        store.set("R1-E1-N2".into(), "lab/compute".into());

        let reloaded = BindingStore::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("R1-E1-N1"), Some("base-manifest"));
        assert_eq!(reloaded.get("R1-E1-N2"), Some("lab/compute"));
        assert!(!dir.path().join("node_binding.new").exists());
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_binding");

        let mut store = BindingStore::load(&path);
        store.set("R1-E1-N1".into(), "base-manifest".into());
        store.set("R1-E1-N1".into(), "lab/compute".into());

        assert_eq!(store.len(), 1);
        let reloaded = BindingStore::load(&path);
        let all: Vec<_> = reloaded.all().map(|(c, m)| (c.to_string(), m.to_string())).collect();
        assert_eq!(all, vec![("R1-E1-N1".to_string(), "lab/compute".to_string())]);
    }

    #[test]
    fn persisted_file_is_a_plain_json_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_binding");
        let mut store = BindingStore::empty(&path);
        store.set("R1-E1-N1".into(), "base-manifest".into());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "R1-E1-N1": "base-manifest" }));
    }

    #[test]
    fn write_failure_keeps_the_in_memory_binding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("node_binding");
        let mut store = BindingStore::load(&path);

        store.set("R1-E1-N1".into(), "base-manifest".into());

        assert_eq!(store.get("R1-E1-N1"), Some("base-manifest"));
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_binding");
        fs::write(&path, "not json").unwrap();
        assert!(BindingStore::load(&path).is_empty());
    }
}
