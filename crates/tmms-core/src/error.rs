use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the topology or manifest files.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate node coordinate {0} in topology")]
    DuplicateCoordinate(String),
}
