//! Core primitives shared by the manifesting server.
//!
//! The server binds node coordinates from the cluster topology to software
//! manifests. This crate owns the read-only side of that picture: the node
//! registry loaded from the topology file and the manifest resolver that
//! turns a manifest name into a package list.

pub mod error;
pub mod manifest;
pub mod topology;

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

pub use error::CoreError;
pub use manifest::{Manifest, ManifestCatalog, ManifestResolver};
pub use topology::{Node, NodeRegistry};

/// Identifier locating a node slot within the cluster topology.
///
/// Opaque to the server: coordinates are compared as strings and may contain
/// `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeCoordinate(pub String);

impl NodeCoordinate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeCoordinate {
    fn from(value: &str) -> Self {
        NodeCoordinate(value.to_owned())
    }
}

impl From<String> for NodeCoordinate {
    fn from(value: String) -> Self {
        NodeCoordinate(value)
    }
}

impl Borrow<str> for NodeCoordinate {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
