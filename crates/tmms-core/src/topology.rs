//! Node registry loaded from the cluster topology file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CoreError, NodeCoordinate};

/// A compute node slot as described by the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub coordinate: NodeCoordinate,
    pub hostname: String,
    #[serde(alias = "socMacAddress", default)]
    pub mac: String,
}

#[derive(Debug, Default, Deserialize)]
struct TopologyFile {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    racks: Vec<Rack>,
}

#[derive(Debug, Default, Deserialize)]
struct Rack {
    #[serde(default)]
    enclosures: Vec<Enclosure>,
}

#[derive(Debug, Default, Deserialize)]
struct Enclosure {
    #[serde(default)]
    nodes: Vec<Node>,
}

impl TopologyFile {
    fn into_nodes(self) -> Vec<Node> {
        let mut nodes = self.nodes;
        for rack in self.racks {
            for enclosure in rack.enclosures {
                nodes.extend(enclosure.nodes);
            }
        }
        nodes
    }
}

/// Read-only lookup table from coordinate to node metadata.
///
/// Built once at startup; iteration follows document order of the topology
/// file.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
    index: HashMap<NodeCoordinate, usize>,
}

impl NodeRegistry {
    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        let content = fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: TopologyFile =
            serde_json::from_str(&content).map_err(|source| CoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_nodes(file.into_nodes())
    }

    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, CoreError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.coordinate.clone(), position).is_some() {
                return Err(CoreError::DuplicateCoordinate(node.coordinate.to_string()));
            }
        }
        Ok(Self { nodes, index })
    }

    pub fn get(&self, coordinate: &str) -> Option<&Node> {
        self.index.get(coordinate).map(|&position| &self.nodes[position])
    }

    pub fn contains(&self, coordinate: &str) -> bool {
        self.index.contains_key(coordinate)
    }

    pub fn coordinates(&self) -> impl Iterator<Item = &NodeCoordinate> {
        self.nodes.iter().map(|node| &node.coordinate)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(coordinate: &str, hostname: &str) -> Node {
        Node {
            coordinate: coordinate.into(),
            hostname: hostname.into(),
            mac: "00:00:00:00:00:01".into(),
        }
    }

    #[test]
    fn lookup_by_coordinate() {
        let registry =
            NodeRegistry::from_nodes(vec![node("R1-E1-N1", "node01"), node("R1-E1-N2", "node02")])
                .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("R1-E1-N2").unwrap().hostname, "node02");
        assert!(registry.contains("R1-E1-N1"));
        assert!(registry.get("R9-E9-N9").is_none());
        let coords: Vec<&str> = registry.coordinates().map(|c| c.as_str()).collect();
        assert_eq!(coords, vec!["R1-E1-N1", "R1-E1-N2"]);
    }

    #[test]
    fn duplicate_coordinates_are_rejected() {
        let err = NodeRegistry::from_nodes(vec![node("R1-E1-N1", "a"), node("R1-E1-N1", "b")])
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCoordinate(coord) if coord == "R1-E1-N1"));
    }

    #[test]
    fn loads_flat_and_nested_topology() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tmconfig.json");
        let doc = serde_json::json!({
            "nodes": [
                { "coordinate": "R1-E1-N1", "hostname": "node01", "mac": "aa:bb:cc:dd:ee:01" }
            ],
            "racks": [{
                "enclosures": [{
                    "nodes": [
                        { "coordinate": "R1-E2-N1", "hostname": "node09", "socMacAddress": "aa:bb:cc:dd:ee:09" }
                    ]
                }]
            }]
        });
        fs::write(&path, doc.to_string()).unwrap();

        let registry = NodeRegistry::from_path(&path).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("R1-E2-N1").unwrap().mac, "aa:bb:cc:dd:ee:09");
        assert_eq!(registry.nodes()[0].hostname, "node01");
    }

    #[test]
    fn missing_topology_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NodeRegistry::from_path(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
