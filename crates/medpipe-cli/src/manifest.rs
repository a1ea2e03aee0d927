//! JSON pipeline manifests.
//!
//! A manifest names nodes, gives each a registry kind and parameters, and
//! lists the links between them. It describes topology only: timestamps,
//! cached outputs and other engine state are never written back.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "name": "ct", "kind": "volume-source", "params": { "shape": [4, 4], "ramp": true } },
//!     { "name": "double", "kind": "scale", "params": { "factor": 2.0 }, "cache_outputs": false },
//!     { "name": "stats", "kind": "statistics" }
//!   ],
//!   "links": [
//!     { "from": "ct", "to": "double" },
//!     { "from": "double", "to": "stats" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use medpipe_core::{CoreError, EngineConfig, NodeHandle, NodeId, Pipeline};
use medpipe_nodes::{NodeError, NodeRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("node name '{name}' is used twice")]
    DuplicateName { name: String },

    #[error("no node named '{name}'")]
    UnknownName { name: String },

    #[error("node '{name}': {source}")]
    Node {
        name: String,
        #[source]
        source: NodeError,
    },

    #[error("link {from} -> {to}: {source}")]
    Link {
        from: String,
        to: String,
        #[source]
        source: CoreError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Overrides the engine's default caching flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_outputs: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSpec {
    pub from: String,
    #[serde(default)]
    pub from_port: usize,
    pub to: String,
    #[serde(default)]
    pub to_port: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

/// A pipeline built from a manifest, with its node names.
#[derive(Debug)]
pub struct BuiltPipeline {
    pub pipeline: Pipeline,
    pub names: IndexMap<String, NodeHandle>,
}

impl BuiltPipeline {
    pub fn handle(&self, name: &str) -> Result<NodeHandle, ManifestError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ManifestError::UnknownName { name: name.to_string() })
    }

    /// Reverse lookup for reporting.
    pub fn name_of(&self, handle: NodeHandle) -> Option<&str> {
        self.names
            .iter()
            .find(|(_, h)| **h == handle)
            .map(|(name, _)| name.as_str())
    }
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Instantiates every node through `registry` and wires the links.
    /// Node ids are assigned 1, 2, ... in manifest order.
    pub fn build(
        &self,
        registry: &NodeRegistry,
        config: EngineConfig,
    ) -> Result<BuiltPipeline, ManifestError> {
        let mut pipeline = Pipeline::new(config);
        let mut names = IndexMap::with_capacity(self.nodes.len());

        for (i, node) in self.nodes.iter().enumerate() {
            if names.contains_key(&node.name) {
                return Err(ManifestError::DuplicateName {
                    name: node.name.clone(),
                });
            }
            let id = NodeId(i as u64 + 1);
            let item = match &node.params {
                Some(params) => registry.create_with(&node.kind, id, params),
                None => registry.create(&node.kind, id),
            }
            .map_err(|source| ManifestError::Node {
                name: node.name.clone(),
                source,
            })?;

            let handle = pipeline.add_node(item);
            if let Some(cache) = node.cache_outputs {
                pipeline
                    .set_cache_outputs(handle, cache)
                    .map_err(|source| ManifestError::Node {
                        name: node.name.clone(),
                        source: source.into(),
                    })?;
            }
            debug!(name = %node.name, kind = %node.kind, %handle, "node built");
            names.insert(node.name.clone(), handle);
        }

        for link in &self.links {
            let lookup = |name: &str| {
                names
                    .get(name)
                    .copied()
                    .ok_or_else(|| ManifestError::UnknownName { name: name.to_string() })
            };
            let producer = lookup(&link.from)?;
            let consumer = lookup(&link.to)?;
            pipeline
                .connect(consumer, producer, link.to_port, link.from_port)
                .map_err(|source| ManifestError::Link {
                    from: link.from.clone(),
                    to: link.to.clone(),
                    source,
                })?;
        }

        Ok(BuiltPipeline { pipeline, names })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medpipe_nodes::StatisticsTarget;

    const CHAIN: &str = r#"{
        "nodes": [
            { "name": "ct", "kind": "volume-source", "params": { "shape": [2, 2], "ramp": true } },
            {
                "name": "double",
                "kind": "scale",
                "params": { "factor": 2.0 },
                "cache_outputs": false
            },
            { "name": "stats", "kind": "statistics" }
        ],
        "links": [
            { "from": "ct", "to": "double" },
            { "from": "double", "to": "stats" }
        ]
    }"#;

    fn build(text: &str) -> Result<BuiltPipeline, ManifestError> {
        Manifest::parse(text)?.build(&NodeRegistry::with_builtins(), EngineConfig::default())
    }

    #[test]
    fn builds_and_runs_chain() {
        let mut built = build(CHAIN).unwrap();
        assert_eq!(built.names.len(), 3);

        let double = built.handle("double").unwrap();
        assert!(!built.pipeline.cache_outputs(double).unwrap());

        let stats = built.handle("stats").unwrap();
        let report = built.pipeline.update(stats).unwrap();
        assert_eq!(report.apply_count(), 3);
        let summary = built
            .pipeline
            .item::<StatisticsTarget>(stats)
            .unwrap()
            .statistics()
            .unwrap();
        assert_eq!(summary.max, 6.0);
        assert_eq!(built.name_of(stats), Some("stats"));
    }

    #[test]
    fn links_default_to_port_zero() {
        let manifest = Manifest::parse(CHAIN).unwrap();
        assert_eq!(manifest.links[0].from_port, 0);
        assert_eq!(manifest.links[0].to_port, 0);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = build(
            r#"{ "nodes": [
                { "name": "a", "kind": "add" },
                { "name": "a", "kind": "add" }
            ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateName { ref name } if name == "a"));
    }

    #[test]
    fn unknown_link_endpoint_is_rejected() {
        let err = build(
            r#"{ "nodes": [ { "name": "a", "kind": "add" } ],
                 "links": [ { "from": "ghost", "to": "a" } ] }"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "no node named 'ghost'");
    }

    #[test]
    fn unknown_kind_names_the_node() {
        let err = build(r#"{ "nodes": [ { "name": "m", "kind": "median" } ] }"#).unwrap_err();
        assert_eq!(err.to_string(), "node 'm': unknown node kind: 'median'");
    }

    #[test]
    fn out_of_range_port_is_a_link_error() {
        let err = build(
            r#"{ "nodes": [
                { "name": "src", "kind": "volume-source" },
                { "name": "sum", "kind": "add" }
            ],
            "links": [ { "from": "src", "to": "sum", "to_port": 2 } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::Link {
                source: CoreError::OutOfRange { .. },
                ..
            }
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Manifest::parse(r#"{ "nodes": [], "edges": [] }"#).unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");
        std::fs::write(&path, CHAIN).unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.nodes.len(), 3);

        let missing = Manifest::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ManifestError::Io { .. }));
    }
}
