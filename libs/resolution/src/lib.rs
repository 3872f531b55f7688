// Copyright 2018-2026 the Deno authors. MIT license.

//! Peer dependency resolution for the silo package installer.
//!
//! Takes a flat set of package manifests plus a resolution table mapping
//! `name + range -> concrete version` and produces a fully virtualized
//! dependency graph: packages whose peer dependencies must be satisfied
//! differently in different contexts are duplicated ("virtualized") so that
//! every consumer sees a package instance linked against the providers it
//! actually gets at runtime.

use std::collections::BTreeMap;
use std::collections::HashMap;

use deno_semver::npm::NpmVersionParseError;
use deno_semver::Version;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

mod graph;
mod resolver;

pub use graph::Graph;
pub use graph::NodeId;
pub use graph::PendingPeerEntry;
pub use graph::PendingPeerLink;
pub use resolver::resolve;
pub use resolver::ResolveOptions;

/// A single package manifest, the unit of resolver input.
///
/// Field names follow the package.json convention so manifest files can be
/// deserialized directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageManifest {
  pub name: String,
  pub version: String,
  /// Local packages live inside the project. They act as reachability
  /// roots and their peer dependencies never propagate upwards.
  pub is_local: bool,
  pub dependencies: BTreeMap<String, String>,
  pub dev_dependencies: BTreeMap<String, String>,
  pub optional_dependencies: BTreeMap<String, String>,
  pub peer_dependencies: BTreeMap<String, String>,
  pub peer_dependencies_meta: BTreeMap<String, PeerDependencyMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerDependencyMeta {
  pub optional: bool,
}

/// `name -> range -> concrete version`, as selected by whatever performed
/// version-range resolution (a registry client, a lockfile, a test).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionMap(pub HashMap<String, HashMap<String, String>>);

impl ResolutionMap {
  pub fn insert(
    &mut self,
    name: impl Into<String>,
    range: impl Into<String>,
    version: impl Into<String>,
  ) {
    self
      .0
      .entry(name.into())
      .or_default()
      .insert(range.into(), version.into());
  }

  pub fn get(&self, name: &str, range: &str) -> Option<&str> {
    self.0.get(name)?.get(range).map(|v| v.as_str())
  }
}

/// The resolver's public output: a projected graph containing only nodes
/// reachable from local roots, densely renumbered in (name, version)
/// lexicographic order with links sorted by (source, target).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
  pub nodes: Vec<GraphNode>,
  pub links: Vec<GraphLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
  pub id: u32,
  pub name: String,
  pub version: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLink {
  pub source_id: u32,
  pub target_id: u32,
}

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("Invalid version \"{version}\" of package \"{name}\"")]
  VersionParse {
    name: String,
    version: String,
    #[source]
    source: NpmVersionParseError,
  },
  #[error(
    "No resolution found for \"{name}@{range}\" required by \"{dependent}\""
  )]
  MissingResolution {
    name: String,
    range: String,
    dependent: String,
  },
  #[error(
    "Package \"{name}@{version}\" required by \"{dependent}\" is not in the manifest set"
  )]
  MissingTargetPackage {
    name: String,
    version: String,
    dependent: String,
  },
  #[error("missing peer dependency, {name} in {dependent} (parent: {parent})")]
  UnmetPeerDependency {
    name: String,
    dependent: String,
    parent: String,
  },
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn manifest_deserializes_from_package_json_shape() {
    let manifest: PackageManifest = serde_json::from_str(
      r#"{
        "name": "package-a",
        "version": "1.0.0",
        "isLocal": true,
        "dependencies": { "package-b": "^1" },
        "peerDependencies": { "package-c": "^2" },
        "peerDependenciesMeta": { "package-c": { "optional": true } }
      }"#,
    )
    .unwrap();
    assert_eq!(manifest.name, "package-a");
    assert!(manifest.is_local);
    assert_eq!(manifest.dependencies["package-b"], "^1");
    assert!(manifest.peer_dependencies_meta["package-c"].optional);
    assert!(manifest.dev_dependencies.is_empty());
  }

  #[test]
  fn snapshot_serde_round_trip() {
    let snapshot = GraphSnapshot {
      nodes: vec![GraphNode {
        id: 0,
        name: "package-a".to_string(),
        version: Version::parse_from_npm("1.2.3-beta.1").unwrap(),
      }],
      links: vec![GraphLink {
        source_id: 0,
        target_id: 0,
      }],
    };
    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed: GraphSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, snapshot);
  }
}
