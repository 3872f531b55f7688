// Copyright 2018-2026 the Deno authors. MIT license.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use deno_semver::Version;
use deno_semver::VersionReq;

use crate::graph::Graph;
use crate::graph::NodeId;
use crate::graph::PendingPeerEntry;
use crate::GraphSnapshot;
use crate::PackageManifest;
use crate::ResolutionMap;
use crate::ResolveError;

#[derive(Debug, Clone)]
pub struct ResolveOptions {
  /// Whether an unmet non-optional peer dependency aborts resolution.
  /// When false the miss is logged and the package is left as-is.
  pub fail_on_missing_peer: bool,
}

impl Default for ResolveOptions {
  fn default() -> Self {
    Self {
      fail_on_missing_peer: true,
    }
  }
}

/// Builds the dependency graph for the given manifests and projects it into
/// the public snapshot shape.
///
/// Resolution happens in phases: base nodes, regular dependency links, dev
/// dependency links (local manifests only), optional dependency links, peer
/// link registration, and finally the peer dependency fixed point that
/// virtualizes packages per fulfilled peer set.
pub fn resolve(
  manifests: &[PackageManifest],
  resolutions: &ResolutionMap,
  options: &ResolveOptions,
) -> Result<GraphSnapshot, ResolveError> {
  let mut graph = Graph::new();

  let mut node_ids = Vec::with_capacity(manifests.len());
  for manifest in manifests {
    let version = parse_version(&manifest.name, &manifest.version)?;
    node_ids.push(graph.add_node(&manifest.name, &version, manifest.is_local));
  }

  for (manifest, &source) in manifests.iter().zip(&node_ids) {
    link_dependencies(
      &mut graph,
      source,
      manifest,
      &manifest.dependencies,
      resolutions,
      false,
    )?;
  }
  for (manifest, &source) in manifests.iter().zip(&node_ids) {
    if !manifest.is_local {
      continue;
    }
    link_dependencies(
      &mut graph,
      source,
      manifest,
      &manifest.dev_dependencies,
      resolutions,
      false,
    )?;
  }
  for (manifest, &source) in manifests.iter().zip(&node_ids) {
    link_dependencies(
      &mut graph,
      source,
      manifest,
      &manifest.optional_dependencies,
      resolutions,
      true,
    )?;
  }

  for (manifest, &source) in manifests.iter().zip(&node_ids) {
    // names appearing only in the meta map still count as peers with an
    // implied any-version range; explicit ranges win
    let mut combined: BTreeMap<&str, &str> = manifest
      .peer_dependencies_meta
      .keys()
      .map(|name| (name.as_str(), "*"))
      .collect();
    for (name, range) in &manifest.peer_dependencies {
      combined.insert(name, range);
    }
    for (name, range) in combined {
      let optional = manifest
        .peer_dependencies_meta
        .get(name)
        .map(|meta| meta.optional)
        .unwrap_or(false);
      graph.add_peer_link(source, name, range, optional);
    }
  }

  run_peer_fixed_point(&mut graph, options)?;

  Ok(graph.project())
}

fn parse_version(name: &str, text: &str) -> Result<Version, ResolveError> {
  Version::parse_from_npm(text).map_err(|source| ResolveError::VersionParse {
    name: name.to_string(),
    version: text.to_string(),
    source,
  })
}

fn link_dependencies(
  graph: &mut Graph,
  source: NodeId,
  manifest: &PackageManifest,
  dependencies: &BTreeMap<String, String>,
  resolutions: &ResolutionMap,
  optional: bool,
) -> Result<(), ResolveError> {
  for (name, range) in dependencies {
    let dependent = || format!("{}@{}", manifest.name, manifest.version);
    let Some(version_text) = resolutions.get(name, range) else {
      return Err(ResolveError::MissingResolution {
        name: name.clone(),
        range: range.clone(),
        dependent: dependent(),
      });
    };
    let version = parse_version(name, version_text)?;
    match graph.get_base_node(name, &version) {
      Some(target) => graph.add_link(source, target),
      None if optional => {
        log::debug!(
          "skipping optional dependency {}@{} of {}: not in the manifest set",
          name,
          version,
          dependent()
        );
      }
      None => {
        return Err(ResolveError::MissingTargetPackage {
          name: name.clone(),
          version: version.to_string(),
          dependent: dependent(),
        });
      }
    }
  }
  Ok(())
}

enum PeerResolution {
  /// A concrete provider node was found in the parent's scope.
  Provider(NodeId),
  /// Nothing to do: a regular dependency already satisfies the peer, or an
  /// optional peer has no provider.
  Ignored,
  /// The parent still has pending peer links of its own and will be
  /// virtualized later; the provider may become findable then.
  RetryLater,
  /// Unmet, reported as a warning.
  Failed,
}

/// Drains the pending peer link queue, virtualizing and rewiring packages
/// until no entry makes progress.
///
/// The watchdog counts queue revolutions: it is reset whenever an entry is
/// resolved or dropped as stale and decremented when an entry is re-queued,
/// so hitting zero means a full pass made no progress and the remaining
/// entries are abandoned.
fn run_peer_fixed_point(
  graph: &mut Graph,
  options: &ResolveOptions,
) -> Result<(), ResolveError> {
  let mut queue: VecDeque<PendingPeerEntry> = graph.get_peer_links().into();
  let mut watchdog = queue.len() + 1;
  while watchdog > 0 {
    let Some(entry) = queue.pop_front() else {
      break;
    };
    if !graph.has_link(entry.parent, entry.source) {
      // the parent was rewired onto a virtual node while this entry was
      // queued; drop the stale entry
      watchdog = queue.len() + 1;
      continue;
    }
    match resolve_peer_provider(graph, &entry, options)? {
      PeerResolution::Ignored | PeerResolution::Failed => {
        // the queue simply shrinks
      }
      PeerResolution::RetryLater => {
        queue.push_back(entry);
        watchdog -= 1;
      }
      PeerResolution::Provider(provider) => {
        warn_on_unmatching_range(graph, &entry, provider);
        let chosen =
          match graph.find_virtual(entry.source, &entry.target_name, provider)
          {
            Some(existing) => existing,
            None => {
              let new_id =
                graph.create_virtual(entry.source, &entry.target_name, provider);
              log::debug!(
                "virtualized {}@{} fulfilling peer {} under {}@{}",
                graph.node_name(entry.source),
                graph.node_version(entry.source),
                entry.target_name,
                graph.node_name(entry.parent),
                graph.node_version(entry.parent),
              );
              for link in graph.pending_peer_links(new_id).to_vec() {
                queue.push_back(PendingPeerEntry {
                  parent: entry.parent,
                  source: new_id,
                  target_name: link.target_name,
                  target_range: link.target_range,
                  optional: link.optional,
                });
              }
              // virtualization propagates to grandchildren: the children
              // of the clone resolve their own peers against it
              let children: Vec<_> = graph.children(new_id).collect();
              for child in children {
                if graph.node_is_local(child) {
                  continue;
                }
                for link in graph.pending_peer_links(child).to_vec() {
                  queue.push_back(PendingPeerEntry {
                    parent: new_id,
                    source: child,
                    target_name: link.target_name,
                    target_range: link.target_range,
                    optional: link.optional,
                  });
                }
              }
              new_id
            }
          };
        graph.rewire(entry.parent, entry.source, chosen);
        watchdog = queue.len() + 1;
      }
    }
  }
  if !queue.is_empty() {
    log::debug!(
      "peer resolution stopped without progress; abandoning {} pending peer links",
      queue.len()
    );
  }
  Ok(())
}

fn resolve_peer_provider(
  graph: &Graph,
  entry: &PendingPeerEntry,
  options: &ResolveOptions,
) -> Result<PeerResolution, ResolveError> {
  // a regular dependency with the peer's name always wins
  if graph
    .find_child_by_name(entry.source, &entry.target_name)
    .is_some()
  {
    return Ok(PeerResolution::Ignored);
  }
  if let Some(found) = graph.find_child_by_name(entry.parent, &entry.target_name)
  {
    return Ok(PeerResolution::Provider(found));
  }
  if graph.node_name(entry.parent) == entry.target_name {
    return Ok(PeerResolution::Provider(entry.parent));
  }
  if entry.optional {
    return Ok(PeerResolution::Ignored);
  }
  if graph.has_peer_link(entry.parent) {
    return Ok(PeerResolution::RetryLater);
  }
  let dependent = format!(
    "{}@{}",
    graph.node_name(entry.source),
    graph.node_version(entry.source)
  );
  let parent = format!(
    "{}@{}",
    graph.node_name(entry.parent),
    graph.node_version(entry.parent)
  );
  if options.fail_on_missing_peer {
    Err(ResolveError::UnmetPeerDependency {
      name: entry.target_name.clone(),
      dependent,
      parent,
    })
  } else {
    log::warn!(
      "[WARNING] missing peer dependency, {} in {} (parent: {})",
      entry.target_name,
      dependent,
      parent
    );
    Ok(PeerResolution::Failed)
  }
}

fn warn_on_unmatching_range(
  graph: &Graph,
  entry: &PendingPeerEntry,
  provider: NodeId,
) {
  // an unparseable range cannot be checked; satisfaction is assumed
  let Ok(req) = VersionReq::parse_from_npm(&entry.target_range) else {
    return;
  };
  let version = graph.node_version(provider);
  if !req.matches(version) {
    log::warn!(
      "[WARNING] unmatching peer dependency, {} in {}@{} (parent: {}@{}) was resolved to version {} which does not satisfy the given range: {}",
      entry.target_name,
      graph.node_name(entry.source),
      graph.node_version(entry.source),
      graph.node_name(entry.parent),
      graph.node_version(entry.parent),
      version,
      entry.target_range
    );
  }
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::PeerDependencyMeta;

  /// Test fixture mirroring the resolver's input surface: a set of
  /// manifests plus the resolution table the registry client would have
  /// produced for them.
  #[derive(Default)]
  struct TestManifestSet {
    manifests: Vec<PackageManifest>,
    resolutions: ResolutionMap,
  }

  impl TestManifestSet {
    fn ensure_package(&mut self, name: &str, version: &str) {
      self.manifest_mut(name, version);
    }

    fn ensure_local_package(&mut self, name: &str, version: &str) {
      self.manifest_mut(name, version).is_local = true;
    }

    fn manifest_mut(
      &mut self,
      name: &str,
      version: &str,
    ) -> &mut PackageManifest {
      if let Some(index) = self
        .manifests
        .iter()
        .position(|m| m.name == name && m.version == version)
      {
        return &mut self.manifests[index];
      }
      self.manifests.push(PackageManifest {
        name: name.to_string(),
        version: version.to_string(),
        ..Default::default()
      });
      self.manifests.last_mut().unwrap()
    }

    fn add_resolution(&mut self, name: &str, range: &str, version: &str) {
      self.resolutions.insert(name, range, version);
    }

    fn add_dependency(&mut self, package: (&str, &str), dep: (&str, &str)) {
      self
        .manifest_mut(package.0, package.1)
        .dependencies
        .insert(dep.0.to_string(), dep.1.to_string());
    }

    fn add_dev_dependency(&mut self, package: (&str, &str), dep: (&str, &str)) {
      self
        .manifest_mut(package.0, package.1)
        .dev_dependencies
        .insert(dep.0.to_string(), dep.1.to_string());
    }

    fn add_optional_dependency(
      &mut self,
      package: (&str, &str),
      dep: (&str, &str),
    ) {
      self
        .manifest_mut(package.0, package.1)
        .optional_dependencies
        .insert(dep.0.to_string(), dep.1.to_string());
    }

    fn add_peer_dependency(&mut self, package: (&str, &str), dep: (&str, &str)) {
      self
        .manifest_mut(package.0, package.1)
        .peer_dependencies
        .insert(dep.0.to_string(), dep.1.to_string());
    }

    fn add_optional_peer_dependency(
      &mut self,
      package: (&str, &str),
      dep_name: &str,
    ) {
      self
        .manifest_mut(package.0, package.1)
        .peer_dependencies_meta
        .insert(
          dep_name.to_string(),
          PeerDependencyMeta { optional: true },
        );
    }

    fn resolve(&self) -> Result<GraphSnapshot, ResolveError> {
      self.resolve_with_options(&Default::default())
    }

    fn resolve_with_options(
      &self,
      options: &ResolveOptions,
    ) -> Result<GraphSnapshot, ResolveError> {
      resolve(&self.manifests, &self.resolutions, options)
    }
  }

  fn nodes_of(snapshot: &GraphSnapshot) -> Vec<String> {
    snapshot
      .nodes
      .iter()
      .map(|n| format!("{}@{}", n.name, n.version))
      .collect()
  }

  fn links_of(snapshot: &GraphSnapshot) -> Vec<(u32, u32)> {
    snapshot
      .links
      .iter()
      .map(|l| (l.source_id, l.target_id))
      .collect()
  }

  /// Re-expresses a projected snapshot as resolver input. Only valid when
  /// virtualization produced no duplicate (name, version) pairs.
  fn manifests_from_snapshot(
    snapshot: &GraphSnapshot,
    local_names: &[&str],
  ) -> TestManifestSet {
    let mut set = TestManifestSet::default();
    for node in &snapshot.nodes {
      let version = node.version.to_string();
      if local_names.contains(&node.name.as_str()) {
        set.ensure_local_package(&node.name, &version);
      } else {
        set.ensure_package(&node.name, &version);
      }
    }
    for link in &snapshot.links {
      let source = &snapshot.nodes[link.source_id as usize];
      let target = &snapshot.nodes[link.target_id as usize];
      let target_version = target.version.to_string();
      set.add_dependency(
        (&source.name, &source.version.to_string()),
        (&target.name, &target_version),
      );
      set.add_resolution(&target.name, &target_version, &target_version);
    }
    set
  }

  #[test]
  fn resolve_basic() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.1.0");
    set.ensure_package("package-c", "1.0.1");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-a", "1.0.0"), ("package-c", "^1"));
    set.add_resolution("package-b", "^1", "1.1.0");
    set.add_resolution("package-c", "^1", "1.0.1");

    let snapshot = set.resolve().unwrap();
    assert_eq!(
      nodes_of(&snapshot),
      vec!["package-a@1.0.0", "package-b@1.1.0", "package-c@1.0.1"]
    );
    assert_eq!(links_of(&snapshot), vec![(0, 1), (0, 2)]);
  }

  #[test]
  fn resolve_basic_is_fixed_point() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.1.0");
    set.ensure_package("package-c", "1.0.1");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-a", "1.0.0"), ("package-c", "^1"));
    set.add_resolution("package-b", "^1", "1.1.0");
    set.add_resolution("package-c", "^1", "1.0.1");

    let snapshot = set.resolve().unwrap();
    let roundtripped = manifests_from_snapshot(&snapshot, &["package-a"])
      .resolve()
      .unwrap();
    assert_eq!(roundtripped, snapshot);
  }

  #[test]
  fn resolve_peer_dep_dedup() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.ensure_package("package-c", "1.0.0");
    set.ensure_package("package-d", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-a", "1.0.0"), ("package-c", "^1"));
    set.add_dependency(("package-a", "1.0.0"), ("package-d", "^1"));
    set.add_dependency(("package-c", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-c", "1.0.0"), ("package-d", "^1"));
    set.add_peer_dependency(("package-b", "1.0.0"), ("package-d", "^1"));
    set.add_resolution("package-b", "^1", "1.0.0");
    set.add_resolution("package-c", "^1", "1.0.0");
    set.add_resolution("package-d", "^1", "1.0.0");

    let snapshot = set.resolve().unwrap();
    // both package-a and package-c share the one virtualized package-b
    assert_eq!(
      nodes_of(&snapshot),
      vec![
        "package-a@1.0.0",
        "package-b@1.0.0",
        "package-c@1.0.0",
        "package-d@1.0.0",
      ]
    );
    assert_eq!(
      links_of(&snapshot),
      vec![(0, 1), (0, 2), (0, 3), (1, 3), (2, 1), (2, 3)]
    );
  }

  #[test]
  fn resolve_peer_dep_virtual_creation() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.ensure_package("package-c", "1.0.0");
    set.ensure_package("package-d", "1.0.0");
    set.ensure_package("package-d", "2.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-a", "1.0.0"), ("package-c", "^1"));
    set.add_dependency(("package-a", "1.0.0"), ("package-d", "^2"));
    set.add_dependency(("package-c", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-c", "1.0.0"), ("package-d", "^1"));
    set.add_peer_dependency(("package-b", "1.0.0"), ("package-d", "*"));
    set.add_resolution("package-b", "^1", "1.0.0");
    set.add_resolution("package-c", "^1", "1.0.0");
    set.add_resolution("package-d", "^1", "1.0.0");
    set.add_resolution("package-d", "^2", "2.0.0");

    let snapshot = set.resolve().unwrap();
    // two virtualized copies of package-b: one fulfilled with package-d@2
    // (under package-a), one with package-d@1 (under package-c)
    assert_eq!(
      nodes_of(&snapshot),
      vec![
        "package-a@1.0.0",
        "package-b@1.0.0",
        "package-b@1.0.0",
        "package-c@1.0.0",
        "package-d@1.0.0",
        "package-d@2.0.0",
      ]
    );
    assert_eq!(
      links_of(&snapshot),
      vec![(0, 1), (0, 3), (0, 5), (1, 5), (2, 4), (3, 2), (3, 4)]
    );
  }

  #[test]
  fn resolve_peer_fulfilled_by_parent_itself() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_peer_dependency(("package-b", "1.0.0"), ("package-a", "*"));
    set.add_resolution("package-b", "^1", "1.0.0");

    let snapshot = set.resolve().unwrap();
    assert_eq!(
      nodes_of(&snapshot),
      vec!["package-a@1.0.0", "package-b@1.0.0"]
    );
    // the virtualized package-b links back to its fulfilling parent
    assert_eq!(links_of(&snapshot), vec![(0, 1), (1, 0)]);
  }

  #[test]
  fn resolve_peer_shadowed_by_regular_dep() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.ensure_package("package-d", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-b", "1.0.0"), ("package-d", "^1"));
    set.add_peer_dependency(("package-b", "1.0.0"), ("package-d", "^1"));
    set.add_resolution("package-b", "^1", "1.0.0");
    set.add_resolution("package-d", "^1", "1.0.0");

    let snapshot = set.resolve().unwrap();
    // no virtualization: the regular dependency already satisfies the peer
    assert_eq!(
      nodes_of(&snapshot),
      vec!["package-a@1.0.0", "package-b@1.0.0", "package-d@1.0.0"]
    );
    assert_eq!(links_of(&snapshot), vec![(0, 1), (1, 2)]);
  }

  #[test]
  fn resolve_optional_peer_without_provider() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_optional_peer_dependency(("package-b", "1.0.0"), "package-x");
    set.add_resolution("package-b", "^1", "1.0.0");

    let snapshot = set.resolve().unwrap();
    assert_eq!(
      nodes_of(&snapshot),
      vec!["package-a@1.0.0", "package-b@1.0.0"]
    );
    assert_eq!(links_of(&snapshot), vec![(0, 1)]);
  }

  #[test]
  fn resolve_unmet_peer_fails() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_peer_dependency(("package-b", "1.0.0"), ("package-x", "^1"));
    set.add_resolution("package-b", "^1", "1.0.0");

    let err = set.resolve().unwrap_err();
    assert_eq!(
      err.to_string(),
      "missing peer dependency, package-x in package-b@1.0.0 (parent: package-a@1.0.0)"
    );
  }

  #[test]
  fn resolve_unmet_peer_warns_when_allowed() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_peer_dependency(("package-b", "1.0.0"), ("package-x", "^1"));
    set.add_resolution("package-b", "^1", "1.0.0");

    let snapshot = set
      .resolve_with_options(&ResolveOptions {
        fail_on_missing_peer: false,
      })
      .unwrap();
    // the package stays as-is, without virtualization
    assert_eq!(
      nodes_of(&snapshot),
      vec!["package-a@1.0.0", "package-b@1.0.0"]
    );
    assert_eq!(links_of(&snapshot), vec![(0, 1)]);
  }

  #[test]
  fn resolve_unmatching_peer_range_still_used() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.ensure_package("package-x", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-a", "1.0.0"), ("package-x", "^1"));
    set.add_peer_dependency(("package-b", "1.0.0"), ("package-x", "^2"));
    set.add_resolution("package-b", "^1", "1.0.0");
    set.add_resolution("package-x", "^1", "1.0.0");

    let snapshot = set.resolve().unwrap();
    // package-x@1 does not satisfy ^2 but is used anyway (with a warning)
    assert_eq!(
      nodes_of(&snapshot),
      vec!["package-a@1.0.0", "package-b@1.0.0", "package-x@1.0.0"]
    );
    assert_eq!(links_of(&snapshot), vec![(0, 1), (0, 2), (1, 2)]);
  }

  #[test]
  fn resolve_dev_deps_only_for_locals() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.ensure_package("package-c", "1.0.0");
    set.add_dev_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-a", "1.0.0"), ("package-c", "^1"));
    // the non-local package-c's dev dependency is ignored entirely, so
    // its (unresolvable) range never errors
    set.add_dev_dependency(("package-c", "1.0.0"), ("package-x", "^9"));
    set.add_resolution("package-b", "^1", "1.0.0");
    set.add_resolution("package-c", "^1", "1.0.0");

    let snapshot = set.resolve().unwrap();
    assert_eq!(
      nodes_of(&snapshot),
      vec!["package-a@1.0.0", "package-b@1.0.0", "package-c@1.0.0"]
    );
    assert_eq!(links_of(&snapshot), vec![(0, 1), (0, 2)]);
  }

  #[test]
  fn resolve_optional_dep_with_missing_target() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.add_optional_dependency(("package-a", "1.0.0"), ("package-m", "^1"));
    set.add_optional_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    // package-m has a resolution but no manifest; it is silently skipped
    set.add_resolution("package-m", "^1", "1.0.0");
    set.add_resolution("package-b", "^1", "1.0.0");

    let snapshot = set.resolve().unwrap();
    assert_eq!(
      nodes_of(&snapshot),
      vec!["package-a@1.0.0", "package-b@1.0.0"]
    );
    assert_eq!(links_of(&snapshot), vec![(0, 1)]);
  }

  #[test]
  fn resolve_missing_resolution_entry_fails() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));

    let err = set.resolve().unwrap_err();
    assert!(matches!(err, ResolveError::MissingResolution { .. }));
    assert_eq!(
      err.to_string(),
      "No resolution found for \"package-b@^1\" required by \"package-a@1.0.0\""
    );
  }

  #[test]
  fn resolve_missing_target_package_fails() {
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_resolution("package-b", "^1", "1.0.0");

    let err = set.resolve().unwrap_err();
    assert!(matches!(err, ResolveError::MissingTargetPackage { .. }));
  }

  #[test]
  fn resolve_nested_peers_with_watchdog() {
    // package-b peers on package-x and so does its child package-c; the
    // child entry spins through retry-later until package-b is
    // virtualized, after which it resolves against the virtual parent
    let mut set = TestManifestSet::default();
    set.ensure_local_package("package-a", "1.0.0");
    set.ensure_package("package-b", "1.0.0");
    set.ensure_package("package-c", "1.0.0");
    set.ensure_package("package-x", "1.0.0");
    set.add_dependency(("package-a", "1.0.0"), ("package-b", "^1"));
    set.add_dependency(("package-a", "1.0.0"), ("package-x", "^1"));
    set.add_dependency(("package-b", "1.0.0"), ("package-c", "^1"));
    set.add_peer_dependency(("package-b", "1.0.0"), ("package-x", "^1"));
    set.add_peer_dependency(("package-c", "1.0.0"), ("package-x", "^1"));
    set.add_resolution("package-b", "^1", "1.0.0");
    set.add_resolution("package-c", "^1", "1.0.0");
    set.add_resolution("package-x", "^1", "1.0.0");

    let snapshot = set.resolve().unwrap();
    assert_eq!(
      nodes_of(&snapshot),
      vec![
        "package-a@1.0.0",
        "package-b@1.0.0",
        "package-c@1.0.0",
        "package-x@1.0.0",
      ]
    );
    assert_eq!(
      links_of(&snapshot),
      vec![(0, 1), (0, 3), (1, 2), (1, 3), (2, 3)]
    );
  }
}
