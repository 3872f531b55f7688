// Copyright 2018-2026 the Deno authors. MIT license.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;

use deno_semver::Version;

use crate::GraphLink;
use crate::GraphNode;
use crate::GraphSnapshot;

/// A unique identifier to a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
  fn index(&self) -> usize {
    self.0 as usize
  }
}

/// An unresolved peer dependency attached to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPeerLink {
  pub target_name: String,
  pub target_range: String,
  pub optional: bool,
}

/// A pending peer link enriched with one of the source's parents. The
/// resolver processes one of these per (parent, source) combination since
/// each parent may end up with a differently virtualized source.
#[derive(Debug, Clone)]
pub struct PendingPeerEntry {
  pub parent: NodeId,
  pub source: NodeId,
  pub target_name: String,
  pub target_range: String,
  pub optional: bool,
}

#[derive(Debug)]
struct Node {
  name: String,
  version: Version,
  is_local: bool,
  /// Peer dependencies fulfilled so far. Two nodes may share a
  /// (name, version) and differ only here; the node with an empty map is
  /// the "base" node. Uses a BTreeMap so equality and iteration order are
  /// deterministic.
  peer_deps: BTreeMap<String, NodeId>,
}

/// Mutable dependency graph with virtualization primitives.
///
/// Nodes live in an arena and are addressed by integer ids; the forward and
/// reverse link indices are kept paired by every mutation. A graph is
/// created empty, mutated by a single resolve pass, and then projected once
/// into the public [`GraphSnapshot`] shape.
#[derive(Default)]
pub struct Graph {
  nodes: Vec<Node>,
  forward: Vec<BTreeSet<NodeId>>,
  reverse: Vec<BTreeSet<NodeId>>,
  pending_peers: Vec<Vec<PendingPeerLink>>,
  nodes_by_name: HashMap<String, Vec<NodeId>>,
}

impl Graph {
  pub fn new() -> Self {
    Default::default()
  }

  /// Creates the base node for a (name, version). Calling this twice for
  /// the same pair is not expected in normal use; the newest node then
  /// shadows the base index.
  pub fn add_node(
    &mut self,
    name: &str,
    version: &Version,
    is_local: bool,
  ) -> NodeId {
    debug_assert!(
      self.get_base_node(name, version).is_none(),
      "duplicate base node for {}@{}",
      name,
      version
    );
    self.insert_node(Node {
      name: name.to_string(),
      version: version.clone(),
      is_local,
      peer_deps: Default::default(),
    })
  }

  fn insert_node(&mut self, node: Node) -> NodeId {
    let id = NodeId(self.nodes.len() as u32);
    self
      .nodes_by_name
      .entry(node.name.clone())
      .or_default()
      .push(id);
    self.nodes.push(node);
    self.forward.push(Default::default());
    self.reverse.push(Default::default());
    self.pending_peers.push(Default::default());
    id
  }

  /// The unique node with an empty peer_deps map for this (name, version),
  /// if any.
  pub fn get_base_node(&self, name: &str, version: &Version) -> Option<NodeId> {
    let candidates = self.nodes_by_name.get(name)?;
    candidates.iter().rev().copied().find(|id| {
      let node = &self.nodes[id.index()];
      node.version == *version && node.peer_deps.is_empty()
    })
  }

  pub fn node_name(&self, id: NodeId) -> &str {
    &self.nodes[id.index()].name
  }

  pub fn node_version(&self, id: NodeId) -> &Version {
    &self.nodes[id.index()].version
  }

  pub fn node_is_local(&self, id: NodeId) -> bool {
    self.nodes[id.index()].is_local
  }

  /// Idempotent set insertion into the forward and reverse indices.
  pub fn add_link(&mut self, source: NodeId, target: NodeId) {
    self.forward[source.index()].insert(target);
    self.reverse[target.index()].insert(source);
  }

  pub fn has_link(&self, source: NodeId, target: NodeId) -> bool {
    self.forward[source.index()].contains(&target)
  }

  pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    self.forward[id.index()].iter().copied()
  }

  /// The first forward child whose node name matches, in id order.
  pub fn find_child_by_name(&self, id: NodeId, name: &str) -> Option<NodeId> {
    self
      .children(id)
      .find(|child| self.nodes[child.index()].name == name)
  }

  pub fn add_peer_link(
    &mut self,
    source: NodeId,
    target_name: &str,
    target_range: &str,
    optional: bool,
  ) {
    self.pending_peers[source.index()].push(PendingPeerLink {
      target_name: target_name.to_string(),
      target_range: target_range.to_string(),
      optional,
    });
  }

  pub fn has_peer_link(&self, id: NodeId) -> bool {
    !self.pending_peers[id.index()].is_empty()
  }

  pub fn pending_peer_links(&self, id: NodeId) -> &[PendingPeerLink] {
    &self.pending_peers[id.index()]
  }

  /// Enumerates every pending peer link once per reverse neighbour of its
  /// source. Local nodes are excluded because their peer dependencies never
  /// propagate upwards.
  pub fn get_peer_links(&self) -> Vec<PendingPeerEntry> {
    let mut entries = Vec::new();
    for index in 0..self.nodes.len() {
      let source = NodeId(index as u32);
      if self.pending_peers[index].is_empty() || self.nodes[index].is_local {
        continue;
      }
      for &parent in &self.reverse[index] {
        for link in &self.pending_peers[index] {
          entries.push(PendingPeerEntry {
            parent,
            source,
            target_name: link.target_name.clone(),
            target_range: link.target_range.clone(),
            optional: link.optional,
          });
        }
      }
    }
    entries
  }

  /// An existing node equivalent to `source` with the fulfilled entry
  /// added to its peer_deps, if one was already created. The dedup key is
  /// (name, version, full peer_deps map).
  pub fn find_virtual(
    &self,
    source: NodeId,
    fulfilled_name: &str,
    fulfilled_target: NodeId,
  ) -> Option<NodeId> {
    let source_node = &self.nodes[source.index()];
    let mut expected = source_node.peer_deps.clone();
    expected.insert(fulfilled_name.to_string(), fulfilled_target);
    let candidates = self.nodes_by_name.get(&source_node.name)?;
    candidates.iter().copied().find(|id| {
      let node = &self.nodes[id.index()];
      *id != source
        && node.version == source_node.version
        && node.peer_deps == expected
    })
  }

  /// Clones `source` into a new virtual node whose peer_deps additionally
  /// map `fulfilled_name` to `fulfilled_target`. The clone duplicates all
  /// outbound links of the source, gains a link to the fulfilled target,
  /// and inherits the source's pending peer links minus any entry for the
  /// fulfilled name. The clone starts parentless; callers rewire a parent
  /// onto it afterwards.
  pub fn create_virtual(
    &mut self,
    source: NodeId,
    fulfilled_name: &str,
    fulfilled_target: NodeId,
  ) -> NodeId {
    let source_node = &self.nodes[source.index()];
    let mut peer_deps = source_node.peer_deps.clone();
    peer_deps.insert(fulfilled_name.to_string(), fulfilled_target);
    let new_node = Node {
      name: source_node.name.clone(),
      version: source_node.version.clone(),
      is_local: source_node.is_local,
      peer_deps,
    };
    let new_id = self.insert_node(new_node);
    for target in self.forward[source.index()].clone() {
      self.add_link(new_id, target);
    }
    self.add_link(new_id, fulfilled_target);
    let inherited: Vec<PendingPeerLink> = self.pending_peers[source.index()]
      .iter()
      .filter(|link| link.target_name != fulfilled_name)
      .cloned()
      .collect();
    self.pending_peers[new_id.index()] = inherited;
    new_id
  }

  /// Replaces the link `parent -> old_child` with `parent -> new_child`,
  /// keeping the reverse index consistent.
  pub fn rewire(
    &mut self,
    parent: NodeId,
    old_child: NodeId,
    new_child: NodeId,
  ) {
    self.forward[parent.index()].remove(&old_child);
    self.reverse[old_child.index()].remove(&parent);
    self.add_link(parent, new_child);
  }

  /// Projects the graph into its public shape: only nodes reachable from a
  /// local root survive, ids are densely renumbered in (name, version)
  /// lexicographic order, and links are sorted by (source, target).
  pub fn project(&self) -> GraphSnapshot {
    let mut reachable = vec![false; self.nodes.len()];
    let mut stack = Vec::new();
    for (index, node) in self.nodes.iter().enumerate() {
      if node.is_local {
        reachable[index] = true;
        stack.push(NodeId(index as u32));
      }
    }
    while let Some(id) = stack.pop() {
      for &target in &self.forward[id.index()] {
        if !reachable[target.index()] {
          reachable[target.index()] = true;
          stack.push(target);
        }
      }
    }

    let mut ordered: Vec<NodeId> = (0..self.nodes.len())
      .filter(|index| reachable[*index])
      .map(|index| NodeId(index as u32))
      .collect();
    // (name, version) lexicographic order; virtual twins share both, so
    // creation order breaks the tie to keep the output stable
    ordered.sort_by_cached_key(|id| {
      let node = &self.nodes[id.index()];
      (node.name.clone(), node.version.to_string(), *id)
    });

    let mut new_ids = HashMap::with_capacity(ordered.len());
    for (new_id, old_id) in ordered.iter().enumerate() {
      new_ids.insert(*old_id, new_id as u32);
    }

    let nodes = ordered
      .iter()
      .enumerate()
      .map(|(new_id, old_id)| {
        let node = &self.nodes[old_id.index()];
        GraphNode {
          id: new_id as u32,
          name: node.name.clone(),
          version: node.version.clone(),
        }
      })
      .collect();

    let mut links = Vec::new();
    for old_id in &ordered {
      let source_id = new_ids[old_id];
      for target in &self.forward[old_id.index()] {
        links.push(GraphLink {
          source_id,
          target_id: new_ids[target],
        });
      }
    }
    links.sort_by_key(|link| (link.source_id, link.target_id));

    GraphSnapshot { nodes, links }
  }
}
