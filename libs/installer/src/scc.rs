// Copyright 2018-2026 the Deno authors. MIT license.

//! Condensation of a package link graph into its strongly connected
//! components. Package graphs contain cycles, so the installer runs
//! lifecycle scripts over the component DAG instead of recursing.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;

/// One strongly connected component of the package graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Component {
  /// Keys of the member nodes, in input order.
  pub keys: Vec<String>,
  /// Component ids this component depends on, excluding itself. Components
  /// are emitted leaves-first, so dependencies always have smaller ids.
  pub dependencies: Vec<usize>,
}

/// The component DAG of a package graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condensation {
  pub components: BTreeMap<usize, Component>,
  /// Components containing at least one node the caller flagged as a root.
  pub root_components: Vec<usize>,
}

/// Tarjan's strongly connected components algorithm, made iterative with an
/// explicit work stack since dependency chains can be deep.
///
/// Components come out in reverse topological order (leaf/sink components
/// first), which is exactly the order needed to run scripts bottom-up.
struct TarjanState {
  index_counter: usize,
  stack: Vec<usize>,
  on_stack: Vec<bool>,
  indices: Vec<Option<usize>>,
  lowlinks: Vec<usize>,
  result: Vec<Vec<usize>>,
}

impl TarjanState {
  fn new(node_count: usize) -> Self {
    Self {
      index_counter: 0,
      stack: Vec::new(),
      on_stack: vec![false; node_count],
      indices: vec![None; node_count],
      lowlinks: vec![0; node_count],
      result: Vec::new(),
    }
  }

  fn visit(&mut self, node: usize) {
    self.indices[node] = Some(self.index_counter);
    self.lowlinks[node] = self.index_counter;
    self.index_counter += 1;
    self.stack.push(node);
    self.on_stack[node] = true;
  }
}

fn strongconnect(start: usize, adj: &[Vec<usize>], state: &mut TarjanState) {
  // (node, index of the next child to look at)
  let mut frames: Vec<(usize, usize)> = vec![(start, 0)];
  state.visit(start);

  while let Some(frame) = frames.last_mut() {
    let node = frame.0;
    let next_child = adj[node].get(frame.1).copied();
    if let Some(child) = next_child {
      frame.1 += 1;
      if state.indices[child].is_none() {
        state.visit(child);
        frames.push((child, 0));
      } else if state.on_stack[child] {
        let child_index = state.indices[child].unwrap();
        if child_index < state.lowlinks[node] {
          state.lowlinks[node] = child_index;
        }
      }
      continue;
    }

    // all children handled: emit a component if this is its root, then
    // fold the lowlink into the parent frame
    if state.lowlinks[node] == state.indices[node].unwrap() {
      let mut component = Vec::new();
      loop {
        let member = state.stack.pop().unwrap();
        state.on_stack[member] = false;
        component.push(member);
        if member == node {
          break;
        }
      }
      state.result.push(component);
    }
    frames.pop();
    if let Some(&(parent, _)) = frames.last() {
      if state.lowlinks[node] < state.lowlinks[parent] {
        state.lowlinks[parent] = state.lowlinks[node];
      }
    }
  }
}

/// Reduces the graph over `keys` to a DAG of strongly connected components.
///
/// `links` are (source, target) index pairs into `keys`; duplicates are
/// tolerated. `roots` flags the node indices whose components become root
/// components.
pub fn condense(
  keys: &[String],
  links: &[(usize, usize)],
  roots: &HashSet<usize>,
) -> Condensation {
  let mut adj: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];
  for &(source, target) in links {
    adj[source].push(target);
  }
  for children in &mut adj {
    children.sort_unstable();
    children.dedup();
  }

  let mut state = TarjanState::new(keys.len());
  for node in 0..keys.len() {
    if state.indices[node].is_none() {
      strongconnect(node, &adj, &mut state);
    }
  }

  let mut component_of = vec![0; keys.len()];
  for (component_id, members) in state.result.iter().enumerate() {
    for &member in members {
      component_of[member] = component_id;
    }
  }

  let mut components = BTreeMap::new();
  let mut root_components = Vec::new();
  for (component_id, members) in state.result.iter().enumerate() {
    let mut members = members.clone();
    members.sort_unstable();
    let mut dependencies = BTreeSet::new();
    for &member in &members {
      for &child in &adj[member] {
        if component_of[child] != component_id {
          dependencies.insert(component_of[child]);
        }
      }
    }
    if members.iter().any(|member| roots.contains(member)) {
      root_components.push(component_id);
    }
    components.insert(
      component_id,
      Component {
        keys: members.iter().map(|&member| keys[member].clone()).collect(),
        dependencies: dependencies.into_iter().collect(),
      },
    );
  }

  Condensation {
    components,
    root_components,
  }
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;

  fn keys_of(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
  }

  fn component_keys(condensation: &Condensation) -> Vec<Vec<&str>> {
    condensation
      .components
      .values()
      .map(|c| c.keys.iter().map(|k| k.as_str()).collect())
      .collect()
  }

  #[test]
  fn condense_chain() {
    let keys = keys_of(&["a", "b", "c"]);
    let links = vec![(0, 1), (1, 2)];
    let condensation = condense(&keys, &links, &HashSet::from([0]));

    // leaves come first
    assert_eq!(component_keys(&condensation), vec![
      vec!["c"],
      vec!["b"],
      vec!["a"]
    ]);
    assert_eq!(condensation.components[&0].dependencies, Vec::<usize>::new());
    assert_eq!(condensation.components[&1].dependencies, vec![0]);
    assert_eq!(condensation.components[&2].dependencies, vec![1]);
    assert_eq!(condensation.root_components, vec![2]);
  }

  #[test]
  fn condense_cycle() {
    let keys = keys_of(&["a", "b", "c"]);
    // a <-> b, both depending on c
    let links = vec![(0, 1), (1, 0), (0, 2), (1, 2)];
    let condensation = condense(&keys, &links, &HashSet::from([0]));

    assert_eq!(component_keys(&condensation), vec![
      vec!["c"],
      vec!["a", "b"]
    ]);
    assert_eq!(condensation.components[&1].dependencies, vec![0]);
    assert_eq!(condensation.root_components, vec![1]);
  }

  #[test]
  fn condense_self_loop_is_not_a_dependency() {
    let keys = keys_of(&["a", "b"]);
    let links = vec![(0, 0), (1, 1), (0, 1)];
    let condensation = condense(&keys, &links, &HashSet::from([0]));

    assert_eq!(component_keys(&condensation), vec![vec!["b"], vec!["a"]]);
    assert_eq!(condensation.components[&0].dependencies, Vec::<usize>::new());
    assert_eq!(condensation.components[&1].dependencies, vec![0]);
  }

  #[test]
  fn condense_every_node_in_exactly_one_component() {
    let keys = keys_of(&["a", "b", "c", "d", "e"]);
    let links = vec![(0, 1), (1, 2), (2, 1), (2, 3), (4, 3)];
    let condensation = condense(&keys, &links, &HashSet::from([0, 4]));

    let mut seen = Vec::new();
    for component in condensation.components.values() {
      for key in &component.keys {
        seen.push(key.clone());
      }
    }
    // the component graph is a DAG: dependencies always point at
    // already-emitted (smaller id) components
    for (id, component) in &condensation.components {
      for dep in &component.dependencies {
        assert!(dep < id);
      }
    }
    seen.sort();
    assert_eq!(seen, keys_of(&["a", "b", "c", "d", "e"]));
    assert_eq!(condensation.root_components.len(), 2);
  }
}
