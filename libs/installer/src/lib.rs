// Copyright 2018-2026 the Deno authors. MIT license.

//! Materializes a resolved package graph on disk.
//!
//! Every package is copied into its own directory inside an installation
//! store and its dependencies are linked into a `node_modules` folder next
//! to its contents, so a package can only ever see the dependencies it
//! declared. After layout, `install`/`postinstall` lifecycle scripts run
//! over the strongly-connected-component DAG of the graph with bounded
//! parallelism.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;

mod bin_entries;
mod fs;
mod lifecycle_scripts;
pub mod scc;

pub use bin_entries::BinEntriesError;
pub use lifecycle_scripts::LifecycleScriptsExecutor;
pub use lifecycle_scripts::NullLifecycleScriptsExecutor;
pub use lifecycle_scripts::ScriptInvocation;
pub use lifecycle_scripts::ShellScriptsExecutor;

use crate::fs::join_package_name;
use crate::fs::CopyAction;

/// Cap on concurrently in-flight directory, symlink and shim operations,
/// preventing file descriptor exhaustion on large graphs.
const CONCURRENCY_LIMIT: usize = 300;

/// The installer's input: packages addressed by caller-supplied unique keys
/// plus the links to materialize between them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallGraph {
  pub nodes: Vec<InstallNode>,
  pub links: Vec<InstallLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallNode {
  /// Unique identifier, also the directory name inside the store.
  pub key: String,
  /// Package name; decides the `node_modules/<name>` link paths.
  pub name: String,
  /// Absolute path to the package's existing contents. May not exist, in
  /// which case the package is treated as empty.
  pub location: PathBuf,
  /// Install into `location` itself instead of copying into the store.
  /// Used for packages that live inside the project.
  #[serde(default)]
  pub keep_in_place: bool,
  /// Executables the package exposes: bin name to a path relative to the
  /// package root.
  #[serde(default)]
  pub bins: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallLink {
  pub source: String,
  pub target: String,
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
  /// Basenames of top level entries not to copy into the store.
  pub files_to_exclude: HashSet<String>,
  /// Let the last shim win when two dependencies of one package expose the
  /// same bin name, instead of failing validation.
  pub ignore_bin_conflicts: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
  #[error("Location is not an absolute path: \"{0}\"")]
  StoreNotAbsolute(String),
  #[error("Location does not exist: \"{0}\"")]
  StoreNotFound(String),
  #[error("Location is not a directory: \"{0}\"")]
  StoreNotADirectory(String),
  #[error("Location is not an empty directory: \"{0}\"")]
  StoreNotEmpty(String),
  #[error("Multiple nodes have the following key: \"{0}\"")]
  DuplicateKey(String),
  #[error("Location of a node is not absolute: \"{0}\"")]
  NodeLocationNotAbsolute(String),
  #[error("Location of a node is not a directory: \"{0}\"")]
  NodeLocationNotADirectory(String),
  #[error("Package name invalid: \"{0}\"")]
  InvalidPackageName(String),
  #[error("Invalid link source: \"{0}\"")]
  InvalidLinkSource(String),
  #[error("Invalid link target: \"{0}\"")]
  InvalidLinkTarget(String),
  #[error("Package \"{source_key}\" depends on multiple packages called \"{name}\"")]
  ConflictingTargetNames { source_key: String, name: String },
  #[error("Package \"{key}\" exposes a bin script with an invalid name: \"{name}\"")]
  InvalidBinName { key: String, name: String },
  #[error(
    "Several different scripts called \"{name}\" need to be installed at the same location ({source_key})."
  )]
  ConflictingBinScripts { name: String, source_key: String },
  #[error("Creating '{path}'")]
  Creating {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Removing '{path}'")]
  Removing {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Reading '{path}'")]
  Reading {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Copying '{from}' to '{to}'")]
  Copying {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Symlinking '{from}' to '{to}'")]
  Symlinking {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Parsing '{path}'")]
  ParsingPackageJson {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
  #[error("Script \"{script}\" of package \"{key}\" failed: {error:#}")]
  Script {
    key: String,
    script: String,
    error: anyhow::Error,
  },
  #[error(transparent)]
  BinEntries(#[from] BinEntriesError),
  #[error(transparent)]
  TaskJoin(#[from] tokio::task::JoinError),
}

/// Installs package graphs into a store directory.
pub struct PackageInstaller {
  options: InstallOptions,
  scripts_executor: Box<dyn LifecycleScriptsExecutor>,
}

impl PackageInstaller {
  pub fn new(options: InstallOptions) -> Self {
    Self::with_scripts_executor(options, Box::new(ShellScriptsExecutor))
  }

  pub fn with_scripts_executor(
    options: InstallOptions,
    scripts_executor: Box<dyn LifecycleScriptsExecutor>,
  ) -> Self {
    Self {
      options,
      scripts_executor,
    }
  }

  /// Validates the graph, materializes it under `store_dir` and runs the
  /// lifecycle scripts.
  ///
  /// All validation happens before the first disk mutation; after that the
  /// phases are strictly ordered: file copies, then symlinks, then bin
  /// shims, then scripts. A failure aborts the install without rollback.
  pub async fn install(
    &self,
    graph: &InstallGraph,
    store_dir: &Path,
  ) -> Result<(), InstallError> {
    let links = validate(graph, store_dir, &self.options)?;

    let destinations: Vec<PathBuf> = graph
      .nodes
      .iter()
      .map(|node| {
        if node.keep_in_place {
          node.location.clone()
        } else {
          store_dir.join(&node.key)
        }
      })
      .collect();

    self
      .copy_packages_to_store(graph, &destinations)
      .await?;

    // explicit links win over the implicit self link in the unusual case
    // of a dependency sharing the node's own name
    let mut link_jobs: BTreeMap<(usize, String), usize> = BTreeMap::new();
    for &(source, target) in &links {
      link_jobs.insert((source, graph.nodes[target].name.clone()), target);
    }
    for (index, node) in graph.nodes.iter().enumerate() {
      link_jobs.entry((index, node.name.clone())).or_insert(index);
    }

    self.create_symlinks(&link_jobs, &destinations).await?;
    self
      .create_bin_shims(graph, &link_jobs, &destinations)
      .await?;
    self
      .run_scripts(graph, &links, &destinations)
      .await?;

    Ok(())
  }

  /// Copies every non-in-place package into `store/<key>` and purges the
  /// `node_modules` folder of in-place ones. Scanning happens with bounded
  /// concurrency; the resulting flat action list is executed by the copy
  /// worker pool.
  async fn copy_packages_to_store(
    &self,
    graph: &InstallGraph,
    destinations: &[PathBuf],
  ) -> Result<(), InstallError> {
    let files_to_exclude = Arc::new(self.options.files_to_exclude.clone());
    let mut prepare_jobs = futures::stream::iter(
      graph.nodes.iter().enumerate().map(|(index, node)| {
        let location = node.location.clone();
        let keep_in_place = node.keep_in_place;
        let destination = destinations[index].clone();
        let files_to_exclude = files_to_exclude.clone();
        async move {
          let actions = tokio::task::spawn_blocking(move || {
            prepare_node(
              &location,
              keep_in_place,
              &destination,
              &files_to_exclude,
            )
          })
          .await??;
          Ok::<_, InstallError>(actions)
        }
      }),
    )
    .buffer_unordered(CONCURRENCY_LIMIT);

    let mut copy_actions = Vec::new();
    while let Some(result) = prepare_jobs.next().await {
      copy_actions.extend(result?);
    }
    drop(prepare_jobs);

    fs::execute_copy_actions(copy_actions).await
  }

  async fn create_symlinks(
    &self,
    link_jobs: &BTreeMap<(usize, String), usize>,
    destinations: &[PathBuf],
  ) -> Result<(), InstallError> {
    let mut symlink_jobs = futures::stream::iter(link_jobs.iter().map(
      |(&(source, ref name), &target)| {
        let link = join_package_name(
          &destinations[source].join("node_modules"),
          name,
        );
        let original = destinations[target].clone();
        async move {
          tokio::task::spawn_blocking(move || {
            if let Some(parent) = link.parent() {
              std::fs::create_dir_all(parent).map_err(|source| {
                InstallError::Creating {
                  path: parent.to_path_buf(),
                  source,
                }
              })?;
            }
            fs::symlink_dir(&original, &link)
          })
          .await??;
          Ok::<_, InstallError>(())
        }
      },
    ))
    .buffer_unordered(CONCURRENCY_LIMIT);

    while let Some(result) = symlink_jobs.next().await {
      result?;
    }
    Ok(())
  }

  /// Installs bin shims for every linked dependency that exposes bins.
  /// Entries whose entrypoint file does not exist are skipped silently.
  /// Shims of one source are written sequentially so that a permitted
  /// conflict deterministically resolves to the last one.
  async fn create_bin_shims(
    &self,
    graph: &InstallGraph,
    link_jobs: &BTreeMap<(usize, String), usize>,
    destinations: &[PathBuf],
  ) -> Result<(), InstallError> {
    let mut shims_by_source: BTreeMap<usize, Vec<(String, PathBuf)>> =
      BTreeMap::new();
    for (&(source, _), &target) in link_jobs {
      for (bin_name, bin_path) in &graph.nodes[target].bins {
        let entrypoint = join_package_name(&destinations[target], bin_path);
        shims_by_source
          .entry(source)
          .or_default()
          .push((bin_name.clone(), entrypoint));
      }
    }

    let mut shim_jobs =
      futures::stream::iter(shims_by_source.into_iter().map(
        |(source, shims)| {
          let bin_dir =
            destinations[source].join("node_modules").join(".bin");
          async move {
            tokio::task::spawn_blocking(move || {
              set_up_source_bins(&bin_dir, &shims)
            })
            .await??;
            Ok::<_, InstallError>(())
          }
        },
      ))
      .buffer_unordered(CONCURRENCY_LIMIT);

    while let Some(result) = shim_jobs.next().await {
      result?;
    }
    Ok(())
  }

  /// Runs lifecycle scripts over the component DAG of the final on-disk
  /// graph, self links included.
  async fn run_scripts(
    &self,
    graph: &InstallGraph,
    links: &[(usize, usize)],
    destinations: &[PathBuf],
  ) -> Result<(), InstallError> {
    let mut scc_links: BTreeSet<(usize, usize)> =
      links.iter().copied().collect();
    for index in 0..graph.nodes.len() {
      scc_links.insert((index, index));
    }
    let keys: Vec<String> =
      graph.nodes.iter().map(|node| node.key.clone()).collect();
    let roots: HashSet<usize> = graph
      .nodes
      .iter()
      .enumerate()
      .filter(|(_, node)| node.keep_in_place)
      .map(|(index, _)| index)
      .collect();
    let condensation = scc::condense(
      &keys,
      &scc_links.into_iter().collect::<Vec<_>>(),
      &roots,
    );
    let destinations_by_key: HashMap<String, PathBuf> = graph
      .nodes
      .iter()
      .zip(destinations)
      .map(|(node, destination)| (node.key.clone(), destination.clone()))
      .collect();
    lifecycle_scripts::run_lifecycle_scripts(
      &condensation,
      &destinations_by_key,
      &*self.scripts_executor,
    )
    .await
  }
}

fn prepare_node(
  location: &Path,
  keep_in_place: bool,
  destination: &Path,
  files_to_exclude: &HashSet<String>,
) -> Result<Vec<CopyAction>, InstallError> {
  if keep_in_place {
    fs::remove_dir_all_if_exists(&destination.join("node_modules"))?;
    Ok(Vec::new())
  } else {
    std::fs::create_dir_all(destination).map_err(|source| {
      InstallError::Creating {
        path: destination.to_path_buf(),
        source,
      }
    })?;
    fs::scan_package_contents(location, destination, files_to_exclude)
  }
}

fn set_up_source_bins(
  bin_dir: &Path,
  shims: &[(String, PathBuf)],
) -> Result<(), InstallError> {
  let mut created_dir = false;
  for (bin_name, entrypoint) in shims {
    if !entrypoint.is_file() {
      continue;
    }
    if !created_dir {
      std::fs::create_dir_all(bin_dir).map_err(|source| {
        InstallError::Creating {
          path: bin_dir.to_path_buf(),
          source,
        }
      })?;
      created_dir = true;
    }
    bin_entries::set_up_bin_entry(bin_name, entrypoint, bin_dir)?;
  }
  Ok(())
}

/// Runs every check of the input before anything touches the disk; the
/// first offending condition wins. Returns the deduplicated links as node
/// index pairs.
fn validate(
  graph: &InstallGraph,
  store_dir: &Path,
  options: &InstallOptions,
) -> Result<Vec<(usize, usize)>, InstallError> {
  // the store: absolute, existing, a directory, empty
  if !store_dir.is_absolute() {
    return Err(InstallError::StoreNotAbsolute(
      store_dir.display().to_string(),
    ));
  }
  let metadata = match std::fs::metadata(store_dir) {
    Ok(metadata) => metadata,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
      return Err(InstallError::StoreNotFound(
        store_dir.display().to_string(),
      ));
    }
    Err(source) => {
      return Err(InstallError::Reading {
        path: store_dir.to_path_buf(),
        source,
      });
    }
  };
  if !metadata.is_dir() {
    return Err(InstallError::StoreNotADirectory(
      store_dir.display().to_string(),
    ));
  }
  let mut entries =
    std::fs::read_dir(store_dir).map_err(|source| InstallError::Reading {
      path: store_dir.to_path_buf(),
      source,
    })?;
  if entries.next().is_some() {
    return Err(InstallError::StoreNotEmpty(
      store_dir.display().to_string(),
    ));
  }

  // unique keys
  let mut node_by_key: HashMap<&str, usize> =
    HashMap::with_capacity(graph.nodes.len());
  for (index, node) in graph.nodes.iter().enumerate() {
    if node_by_key.insert(node.key.as_str(), index).is_some() {
      return Err(InstallError::DuplicateKey(node.key.clone()));
    }
  }

  // locations: absolute and, when they exist, directories
  for node in &graph.nodes {
    if !node.location.is_absolute() {
      return Err(InstallError::NodeLocationNotAbsolute(
        node.location.display().to_string(),
      ));
    }
    match std::fs::metadata(&node.location) {
      Ok(metadata) if !metadata.is_dir() => {
        return Err(InstallError::NodeLocationNotADirectory(
          node.location.display().to_string(),
        ));
      }
      Ok(_) => {}
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        // treated as an empty package
      }
      Err(source) => {
        return Err(InstallError::Reading {
          path: node.location.clone(),
          source,
        });
      }
    }
  }

  // package names
  for node in &graph.nodes {
    if !lazy_regex::regex_is_match!(
      r"^(@[a-z0-9-~][a-z0-9-._~]*/)?[a-zA-Z0-9-~][a-zA-Z0-9-._~]*$",
      &node.name
    ) {
      return Err(InstallError::InvalidPackageName(node.name.clone()));
    }
  }

  // link endpoints
  let mut links = Vec::with_capacity(graph.links.len());
  for link in &graph.links {
    let Some(&source) = node_by_key.get(link.source.as_str()) else {
      return Err(InstallError::InvalidLinkSource(link.source.clone()));
    };
    let Some(&target) = node_by_key.get(link.target.as_str()) else {
      return Err(InstallError::InvalidLinkTarget(link.target.clone()));
    };
    links.push((source, target));
  }
  links.sort_unstable();
  links.dedup();

  // a node_modules directory cannot host two packages under one name
  let mut names_per_source: HashMap<usize, HashMap<&str, usize>> =
    HashMap::new();
  for &(source, target) in &links {
    let names = names_per_source.entry(source).or_default();
    let name = graph.nodes[target].name.as_str();
    if let Some(&existing) = names.get(name) {
      if existing != target {
        return Err(InstallError::ConflictingTargetNames {
          source_key: graph.nodes[source].key.clone(),
          name: name.to_string(),
        });
      }
    } else {
      names.insert(name, target);
    }
  }

  // bin names must be plain file names
  for node in &graph.nodes {
    for bin_name in node.bins.keys() {
      if bin_name.contains(&['/', '\\', '\n'][..]) {
        return Err(InstallError::InvalidBinName {
          key: node.key.clone(),
          name: bin_name.clone(),
        });
      }
    }
  }

  // two dependencies of one package must not expose the same bin name
  if !options.ignore_bin_conflicts {
    let mut bins_per_source: HashMap<usize, HashMap<&str, usize>> =
      HashMap::new();
    for &(source, target) in &links {
      let bins = bins_per_source.entry(source).or_default();
      for bin_name in graph.nodes[target].bins.keys() {
        if let Some(&existing) = bins.get(bin_name.as_str()) {
          if existing != target {
            return Err(InstallError::ConflictingBinScripts {
              name: bin_name.clone(),
              source_key: graph.nodes[source].key.clone(),
            });
          }
        } else {
          bins.insert(bin_name, target);
        }
      }
    }
  }

  Ok(links)
}
