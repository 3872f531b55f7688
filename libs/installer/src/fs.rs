// Copyright 2018-2026 the Deno authors. MIT license.

use std::collections::HashSet;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::InstallError;

/// One pending file copy. Parent directories are created while scanning, so
/// executing an action is a plain file copy.
#[derive(Debug)]
pub(crate) struct CopyAction {
  pub from: PathBuf,
  pub to: PathBuf,
}

/// Scans a package's contents into a flat list of copy actions, creating
/// the destination directory tree eagerly. A nonexistent location is
/// treated as an empty package. Top level entries whose basename is in
/// `files_to_exclude` are skipped.
pub(crate) fn scan_package_contents(
  location: &Path,
  destination: &Path,
  files_to_exclude: &HashSet<String>,
) -> Result<Vec<CopyAction>, InstallError> {
  let mut actions = Vec::new();
  if !location.exists() {
    return Ok(actions);
  }
  let entries = fs::read_dir(location).map_err(|source| {
    InstallError::Reading {
      path: location.to_path_buf(),
      source,
    }
  })?;
  for entry in entries {
    let entry = entry.map_err(|source| InstallError::Reading {
      path: location.to_path_buf(),
      source,
    })?;
    if let Some(name) = entry.file_name().to_str() {
      if files_to_exclude.contains(name) {
        continue;
      }
    }
    scan_entry(&entry, destination, &mut actions)?;
  }
  Ok(actions)
}

fn scan_dir(
  dir: &Path,
  destination: &Path,
  actions: &mut Vec<CopyAction>,
) -> Result<(), InstallError> {
  let entries = fs::read_dir(dir).map_err(|source| InstallError::Reading {
    path: dir.to_path_buf(),
    source,
  })?;
  for entry in entries {
    let entry = entry.map_err(|source| InstallError::Reading {
      path: dir.to_path_buf(),
      source,
    })?;
    scan_entry(&entry, destination, actions)?;
  }
  Ok(())
}

fn scan_entry(
  entry: &fs::DirEntry,
  destination: &Path,
  actions: &mut Vec<CopyAction>,
) -> Result<(), InstallError> {
  let from = entry.path();
  let to = destination.join(entry.file_name());
  let file_type = entry.file_type().map_err(|source| InstallError::Reading {
    path: from.clone(),
    source,
  })?;
  if file_type.is_dir() {
    fs::create_dir_all(&to).map_err(|source| InstallError::Creating {
      path: to.clone(),
      source,
    })?;
    scan_dir(&from, &to, actions)?;
  } else {
    actions.push(CopyAction { from, to });
  }
  Ok(())
}

/// Executes the copy actions with a pool of blocking workers, each handling
/// a disjoint slice of the list. The pool size is `min(file count,
/// WORKERS_LIMIT)`, defaulting the limit to the CPU count. The first
/// failing copy aborts the install.
pub(crate) async fn execute_copy_actions(
  actions: Vec<CopyAction>,
) -> Result<(), InstallError> {
  if actions.is_empty() {
    return Ok(());
  }
  let worker_count = copy_worker_count(actions.len());
  let chunk_size = actions.len().div_ceil(worker_count);
  let mut workers = Vec::with_capacity(worker_count);
  let mut actions = actions;
  while !actions.is_empty() {
    let rest = actions.split_off(actions.len().min(chunk_size));
    let chunk = std::mem::replace(&mut actions, rest);
    workers.push(tokio::task::spawn_blocking(move || copy_files(&chunk)));
  }
  for worker in workers {
    worker.await??;
  }
  Ok(())
}

fn copy_files(actions: &[CopyAction]) -> Result<(), InstallError> {
  for action in actions {
    fs::copy(&action.from, &action.to).map_err(|source| {
      InstallError::Copying {
        from: action.from.clone(),
        to: action.to.clone(),
        source,
      }
    })?;
  }
  Ok(())
}

fn copy_worker_count(file_count: usize) -> usize {
  let limit = std::env::var("WORKERS_LIMIT")
    .ok()
    .and_then(|value| value.parse::<usize>().ok())
    .filter(|limit| *limit > 0)
    .unwrap_or_else(|| {
      std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
    });
  limit.min(file_count).max(1)
}

pub(crate) fn remove_dir_all_if_exists(path: &Path) -> Result<(), InstallError> {
  match fs::remove_dir_all(path) {
    Ok(()) => Ok(()),
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(InstallError::Removing {
      path: path.to_path_buf(),
      source,
    }),
  }
}

/// Creates a directory symlink, replacing whatever was at the link path.
/// Uses a junction on Windows since those work on ntfs without elevated
/// privileges.
pub(crate) fn symlink_dir(
  original: &Path,
  link: &Path,
) -> Result<(), InstallError> {
  let err_mapper = |source: std::io::Error| InstallError::Symlinking {
    from: original.to_path_buf(),
    to: link.to_path_buf(),
    source,
  };
  let _ = fs::remove_file(link);
  let _ = fs::remove_dir_all(link);
  #[cfg(unix)]
  {
    std::os::unix::fs::symlink(original, link).map_err(err_mapper)
  }
  #[cfg(windows)]
  {
    junction::create(original, link).map_err(err_mapper)
  }
}

/// `to` relative to the directory `from`, when both are absolute.
pub(crate) fn relative_path(from: &Path, to: &Path) -> Option<PathBuf> {
  if !from.is_absolute() || !to.is_absolute() {
    return None;
  }
  let from_components: Vec<Component> = from.components().collect();
  let to_components: Vec<Component> = to.components().collect();
  let shared = from_components
    .iter()
    .zip(&to_components)
    .take_while(|(a, b)| a == b)
    .count();
  let mut result = PathBuf::new();
  for _ in shared..from_components.len() {
    result.push("..");
  }
  for component in &to_components[shared..] {
    result.push(component);
  }
  Some(result)
}

/// Appends a possibly scoped package name to a path one segment at a time
/// so separators are correct on every platform.
pub(crate) fn join_package_name(path: &Path, package_name: &str) -> PathBuf {
  let mut path = path.to_path_buf();
  for part in package_name.split('/') {
    path.push(part);
  }
  path
}
