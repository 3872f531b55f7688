// Copyright 2018-2026 the Deno authors. MIT license.

use std::path::Path;
use std::path::PathBuf;

use crate::fs::relative_path;

#[derive(Debug, thiserror::Error)]
pub enum BinEntriesError {
  #[error("Creating '{path}'")]
  Creating {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[cfg(unix)]
  #[error("Setting permissions on '{path}'")]
  Permissions {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Can't set up '{name}' bin at {path}")]
  SetUpBin {
    name: String,
    path: PathBuf,
    #[source]
    source: Box<Self>,
  },
  #[cfg(unix)]
  #[error("Removing existing bin '{path}'")]
  RemoveBinSymlink {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Installs a shim for `entrypoint` at `bin_dir/<bin_name>`. The caller has
/// verified that the entrypoint exists as a file; the shim replaces any
/// previous one with the same name.
pub(crate) fn set_up_bin_entry(
  bin_name: &str,
  entrypoint: &Path,
  bin_dir: &Path,
) -> Result<(), BinEntriesError> {
  #[cfg(unix)]
  {
    symlink_bin_entry(bin_name, entrypoint, bin_dir)
  }
  #[cfg(windows)]
  {
    set_up_bin_shim(bin_name, entrypoint, bin_dir)
  }
}

#[cfg(windows)]
fn set_up_bin_shim(
  bin_name: &str,
  entrypoint: &Path,
  bin_dir: &Path,
) -> Result<(), BinEntriesError> {
  let mut cmd_shim = bin_dir.join(bin_name);
  cmd_shim.set_extension("cmd");
  let target = relative_path(bin_dir, entrypoint)
    .unwrap_or_else(|| entrypoint.to_path_buf());
  let shim = format!("@\"%~dp0\\{}\" %*\r\n", target.display());
  std::fs::write(&cmd_shim, shim).map_err(|err| {
    BinEntriesError::SetUpBin {
      name: bin_name.to_string(),
      path: cmd_shim.clone(),
      source: Box::new(err.into()),
    }
  })?;
  Ok(())
}

/// Make the file at `path` executable if it exists.
/// Returns `true` if the file exists, `false` otherwise.
#[cfg(unix)]
fn make_executable_if_exists(path: &Path) -> Result<bool, BinEntriesError> {
  use std::io;
  use std::os::unix::fs::PermissionsExt;
  let mut perms = match std::fs::metadata(path) {
    Ok(metadata) => metadata.permissions(),
    Err(err) => {
      if err.kind() == io::ErrorKind::NotFound {
        return Ok(false);
      }
      return Err(err.into());
    }
  };
  if perms.mode() & 0o111 == 0 {
    // if the original file is not executable, make it executable
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms).map_err(|source| {
      BinEntriesError::Permissions {
        path: path.to_path_buf(),
        source,
      }
    })?;
  }
  Ok(true)
}

#[cfg(unix)]
fn symlink_bin_entry(
  bin_name: &str,
  entrypoint: &Path,
  bin_dir: &Path,
) -> Result<(), BinEntriesError> {
  use std::io;
  use std::os::unix::fs::symlink;
  let link = bin_dir.join(bin_name);

  let found = make_executable_if_exists(entrypoint).map_err(|source| {
    BinEntriesError::SetUpBin {
      name: bin_name.to_string(),
      path: entrypoint.to_path_buf(),
      source: Box::new(source),
    }
  })?;
  if !found {
    return Ok(());
  }

  let original_relative = relative_path(bin_dir, entrypoint)
    .unwrap_or_else(|| entrypoint.to_path_buf());

  if let Err(err) = symlink(&original_relative, &link) {
    if err.kind() == io::ErrorKind::AlreadyExists {
      // remove and retry
      std::fs::remove_file(&link).map_err(|source| {
        BinEntriesError::RemoveBinSymlink {
          path: link.clone(),
          source,
        }
      })?;
      symlink(&original_relative, &link).map_err(|source| {
        BinEntriesError::SetUpBin {
          name: bin_name.to_string(),
          path: original_relative.to_path_buf(),
          source: Box::new(source.into()),
        }
      })?;
      return Ok(());
    }
    return Err(BinEntriesError::SetUpBin {
      name: bin_name.to_string(),
      path: original_relative.to_path_buf(),
      source: Box::new(err.into()),
    });
  }

  Ok(())
}

#[cfg(test)]
mod test {
  use super::*;

  #[cfg(unix)]
  #[test]
  fn shim_points_at_entrypoint_and_makes_it_executable() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let package_dir = temp_dir.path().join("pkg");
    let bin_dir = temp_dir.path().join(".bin");
    std::fs::create_dir_all(&package_dir).unwrap();
    std::fs::create_dir_all(&bin_dir).unwrap();
    let entrypoint = package_dir.join("cli.js");
    std::fs::write(&entrypoint, "#!/usr/bin/env node\n").unwrap();

    set_up_bin_entry("pkg-cli", &entrypoint, &bin_dir).unwrap();

    let link = bin_dir.join("pkg-cli");
    assert_eq!(
      std::fs::read_link(&link).unwrap(),
      PathBuf::from("../pkg/cli.js")
    );
    let mode = std::fs::metadata(&entrypoint).unwrap().permissions().mode();
    assert_ne!(mode & 0o111, 0);
  }

  #[cfg(unix)]
  #[test]
  fn existing_shim_is_replaced() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let bin_dir = temp_dir.path().join(".bin");
    std::fs::create_dir_all(&bin_dir).unwrap();
    let first = temp_dir.path().join("first.js");
    let second = temp_dir.path().join("second.js");
    std::fs::write(&first, "").unwrap();
    std::fs::write(&second, "").unwrap();

    set_up_bin_entry("tool", &first, &bin_dir).unwrap();
    set_up_bin_entry("tool", &second, &bin_dir).unwrap();

    assert_eq!(
      std::fs::read_link(bin_dir.join("tool")).unwrap(),
      PathBuf::from("../second.js")
    );
  }
}
