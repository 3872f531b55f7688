// Copyright 2018-2026 the Deno authors. MIT license.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use anyhow::Error as AnyError;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::Deserialize;

use crate::scc::Condensation;
use crate::InstallError;

/// A single lifecycle script about to run: the `install` or `postinstall`
/// entry of a package's `package.json`, executed with the package's
/// destination directory as the working directory.
#[derive(Debug)]
pub struct ScriptInvocation<'a> {
  pub package_key: &'a str,
  pub script_name: &'a str,
  pub command: &'a str,
  pub cwd: &'a Path,
}

/// How lifecycle scripts are actually invoked is up to the embedder; the
/// installer only decides when each script runs.
#[async_trait::async_trait(?Send)]
pub trait LifecycleScriptsExecutor: Send + Sync {
  async fn execute(
    &self,
    invocation: ScriptInvocation<'_>,
  ) -> Result<(), AnyError>;
}

/// Executor that skips every script. Useful for tests and dry runs.
#[derive(Debug)]
pub struct NullLifecycleScriptsExecutor;

#[async_trait::async_trait(?Send)]
impl LifecycleScriptsExecutor for NullLifecycleScriptsExecutor {
  async fn execute(
    &self,
    _invocation: ScriptInvocation<'_>,
  ) -> Result<(), AnyError> {
    Ok(())
  }
}

/// Default executor: runs the script command through the platform shell and
/// waits for it to exit.
#[derive(Debug, Default)]
pub struct ShellScriptsExecutor;

#[async_trait::async_trait(?Send)]
impl LifecycleScriptsExecutor for ShellScriptsExecutor {
  async fn execute(
    &self,
    invocation: ScriptInvocation<'_>,
  ) -> Result<(), AnyError> {
    log::debug!(
      "running {} script of {} in {}",
      invocation.script_name,
      invocation.package_key,
      invocation.cwd.display()
    );
    #[cfg(unix)]
    let mut command = {
      let mut command = tokio::process::Command::new("sh");
      command.arg("-c").arg(invocation.command);
      command
    };
    #[cfg(windows)]
    let mut command = {
      let mut command = tokio::process::Command::new("cmd");
      command.args(["/d", "/s", "/c", invocation.command]);
      command
    };
    let status = command
      .current_dir(invocation.cwd)
      .status()
      .await
      .with_context(|| {
        format!(
          "spawning {} script of package {}",
          invocation.script_name, invocation.package_key
        )
      })?;
    if !status.success() {
      bail!(
        "{} script of package {} exited with {}",
        invocation.script_name,
        invocation.package_key,
        status
      );
    }
    Ok(())
  }
}

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
  #[serde(default)]
  scripts: HashMap<String, String>,
}

/// The lifecycle scripts a destination directory declares, in execution
/// order. A missing `package.json` means no scripts.
pub(crate) fn collect_lifecycle_scripts(
  destination: &Path,
) -> Result<Vec<(String, String)>, InstallError> {
  let path = destination.join("package.json");
  let text = match std::fs::read_to_string(&path) {
    Ok(text) => text,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
      return Ok(Vec::new());
    }
    Err(source) => return Err(InstallError::Reading { path, source }),
  };
  let package_json: PackageJson = serde_json::from_str(&text)
    .map_err(|source| InstallError::ParsingPackageJson { path, source })?;
  let mut scripts = Vec::new();
  for name in ["install", "postinstall"] {
    if let Some(command) = package_json.scripts.get(name) {
      scripts.push((name.to_string(), command.clone()));
    }
  }
  Ok(scripts)
}

struct PackageScripts {
  key: String,
  destination: PathBuf,
  scripts: Vec<(String, String)>,
}

async fn run_package_scripts(
  package: &PackageScripts,
  executor: &dyn LifecycleScriptsExecutor,
) -> Result<(), InstallError> {
  for (script_name, command) in &package.scripts {
    executor
      .execute(ScriptInvocation {
        package_key: &package.key,
        script_name,
        command,
        cwd: &package.destination,
      })
      .await
      .map_err(|error| InstallError::Script {
        key: package.key.clone(),
        script: script_name.clone(),
        error,
      })?;
  }
  Ok(())
}

async fn run_component(
  component_id: usize,
  members: Vec<PackageScripts>,
  executor: &dyn LifecycleScriptsExecutor,
) -> (usize, Result<(), InstallError>) {
  // members of one component run concurrently; ordering within a cycle
  // would be arbitrary anyway
  let result = futures::future::try_join_all(
    members
      .iter()
      .map(|member| run_package_scripts(member, executor)),
  )
  .await
  .map(|_| ());
  (component_id, result)
}

/// Walks the component DAG bottom-up: a component's scripts start only once
/// every component it depends on has finished. A failure stops new
/// components from being scheduled while in-flight ones drain naturally;
/// the first error wins.
pub(crate) async fn run_lifecycle_scripts(
  condensation: &Condensation,
  destinations: &HashMap<String, PathBuf>,
  executor: &dyn LifecycleScriptsExecutor,
) -> Result<(), InstallError> {
  let mut members_by_component: BTreeMap<usize, Vec<PackageScripts>> =
    BTreeMap::new();
  for (&component_id, component) in &condensation.components {
    let mut members = Vec::with_capacity(component.keys.len());
    for key in &component.keys {
      let destination = destinations[key].clone();
      members.push(PackageScripts {
        key: key.clone(),
        scripts: collect_lifecycle_scripts(&destination)?,
        destination,
      });
    }
    members_by_component.insert(component_id, members);
  }

  let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
  let mut blocked_on: BTreeMap<usize, usize> = BTreeMap::new();
  for (&component_id, component) in &condensation.components {
    blocked_on.insert(component_id, component.dependencies.len());
    for &dependency in &component.dependencies {
      dependents.entry(dependency).or_default().push(component_id);
    }
  }

  let mut running = FuturesUnordered::new();
  for (&component_id, &blockers) in &blocked_on {
    if blockers == 0 {
      let members = members_by_component.remove(&component_id).unwrap();
      running.push(run_component(component_id, members, executor));
    }
  }

  let mut first_error = None;
  while let Some((component_id, result)) = running.next().await {
    if let Err(err) = result {
      first_error.get_or_insert(err);
      continue;
    }
    if first_error.is_some() {
      // let in-flight components drain without scheduling new ones
      continue;
    }
    for &dependent in dependents.get(&component_id).into_iter().flatten() {
      let blockers = blocked_on.get_mut(&dependent).unwrap();
      *blockers -= 1;
      if *blockers == 0 {
        let members = members_by_component.remove(&dependent).unwrap();
        running.push(run_component(dependent, members, executor));
      }
    }
  }

  match first_error {
    Some(err) => Err(err),
    None => Ok(()),
  }
}
