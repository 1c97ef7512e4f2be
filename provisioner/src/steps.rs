//! Provisioning steps
//!
//! Each step is a single-shot, all-or-nothing action: it consumes the
//! [`ImageState`] token, checks its predecessor phase, performs exactly one
//! kind of external work, and returns the advanced token on success. There
//! are no retries and no partial-success states; the first failure aborts
//! the whole run.
//!
//! Non-zero tool exits are classified into the error taxonomy by sniffing
//! the tool's stderr for well-known diagnostics. Anything unrecognized stays
//! a [`ProvisionError::ToolExit`] with the stderr carried verbatim.

use crate::activate::ActivationScope;
use crate::error::{ProvisionError, ProvisionResult};
use crate::runner::{Invocation, ToolOutput, ToolRunner};
use crate::state::{ImageState, Phase};
use recipe::{Channel, EnvironmentSpec, NamedEnvironment, PackageSet, RepositorySource};
use std::path::Path;
use tracing::info;

/// Run an invocation, mapping a spawn failure into the taxonomy. Exit-status
/// interpretation is left to the caller.
pub(crate) async fn run_tool(
    runner: &dyn ToolRunner,
    invocation: &Invocation,
) -> ProvisionResult<ToolOutput> {
    runner
        .run(invocation)
        .await
        .map_err(|source| ProvisionError::Spawn {
            command: invocation.command_line(),
            source,
        })
}

fn stderr_contains_any(output: &ToolOutput, needles: &[&str]) -> bool {
    needles.iter().any(|n| output.stderr.contains(n))
}

/// The `apk add` command line for a package set.
pub fn os_packages_invocation(packages: &PackageSet) -> Invocation {
    Invocation::new("apk")
        .args(["add", "--no-cache"])
        .args(packages.names().iter().cloned())
}

/// The `git clone` command line for a repository source.
pub fn clone_invocation(source: &RepositorySource) -> Invocation {
    Invocation::new("git")
        .arg("clone")
        .arg(source.url.as_str())
        .arg(source.destination.display().to_string())
}

/// The `conda env create` command line for an environment file.
pub fn env_create_invocation(spec_path: &Path) -> Invocation {
    Invocation::new("conda")
        .args(["env", "create", "--file"])
        .arg(spec_path.display().to_string())
}

/// The channel-scoped install command line, wrapped to run inside the named
/// environment.
pub fn augment_invocation(
    environment: &NamedEnvironment,
    channel: &Channel,
    packages: &PackageSet,
) -> Invocation {
    let install = Invocation::new("conda")
        .args(["install", "--yes", "--channel"])
        .arg(channel.as_str())
        .args(packages.names().iter().cloned());
    ActivationScope::wrap_for(environment, install)
}

/// Install OS-level packages with the system package manager, skipping the
/// local package-index cache.
///
/// An empty package set performs no invocation but still records the phase.
pub async fn install_os_packages(
    state: ImageState,
    runner: &dyn ToolRunner,
    packages: &PackageSet,
) -> ProvisionResult<ImageState> {
    state.require(Phase::BaseSelect, Phase::OsPackages)?;

    if packages.is_empty() {
        return Ok(state.record(Phase::OsPackages));
    }

    let invocation = os_packages_invocation(packages);
    info!(packages = %packages, "installing OS packages");
    let output = run_tool(runner, &invocation).await?;

    if output.success() {
        return Ok(state.record(Phase::OsPackages));
    }

    if stderr_contains_any(&output, &["unable to select packages", "no such package"]) {
        return Err(ProvisionError::Resolution {
            package: packages.to_string(),
            detail: output.stderr,
        });
    }
    if stderr_contains_any(
        &output,
        &["network error", "temporary error", "could not connect"],
    ) {
        return Err(ProvisionError::Network {
            resource: "package index".to_string(),
            detail: output.stderr,
        });
    }
    Err(ProvisionError::ToolExit {
        command: invocation.command_line(),
        code: output.code,
        stderr: output.stderr,
    })
}

/// Clone the source repository (full clone, default branch) into its
/// destination.
///
/// Fails before invoking anything if the destination already exists and is
/// non-empty. An interrupted clone leaves the image invalid; recovery is a
/// full rebuild, never a resume.
pub async fn fetch_source(
    state: ImageState,
    runner: &dyn ToolRunner,
    source: &RepositorySource,
) -> ProvisionResult<ImageState> {
    state.require(Phase::OsPackages, Phase::SourceFetch)?;

    if destination_is_nonempty(&source.destination) {
        return Err(ProvisionError::Collision {
            target: source.destination.display().to_string(),
            detail: "destination already exists and is not empty".to_string(),
        });
    }

    let invocation = clone_invocation(source);
    info!(url = %source.url, dest = %source.destination.display(), "cloning source repository");
    let output = run_tool(runner, &invocation).await?;

    if output.success() {
        return Ok(state.record(Phase::SourceFetch));
    }

    if stderr_contains_any(
        &output,
        &["Could not resolve", "unable to access", "Connection refused"],
    ) {
        return Err(ProvisionError::Network {
            resource: source.url.clone(),
            detail: output.stderr,
        });
    }
    if output
        .stderr
        .contains("already exists and is not an empty directory")
    {
        return Err(ProvisionError::Collision {
            target: source.destination.display().to_string(),
            detail: output.stderr,
        });
    }
    Err(ProvisionError::ToolExit {
        command: invocation.command_line(),
        code: output.code,
        stderr: output.stderr,
    })
}

fn destination_is_nonempty(destination: &Path) -> bool {
    match std::fs::read_dir(destination) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

/// Materialize the named environment from the spec file shipped inside the
/// cloned repository. The file's contents are handed verbatim to the
/// environment manager, never parsed here.
pub async fn build_environment(
    state: ImageState,
    runner: &dyn ToolRunner,
    source: &RepositorySource,
    spec: &EnvironmentSpec,
) -> ProvisionResult<ImageState> {
    state.require(Phase::SourceFetch, Phase::EnvBuild)?;

    let spec_path = spec.resolved_path(&source.destination);
    let invocation = env_create_invocation(&spec_path);
    info!(spec = %spec_path.display(), "creating environment from spec file");
    let output = run_tool(runner, &invocation).await?;

    if output.success() {
        return Ok(state.record(Phase::EnvBuild));
    }

    Err(classify_conda_failure(
        &invocation,
        output,
        spec_path.display().to_string(),
    ))
}

/// Activate the named environment and install the extra packages from the
/// given channel, confirming non-interactively.
///
/// Activation is a scoped acquisition: it applies only to invocations issued
/// through the scope and is released when the step ends, success or failure.
/// An empty package set still performs activation (which verifies the
/// environment exists) but skips the install.
pub async fn augment_environment(
    state: ImageState,
    runner: &dyn ToolRunner,
    environment: &NamedEnvironment,
    channel: &Channel,
    packages: &PackageSet,
) -> ProvisionResult<ImageState> {
    state.require(Phase::EnvBuild, Phase::EnvAugment)?;

    let scope = ActivationScope::enter(runner, environment).await?;
    info!(environment = %environment, "activated environment");

    let result = if packages.is_empty() {
        Ok(())
    } else {
        let install = Invocation::new("conda")
            .args(["install", "--yes", "--channel"])
            .arg(channel.as_str())
            .args(packages.names().iter().cloned());
        let invocation = scope.wrap(install);
        info!(packages = %packages, channel = %channel, "installing extra packages");
        match run_tool(runner, &invocation).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(classify_conda_failure(
                &invocation,
                output,
                environment.to_string(),
            )),
            Err(e) => Err(e),
        }
    };

    scope.exit();

    result.map(|()| state.record(Phase::EnvAugment))
}

/// Map a non-zero environment-manager exit into the error taxonomy.
fn classify_conda_failure(
    invocation: &Invocation,
    output: ToolOutput,
    target: String,
) -> ProvisionError {
    if stderr_contains_any(
        &output,
        &["ResolvePackageNotFound", "PackagesNotFoundError"],
    ) {
        return ProvisionError::Resolution {
            package: target,
            detail: output.stderr,
        };
    }
    if output.stderr.contains("prefix already exists") {
        return ProvisionError::Collision {
            target,
            detail: output.stderr,
        };
    }
    if stderr_contains_any(
        &output,
        &[
            "EnvironmentLocationNotFound",
            "Could not find conda environment",
        ],
    ) {
        return ProvisionError::Collision {
            target,
            detail: output.stderr,
        };
    }
    if stderr_contains_any(&output, &["CondaHTTPError", "ConnectionError"]) {
        return ProvisionError::Network {
            resource: target,
            detail: output.stderr,
        };
    }
    ProvisionError::ToolExit {
        command: invocation.command_line(),
        code: output.code,
        stderr: output.stderr,
    }
}
