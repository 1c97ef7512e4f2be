//! Scoped environment activation
//!
//! Activating an environment is a temporary, reversible shell-state change:
//! it only affects commands issued while the activation is in force. Instead
//! of a global toggle, activation is modeled as an enter/exit guard. The
//! guard verifies the environment exists on entry, rewrites invocations to
//! run inside the environment, and is released when the step ends, whether
//! it succeeded or failed. Nothing leaks outside the scope.

use crate::error::{ProvisionError, ProvisionResult};
use crate::runner::{Invocation, ToolRunner};
use crate::steps::run_tool;
use recipe::NamedEnvironment;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

/// The environment-manager listing used to verify an environment exists.
pub fn list_invocation() -> Invocation {
    Invocation::new("conda").args(["env", "list", "--json"])
}

#[derive(Debug, Deserialize)]
struct EnvironmentListing {
    #[serde(default)]
    envs: Vec<PathBuf>,
}

/// Guard representing an active environment.
///
/// Constructed with [`ActivationScope::enter`], released with
/// [`ActivationScope::exit`]. Invocations pass through [`ActivationScope::wrap`]
/// to run inside the environment.
#[derive(Debug)]
pub struct ActivationScope {
    environment: NamedEnvironment,
    active: bool,
}

impl ActivationScope {
    /// Activate the named environment. Fails with a not-found collision if
    /// the environment manager does not know the name.
    pub async fn enter(
        runner: &dyn ToolRunner,
        environment: &NamedEnvironment,
    ) -> ProvisionResult<Self> {
        let invocation = list_invocation();
        let output = run_tool(runner, &invocation).await?;

        if !output.success() {
            return Err(ProvisionError::ToolExit {
                command: invocation.command_line(),
                code: output.code,
                stderr: output.stderr,
            });
        }

        let listing: EnvironmentListing =
            serde_json::from_str(&output.stdout).map_err(|e| ProvisionError::ToolExit {
                command: invocation.command_line(),
                code: output.code,
                stderr: format!("unparseable environment listing: {}", e),
            })?;

        let known = listing.envs.iter().any(|prefix| {
            prefix
                .file_name()
                .map(|name| name == environment.as_str())
                .unwrap_or(false)
        });

        if !known {
            return Err(ProvisionError::Collision {
                target: environment.to_string(),
                detail: "environment not found".to_string(),
            });
        }

        Ok(Self {
            environment: environment.clone(),
            active: true,
        })
    }

    /// Rewrite an invocation to execute inside this scope's environment.
    pub fn wrap(&self, invocation: Invocation) -> Invocation {
        Self::wrap_for(&self.environment, invocation)
    }

    /// Rewrite an invocation to execute inside the named environment. The
    /// original environment overlay and working directory are preserved.
    pub fn wrap_for(environment: &NamedEnvironment, invocation: Invocation) -> Invocation {
        let mut wrapped = Invocation::new("conda")
            .args(["run", "--no-capture-output", "-n"])
            .arg(environment.as_str())
            .arg(invocation.program.as_str())
            .args(invocation.args.iter().cloned())
            .env("CONDA_DEFAULT_ENV", environment.as_str());
        for (key, value) in &invocation.env {
            wrapped = wrapped.env(key.as_str(), value.as_str());
        }
        if let Some(dir) = invocation.cwd {
            wrapped = wrapped.cwd(dir);
        }
        wrapped
    }

    pub fn environment(&self) -> &NamedEnvironment {
        &self.environment
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Release the scope. Activation has no effect outside the step, so exit
    /// is a bookkeeping action, not an external invocation.
    pub fn exit(mut self) {
        self.active = false;
    }
}

impl Drop for ActivationScope {
    fn drop(&mut self) {
        if self.active {
            debug!(
                environment = %self.environment,
                "activation scope dropped without explicit exit"
            );
            self.active = false;
        }
    }
}
