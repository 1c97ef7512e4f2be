//! The provisioning pipeline
//!
//! Control flow is strictly linear: base selection, OS packages, source
//! fetch, environment build, environment augment. Each step consumes the
//! image-state token left by the previous one; the first failure aborts the
//! run with no cleanup and no retry. Idempotence comes from rebuilding from
//! scratch, never from resuming mid-step.

use crate::error::{ProvisionError, ProvisionResult};
use crate::git_meta::{read_provenance, SourceProvenance};
use crate::runner::{Invocation, SystemRunner, ToolRunner};
use crate::state::{ImageState, Phase};
use crate::{activate, steps};
use chrono::{DateTime, Utc};
use recipe::Recipe;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of a completed provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub base_image: String,
    /// Phases completed, in execution order.
    pub phases: Vec<String>,
    /// Name of the environment the run produced.
    pub environment: String,
    /// Provenance of the fetched source, when the clone is inspectable.
    pub source: Option<SourceProvenance>,
}

impl ProvisionReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Executes a [`Recipe`] as an ordered, all-or-nothing pipeline.
pub struct Provisioner {
    recipe: Recipe,
    runner: Arc<dyn ToolRunner>,
}

impl Provisioner {
    /// Create a provisioner that executes against the host system.
    pub fn new(recipe: Recipe) -> Self {
        Self {
            recipe,
            runner: Arc::new(SystemRunner::new()),
        }
    }

    /// Substitute the tool runner (used by tests and dry runs).
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// The ordered invocations this recipe would issue, without running
    /// anything. Two calls on the same recipe always return the same
    /// sequence.
    pub fn plan(&self) -> ProvisionResult<Vec<Invocation>> {
        self.recipe
            .validate()
            .map_err(ProvisionError::InvalidRecipe)?;

        let mut invocations = Vec::new();
        if !self.recipe.os_packages.is_empty() {
            invocations.push(steps::os_packages_invocation(&self.recipe.os_packages));
        }
        invocations.push(steps::clone_invocation(&self.recipe.source));
        invocations.push(steps::env_create_invocation(
            &self
                .recipe
                .environment_file
                .resolved_path(&self.recipe.source.destination),
        ));
        invocations.push(activate::list_invocation());
        if !self.recipe.extra_packages.is_empty() {
            invocations.push(steps::augment_invocation(
                &self.recipe.environment_name,
                &self.recipe.channel,
                &self.recipe.extra_packages,
            ));
        }
        Ok(invocations)
    }

    /// Run the full pipeline. Returns a report only when every step
    /// succeeded; any failure propagates immediately and leaves no usable
    /// image artifact behind.
    pub async fn provision(&self) -> ProvisionResult<ProvisionReport> {
        self.recipe
            .validate()
            .map_err(ProvisionError::InvalidRecipe)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            base_image = %self.recipe.base_image,
            runner = self.runner.name(),
            "starting provisioning run"
        );

        let state = ImageState::new(&self.recipe.base_image);

        let state =
            steps::install_os_packages(state, self.runner.as_ref(), &self.recipe.os_packages)
                .await?;

        let state = steps::fetch_source(state, self.runner.as_ref(), &self.recipe.source).await?;
        let source = self.inspect_clone()?;

        let state = steps::build_environment(
            state,
            self.runner.as_ref(),
            &self.recipe.source,
            &self.recipe.environment_file,
        )
        .await?;

        let state = steps::augment_environment(
            state,
            self.runner.as_ref(),
            &self.recipe.environment_name,
            &self.recipe.channel,
            &self.recipe.extra_packages,
        )
        .await?;

        let finished_at = Utc::now();
        info!(%run_id, "provisioning run complete");

        Ok(ProvisionReport {
            run_id,
            started_at,
            finished_at,
            base_image: state.base_image().to_string(),
            phases: state.completed().iter().map(Phase::to_string).collect(),
            environment: self.recipe.environment_name.to_string(),
            source,
        })
    }

    /// Record where the clone landed. Only attempted when the destination
    /// holds a repository; a runner that does not touch the filesystem (dry
    /// runs, scripted tests) yields no provenance. When a repository is
    /// present but unreadable, the clone is considered invalid and the run
    /// fails.
    fn inspect_clone(&self) -> ProvisionResult<Option<SourceProvenance>> {
        let dest = &self.recipe.source.destination;
        if dest.join(".git").exists() {
            Ok(Some(read_provenance(dest)?))
        } else {
            debug!(dest = %dest.display(), "no repository at destination; skipping provenance");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ToolOutput;
    use crate::testing::ScriptedRunner;
    use recipe::{PackageSet, RepositorySource};

    fn scripted_recipe(dir: &std::path::Path) -> Recipe {
        // Point the clone destination into a scratch directory so the
        // pre-clone collision check never trips on the test's working dir.
        Recipe::default().with_source(RepositorySource::new(
            "https://github.com/maestrotf/pytassim",
            dir.join("pytassim"),
        ))
    }

    fn happy_script() -> Vec<ToolOutput> {
        vec![
            ToolOutput::ok(""), // apk add
            ToolOutput::ok(""), // git clone
            ToolOutput::ok(""), // conda env create
            ToolOutput::ok(r#"{"envs": ["/opt/conda", "/opt/conda/envs/pytassim-dev"]}"#),
            ToolOutput::ok(""), // conda install
        ]
    }

    #[tokio::test]
    async fn test_provision_runs_all_phases_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(happy_script()));
        let provisioner =
            Provisioner::new(scripted_recipe(dir.path())).with_runner(runner.clone());

        let report = provisioner.provision().await.unwrap();
        assert_eq!(
            report.phases,
            vec![
                "base-select",
                "os-packages",
                "source-fetch",
                "env-build",
                "env-augment"
            ]
        );
        assert_eq!(report.environment, "pytassim-dev");
        assert_eq!(report.base_image, "frolvlad/alpine-miniconda3");
        assert!(report.source.is_none());
        assert!(report.duration() >= chrono::Duration::zero());

        let recorded = runner.recorded();
        assert_eq!(recorded.len(), 5);
        assert_eq!(recorded[0].program, "apk");
        assert_eq!(recorded[1].program, "git");
        assert!(recorded[2].command_line().starts_with("conda env create"));
        assert_eq!(recorded[3].command_line(), "conda env list --json");
        assert!(recorded[4].command_line().contains("conda install"));
    }

    #[tokio::test]
    async fn test_provision_aborts_after_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec![ToolOutput::failed(
            1,
            "ERROR: unable to select packages:\n  ghost-package (no such package)",
        )]));
        let provisioner =
            Provisioner::new(scripted_recipe(dir.path())).with_runner(runner.clone());

        let err = provisioner.provision().await.unwrap_err();
        assert!(matches!(err, ProvisionError::Resolution { .. }));
        // No step after the failing one issued an invocation.
        assert_eq!(runner.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_provision_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();

        let first = Arc::new(ScriptedRunner::new(happy_script()));
        Provisioner::new(scripted_recipe(dir.path()))
            .with_runner(first.clone())
            .provision()
            .await
            .unwrap();

        let second = Arc::new(ScriptedRunner::new(happy_script()));
        Provisioner::new(scripted_recipe(dir.path()))
            .with_runner(second.clone())
            .provision()
            .await
            .unwrap();

        assert_eq!(first.recorded(), second.recorded());
    }

    #[test]
    fn test_plan_matches_recipe_and_is_stable() {
        let provisioner = Provisioner::new(Recipe::default());
        let plan = provisioner.plan().unwrap();
        let lines: Vec<String> = plan.iter().map(Invocation::command_line).collect();
        assert_eq!(
            lines,
            vec![
                "apk add --no-cache git bash build-base",
                "git clone https://github.com/maestrotf/pytassim pytassim",
                "conda env create --file pytassim/dev_environment.yml",
                "conda env list --json",
                "conda run --no-capture-output -n pytassim-dev \
                 conda install --yes --channel pytorch pytorch-cpu torchvision-cpu",
            ]
        );
        assert_eq!(plan, provisioner.plan().unwrap());
    }

    #[test]
    fn test_plan_skips_empty_package_sets() {
        let recipe = Recipe::default()
            .with_os_packages(PackageSet::empty())
            .with_extra_packages(PackageSet::empty());
        let plan = Provisioner::new(recipe).plan().unwrap();
        let programs: Vec<&str> = plan.iter().map(|i| i.program.as_str()).collect();
        assert_eq!(programs, vec!["git", "conda", "conda"]);
    }

    #[tokio::test]
    async fn test_invalid_recipe_is_rejected_before_any_invocation() {
        let runner = Arc::new(ScriptedRunner::always_ok());
        let recipe = Recipe::default().with_base_image("");
        let provisioner = Provisioner::new(recipe).with_runner(runner.clone());

        let err = provisioner.provision().await.unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidRecipe(_)));
        assert!(runner.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_report_serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(happy_script()));
        let report = Provisioner::new(scripted_recipe(dir.path()))
            .with_runner(runner)
            .provision()
            .await
            .unwrap();

        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("pytassim-dev"));
        assert!(json.contains("env-augment"));
    }
}
