//! End-to-end pipeline scenarios driven through a scripted runner.

use provisioner::testing::ScriptedRunner;
use provisioner::{
    build_environment, fetch_source, install_os_packages, ImageState, Phase, ProvisionError,
    Provisioner, ToolOutput,
};
use recipe::{NamedEnvironment, Recipe, RepositorySource};
use std::path::Path;
use std::sync::Arc;

fn scratch_recipe(dir: &Path) -> Recipe {
    Recipe::default().with_source(RepositorySource::new(
        "https://github.com/maestrotf/pytassim",
        dir.join("pytassim"),
    ))
}

fn conda_env_listing(names: &[&str]) -> ToolOutput {
    let envs: Vec<String> = names
        .iter()
        .map(|n| format!("/opt/conda/envs/{}", n))
        .collect();
    ToolOutput::ok(serde_json::json!({ "envs": envs }).to_string())
}

// Scenario: all OS packages resolvable; the installer succeeds and the
// pipeline proceeds to the clone.
#[tokio::test]
async fn resolvable_os_packages_proceed_to_clone() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new(vec![
        ToolOutput::ok(""),
        ToolOutput::ok(""),
        ToolOutput::ok(""),
        conda_env_listing(&["pytassim-dev"]),
        ToolOutput::ok(""),
    ]));

    Provisioner::new(scratch_recipe(dir.path()))
        .with_runner(runner.clone())
        .provision()
        .await
        .unwrap();

    let recorded = runner.recorded();
    assert_eq!(
        recorded[0].command_line(),
        "apk add --no-cache git bash build-base"
    );
    assert!(recorded[1].command_line().starts_with("git clone"));
}

// Scenario: unreachable repository URL. The fetch fails with a network
// error and neither the environment build nor the augment ever run.
#[tokio::test]
async fn unreachable_repository_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new(vec![
        ToolOutput::ok(""),
        ToolOutput::failed(
            128,
            "fatal: unable to access 'https://github.com/maestrotf/pytassim/': \
             Could not resolve host: github.com",
        ),
    ]));

    let err = Provisioner::new(scratch_recipe(dir.path()))
        .with_runner(runner.clone())
        .provision()
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Network { .. }));
    let recorded = runner.recorded();
    assert_eq!(recorded.len(), 2);
    assert!(!recorded.iter().any(|i| i.args.contains(&"env".to_string())
        && i.args.contains(&"create".to_string())));
}

// Scenario: the spec file declares "pytassim-dev"; the augmenter activates
// it and installs the pytorch packages from the pytorch channel.
#[tokio::test]
async fn full_run_produces_augmented_environment() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new(vec![
        ToolOutput::ok(""),
        ToolOutput::ok(""),
        ToolOutput::ok(""),
        conda_env_listing(&["pytassim-dev", "unrelated"]),
        ToolOutput::ok(""),
    ]));

    let report = Provisioner::new(scratch_recipe(dir.path()))
        .with_runner(runner.clone())
        .provision()
        .await
        .unwrap();

    assert_eq!(report.environment, "pytassim-dev");
    assert_eq!(report.phases.last().map(String::as_str), Some("env-augment"));

    let install = runner.recorded().last().unwrap().command_line();
    assert!(install.contains("-n pytassim-dev"));
    assert!(install.contains("--channel pytorch"));
    assert!(install.contains("pytorch-cpu torchvision-cpu"));
}

// Scenario: the augmenter is pointed at an environment the manager does not
// know. Activation fails with a not-found condition and the run fails.
#[tokio::test]
async fn augmenting_a_missing_environment_fails() {
    let dir = tempfile::tempdir().unwrap();
    let recipe =
        scratch_recipe(dir.path()).with_environment_name(NamedEnvironment::new("ghost-env"));
    let runner = Arc::new(ScriptedRunner::new(vec![
        ToolOutput::ok(""),
        ToolOutput::ok(""),
        ToolOutput::ok(""),
        conda_env_listing(&["pytassim-dev"]),
    ]));

    let err = Provisioner::new(recipe)
        .with_runner(runner.clone())
        .provision()
        .await
        .unwrap_err();

    match err {
        ProvisionError::Collision { target, .. } => assert_eq!(target, "ghost-env"),
        other => panic!("expected collision, got {other:?}"),
    }
    // The channel install was never attempted.
    assert_eq!(runner.recorded().len(), 4);
}

// The ordering invariant holds even when steps are driven by hand: the
// environment build refuses to run before the source fetch completed.
#[tokio::test]
async fn steps_refuse_to_run_out_of_order() {
    let runner = ScriptedRunner::always_ok();
    let recipe = Recipe::default();

    let state = ImageState::new(&recipe.base_image);
    let state = install_os_packages(state, &runner, &recipe.os_packages)
        .await
        .unwrap();

    let err = build_environment(state, &runner, &recipe.source, &recipe.environment_file)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::OrderViolation {
            needed: Phase::SourceFetch,
            attempted: Phase::EnvBuild,
        }
    ));
}

// Restarting from a fresh base yields the same phase list and the same
// invocation sequence as the first run.
#[tokio::test]
async fn restarted_run_reproduces_the_first() {
    let dir = tempfile::tempdir().unwrap();

    let script = || {
        vec![
            ToolOutput::ok(""),
            ToolOutput::ok(""),
            ToolOutput::ok(""),
            conda_env_listing(&["pytassim-dev"]),
            ToolOutput::ok(""),
        ]
    };

    let first_runner = Arc::new(ScriptedRunner::new(script()));
    let first = Provisioner::new(scratch_recipe(dir.path()))
        .with_runner(first_runner.clone())
        .provision()
        .await
        .unwrap();

    let second_runner = Arc::new(ScriptedRunner::new(script()));
    let second = Provisioner::new(scratch_recipe(dir.path()))
        .with_runner(second_runner.clone())
        .provision()
        .await
        .unwrap();

    assert_eq!(first.phases, second.phases);
    assert_eq!(first_runner.recorded(), second_runner.recorded());
    assert_ne!(first.run_id, second.run_id);
}

// A stale, non-empty clone destination is rejected before any tool runs for
// the fetch step.
#[tokio::test]
async fn stale_destination_is_a_collision() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pytassim");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("leftover.txt"), b"partial").unwrap();

    let runner = ScriptedRunner::always_ok();
    let recipe = scratch_recipe(dir.path());

    let state = ImageState::new(&recipe.base_image).record(Phase::OsPackages);
    let err = fetch_source(state, &runner, &recipe.source)
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Collision { .. }));
    assert!(runner.recorded().is_empty());
}
