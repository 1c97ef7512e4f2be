use clap::{Parser, Subcommand};
use provisioner::{Invocation, Provisioner};
use recipe::{Recipe, RecipeResult};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Reproducibly provision scientific-computing container environments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full provisioning pipeline
    Build {
        /// Path to a recipe file (defaults to the built-in pytassim recipe)
        #[arg(short, long)]
        recipe: Option<PathBuf>,
    },
    /// Validate a recipe without running anything
    Check {
        /// Path to a recipe file (defaults to the built-in pytassim recipe)
        #[arg(short, long)]
        recipe: Option<PathBuf>,
    },
    /// Print the commands a build would run, in order
    Plan {
        /// Path to a recipe file (defaults to the built-in pytassim recipe)
        #[arg(short, long)]
        recipe: Option<PathBuf>,
    },
}

/// Load the recipe from a file, or fall back to the built-in default.
fn load_recipe(path: Option<&Path>) -> RecipeResult<Recipe> {
    match path {
        Some(path) => Recipe::from_path(path),
        None => Ok(Recipe::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { recipe } => {
            let recipe = load_recipe(recipe.as_deref())?;
            build(recipe).await;
        }
        Commands::Check { recipe } => {
            let recipe = load_recipe(recipe.as_deref())?;
            check(&recipe);
        }
        Commands::Plan { recipe } => {
            let recipe = load_recipe(recipe.as_deref())?;
            plan(&recipe);
        }
    }

    Ok(())
}

async fn build(recipe: Recipe) {
    let provisioner = Provisioner::new(recipe);
    match provisioner.provision().await {
        Ok(report) => {
            info!(run_id = %report.run_id, "provisioning succeeded");
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    error!("Failed to render report: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!("Provisioning failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn check(recipe: &Recipe) {
    match recipe.validate() {
        Ok(()) => println!("Recipe OK: {} -> {}", recipe.base_image, recipe.environment_name),
        Err(reason) => {
            error!("Invalid recipe: {}", reason);
            std::process::exit(1);
        }
    }
}

fn plan(recipe: &Recipe) {
    let provisioner = Provisioner::new(recipe.clone());
    match provisioner.plan() {
        Ok(invocations) => {
            for line in invocations.iter().map(Invocation::command_line) {
                println!("{}", line);
            }
        }
        Err(e) => {
            error!("Cannot plan build: {}", e);
            std::process::exit(1);
        }
    }
}
