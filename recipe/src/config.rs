//! Recipe loading and validation
//!
//! A [`Recipe`] is the full declarative input to a provisioning run: the base
//! image to start from, the OS packages to install, the repository to fetch,
//! the environment file to materialize, and the extra packages to layer on
//! top. Recipes are stored as TOML.

use crate::types::{Channel, EnvironmentSpec, NamedEnvironment, PackageSet, RepositorySource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors related to recipe loading
#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("Failed to parse recipe: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize recipe: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid recipe: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RecipeResult<T> = Result<T, RecipeError>;

/// Declarative description of one provisioning run.
///
/// Field order matters for serialization: `source` is a nested table and TOML
/// requires plain values to precede tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Base image reference resolved by the container runtime.
    pub base_image: String,
    /// Environment-definition file inside the cloned repository.
    pub environment_file: EnvironmentSpec,
    /// Name the environment file is expected to declare; used for activation.
    pub environment_name: NamedEnvironment,
    /// OS-level packages installed with the system package manager.
    pub os_packages: PackageSet,
    /// Additional packages installed into the environment after creation.
    pub extra_packages: PackageSet,
    /// Channel the extra packages are installed from.
    pub channel: Channel,
    /// Repository to clone before building the environment.
    pub source: RepositorySource,
}

impl Default for Recipe {
    fn default() -> Self {
        Self {
            base_image: "frolvlad/alpine-miniconda3".to_string(),
            environment_file: EnvironmentSpec::new("dev_environment.yml"),
            environment_name: NamedEnvironment::new("pytassim-dev"),
            os_packages: PackageSet::new(["git", "bash", "build-base"]),
            extra_packages: PackageSet::new(["pytorch-cpu", "torchvision-cpu"]),
            channel: Channel::new("pytorch"),
            source: RepositorySource::from_url("https://github.com/maestrotf/pytassim"),
        }
    }
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_image(mut self, base_image: impl Into<String>) -> Self {
        self.base_image = base_image.into();
        self
    }

    pub fn with_os_packages(mut self, packages: PackageSet) -> Self {
        self.os_packages = packages;
        self
    }

    pub fn with_source(mut self, source: RepositorySource) -> Self {
        self.source = source;
        self
    }

    pub fn with_environment_file(mut self, file: EnvironmentSpec) -> Self {
        self.environment_file = file;
        self
    }

    pub fn with_environment_name(mut self, name: NamedEnvironment) -> Self {
        self.environment_name = name;
        self
    }

    pub fn with_extra_packages(mut self, packages: PackageSet) -> Self {
        self.extra_packages = packages;
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Load a recipe from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> RecipeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let recipe: Recipe = toml::from_str(&contents)?;
        Ok(recipe)
    }

    /// Serialize the recipe to TOML.
    pub fn to_toml(&self) -> RecipeResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_image.trim().is_empty() {
            return Err("Base image cannot be empty".to_string());
        }

        if self.source.url.trim().is_empty() {
            return Err("Repository URL cannot be empty".to_string());
        }

        if self.source.destination.as_os_str().is_empty() {
            return Err("Clone destination cannot be empty".to_string());
        }

        if self.environment_file.path().is_absolute() {
            return Err(format!(
                "Environment file must be relative to the clone destination, got {}",
                self.environment_file.path().display()
            ));
        }

        if self.environment_name.as_str().trim().is_empty() {
            return Err("Environment name cannot be empty".to_string());
        }

        if let Some(bad) = self.os_packages.first_invalid() {
            return Err(format!("OS package name cannot be blank: {:?}", bad));
        }

        if let Some(bad) = self.extra_packages.first_invalid() {
            return Err(format!("Extra package name cannot be blank: {:?}", bad));
        }

        if !self.extra_packages.is_empty() && self.channel.as_str().trim().is_empty() {
            return Err("Channel cannot be empty when extra packages are declared".to_string());
        }

        Ok(())
    }
}
