//! Core recipe data types
//!
//! These types describe *what* a provisioning run installs and from where.
//! They are declared once, stay immutable for the duration of a run, and are
//! opaque to the external tools that consume them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An ordered, de-duplicated set of package names.
///
/// Order is preserved as declared so that repeated runs hand the package
/// manager an identical command line. Duplicates keep their first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct PackageSet {
    names: Vec<String>,
}

impl From<Vec<String>> for PackageSet {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<PackageSet> for Vec<String> {
    fn from(set: PackageSet) -> Self {
        set.names
    }
}

impl PackageSet {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut seen = Vec::new();
        for name in names {
            let name = name.into();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        Self { names: seen }
    }

    pub fn empty() -> Self {
        Self { names: Vec::new() }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns the first package name that is empty or all-whitespace, if any.
    pub fn first_invalid(&self) -> Option<&str> {
        self.names
            .iter()
            .find(|n| n.trim().is_empty())
            .map(String::as_str)
    }
}

impl std::fmt::Display for PackageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names.join(" "))
    }
}

impl FromIterator<String> for PackageSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Where to fetch source code from and where the clone lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySource {
    /// Remote URL of the repository.
    pub url: String,
    /// Destination directory for the clone.
    pub destination: PathBuf,
}

impl RepositorySource {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }

    /// Build a source whose destination is derived from the URL basename,
    /// with a trailing `.git` suffix stripped, matching the implicit
    /// destination a bare `git clone <url>` would choose.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let basename = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("source")
            .trim_end_matches(".git")
            .to_string();
        Self {
            destination: PathBuf::from(basename),
            url,
        }
    }
}

/// Path to a declarative environment-definition file, relative to the
/// repository clone destination. Its contents are owned by the external
/// environment manager and never inspected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentSpec {
    path: PathBuf,
}

impl EnvironmentSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Join the spec path under the repository clone destination.
    pub fn resolved_path(&self, clone_destination: &Path) -> PathBuf {
        clone_destination.join(&self.path)
    }
}

/// Name of an isolated runtime environment materialized by the environment
/// manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedEnvironment(pub String);

impl NamedEnvironment {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NamedEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named package-distribution source consulted during installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(pub String);

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
