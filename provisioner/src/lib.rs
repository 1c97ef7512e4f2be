//! Ordered, all-or-nothing provisioning of scientific-computing container
//! environments.
//!
//! The pipeline reproduces a working environment from a declarative
//! [`recipe::Recipe`]: pin a base image, install OS packages, clone a source
//! repository, materialize a named environment from a spec file shipped in
//! that repository, then layer extra packages into the environment from a
//! channel. Every external tool is reached through the [`ToolRunner`] trait
//! so the whole pipeline is testable without touching the host.

pub mod activate;
pub mod error;
pub mod git_meta;
pub mod pipeline;
pub mod runner;
pub mod state;
pub mod steps;
pub mod testing;

pub use activate::ActivationScope;
pub use error::{ProvisionError, ProvisionResult};
pub use git_meta::{read_provenance, SourceProvenance};
pub use pipeline::{ProvisionReport, Provisioner};
pub use runner::{Invocation, SystemRunner, ToolOutput, ToolRunner};
pub use state::{ImageState, Phase};
pub use steps::{
    augment_environment, build_environment, fetch_source, install_os_packages,
};
