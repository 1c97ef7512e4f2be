//! Image state token
//!
//! The filesystem being provisioned is global mutable state. Rather than
//! letting steps mutate it ambiently, the pipeline threads a single
//! [`ImageState`] token through each step by value: a step consumes the
//! state, checks that its predecessor phase has completed, and records its
//! own phase on success. Preconditions become explicit and testable.

use crate::error::{ProvisionError, ProvisionResult};
use serde::{Deserialize, Serialize};

/// The ordered phases of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Base image pinned as the starting filesystem state.
    BaseSelect,
    /// OS-level packages installed.
    OsPackages,
    /// Source repository cloned.
    SourceFetch,
    /// Named environment materialized from the spec file.
    EnvBuild,
    /// Extra packages installed into the environment.
    EnvAugment,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::BaseSelect => write!(f, "base-select"),
            Phase::OsPackages => write!(f, "os-packages"),
            Phase::SourceFetch => write!(f, "source-fetch"),
            Phase::EnvBuild => write!(f, "env-build"),
            Phase::EnvAugment => write!(f, "env-augment"),
        }
    }
}

/// Cumulative state of the image under construction.
///
/// Owned exclusively by the provisioning run; there is exactly one token per
/// run and it only ever advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageState {
    base_image: String,
    completed: Vec<Phase>,
}

impl ImageState {
    /// Pin the base image. This is the Base Selection step itself, so the
    /// returned state already has [`Phase::BaseSelect`] recorded.
    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            completed: vec![Phase::BaseSelect],
        }
    }

    pub fn base_image(&self) -> &str {
        &self.base_image
    }

    pub fn completed(&self) -> &[Phase] {
        &self.completed
    }

    pub fn has_completed(&self, phase: Phase) -> bool {
        self.completed.contains(&phase)
    }

    /// Check that `needed` has completed before `attempted` runs.
    pub fn require(&self, needed: Phase, attempted: Phase) -> ProvisionResult<()> {
        if self.has_completed(needed) {
            Ok(())
        } else {
            Err(ProvisionError::OrderViolation { needed, attempted })
        }
    }

    /// Record a phase as completed. Recording is append-only; a phase is
    /// never recorded twice.
    pub fn record(mut self, phase: Phase) -> Self {
        if !self.completed.contains(&phase) {
            self.completed.push(phase);
        }
        self
    }
}
