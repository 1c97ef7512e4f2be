//! Post-clone repository inspection
//!
//! After a successful fetch the pipeline records which commit the clone
//! landed on, so two runs of the same recipe can be compared: identical
//! provenance plus an identical recipe means identical installed-package
//! sets.

use crate::error::ProvisionResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where the provisioned source actually came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProvenance {
    /// The `origin` remote URL, or `"unknown"` when the clone has none.
    pub url: String,
    /// Commit id the clone's HEAD points at.
    pub head_commit: String,
}

/// Read provenance from a cloned repository on disk.
pub fn read_provenance(path: impl AsRef<Path>) -> ProvisionResult<SourceProvenance> {
    let repo = git2::Repository::open(path.as_ref())?;

    let head = repo.head()?;
    let commit = head.peel_to_commit()?;

    let url = repo
        .find_remote("origin")
        .ok()
        .as_ref()
        .and_then(|remote| remote.url())
        .unwrap_or("unknown")
        .to_string();

    Ok(SourceProvenance {
        url,
        head_commit: commit.id().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo_with_commit(dir: &Path) -> git2::Repository {
        let repo = git2::Repository::init(dir).unwrap();
        {
            let signature = git2::Signature::now("tester", "tester@example.com").unwrap();
            let tree_id = {
                let mut index = repo.index().unwrap();
                index.write_tree().unwrap()
            };
            let tree = repo.find_tree(tree_id).unwrap();
            repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn test_read_provenance_from_fresh_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo_with_commit(dir.path());
        repo.remote("origin", "https://github.com/maestrotf/pytassim")
            .unwrap();

        let provenance = read_provenance(dir.path()).unwrap();
        assert_eq!(provenance.url, "https://github.com/maestrotf/pytassim");
        assert_eq!(provenance.head_commit.len(), 40);
    }

    #[test]
    fn test_read_provenance_without_origin_remote() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());

        let provenance = read_provenance(dir.path()).unwrap();
        assert_eq!(provenance.url, "unknown");
    }

    #[test]
    fn test_read_provenance_fails_for_non_repository() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_provenance(dir.path());
        assert!(result.is_err());
    }
}
