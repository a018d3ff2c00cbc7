//! Unified repository backend trait
//!
//! One interface for both repository kinds; the variant is picked from the
//! repository's stored kind through [`Registry`](crate::registry::Registry).

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::{Repository, RepositoryKind};
use crate::error::Result;
use crate::signing::SignOutcome;

/// Parameters of a mirror import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorRequest {
    /// Base URL of the remote repository
    pub url: String,
    /// Architecture to mirror; required for index repositories
    pub architecture: Option<String>,
    /// Keyring holding the remote repository's signing key
    pub keyring: Option<PathBuf>,
}

/// Repository engine operations
#[async_trait]
pub trait Backend: Send + Sync {
    /// Kind of repository this backend manages
    fn kind(&self) -> RepositoryKind;

    /// Provision the repository and its publish endpoint; idempotent
    fn create_repository(&mut self, repo: &Repository) -> Result<()>;

    /// Sign, register and publish a package
    fn add_package(&mut self, repo: &Repository, artifact: &Path) -> Result<SignOutcome>;

    /// Remove a package and publish
    fn remove_package(&mut self, repo: &Repository, artifact: &Path) -> Result<()>;

    /// Output of the package signature verifier
    fn check_signature(&self, artifact: &Path, best_effort: bool) -> Result<String>;

    /// Package file names as the engine currently holds them
    fn rebuild_package_list(&self, repo: &Repository) -> Result<Vec<String>>;

    /// Publish again without changing contents
    fn export(&mut self, repo: &Repository) -> Result<()>;

    /// Populate the repository from a remote one; returns what was imported
    async fn import_mirror(
        &mut self,
        repo: &Repository,
        request: &MirrorRequest,
    ) -> Result<Vec<String>>;
}
