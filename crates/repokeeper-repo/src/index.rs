//! Index (RPM) repositories served as createrepo_c trees
//!
//! Packages are kept in per-architecture buckets under
//! `<home>/rpms/<repo>/<arch>/`. Every mutation ends with a sync pass that
//! rebuilds `<repo.path>/<arch>` from its bucket, regenerates the metadata
//! and signs `repomd.xml`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::backend::{Backend, MirrorRequest};
use crate::config::{Home, Repository, RepositoryKind, check_path_segment, package_file_name};
use crate::error::{RepoError, Result};
use crate::mirror::{self, GpgVerifier, MirrorDescriptor};
use crate::signing::{PackageSigner, RpmSigner, SignOutcome};
use crate::tool::{Invocation, ToolRunner, run_checked};

/// Architecture segment of an RPM file name
///
/// `foo-1.0-1.x86_64.rpm` → `x86_64`
pub fn architecture_of(filename: &str) -> Result<&str> {
    let segments: Vec<&str> = filename.split('.').collect();
    if segments.len() < 3 || segments[segments.len() - 2].is_empty() {
        return Err(RepoError::InvalidPackageName {
            filename: filename.to_string(),
        });
    }
    Ok(segments[segments.len() - 2])
}

/// createrepo_c-backed [`Backend`]
pub struct IndexBackend {
    runner: Arc<dyn ToolRunner>,
    signer: RpmSigner,
    home: Home,
}

impl IndexBackend {
    pub fn new(home: Home, runner: Arc<dyn ToolRunner>, signer: RpmSigner) -> Self {
        Self {
            runner,
            signer,
            home,
        }
    }

    fn bucket_root(&self, repo: &Repository) -> PathBuf {
        self.home.rpm_root(&repo.name)
    }

    /// Architecture buckets that currently exist, sorted
    fn buckets(&self, repo: &Repository) -> Result<Vec<String>> {
        let root = self.bucket_root(repo);
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut arches = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                arches.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        arches.sort();
        Ok(arches)
    }

    /// Rebuild and sign every published architecture directory
    pub fn sync(&self, repo: &Repository) -> Result<()> {
        for arch in self.buckets(repo)? {
            self.sync_architecture(repo, &arch)?;
        }
        Ok(())
    }

    fn sync_architecture(&self, repo: &Repository, arch: &str) -> Result<()> {
        let bucket = self.bucket_root(repo).join(arch);
        let target = repo.path.join(arch);

        if target.exists() {
            std::fs::remove_dir_all(&target)?;
        }
        std::fs::create_dir_all(&target)?;

        for entry in std::fs::read_dir(&bucket)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::copy(entry.path(), target.join(entry.file_name()))?;
            }
        }

        let createrepo = Invocation::new("createrepo_c")
            .args(["--update", "."])
            .current_dir(&target);
        run_checked(self.runner.as_ref(), &createrepo)?;

        let sign = Invocation::new("gpg")
            .args(["--batch", "--yes", "--armor", "--local-user"])
            .arg(&repo.signing_key_id)
            .args(["--detach-sign", "--output", "repomd.xml.asc", "repomd.xml"])
            .current_dir(target.join("repodata"));
        run_checked(self.runner.as_ref(), &sign)?;

        tracing::info!(repo = %repo.name, %arch, "metadata signed");
        Ok(())
    }

    /// Architectures whose metadata and signature are both in place
    pub fn published_architectures(&self, repo: &Repository) -> Result<Vec<String>> {
        Ok(self
            .buckets(repo)?
            .into_iter()
            .filter(|arch| {
                let repodata = repo.path.join(arch).join("repodata");
                repodata.join("repomd.xml").is_file() && repodata.join("repomd.xml.asc").is_file()
            })
            .collect())
    }
}

/// Drop a file whose publication failed, and its bucket if now empty
fn discard_bucket_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!("Failed to remove {}: {}", path.display(), e);
        return;
    }
    if let Some(bucket) = path.parent() {
        // fails while other packages remain
        let _ = std::fs::remove_dir(bucket);
    }
}

#[async_trait]
impl Backend for IndexBackend {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Index
    }

    fn create_repository(&mut self, repo: &Repository) -> Result<()> {
        std::fs::create_dir_all(self.bucket_root(repo))?;
        Ok(())
    }

    fn add_package(&mut self, repo: &Repository, artifact: &Path) -> Result<SignOutcome> {
        let file_name = package_file_name(artifact)?;
        let arch = architecture_of(&file_name)?;

        let outcome = self.signer.sign(&repo.signing_key_id, artifact)?;

        let bucket = self.bucket_root(repo).join(arch);
        std::fs::create_dir_all(&bucket)?;
        let copied = bucket.join(&file_name);
        std::fs::copy(artifact, &copied)?;

        if let Err(e) = self.sync(repo) {
            discard_bucket_file(&copied);
            return Err(e);
        }
        Ok(outcome)
    }

    fn remove_package(&mut self, repo: &Repository, artifact: &Path) -> Result<()> {
        let file_name = package_file_name(artifact)?;
        let arch = architecture_of(&file_name)?;

        match std::fs::remove_file(self.bucket_root(repo).join(arch).join(&file_name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(package = %file_name, "not in bucket");
            }
            Err(e) => return Err(e.into()),
        }

        self.sync(repo)
    }

    fn check_signature(&self, artifact: &Path, best_effort: bool) -> Result<String> {
        self.signer.check(artifact, best_effort)
    }

    fn rebuild_package_list(&self, repo: &Repository) -> Result<Vec<String>> {
        let root = self.bucket_root(repo);
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut packages = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if RepositoryKind::from_package_path(entry.path()) == Some(RepositoryKind::Index) {
                packages.push(name.into_owned());
            }
        }
        packages.sort();
        Ok(packages)
    }

    fn export(&mut self, repo: &Repository) -> Result<()> {
        self.sync(repo)
    }

    async fn import_mirror(
        &mut self,
        repo: &Repository,
        request: &MirrorRequest,
    ) -> Result<Vec<String>> {
        let architecture =
            request
                .architecture
                .clone()
                .ok_or_else(|| RepoError::MissingArchitecture {
                    url: request.url.clone(),
                })?;
        check_path_segment("architecture", &architecture)?;

        let descriptor = MirrorDescriptor {
            source_url: request.url.clone(),
            working_directory: self.home.mirror_dir(&repo.name, &architecture),
            architecture,
        };
        let verifier = GpgVerifier::new(self.runner.clone(), request.keyring.clone());
        let bucket = self.bucket_root(repo).join(&descriptor.architecture);

        let imported = mirror::import(&descriptor, &verifier, &bucket).await?;
        self.sync(repo)?;
        Ok(imported)
    }
}
