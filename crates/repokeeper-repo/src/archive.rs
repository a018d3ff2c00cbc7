//! Archive (Debian) repositories managed through aptly
//!
//! aptly keeps its own package database under `<home>/aptly` and is driven
//! with `-config=<home>/aptly.json`. repokeeper only ever edits the
//! `FileSystemPublishEndpoints` table of that file; every other setting is
//! written once with defaults and then left alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{Backend, MirrorRequest};
use crate::config::{Home, Repository, RepositoryKind, package_file_name};
use crate::error::{RepoError, Result};
use crate::signing::{DebSigner, PackageSigner, SignOutcome};
use crate::state::write_atomic;
use crate::tool::{Invocation, ToolOutput, ToolRunner, run_checked};

/// Distribution label every repository is published under
pub const DISTRIBUTION: &str = "stable";

/// Directory bare keyring names are resolved against
const KEYRING_DIR: &str = "/usr/share/keyrings";

/// aptly configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AptlyConfig {
    pub root_dir: PathBuf,
    pub download_concurrency: u32,
    pub download_speed_limit: u64,
    pub architectures: Vec<String>,
    pub dependency_follow_suggests: bool,
    pub dependency_follow_recommends: bool,
    pub dependency_follow_all_variants: bool,
    pub dependency_follow_source: bool,
    pub dependency_verbose_resolve: bool,
    pub gpg_disable_sign: bool,
    pub gpg_disable_verify: bool,
    pub gpg_provider: String,
    pub download_source_packages: bool,
    pub skip_legacy_pool: bool,
    #[serde(rename = "ppaDistributorID")]
    pub ppa_distributor_id: String,
    pub ppa_codename: String,
    pub skip_contents_publishing: bool,

    #[serde(rename = "FileSystemPublishEndpoints")]
    pub file_system_publish_endpoints: BTreeMap<String, FileSystemEndpoint>,

    #[serde(rename = "S3PublishEndpoints")]
    pub s3_publish_endpoints: serde_json::Map<String, serde_json::Value>,

    #[serde(rename = "SwiftPublishEndpoints")]
    pub swift_publish_endpoints: serde_json::Map<String, serde_json::Value>,

    /// Settings repokeeper does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for AptlyConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::new(),
            download_concurrency: 4,
            download_speed_limit: 0,
            architectures: Vec::new(),
            dependency_follow_suggests: false,
            dependency_follow_recommends: false,
            dependency_follow_all_variants: false,
            dependency_follow_source: false,
            dependency_verbose_resolve: false,
            gpg_disable_sign: false,
            gpg_disable_verify: false,
            gpg_provider: "gpg2".to_string(),
            download_source_packages: false,
            skip_legacy_pool: true,
            ppa_distributor_id: String::new(),
            ppa_codename: String::new(),
            skip_contents_publishing: false,
            file_system_publish_endpoints: BTreeMap::new(),
            s3_publish_endpoints: serde_json::Map::new(),
            swift_publish_endpoints: serde_json::Map::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl AptlyConfig {
    /// Defaults rooted at `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }
}

/// Entry of `FileSystemPublishEndpoints`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemEndpoint {
    pub root_dir: PathBuf,
    pub link_method: String,
    pub verify_method: String,
}

impl FileSystemEndpoint {
    fn for_repository(repo: &Repository) -> Self {
        Self {
            root_dir: repo.path.clone(),
            link_method: "copy".to_string(),
            verify_method: "md5".to_string(),
        }
    }
}

/// aptly-backed [`Backend`]
pub struct ArchiveBackend {
    runner: Arc<dyn ToolRunner>,
    signer: DebSigner,
    config_path: PathBuf,
    config: AptlyConfig,
}

impl ArchiveBackend {
    /// Load `<home>/aptly.json`, writing the default document on first use
    pub fn open(home: &Home, runner: Arc<dyn ToolRunner>) -> Result<Self> {
        let config_path = home.aptly_config();
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            std::fs::create_dir_all(home.aptly_root())?;
            let config = AptlyConfig::new(home.aptly_root());
            write_atomic(&config_path, &serde_json::to_vec_pretty(&config)?)?;
            config
        };

        Ok(Self {
            signer: DebSigner::new(runner.clone()),
            runner,
            config_path,
            config,
        })
    }

    pub fn config(&self) -> &AptlyConfig {
        &self.config
    }

    /// Publish endpoint registered for a repository
    pub fn endpoint(&self, name: &str) -> Option<&FileSystemEndpoint> {
        self.config.file_system_publish_endpoints.get(name)
    }

    fn save_config(&self) -> Result<()> {
        write_atomic(&self.config_path, &serde_json::to_vec_pretty(&self.config)?)
    }

    fn command<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        Invocation::new("aptly")
            .arg(format!("-config={}", self.config_path.display()))
            .args(args)
    }

    fn aptly<I, S>(&self, args: I) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        run_checked(self.runner.as_ref(), &self.command(args))
    }

    fn local_repositories(&self) -> Result<Vec<String>> {
        let out = self.aptly(["repo", "list", "-raw"])?;
        Ok(out.output.split_whitespace().map(str::to_string).collect())
    }

    fn published(&self) -> Result<Vec<String>> {
        let out = self.aptly(["publish", "list", "-raw"])?;
        Ok(out
            .output
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Drop any existing publication, then publish afresh.
    ///
    /// aptly cannot update a filesystem publication in place.
    fn publish(&self, repo: &Repository) -> Result<()> {
        let target = format!("filesystem:{}:", repo.name);
        let listed = format!("{}. {}", target, DISTRIBUTION);

        if self.published()?.iter().any(|p| *p == listed) {
            self.aptly(["publish", "drop", DISTRIBUTION, target.as_str()])?;
        }

        self.aptly([
            "publish".to_string(),
            "repo".to_string(),
            format!("-distribution={}", DISTRIBUTION),
            format!("-gpg-key={}", repo.signing_key_id),
            repo.name.clone(),
            target,
        ])?;

        tracing::info!(repo = %repo.name, "published");
        Ok(())
    }

    fn mirrors(&self) -> Result<Vec<String>> {
        let out = self.aptly(["mirror", "list", "-raw"])?;
        Ok(out.output.split_whitespace().map(str::to_string).collect())
    }

    /// Download the mirror and copy its packages into the local repository
    fn pull_mirror(&self, repo: &Repository, keyring_flag: &str) -> Result<()> {
        let update = self.aptly(["mirror", "update", keyring_flag, repo.name.as_str()])?;
        tracing::info!("{}", update.output.trim_end());

        self.aptly(["repo", "import", repo.name.as_str(), repo.name.as_str(), "Name"])?;
        Ok(())
    }

    fn search(&self, name: &str) -> Result<Vec<String>> {
        let inv = self.command(["repo", "search", name]);
        let out = self.runner.run(&inv)?;
        if !out.is_success() {
            if out.output.contains("no results") {
                return Ok(Vec::new());
            }
            return Err(RepoError::ToolFailed {
                program: inv.program.clone(),
                args: inv.display_args(),
                status: format!("exit status: {}", out.code.unwrap_or(-1)),
                output: out.output,
            });
        }
        Ok(out
            .output
            .split_whitespace()
            .map(|key| format!("{}.deb", key))
            .collect())
    }
}

/// aptly package query for a `.deb` file name
fn package_key(file_name: &str) -> String {
    file_name.strip_suffix(".deb").unwrap_or(file_name).to_string()
}

fn resolve_keyring(keyring: &Path) -> PathBuf {
    if keyring.components().count() == 1 {
        Path::new(KEYRING_DIR).join(keyring)
    } else {
        keyring.to_path_buf()
    }
}

#[async_trait]
impl Backend for ArchiveBackend {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Archive
    }

    fn create_repository(&mut self, repo: &Repository) -> Result<()> {
        if !self.local_repositories()?.contains(&repo.name) {
            self.aptly(["repo", "create", repo.name.as_str()])?;
        }

        self.config
            .file_system_publish_endpoints
            .insert(repo.name.clone(), FileSystemEndpoint::for_repository(repo));
        self.save_config()
    }

    fn add_package(&mut self, repo: &Repository, artifact: &Path) -> Result<SignOutcome> {
        let outcome = self.signer.sign(&repo.signing_key_id, artifact)?;
        let add = self
            .command(["repo", "add", repo.name.as_str()])
            .arg(artifact);
        run_checked(self.runner.as_ref(), &add)?;

        if let Err(e) = self.publish(repo) {
            let key = package_key(&package_file_name(artifact)?);
            if let Err(undo) = self.aptly(["repo", "remove", repo.name.as_str(), key.as_str()]) {
                tracing::warn!(
                    package = %key,
                    "failed to withdraw unpublished package: {}",
                    undo
                );
            }
            return Err(e);
        }
        Ok(outcome)
    }

    fn remove_package(&mut self, repo: &Repository, artifact: &Path) -> Result<()> {
        let key = package_key(&package_file_name(artifact)?);
        self.aptly(["repo", "remove", repo.name.as_str(), key.as_str()])?;
        self.publish(repo)
    }

    fn check_signature(&self, artifact: &Path, best_effort: bool) -> Result<String> {
        self.signer.check(artifact, best_effort)
    }

    fn rebuild_package_list(&self, repo: &Repository) -> Result<Vec<String>> {
        self.search(&repo.name)
    }

    fn export(&mut self, repo: &Repository) -> Result<()> {
        self.publish(repo)
    }

    async fn import_mirror(
        &mut self,
        repo: &Repository,
        request: &MirrorRequest,
    ) -> Result<Vec<String>> {
        let keyring = request
            .keyring
            .as_deref()
            .map(resolve_keyring)
            .ok_or_else(|| RepoError::MissingKeyring {
                url: request.url.clone(),
            })?;
        let keyring_flag = format!("-keyring={}", keyring.display());

        let mut create = vec!["mirror".to_string(), "create".to_string(), keyring_flag.clone()];
        if let Some(arch) = &request.architecture {
            create.push(format!("-architectures={}", arch));
        }
        create.extend([
            repo.name.clone(),
            request.url.clone(),
            DISTRIBUTION.to_string(),
            "main".to_string(),
        ]);
        if self.mirrors()?.contains(&repo.name) {
            tracing::info!(mirror = %repo.name, "dropping leftover mirror");
            self.aptly(["mirror", "drop", repo.name.as_str()])?;
        }
        self.aptly(create)?;

        if let Err(e) = self.pull_mirror(repo, &keyring_flag) {
            if let Err(undo) = self.aptly(["mirror", "drop", repo.name.as_str()]) {
                tracing::warn!(mirror = %repo.name, "failed to drop mirror: {}", undo);
            }
            return Err(e);
        }
        self.aptly(["mirror", "drop", repo.name.as_str()])?;
        self.publish(repo)?;

        self.search(&repo.name)
    }
}
