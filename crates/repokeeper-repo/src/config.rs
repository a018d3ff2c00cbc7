//! Repository definitions and on-disk layout
//!
//! Everything repokeeper owns lives under one home directory, by default
//! `~/.repokeeper`:
//!
//! ```text
//! ~/.repokeeper/
//!   repokeeper.yaml          repository state
//!   aptly.json               archive engine configuration
//!   aptly/                   archive engine root
//!   rpms/<repo>/<arch>/      index package buckets
//!   mirrors/<repo>/<arch>/   mirror download cache
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "REPOKEEPER_HOME";

/// Paths under the repokeeper home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Home {
    root: PathBuf,
}

impl Home {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.repokeeper`
    pub fn default_root() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine home directory".to_string(),
        })?;
        Ok(home.join(".repokeeper"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("repokeeper.yaml")
    }

    pub fn aptly_config(&self) -> PathBuf {
        self.root.join("aptly.json")
    }

    pub fn aptly_root(&self) -> PathBuf {
        self.root.join("aptly")
    }

    /// Bucket root for an index repository
    pub fn rpm_root(&self, repo: &str) -> PathBuf {
        self.root.join("rpms").join(repo)
    }

    /// Download cache for one mirrored architecture
    pub fn mirror_dir(&self, repo: &str, arch: &str) -> PathBuf {
        self.root.join("mirrors").join(repo).join(arch)
    }
}

/// Repository kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    /// Debian-style repository managed through aptly
    #[serde(alias = "deb")]
    Archive,

    /// RPM-style repository laid out per architecture with createrepo metadata
    #[serde(alias = "rpm")]
    Index,
}

impl RepositoryKind {
    /// File extension of packages stored in this kind of repository
    pub fn package_extension(self) -> &'static str {
        match self {
            RepositoryKind::Archive => "deb",
            RepositoryKind::Index => "rpm",
        }
    }

    /// Detect the kind from a package file's extension
    pub fn from_package_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.trim().to_ascii_lowercase();
        match ext.as_str() {
            "deb" => Some(RepositoryKind::Archive),
            "rpm" => Some(RepositoryKind::Index),
            _ => None,
        }
    }
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::Archive => f.write_str("archive"),
            RepositoryKind::Index => f.write_str("index"),
        }
    }
}

/// Remote sync target kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    /// Commit into the repository directory and push to `origin`
    Git,
}

impl fmt::Display for PublisherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublisherKind::Git => f.write_str("git"),
        }
    }
}

/// Repository definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Unique name for this repository
    #[serde(skip)]
    pub name: String,

    /// Repository kind, fixed at creation
    pub kind: RepositoryKind,

    /// Directory the published repository is written to
    pub path: PathBuf,

    /// GPG key id used to sign packages and metadata
    pub signing_key_id: String,

    /// Optional remote sync target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<PublisherKind>,
}

impl Repository {
    pub fn new(
        name: impl Into<String>,
        kind: RepositoryKind,
        path: impl Into<PathBuf>,
        signing_key_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            path: path.into(),
            signing_key_id: signing_key_id.into(),
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Option<PublisherKind>) -> Self {
        self.publisher = publisher;
        self
    }
}

/// File name component of a package path
pub fn package_file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| RepoError::InvalidPackageName {
            filename: path.display().to_string(),
        })
}

/// Reject values that would escape the directory they are joined onto
pub fn check_path_segment(what: &str, value: &str) -> Result<()> {
    let unsafe_segment = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0');
    if unsafe_segment {
        return Err(RepoError::InvalidConfig {
            message: format!("Invalid {}: {:?}", what, value),
        });
    }
    Ok(())
}
