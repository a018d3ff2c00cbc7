//! Persistent repository state
//!
//! Stores every repository definition and its package list in
//! `<home>/repokeeper.yaml`. The file is rewritten in full after each
//! mutation, through a temp file in the same directory that is renamed over
//! the old one, so a reader never observes a half-written document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{PublisherKind, Repository, RepositoryKind};
use crate::error::{RepoError, Result};

/// Serialized state document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub repositories: BTreeMap<String, Repository>,

    #[serde(default)]
    pub packages: BTreeMap<String, Vec<String>>,
}

/// Owner of the state file
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: State,
}

impl StateStore {
    /// Load state from `path`, creating an empty document on first use
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let mut state: State = if content.trim().is_empty() {
                State::default()
            } else {
                serde_yaml::from_str(&content)?
            };
            for (name, repo) in state.repositories.iter_mut() {
                repo.name = name.clone();
            }
            Ok(Self { path, state })
        } else {
            let store = Self {
                path,
                state: State::default(),
            };
            store.persist()?;
            Ok(store)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// All repositories, ordered by name
    pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
        self.state.repositories.values()
    }

    /// Look up a repository
    pub fn repository(&self, name: &str) -> Result<&Repository> {
        self.state
            .repositories
            .get(name)
            .ok_or_else(|| RepoError::UnknownRepository {
                name: name.to_string(),
            })
    }

    /// Package list of a registered repository
    pub fn packages(&self, repo: &str) -> Result<&[String]> {
        self.repository(repo)?;
        Ok(self
            .state
            .packages
            .get(repo)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    /// Whether `filename` is already listed for `repo`
    pub fn contains_package(&self, repo: &str, filename: &str) -> bool {
        self.state
            .packages
            .get(repo)
            .is_some_and(|pkgs| pkgs.iter().any(|p| p == filename))
    }

    /// Fail if `name` exists with a different kind
    pub fn ensure_kind(&self, name: &str, kind: RepositoryKind) -> Result<()> {
        match self.state.repositories.get(name) {
            Some(existing) if existing.kind != kind => Err(RepoError::KindMismatch {
                name: name.to_string(),
                existing: existing.kind.to_string(),
                requested: kind.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Insert or replace a repository definition.
    ///
    /// The kind of an existing repository cannot change. The package list is
    /// kept as-is.
    pub fn upsert_repository(
        &mut self,
        name: &str,
        kind: RepositoryKind,
        path: impl Into<PathBuf>,
        signing_key_id: &str,
        publisher: Option<PublisherKind>,
    ) -> Result<&Repository> {
        self.ensure_kind(name, kind)?;

        let repo = Repository::new(name, kind, path, signing_key_id).with_publisher(publisher);
        self.state.repositories.insert(name.to_string(), repo);
        self.state.packages.entry(name.to_string()).or_default();
        self.persist()?;

        self.repository(name)
    }

    /// Record a new package
    pub fn add_package(&mut self, repo: &str, filename: &str) -> Result<()> {
        self.repository(repo)?;
        if self.contains_package(repo, filename) {
            return Err(RepoError::DuplicatePackage {
                repo: repo.to_string(),
                filename: filename.to_string(),
            });
        }

        self.state
            .packages
            .entry(repo.to_string())
            .or_default()
            .push(filename.to_string());
        self.persist()
    }

    /// Forget a package; absent packages are ignored
    pub fn remove_package(&mut self, repo: &str, filename: &str) -> Result<()> {
        self.repository(repo)?;
        if let Some(pkgs) = self.state.packages.get_mut(repo) {
            pkgs.retain(|p| p != filename);
        }
        self.persist()
    }

    /// Replace the package list with one read back from disk
    pub fn replace_packages(&mut self, repo: &str, filenames: Vec<String>) -> Result<()> {
        self.repository(repo)?;
        let mut unique: Vec<String> = Vec::with_capacity(filenames.len());
        for name in filenames {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        self.state.packages.insert(repo.to_string(), unique);
        self.persist()
    }

    /// Write the whole document atomically
    pub fn persist(&self) -> Result<()> {
        let content = serde_yaml::to_string(&self.state)?;
        write_atomic(&self.path, content.as_bytes())
    }
}

/// Replace `path` with `content` via a temp file and rename
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
