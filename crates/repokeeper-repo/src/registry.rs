//! Backend lookup by repository kind
//!
//! Backends are opened on first use, so commands that only touch one kind
//! never read the other engine's configuration.

use std::path::PathBuf;
use std::sync::Arc;

use crate::archive::ArchiveBackend;
use crate::backend::Backend;
use crate::config::{Home, RepositoryKind};
use crate::error::Result;
use crate::index::IndexBackend;
use crate::signing::{DebSigner, PackageSigner, RpmSigner};
use crate::tool::ToolRunner;

pub struct Registry {
    home: Home,
    runner: Arc<dyn ToolRunner>,
    rpm_macros: Option<PathBuf>,
    archive: Option<ArchiveBackend>,
    index: Option<IndexBackend>,
}

impl Registry {
    pub fn new(home: Home, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            home,
            runner,
            rpm_macros: None,
            archive: None,
            index: None,
        }
    }

    /// Write the RPM signer's identity hint somewhere other than `~/.rpmmacros`
    pub fn with_rpm_macros(mut self, path: impl Into<PathBuf>) -> Self {
        self.rpm_macros = Some(path.into());
        self
    }

    pub fn runner(&self) -> Arc<dyn ToolRunner> {
        self.runner.clone()
    }

    /// Backend for `kind`
    pub fn backend(&mut self, kind: RepositoryKind) -> Result<&mut dyn Backend> {
        match kind {
            RepositoryKind::Archive => Ok(self.archive()?),
            RepositoryKind::Index => Ok(self.index()?),
        }
    }

    /// Signature verifier for `kind`; the engine itself is not opened
    pub fn signer(&self, kind: RepositoryKind) -> Result<Box<dyn PackageSigner>> {
        Ok(match kind {
            RepositoryKind::Archive => Box::new(DebSigner::new(self.runner.clone())),
            RepositoryKind::Index => Box::new(self.rpm_signer()?),
        })
    }

    fn rpm_signer(&self) -> Result<RpmSigner> {
        match &self.rpm_macros {
            Some(path) => Ok(RpmSigner::with_macros_path(self.runner.clone(), path.clone())),
            None => RpmSigner::new(self.runner.clone()),
        }
    }

    fn archive(&mut self) -> Result<&mut ArchiveBackend> {
        let backend = match self.archive.take() {
            Some(backend) => backend,
            None => ArchiveBackend::open(&self.home, self.runner.clone())?,
        };
        Ok(self.archive.insert(backend))
    }

    fn index(&mut self) -> Result<&mut IndexBackend> {
        let backend = match self.index.take() {
            Some(backend) => backend,
            None => IndexBackend::new(self.home.clone(), self.runner.clone(), self.rpm_signer()?),
        };
        Ok(self.index.insert(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::testing::ScriptedRunner;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_backend_matches_kind() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new(Home::new(dir.path()), Arc::new(ScriptedRunner::new()))
            .with_rpm_macros(dir.path().join(".rpmmacros"));

        assert_eq!(
            registry.backend(RepositoryKind::Archive).unwrap().kind(),
            RepositoryKind::Archive
        );
        assert_eq!(
            registry.backend(RepositoryKind::Index).unwrap().kind(),
            RepositoryKind::Index
        );
    }

    #[test]
    fn test_archive_opened_lazily() {
        let dir = TempDir::new().unwrap();
        let home = Home::new(dir.path());
        let mut registry = Registry::new(home.clone(), Arc::new(ScriptedRunner::new()))
            .with_rpm_macros(dir.path().join(".rpmmacros"));

        registry.backend(RepositoryKind::Index).unwrap();
        assert!(!home.aptly_config().exists());

        registry.backend(RepositoryKind::Archive).unwrap();
        assert!(home.aptly_config().exists());
    }

    #[test]
    fn test_signer_does_not_open_engine() {
        let dir = TempDir::new().unwrap();
        let home = Home::new(dir.path());
        let runner = Arc::new(ScriptedRunner::new());
        let registry = Registry::new(home.clone(), runner.clone())
            .with_rpm_macros(dir.path().join(".rpmmacros"));

        registry
            .signer(RepositoryKind::Archive)
            .unwrap()
            .check(Path::new("foo_1.0_amd64.deb"), true)
            .unwrap();

        assert!(!home.aptly_config().exists());
        assert!(!home.aptly_root().exists());
        assert_eq!(runner.command_lines(), ["dpkg-sig --verify foo_1.0_amd64.deb"]);
    }
}
