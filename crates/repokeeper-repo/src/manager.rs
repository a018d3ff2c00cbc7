//! Command-level orchestration
//!
//! [`RepoManager`] ties the state store to the backends. Local checks run
//! before any external program; the state file is only updated once the
//! backend operation succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::MirrorRequest;
use crate::config::{
    Home, PublisherKind, Repository, RepositoryKind, check_path_segment, package_file_name,
};
use crate::error::{RepoError, Result};
use crate::publisher::publisher_for;
use crate::registry::Registry;
use crate::signing::SignOutcome;
use crate::state::StateStore;
use crate::tool::{SystemRunner, ToolRunner, which};

/// Programs repokeeper drives
pub const REQUIRED_TOOLS: &[&str] = &[
    "aptly",
    "dpkg-sig",
    "createrepo_c",
    "rpm",
    "rpmsign",
    "gpg",
    "git",
];

/// Where a required program was found, if anywhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStatus {
    pub program: &'static str,
    pub path: Option<PathBuf>,
}

pub struct RepoManager {
    store: StateStore,
    registry: Registry,
}

impl RepoManager {
    /// Manager over `home` running real external programs
    pub fn open(home: Home) -> Result<Self> {
        Self::with_runner(home, Arc::new(SystemRunner))
    }

    pub fn with_runner(home: Home, runner: Arc<dyn ToolRunner>) -> Result<Self> {
        Self::with_registry(home.clone(), Registry::new(home, runner))
    }

    pub fn with_registry(home: Home, registry: Registry) -> Result<Self> {
        let store = StateStore::open(home.state_file())?;
        Ok(Self { store, registry })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn check_dependencies(&self) -> Vec<DependencyStatus> {
        REQUIRED_TOOLS
            .iter()
            .map(|&program| DependencyStatus {
                program,
                path: which(program),
            })
            .collect()
    }

    /// Create or update a repository and provision it in its engine
    pub fn upsert_repository(
        &mut self,
        name: &str,
        kind: RepositoryKind,
        path: &Path,
        signing_key_id: &str,
        publisher: Option<PublisherKind>,
    ) -> Result<Repository> {
        check_path_segment("repository name", name)?;
        self.store.ensure_kind(name, kind)?;

        std::fs::create_dir_all(path)?;
        let repo = self
            .store
            .upsert_repository(name, kind, path, signing_key_id, publisher)?
            .clone();

        self.registry.backend(kind)?.create_repository(&repo)?;
        tracing::info!(repo = %name, %kind, "repository ready");
        Ok(repo)
    }

    pub fn list_repositories(&self) -> Vec<&Repository> {
        self.store.repositories().collect()
    }

    /// Sign, register and publish a package, then record it
    pub fn add_package(&mut self, name: &str, artifact: &Path) -> Result<SignOutcome> {
        let repo = self.store.repository(name)?.clone();
        let filename = checked_artifact(&repo, artifact)?;
        if self.store.contains_package(name, &filename) {
            return Err(RepoError::DuplicatePackage {
                repo: name.to_string(),
                filename,
            });
        }

        let outcome = self
            .registry
            .backend(repo.kind)?
            .add_package(&repo, artifact)?;
        self.store.add_package(name, &filename)?;

        if repo.publisher.is_some() {
            publisher_for(&repo, self.registry.runner())?.save(&repo, artifact)?;
        }

        tracing::info!(repo = %name, package = %filename, "package added");
        Ok(outcome)
    }

    pub fn remove_package(&mut self, name: &str, artifact: &Path) -> Result<()> {
        let repo = self.store.repository(name)?.clone();
        let filename = package_file_name(artifact)?;
        ensure_extension(&repo, artifact, &filename)?;

        self.registry
            .backend(repo.kind)?
            .remove_package(&repo, artifact)?;
        self.store.remove_package(name, &filename)
    }

    pub fn list_packages(&self, name: &str) -> Result<&[String]> {
        self.store.packages(name)
    }

    /// Run the verifier matching the package's extension
    pub fn check_signature(&self, artifact: &Path, best_effort: bool) -> Result<String> {
        if !artifact.is_file() {
            return Err(RepoError::PackageNotFound {
                path: artifact.to_path_buf(),
            });
        }
        let kind = RepositoryKind::from_package_path(artifact).ok_or_else(|| {
            RepoError::InvalidPackageName {
                filename: artifact.display().to_string(),
            }
        })?;

        self.registry.signer(kind)?.check(artifact, best_effort)
    }

    /// Replace the stored package list with what the engine holds
    pub fn rebuild_package_list(&mut self, name: &str) -> Result<Vec<String>> {
        let repo = self.store.repository(name)?.clone();
        let packages = self
            .registry
            .backend(repo.kind)?
            .rebuild_package_list(&repo)?;
        self.store.replace_packages(name, packages.clone())?;
        Ok(packages)
    }

    /// Push the published tree through the repository's publisher
    pub fn sync(&self, name: &str) -> Result<()> {
        let repo = self.store.repository(name)?;
        publisher_for(repo, self.registry.runner())?.sync(repo)
    }

    pub fn export(&mut self, name: &str) -> Result<()> {
        let repo = self.store.repository(name)?.clone();
        self.registry.backend(repo.kind)?.export(&repo)
    }

    /// Mirror a remote repository, then re-read the package list.
    ///
    /// The stored list is left untouched when the import fails.
    pub async fn import_mirror(
        &mut self,
        name: &str,
        request: &MirrorRequest,
    ) -> Result<Vec<String>> {
        let repo = self.store.repository(name)?.clone();
        let backend = self.registry.backend(repo.kind)?;

        let imported = backend.import_mirror(&repo, request).await?;
        let packages = backend.rebuild_package_list(&repo)?;
        self.store.replace_packages(name, packages)?;

        Ok(imported)
    }
}

/// File name of an existing artifact whose extension fits `repo`
fn checked_artifact(repo: &Repository, artifact: &Path) -> Result<String> {
    if !artifact.is_file() {
        return Err(RepoError::PackageNotFound {
            path: artifact.to_path_buf(),
        });
    }
    let filename = package_file_name(artifact)?;
    ensure_extension(repo, artifact, &filename)?;
    Ok(filename)
}

fn ensure_extension(repo: &Repository, artifact: &Path, filename: &str) -> Result<()> {
    if RepositoryKind::from_package_path(artifact) != Some(repo.kind) {
        return Err(RepoError::PackageKindMismatch {
            repo: repo.name.clone(),
            filename: filename.to_string(),
            expected: repo.kind.package_extension().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::mirror::testing::{ARCH, MockMirror, Package, gpg_invalid, gpg_valid};
    use crate::tool::ToolOutput;
    use crate::tool::testing::ScriptedRunner;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        runner: Arc<ScriptedRunner>,
        manager: RepoManager,
    }

    fn fixture(runner: ScriptedRunner) -> Fixture {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(runner);
        let home = Home::new(dir.path().join("home"));
        let registry = Registry::new(home.clone(), runner.clone())
            .with_rpm_macros(dir.path().join(".rpmmacros"));
        let manager = RepoManager::with_registry(home, registry).unwrap();
        Fixture {
            dir,
            runner,
            manager,
        }
    }

    fn unsigned_deb() -> ScriptedRunner {
        ScriptedRunner::new().on("dpkg-sig", "--verify", ToolOutput::failure(2, "NOSIG\n"))
    }

    impl Fixture {
        fn artifact(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, "package").unwrap();
            path
        }

        fn upsert_demo(&mut self, publisher: Option<PublisherKind>) -> PathBuf {
            let path = self.dir.path().join("demo");
            self.manager
                .upsert_repository("demo", RepositoryKind::Archive, &path, "ABC123", publisher)
                .unwrap();
            path
        }

        fn upsert_el9(&mut self) {
            let path = self.dir.path().join("el9");
            self.manager
                .upsert_repository("el9", RepositoryKind::Index, &path, "ABC123", None)
                .unwrap();
        }

        fn aptly_config(&self) -> serde_json::Value {
            let raw = std::fs::read_to_string(self.dir.path().join("home/aptly.json")).unwrap();
            serde_json::from_str(&raw).unwrap()
        }
    }

    #[test]
    fn test_add_package_records_and_registers_endpoint() {
        let mut f = fixture(unsigned_deb());
        let path = f.upsert_demo(None);
        let deb = f.artifact("foo_1.0_amd64.deb");

        f.manager.add_package("demo", &deb).unwrap();

        assert_eq!(f.manager.list_packages("demo").unwrap(), ["foo_1.0_amd64.deb"]);
        assert_eq!(
            f.aptly_config()["FileSystemPublishEndpoints"]["demo"]["rootDir"],
            path.to_str().unwrap()
        );

        let reopened = StateStore::open(f.dir.path().join("home/repokeeper.yaml")).unwrap();
        assert_eq!(reopened.packages("demo").unwrap(), ["foo_1.0_amd64.deb"]);
    }

    #[test]
    fn test_duplicate_add_fails_before_any_tool() {
        let mut f = fixture(unsigned_deb());
        f.upsert_demo(None);
        let deb = f.artifact("foo_1.0_amd64.deb");
        f.manager.add_package("demo", &deb).unwrap();
        let calls = f.runner.calls().len();

        let err = f.manager.add_package("demo", &deb).unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(matches!(err, RepoError::DuplicatePackage { .. }));
        assert_eq!(f.manager.list_packages("demo").unwrap().len(), 1);
        assert_eq!(f.runner.calls().len(), calls);
    }

    #[test]
    fn test_kind_is_fixed_after_creation() {
        let mut f = fixture(ScriptedRunner::new());
        f.upsert_demo(None);
        let calls = f.runner.calls().len();

        let err = f
            .manager
            .upsert_repository(
                "demo",
                RepositoryKind::Index,
                &f.dir.path().join("other"),
                "ABC123",
                None,
            )
            .unwrap_err();

        assert!(matches!(err, RepoError::KindMismatch { .. }));
        assert_eq!(
            f.manager.store().repository("demo").unwrap().kind,
            RepositoryKind::Archive
        );
        assert!(!f.dir.path().join("other").exists());
        assert_eq!(f.runner.calls().len(), calls);
    }

    #[test]
    fn test_upsert_keeps_packages() {
        let mut f = fixture(unsigned_deb());
        f.upsert_demo(None);
        let deb = f.artifact("foo_1.0_amd64.deb");
        f.manager.add_package("demo", &deb).unwrap();

        f.upsert_demo(Some(PublisherKind::Git));

        assert_eq!(f.manager.list_packages("demo").unwrap().len(), 1);
        assert_eq!(
            f.manager.store().repository("demo").unwrap().publisher,
            Some(PublisherKind::Git)
        );
    }

    #[test]
    fn test_extension_must_match_kind() {
        let mut f = fixture(ScriptedRunner::new());
        f.upsert_demo(None);
        let rpm = f.artifact("foo-1.0-1.x86_64.rpm");
        let calls = f.runner.calls().len();

        let err = f.manager.add_package("demo", &rpm).unwrap_err();

        assert!(matches!(err, RepoError::PackageKindMismatch { .. }));
        assert_eq!(f.runner.calls().len(), calls);
    }

    #[test]
    fn test_missing_artifact_and_repository() {
        let mut f = fixture(ScriptedRunner::new());
        f.upsert_demo(None);

        let err = f
            .manager
            .add_package("demo", &f.dir.path().join("absent_1.0_amd64.deb"))
            .unwrap_err();
        assert!(matches!(err, RepoError::PackageNotFound { .. }));

        let deb = f.artifact("foo_1.0_amd64.deb");
        let err = f.manager.add_package("nope", &deb).unwrap_err();
        assert!(matches!(err, RepoError::UnknownRepository { .. }));
    }

    #[test]
    fn test_backend_failure_leaves_state_untouched() {
        let runner = unsigned_deb().on(
            "dpkg-sig",
            "-s builder",
            ToolOutput::failure(2, "gpg: no secret key"),
        );
        let mut f = fixture(runner);
        f.upsert_demo(None);
        let deb = f.artifact("foo_1.0_amd64.deb");

        let err = f.manager.add_package("demo", &deb).unwrap_err();

        assert_eq!(err.category(), ErrorCategory::ExternalTool);
        assert!(f.manager.list_packages("demo").unwrap().is_empty());
    }

    #[test]
    fn test_failed_metadata_signing_leaves_no_orphan() {
        let failed_once = std::sync::atomic::AtomicBool::new(false);
        let runner = ScriptedRunner::new()
            .on("rpm", "-K", ToolOutput::success("digests signatures OK"))
            .respond(move |inv| {
                let cwd = inv.cwd.as_ref()?;
                match inv.program.as_str() {
                    "createrepo_c" => {
                        std::fs::create_dir_all(cwd.join("repodata")).ok()?;
                        std::fs::write(cwd.join("repodata/repomd.xml"), "<repomd/>").ok()?;
                        Some(ToolOutput::success(""))
                    }
                    "gpg" if !failed_once.swap(true, std::sync::atomic::Ordering::SeqCst) => {
                        Some(ToolOutput::failure(2, "gpg: signing failed: Timeout"))
                    }
                    "gpg" => {
                        std::fs::write(cwd.join("repomd.xml.asc"), "signature").ok()?;
                        Some(ToolOutput::success(""))
                    }
                    _ => None,
                }
            });
        let mut f = fixture(runner);
        f.upsert_el9();
        let foo = f.artifact("foo-1.0-1.x86_64.rpm");
        let bar = f.artifact("bar-1.0-1.x86_64.rpm");

        let err = f.manager.add_package("el9", &foo).unwrap_err();
        assert!(matches!(err, RepoError::ToolFailed { ref program, .. } if program == "gpg"));

        f.manager.add_package("el9", &bar).unwrap();

        assert_eq!(f.manager.list_packages("el9").unwrap(), ["bar-1.0-1.x86_64.rpm"]);
        let published = f.dir.path().join("el9/x86_64");
        assert!(published.join("bar-1.0-1.x86_64.rpm").is_file());
        assert!(!published.join("foo-1.0-1.x86_64.rpm").exists());
        assert_eq!(
            f.manager.rebuild_package_list("el9").unwrap(),
            ["bar-1.0-1.x86_64.rpm"]
        );
    }

    #[test]
    fn test_unsafe_repository_name_rejected() {
        let mut f = fixture(ScriptedRunner::new());
        let path = f.dir.path().join("www");

        let err = f
            .manager
            .upsert_repository("../escape", RepositoryKind::Index, &path, "ABC123", None)
            .unwrap_err();

        assert!(matches!(err, RepoError::InvalidConfig { .. }));
        assert!(!path.exists());
        assert!(f.manager.list_repositories().is_empty());
    }

    #[test]
    fn test_publisher_saves_after_add() {
        let mut f = fixture(unsigned_deb());
        let path = f.upsert_demo(Some(PublisherKind::Git));
        let deb = f.artifact("foo_1.0_amd64.deb");

        f.manager.add_package("demo", &deb).unwrap();

        let lines = f.runner.command_lines();
        let git: Vec<&String> = lines.iter().filter(|l| l.starts_with("git ")).collect();
        assert_eq!(
            git,
            [
                &format!("git -C {} add --all", path.display()),
                &format!("git -C {} commit -m Add foo_1.0_amd64.deb.", path.display()),
            ]
        );
    }

    #[test]
    fn test_sync_requires_publisher() {
        let mut f = fixture(ScriptedRunner::new());
        f.upsert_demo(None);

        let err = f.manager.sync("demo").unwrap_err();
        assert!(matches!(err, RepoError::NoPublisher { .. }));
    }

    #[test]
    fn test_remove_package_is_idempotent() {
        let mut f = fixture(unsigned_deb());
        f.upsert_demo(None);
        let deb = f.artifact("foo_1.0_amd64.deb");
        f.manager.add_package("demo", &deb).unwrap();

        f.manager.remove_package("demo", &deb).unwrap();
        f.manager.remove_package("demo", &deb).unwrap();

        assert!(f.manager.list_packages("demo").unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_replaces_list() {
        let runner = ScriptedRunner::new().on(
            "aptly",
            "repo search demo",
            ToolOutput::success("bar_2.0_all\nfoo_1.0_amd64\n"),
        );
        let mut f = fixture(runner);
        f.upsert_demo(None);

        f.manager.rebuild_package_list("demo").unwrap();

        assert_eq!(
            f.manager.list_packages("demo").unwrap(),
            ["bar_2.0_all.deb", "foo_1.0_amd64.deb"]
        );
    }

    #[test]
    fn test_check_signature_picks_verifier_from_extension() {
        let runner = ScriptedRunner::new().on(
            "rpm",
            "-K",
            ToolOutput::success("foo.rpm: digests signatures OK"),
        );
        let f = fixture(runner);
        let rpm = f.artifact("foo-1.0-1.x86_64.rpm");

        let out = f.manager.check_signature(&rpm, false).unwrap();

        assert_eq!(out, "foo.rpm: digests signatures OK");
        assert!(f.runner.command_lines()[0].starts_with("rpm -K "));

        let txt = f.artifact("notes.txt");
        assert!(matches!(
            f.manager.check_signature(&txt, true),
            Err(RepoError::InvalidPackageName { .. })
        ));
    }

    #[test]
    fn test_check_signature_on_deb_leaves_home_untouched() {
        let runner = ScriptedRunner::new().on(
            "dpkg-sig",
            "--verify",
            ToolOutput::success("GOODSIG _gpgbuilder 0123456789ABCDEF 1700000000"),
        );
        let f = fixture(runner);
        let deb = f.artifact("foo_1.0_amd64.deb");

        let out = f.manager.check_signature(&deb, false).unwrap();

        assert!(out.starts_with("GOODSIG"));
        assert!(!f.dir.path().join("home/aptly.json").exists());
        assert!(!f.dir.path().join("home/aptly").exists());
    }

    #[test]
    fn test_check_dependencies_lists_every_tool() {
        let f = fixture(ScriptedRunner::new());
        let report = f.manager.check_dependencies();
        let programs: Vec<&str> = report.iter().map(|d| d.program).collect();
        assert_eq!(programs, REQUIRED_TOOLS);
    }

    #[tokio::test]
    async fn test_import_mirror_replaces_list() {
        let packages = [Package::new("alpha"), Package::new("beta")];
        let mirror = MockMirror::start(&packages, None).await;
        let mut f = fixture(gpg_valid());
        f.upsert_el9();

        let request = MirrorRequest {
            url: mirror.url(),
            architecture: Some(ARCH.to_string()),
            keyring: None,
        };
        let imported = f.manager.import_mirror("el9", &request).await.unwrap();

        assert_eq!(imported.len(), 2);
        assert_eq!(
            f.manager.list_packages("el9").unwrap(),
            [packages[0].file_name(), packages[1].file_name()]
        );
    }

    #[tokio::test]
    async fn test_primary_mismatch_is_integrity_error() {
        let declared = format!("cafebabe{}", "0".repeat(56));
        let mirror = MockMirror::start(&[Package::new("alpha")], Some(&declared)).await;
        let mut f = fixture(gpg_valid());
        f.upsert_el9();

        let request = MirrorRequest {
            url: mirror.url(),
            architecture: Some(ARCH.to_string()),
            keyring: None,
        };
        let err = f.manager.import_mirror("el9", &request).await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Integrity);
        assert_eq!(mirror.package_requests().await, 0);
        assert!(f.manager.list_packages("el9").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_untrusted_index_leaves_list_unchanged() {
        let mirror = MockMirror::start(&[Package::new("alpha")], None).await;
        let mut f = fixture(gpg_invalid());
        f.upsert_el9();

        let request = MirrorRequest {
            url: mirror.url(),
            architecture: Some(ARCH.to_string()),
            keyring: None,
        };
        let err = f.manager.import_mirror("el9", &request).await.unwrap_err();

        assert!(matches!(err, RepoError::UntrustedIndex { .. }));
        assert_eq!(mirror.requested().await.len(), 2);
        assert!(f.manager.list_packages("el9").unwrap().is_empty());
    }
}
