//! Remote sync of published repository directories

use std::path::Path;
use std::sync::Arc;

use crate::config::{PublisherKind, Repository, package_file_name};
use crate::error::{RepoError, Result};
use crate::tool::{Invocation, ToolRunner, run_checked};

/// Pushes a repository's published tree somewhere else
pub trait Publisher: Send + Sync {
    fn kind(&self) -> PublisherKind;

    /// Record the tree after `artifact` was added
    fn save(&self, repo: &Repository, artifact: &Path) -> Result<()>;

    /// Send recorded changes to the remote
    fn sync(&self, repo: &Repository) -> Result<()>;
}

/// Publisher for a repository directory that is a git checkout
pub struct GitPublisher {
    runner: Arc<dyn ToolRunner>,
}

impl GitPublisher {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    fn git<I, S>(&self, repo: &Repository, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        let inv = Invocation::new("git").arg("-C").arg(&repo.path).args(args);
        run_checked(self.runner.as_ref(), &inv)?;
        Ok(())
    }
}

impl Publisher for GitPublisher {
    fn kind(&self) -> PublisherKind {
        PublisherKind::Git
    }

    fn save(&self, repo: &Repository, artifact: &Path) -> Result<()> {
        let message = format!("Add {}.", package_file_name(artifact)?);
        self.git(repo, ["add", "--all"])?;
        self.git(repo, ["commit", "-m", message.as_str()])
    }

    fn sync(&self, repo: &Repository) -> Result<()> {
        self.git(repo, ["push", "origin", "main"])?;
        tracing::info!(repo = %repo.name, "pushed to origin");
        Ok(())
    }
}

/// Publisher declared by `repo`, failing when there is none
pub fn publisher_for(repo: &Repository, runner: Arc<dyn ToolRunner>) -> Result<Box<dyn Publisher>> {
    match repo.publisher {
        Some(PublisherKind::Git) => Ok(Box::new(GitPublisher::new(runner))),
        None => Err(RepoError::NoPublisher {
            name: repo.name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryKind;
    use crate::tool::ToolOutput;
    use crate::tool::testing::ScriptedRunner;

    fn repo(publisher: Option<PublisherKind>) -> Repository {
        Repository::new("demo", RepositoryKind::Archive, "/srv/demo", "ABC123")
            .with_publisher(publisher)
    }

    #[test]
    fn test_save_commits_everything() {
        let runner = Arc::new(ScriptedRunner::new());
        let publisher = GitPublisher::new(runner.clone());

        publisher
            .save(&repo(Some(PublisherKind::Git)), Path::new("/tmp/foo_1.0_amd64.deb"))
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "git -C /srv/demo add --all",
                "git -C /srv/demo commit -m Add foo_1.0_amd64.deb.",
            ]
        );
    }

    #[test]
    fn test_sync_pushes_main() {
        let runner = Arc::new(ScriptedRunner::new());
        let publisher = publisher_for(&repo(Some(PublisherKind::Git)), runner.clone()).unwrap();

        publisher.sync(&repo(Some(PublisherKind::Git))).unwrap();

        assert_eq!(runner.command_lines(), vec!["git -C /srv/demo push origin main"]);
    }

    #[test]
    fn test_commit_failure_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "git",
            "commit",
            ToolOutput::failure(1, "nothing to commit, working tree clean"),
        ));
        let publisher = GitPublisher::new(runner);

        let err = publisher
            .save(&repo(Some(PublisherKind::Git)), Path::new("foo_1.0_amd64.deb"))
            .unwrap_err();
        assert!(matches!(err, RepoError::ToolFailed { .. }));
    }

    #[test]
    fn test_missing_publisher() {
        let err = publisher_for(&repo(None), Arc::new(ScriptedRunner::new()))
            .err()
            .unwrap();
        assert!(matches!(err, RepoError::NoPublisher { .. }));
    }
}
