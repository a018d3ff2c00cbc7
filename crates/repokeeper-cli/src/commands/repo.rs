//! Repository management commands

use console::style;
use repokeeper_repo::{PublisherKind, RepoManager, RepositoryKind};
use std::path::Path;

use crate::error::Result;

/// Create a repository or update its path, key and publisher
pub fn upsert(
    manager: &mut RepoManager,
    name: &str,
    kind: RepositoryKind,
    path: &Path,
    signing_key_id: &str,
    publisher: Option<PublisherKind>,
) -> Result<()> {
    let repo = manager.upsert_repository(name, kind, path, signing_key_id, publisher)?;
    println!(
        "{} repository {} at {}",
        style(repo.kind).cyan(),
        style(&repo.name).bold(),
        repo.path.display()
    );
    Ok(())
}

/// List configured repositories
pub fn list(manager: &RepoManager) -> Result<()> {
    let repos = manager.list_repositories();

    if repos.is_empty() {
        println!("No repositories configured.");
        println!();
        println!("Add one with: repokeeper upsert-repo -n <name> -t <deb|rpm> -p <path> -k <key>");
        return Ok(());
    }

    println!(
        "{:<20} {:<8} {:<18} {:<10} {}",
        style("NAME").bold(),
        style("TYPE").bold(),
        style("KEY").bold(),
        style("PUBLISHER").bold(),
        style("PATH").bold()
    );

    for repo in repos {
        let publisher = repo
            .publisher
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<8} {:<18} {:<10} {}",
            repo.name,
            repo.kind.package_extension(),
            repo.signing_key_id,
            publisher,
            repo.path.display()
        );
    }

    Ok(())
}
