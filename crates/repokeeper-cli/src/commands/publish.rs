//! Sync and export commands

use console::style;
use repokeeper_repo::RepoManager;

use crate::error::Result;

/// Push the repository through its publisher
pub fn sync(manager: &RepoManager, repo: &str) -> Result<()> {
    manager.sync(repo)?;
    println!("{} Synced {}", style("✓").green().bold(), style(repo).bold());
    Ok(())
}

/// Re-publish the repository without changing its contents
pub fn export(manager: &mut RepoManager, repo: &str) -> Result<()> {
    manager.export(repo)?;
    println!("{} Exported {}", style("✓").green().bold(), style(repo).bold());
    Ok(())
}
