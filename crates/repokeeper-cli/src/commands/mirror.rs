//! Import-mirror command

use console::style;
use repokeeper_repo::{MirrorRequest, RepoManager};

use crate::error::Result;

pub async fn import(manager: &mut RepoManager, repo: &str, request: MirrorRequest) -> Result<()> {
    println!("Importing {} into {}...", request.url, style(repo).bold());

    let imported = manager.import_mirror(repo, &request).await?;
    for package in &imported {
        println!("  {} {}", style("✓").green(), package);
    }

    println!(
        "{} Imported {} package(s) into {}",
        style("✓").green().bold(),
        imported.len(),
        style(repo).bold()
    );
    Ok(())
}
