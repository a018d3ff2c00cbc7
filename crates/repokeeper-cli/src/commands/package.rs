//! Package commands

use console::style;
use repokeeper_repo::{RepoManager, SignOutcome};
use std::path::Path;

use crate::error::Result;

pub fn add(manager: &mut RepoManager, repo: &str, package: &Path) -> Result<()> {
    match manager.add_package(repo, package)? {
        SignOutcome::AlreadySigned { summary } => {
            println!("  {} already signed ({})", style("•").dim(), summary)
        }
        SignOutcome::Signed { key_id } => {
            println!("  {} signed with {}", style("✓").green(), key_id)
        }
    }
    println!(
        "{} Added {} to {}",
        style("✓").green().bold(),
        package.display(),
        style(repo).bold()
    );
    Ok(())
}

pub fn remove(manager: &mut RepoManager, repo: &str, package: &Path) -> Result<()> {
    manager.remove_package(repo, package)?;
    println!(
        "{} Removed {} from {}",
        style("✓").green().bold(),
        package.display(),
        style(repo).bold()
    );
    Ok(())
}

/// Print the stored package list, one file name per line
pub fn list(manager: &RepoManager, repo: &str) -> Result<()> {
    for package in manager.list_packages(repo)? {
        println!("{}", package);
    }
    Ok(())
}

pub fn check_signature(manager: &RepoManager, package: &Path, best_effort: bool) -> Result<()> {
    let output = manager.check_signature(package, best_effort)?;
    print!("{}", output);
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

pub fn rebuild(manager: &mut RepoManager, repo: &str) -> Result<()> {
    let packages = manager.rebuild_package_list(repo)?;
    println!(
        "{} {} now lists {} package(s)",
        style("✓").green().bold(),
        style(repo).bold(),
        packages.len()
    );
    Ok(())
}
