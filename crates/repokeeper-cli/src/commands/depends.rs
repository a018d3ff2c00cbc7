//! Check-depends command - report which external tools are installed

use console::style;
use repokeeper_repo::RepoManager;

use crate::error::Result;

pub fn run(manager: &RepoManager) -> Result<()> {
    for dep in manager.check_dependencies() {
        match dep.path {
            Some(path) => println!(
                "{} {:<14} {}",
                style("✓").green(),
                dep.program,
                style(path.display()).dim()
            ),
            None => println!(
                "{} {:<14} {}",
                style("✗").red(),
                dep.program,
                style("not found").red()
            ),
        }
    }
    Ok(())
}
