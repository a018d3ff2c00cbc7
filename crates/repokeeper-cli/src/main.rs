//! repokeeper CLI - signed apt and rpm repositories with verified mirror import

use clap::{Parser, Subcommand, ValueEnum};
use repokeeper_repo::{HOME_ENV, Home, MirrorRequest, PublisherKind, RepoManager, RepositoryKind};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "repokeeper")]
#[command(author = "repokeeper Contributors")]
#[command(version)]
#[command(about = "Manage signed apt and rpm repositories", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding repokeeper state [default: ~/.repokeeper]
    #[arg(long, global = true, env = HOME_ENV)]
    home: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

/// Repository type as given on the command line
#[derive(Clone, Copy, Debug, ValueEnum)]
enum RepoType {
    #[value(alias = "archive")]
    Deb,
    #[value(alias = "index")]
    Rpm,
}

impl From<RepoType> for RepositoryKind {
    fn from(t: RepoType) -> Self {
        match t {
            RepoType::Deb => RepositoryKind::Archive,
            RepoType::Rpm => RepositoryKind::Index,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PublisherType {
    Git,
}

impl From<PublisherType> for PublisherKind {
    fn from(t: PublisherType) -> Self {
        match t {
            PublisherType::Git => PublisherKind::Git,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the external tools are installed
    CheckDepends,

    /// Create a repository or update an existing one
    UpsertRepo {
        /// Repository name
        #[arg(short, long)]
        name: String,

        /// Repository type; fixed once created
        #[arg(short = 't', long = "type", value_enum)]
        repo_type: RepoType,

        /// Directory the repository is published to
        #[arg(short, long)]
        path: PathBuf,

        /// GPG key id used for signing
        #[arg(short = 'k', long = "key")]
        key: String,

        /// Remote sync target
        #[arg(long, value_enum)]
        publisher: Option<PublisherType>,
    },

    /// List configured repositories
    List,

    /// Sign and add a package
    AddPkg {
        /// Repository name
        #[arg(short, long)]
        repo: String,

        /// Package file
        #[arg(short, long)]
        package: PathBuf,
    },

    /// Remove a package
    RemovePkg {
        /// Repository name
        #[arg(short, long)]
        repo: String,

        /// Package file or file name
        #[arg(short, long)]
        package: PathBuf,
    },

    /// List the packages recorded for a repository
    ListPkgs {
        /// Repository name
        #[arg(short, long)]
        repo: String,
    },

    /// Show a package's signature status
    CheckSig {
        /// Package file
        #[arg(short, long)]
        package: PathBuf,

        /// Print the verifier output even when it reports a failure
        #[arg(long)]
        best_effort: bool,
    },

    /// Re-read the package list from the repository engine
    RebuildPkgList {
        /// Repository name
        #[arg(short, long)]
        repo: String,
    },

    /// Push the repository through its publisher
    Sync {
        /// Repository name
        #[arg(short, long)]
        repo: String,
    },

    /// Publish the repository again
    Export {
        /// Repository name
        #[arg(short, long)]
        repo: String,
    },

    /// Import packages from a remote repository
    ImportMirror {
        /// Repository name
        #[arg(short, long)]
        repo: String,

        /// Base URL of the remote repository
        #[arg(long)]
        url: String,

        /// Architecture to mirror (required for rpm repositories)
        #[arg(long)]
        arch: Option<String>,

        /// Keyring holding the remote signing key
        #[arg(long)]
        keyring: Option<PathBuf>,
    },
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_manager(home: Option<PathBuf>) -> Result<RepoManager> {
    let root = match home {
        Some(root) => root,
        None => Home::default_root()?,
    };
    tracing::debug!(home = %root.display(), "opening repokeeper home");
    Ok(RepoManager::open(Home::new(root))?)
}

async fn run(cli: Cli) -> Result<()> {
    let mut manager = open_manager(cli.home)?;

    match cli.command {
        Commands::CheckDepends => commands::depends::run(&manager),

        Commands::UpsertRepo {
            name,
            repo_type,
            path,
            key,
            publisher,
        } => commands::repo::upsert(
            &mut manager,
            &name,
            repo_type.into(),
            &path,
            &key,
            publisher.map(Into::into),
        ),

        Commands::List => commands::repo::list(&manager),

        Commands::AddPkg { repo, package } => {
            commands::package::add(&mut manager, &repo, &package)
        }

        Commands::RemovePkg { repo, package } => {
            commands::package::remove(&mut manager, &repo, &package)
        }

        Commands::ListPkgs { repo } => commands::package::list(&manager, &repo),

        Commands::CheckSig {
            package,
            best_effort,
        } => commands::package::check_signature(&manager, &package, best_effort),

        Commands::RebuildPkgList { repo } => commands::package::rebuild(&mut manager, &repo),

        Commands::Sync { repo } => commands::publish::sync(&manager, &repo),

        Commands::Export { repo } => commands::publish::export(&mut manager, &repo),

        Commands::ImportMirror {
            repo,
            url,
            arch,
            keyring,
        } => {
            let request = MirrorRequest {
                url,
                architecture: arch,
                keyring,
            };
            commands::mirror::import(&mut manager, &repo, request).await
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_logging(cli.debug);

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => report(err),
    };
    std::process::exit(code);
}

fn report(err: CliError) -> i32 {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    code
}
