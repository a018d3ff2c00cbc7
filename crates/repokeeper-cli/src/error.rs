//! CLI error types with exit code handling
//!
//! Library errors are grouped by category; each category gets its own
//! diagnostic code and exit code.

use miette::Diagnostic;
use repokeeper_repo::{ErrorCategory, RepoError};
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid invocation or repository configuration
    #[error("{message}")]
    #[diagnostic(code(repokeeper::cli::configuration))]
    Configuration {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// An external program failed; its output is surfaced as-is
    #[error("{message}")]
    #[diagnostic(code(repokeeper::cli::tool))]
    Tool {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Signature or checksum verification failed
    #[error("{message}")]
    #[diagnostic(code(repokeeper::cli::integrity))]
    Integrity { message: String },

    /// Remote fetch failed
    #[error("{message}")]
    #[diagnostic(code(repokeeper::cli::network))]
    Network { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("{message}")]
    #[diagnostic(code(repokeeper::cli::io))]
    Io { message: String },

    /// Anything else
    #[error("{message}")]
    #[diagnostic(code(repokeeper::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Configuration { .. } => exit_codes::CONFIGURATION_ERROR,
            CliError::Tool { .. } => exit_codes::TOOL_ERROR,
            CliError::Integrity { .. } => exit_codes::INTEGRITY_ERROR,
            CliError::Network { .. } => exit_codes::NETWORK_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }
}

fn help_for(err: &RepoError) -> Option<String> {
    match err {
        RepoError::UnknownRepository { .. } => {
            Some("Run 'repokeeper list' to see configured repositories".to_string())
        }
        RepoError::KindMismatch { .. } => {
            Some("A repository keeps the type it was created with".to_string())
        }
        RepoError::MissingArchitecture { .. } => {
            Some("Pass --arch for rpm repositories".to_string())
        }
        RepoError::MissingKeyring { .. } => {
            Some("Pass --keyring with the remote repository's public key".to_string())
        }
        RepoError::NoPublisher { .. } => {
            Some("Set one with 'repokeeper upsert-repo ... --publisher git'".to_string())
        }
        RepoError::ToolUnavailable { .. } => {
            Some("Run 'repokeeper check-depends' to see which tools are installed".to_string())
        }
        _ => None,
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let help = help_for(&err);
        let message = err.to_string();
        match err.category() {
            ErrorCategory::Configuration => CliError::Configuration { message, help },
            ErrorCategory::ExternalTool => CliError::Tool { message, help },
            ErrorCategory::Integrity => CliError::Integrity { message },
            ErrorCategory::Network => CliError::Network { message },
            ErrorCategory::Io => CliError::Io { message },
            ErrorCategory::Metadata => CliError::Other { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
