//! Error types for repository operations

use std::path::PathBuf;

use thiserror::Error;

/// Broad classification used by the CLI to pick an exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid or missing repository, kind mismatch, duplicate package
    Configuration,
    /// A wrapped external program failed or is missing
    ExternalTool,
    /// Signature or hash verification failed
    Integrity,
    /// Remote fetch failed
    Network,
    /// Remote metadata could not be understood
    Metadata,
    /// Local filesystem or serialization failure
    Io,
}

/// Repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Repository not found: {name}")]
    UnknownRepository { name: String },

    #[error("Unable to change type for {name} repository: it is {existing}, not {requested}")]
    KindMismatch {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Package {filename} is already present in repository {repo}")]
    DuplicatePackage { repo: String, filename: String },

    #[error("Package {filename} is not a {expected} package (repository {repo})")]
    PackageKindMismatch {
        repo: String,
        filename: String,
        expected: String,
    },

    #[error("Cannot derive package identity from file name: {filename}")]
    InvalidPackageName { filename: String },

    #[error("An architecture is required to mirror {url}")]
    MissingArchitecture { url: String },

    #[error("A keyring file is required to mirror {url}")]
    MissingKeyring { url: String },

    #[error("Repository {name} has no publisher configured")]
    NoPublisher { name: String },

    #[error("Package file not found: {}", path.display())]
    PackageNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ============ External Tool Errors ============
    #[error("{program} {args} failed ({status}):\n{output}")]
    ToolFailed {
        program: String,
        args: String,
        status: String,
        output: String,
    },

    #[error("Unable to run {program}: {message}")]
    ToolUnavailable { program: String, message: String },

    // ============ Integrity Errors ============
    #[error("Signature verification failed for {url}:\n{output}")]
    UntrustedIndex { url: String, output: String },

    #[error("Hash mismatch for {name}: expected {expected}, got {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Refusing unsafe package location: {href}")]
    UnsafeLocation { href: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    // ============ Metadata Errors ============
    #[error("Invalid repository metadata: {message}")]
    InvalidMetadata { message: String },

    #[error("Unsupported digest algorithm: {algorithm}")]
    UnsupportedDigest { algorithm: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            RepoError::UnknownRepository { .. }
            | RepoError::KindMismatch { .. }
            | RepoError::DuplicatePackage { .. }
            | RepoError::PackageKindMismatch { .. }
            | RepoError::InvalidPackageName { .. }
            | RepoError::MissingArchitecture { .. }
            | RepoError::MissingKeyring { .. }
            | RepoError::NoPublisher { .. }
            | RepoError::PackageNotFound { .. }
            | RepoError::InvalidConfig { .. } => ErrorCategory::Configuration,

            RepoError::ToolFailed { .. } | RepoError::ToolUnavailable { .. } => {
                ErrorCategory::ExternalTool
            }

            RepoError::UntrustedIndex { .. }
            | RepoError::HashMismatch { .. }
            | RepoError::UnsafeLocation { .. } => ErrorCategory::Integrity,

            RepoError::HttpError { .. } | RepoError::NetworkError { .. } => ErrorCategory::Network,

            RepoError::InvalidMetadata { .. } | RepoError::UnsupportedDigest { .. } => {
                ErrorCategory::Metadata
            }

            RepoError::Io(_) | RepoError::Serialization(_) => ErrorCategory::Io,
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<quick_xml::DeError> for RepoError {
    fn from(e: quick_xml::DeError) -> Self {
        RepoError::InvalidMetadata {
            message: e.to_string(),
        }
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidConfig {
            message: format!("Invalid URL: {}", e),
        }
    }
}

impl From<walkdir::Error> for RepoError {
    fn from(e: walkdir::Error) -> Self {
        match e.into_io_error() {
            Some(io) => RepoError::Io(io),
            None => RepoError::Io(std::io::Error::other("filesystem loop detected")),
        }
    }
}

impl From<tempfile::PersistError> for RepoError {
    fn from(e: tempfile::PersistError) -> Self {
        RepoError::Io(e.error)
    }
}
