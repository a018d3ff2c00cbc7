//! repokeeper repository management
//!
//! This crate keeps a registry of package repositories and drives the tools
//! that build them:
//!
//! - **Archive repositories**: Debian packages managed through aptly
//! - **Index repositories**: RPM packages laid out per architecture with
//!   createrepo_c metadata and a detached `repomd.xml` signature
//!
//! ## Key Features
//!
//! - **Single state file**: repositories and their package lists in
//!   `repokeeper.yaml`, rewritten atomically after every change
//! - **Sign before publish**: packages are probed and signed with the
//!   repository key before they reach the engine
//! - **Verified mirror import**: remote RPM repositories are imported only
//!   after the descriptor signature, the primary listing checksum and every
//!   package checksum have been checked
//! - **Git publishing**: optional commit and push of the published tree
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use repokeeper_repo::{Home, RepoManager, RepositoryKind};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut manager = RepoManager::open(Home::new(Home::default_root()?))?;
//!
//! manager.upsert_repository("demo", RepositoryKind::Archive, Path::new("/srv/demo"), "ABC123", None)?;
//! manager.add_package("demo", Path::new("foo_1.0_amd64.deb"))?;
//!
//! for package in manager.list_packages("demo")? {
//!     println!("{package}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - External programs get argument vectors, never a shell command line
//! - Mirror signature, checksum and path failures are never downgraded
//! - The RPM signer's `~/.rpmmacros` hint is removed on every exit path

pub mod error;
pub mod config;
pub mod state;
pub mod tool;
pub mod digest;
pub mod signing;
pub mod metadata;
pub mod http;
pub mod mirror;
pub mod backend;
pub mod archive;
pub mod index;
pub mod publisher;
pub mod registry;
pub mod manager;

// Re-exports for convenience
pub use error::{ErrorCategory, RepoError, Result};
pub use config::{HOME_ENV, Home, PublisherKind, Repository, RepositoryKind};
pub use state::{State, StateStore};
pub use tool::{Invocation, SystemRunner, ToolOutput, ToolRunner};
pub use signing::SignOutcome;
pub use backend::{Backend, MirrorRequest};
pub use archive::ArchiveBackend;
pub use index::IndexBackend;
pub use publisher::{GitPublisher, Publisher};
pub use registry::Registry;
pub use manager::{DependencyStatus, RepoManager};
