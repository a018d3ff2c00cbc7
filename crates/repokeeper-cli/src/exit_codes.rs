//! Exit codes for CLI operations
//!
//! One code per error category so scripts can tell a bad invocation from a
//! failed tool or a rejected mirror.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure, unreadable remote metadata
pub const ERROR: i32 = 1;

/// Configuration error - unknown repository, kind mismatch, duplicate package
pub const CONFIGURATION_ERROR: i32 = 2;

/// External tool error - aptly, gpg, createrepo_c, git... failed or missing
pub const TOOL_ERROR: i32 = 3;

/// Integrity error - untrusted signature or checksum mismatch
pub const INTEGRITY_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Network error - remote fetch failed
pub const NETWORK_ERROR: i32 = 6;
