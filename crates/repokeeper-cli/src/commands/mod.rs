//! CLI commands

pub mod depends;
pub mod repo;
pub mod package;
pub mod publish;
pub mod mirror;
