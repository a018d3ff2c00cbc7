//! Package signing
//!
//! Probes a package for an existing signature and signs it with the
//! repository key when there is none. Deb packages are signed in place with
//! dpkg-sig. RPM signing reads the signer identity from `%_gpg_name` in
//! `~/.rpmmacros`, so that file is written for the duration of the rpmsign
//! call and removed afterwards by [`MacroFileGuard`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{RepoError, Result};
use crate::tool::{Invocation, ToolOutput, ToolRunner, run_checked};

/// Result of [`PackageSigner::sign`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    /// The package carried a valid signature; nothing was done
    AlreadySigned { summary: String },
    /// The package was signed with the given key
    Signed { key_id: String },
}

/// Signature probe and signer for one package format
pub trait PackageSigner: Send + Sync {
    /// Run the signature verifier.
    ///
    /// With `best_effort` a failing verifier still returns its output.
    fn check(&self, artifact: &Path, best_effort: bool) -> Result<String>;

    /// Sign `artifact` with `key_id` unless it is already signed
    fn sign(&self, key_id: &str, artifact: &Path) -> Result<SignOutcome>;
}

fn signature_check(
    runner: &dyn ToolRunner,
    invocation: Invocation,
    best_effort: bool,
) -> Result<String> {
    let out = runner.run(&invocation)?;
    if out.is_success() || best_effort {
        return Ok(out.output);
    }
    Err(RepoError::ToolFailed {
        program: invocation.program.clone(),
        args: invocation.display_args(),
        status: format!("exit status: {}", out.code.unwrap_or(-1)),
        output: out.output,
    })
}

// ============ Deb ============

/// dpkg-sig based signer
pub struct DebSigner {
    runner: Arc<dyn ToolRunner>,
}

impl DebSigner {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }
}

/// dpkg-sig ends its verify output with `NOSIG` for unsigned packages
fn deb_is_unsigned(output: &str) -> bool {
    output.trim_end().ends_with("NOSIG")
}

impl PackageSigner for DebSigner {
    fn check(&self, artifact: &Path, best_effort: bool) -> Result<String> {
        let inv = Invocation::new("dpkg-sig").arg("--verify").arg(artifact);
        signature_check(self.runner.as_ref(), inv, best_effort)
    }

    fn sign(&self, key_id: &str, artifact: &Path) -> Result<SignOutcome> {
        let probe = self.check(artifact, true)?;
        if !deb_is_unsigned(&probe) {
            let summary = probe.split_whitespace().next().unwrap_or_default().to_string();
            tracing::info!(package = %artifact.display(), %summary, "package already signed");
            return Ok(SignOutcome::AlreadySigned { summary });
        }

        let inv = Invocation::new("dpkg-sig")
            .arg("-k")
            .arg(key_id)
            .arg("-s")
            .arg("builder")
            .arg(artifact);
        run_checked(self.runner.as_ref(), &inv)?;

        Ok(SignOutcome::Signed {
            key_id: key_id.to_string(),
        })
    }
}

// ============ RPM ============

/// rpmsign based signer
pub struct RpmSigner {
    runner: Arc<dyn ToolRunner>,
    macros_path: PathBuf,
}

impl RpmSigner {
    /// Signer writing its identity hint to `~/.rpmmacros`
    pub fn new(runner: Arc<dyn ToolRunner>) -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine home directory".to_string(),
        })?;
        Ok(Self::with_macros_path(runner, home.join(".rpmmacros")))
    }

    pub fn with_macros_path(runner: Arc<dyn ToolRunner>, macros_path: PathBuf) -> Self {
        Self {
            runner,
            macros_path,
        }
    }

    /// First user id of `key_id` as reported by gpg
    fn key_uid(&self, key_id: &str) -> Result<String> {
        let inv = Invocation::new("gpg")
            .args(["--batch", "--with-colons", "--list-keys"])
            .arg(key_id);
        let out = run_checked(self.runner.as_ref(), &inv)?;
        parse_uid(&out).ok_or_else(|| RepoError::InvalidConfig {
            message: format!("No user id found for key {}", key_id),
        })
    }
}

/// `uid` records carry the user id in field 10
fn parse_uid(out: &ToolOutput) -> Option<String> {
    out.output
        .lines()
        .filter(|line| line.starts_with("uid:"))
        .find_map(|line| line.split(':').nth(9))
        .map(|uid| uid.replace("\\x3a", ":"))
        .filter(|uid| !uid.is_empty())
}

/// `rpm -K` mentions the signature only when one is present.
///
/// Each line reads `<artifact>: <status>`; only the status is classified.
fn rpm_is_signed(artifact: &Path, output: &str) -> bool {
    let prefix = format!("{}:", artifact.display());
    output.lines().any(|line| {
        let status = match line.strip_prefix(prefix.as_str()) {
            Some(status) => status,
            None => line.rsplit_once(": ").map_or(line, |(_, status)| status),
        };
        let status = status.to_ascii_lowercase();
        let tokens: Vec<&str> = status
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let ok = tokens.last() == Some(&"ok") && !tokens.contains(&"not");
        ok && tokens
            .iter()
            .any(|t| matches!(*t, "signatures" | "pgp" | "gpg" | "rsa" | "dsa"))
    })
}

impl PackageSigner for RpmSigner {
    fn check(&self, artifact: &Path, best_effort: bool) -> Result<String> {
        let inv = Invocation::new("rpm").arg("-K").arg(artifact);
        signature_check(self.runner.as_ref(), inv, best_effort)
    }

    fn sign(&self, key_id: &str, artifact: &Path) -> Result<SignOutcome> {
        let probe = self.check(artifact, true)?;
        if rpm_is_signed(artifact, &probe) {
            let summary = probe.lines().next().unwrap_or_default().trim().to_string();
            tracing::info!(package = %artifact.display(), %summary, "package already signed");
            return Ok(SignOutcome::AlreadySigned { summary });
        }

        let uid = self.key_uid(key_id)?;
        let _hint = MacroFileGuard::write(&self.macros_path, &format!("%_gpg_name {}\n", uid))?;

        let inv = Invocation::new("rpmsign").arg("--addsign").arg(artifact);
        run_checked(self.runner.as_ref(), &inv)?;

        Ok(SignOutcome::Signed {
            key_id: key_id.to_string(),
        })
    }
}

/// Temporarily replaces a file; restores or removes it on drop
pub struct MacroFileGuard {
    path: PathBuf,
    previous: Option<Vec<u8>>,
}

impl MacroFileGuard {
    pub fn write(path: &Path, content: &str) -> Result<Self> {
        let previous = match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let guard = Self {
            path: path.to_path_buf(),
            previous,
        };
        std::fs::write(path, content)?;
        Ok(guard)
    }
}

impl Drop for MacroFileGuard {
    fn drop(&mut self) {
        let restored = match self.previous.take() {
            Some(bytes) => std::fs::write(&self.path, bytes),
            None => std::fs::remove_file(&self.path),
        };
        if let Err(e) = restored {
            tracing::warn!("Failed to clean up {}: {}", self.path.display(), e);
        }
    }
}
