//! Verified mirror import for index repositories
//!
//! Nothing from the remote side is trusted until it is bound to the signed
//! `repomd.xml`:
//!
//! 1. fetch `repodata/repomd.xml` and `repodata/repomd.xml.asc`
//! 2. verify the detached signature with gpg
//! 3. read the primary listing's location and checksum from the descriptor
//! 4. fetch the primary listing and check it against that checksum
//! 5. decompress and parse it into a [`PackageHashMap`]
//! 6. fetch each package (reusing cached copies) and check its checksum
//! 7. copy each verified package into the architecture bucket
//!
//! Any failure aborts the import. Packages copied before the failure stay
//! where they are.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::digest::digest_matches;
use crate::error::{RepoError, Result};
use crate::http::MirrorClient;
use crate::metadata::{self, PackageHashMap, PackageLocation};
use crate::state::write_atomic;
use crate::tool::{Invocation, ToolRunner};

const REPOMD: &str = "repodata/repomd.xml";
const REPOMD_SIGNATURE: &str = "repodata/repomd.xml.asc";

/// One mirror import request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorDescriptor {
    pub source_url: String,
    pub architecture: String,
    /// Download cache for this source and architecture
    pub working_directory: PathBuf,
}

/// Outcome of a detached signature check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCheck {
    pub valid: bool,
    pub output: String,
}

/// Detached signature verification through gpg
pub struct GpgVerifier {
    runner: Arc<dyn ToolRunner>,
    keyring: Option<PathBuf>,
}

impl GpgVerifier {
    pub fn new(runner: Arc<dyn ToolRunner>, keyring: Option<PathBuf>) -> Self {
        Self { runner, keyring }
    }

    /// Verify `signature` over `document`.
    ///
    /// Only a `VALIDSIG` status line counts; a non-zero gpg exit is an invalid
    /// signature, not a tool failure.
    pub fn verify(&self, document: &Path, signature: &Path) -> Result<SignatureCheck> {
        let mut inv = Invocation::new("gpg").args(["--batch", "--status-fd", "1"]);
        if let Some(keyring) = &self.keyring {
            inv = inv.arg("--no-default-keyring").arg("--keyring").arg(keyring);
        }
        let inv = inv.arg("--verify").arg(signature).arg(document);

        let out = self.runner.run(&inv)?;
        let valid = out.is_success()
            && out
                .output
                .lines()
                .any(|line| line.starts_with("[GNUPG:] VALIDSIG "));

        Ok(SignatureCheck {
            valid,
            output: out.output,
        })
    }
}

/// Run the import pipeline, copying verified packages into `bucket`.
///
/// Returns the imported package locations in listing order.
pub async fn import(
    descriptor: &MirrorDescriptor,
    verifier: &GpgVerifier,
    bucket: &Path,
) -> Result<Vec<String>> {
    let client = MirrorClient::new(&descriptor.source_url, &descriptor.architecture)?;
    let workdir = &descriptor.working_directory;
    std::fs::create_dir_all(workdir.join("repodata"))?;

    tracing::info!(
        source = %descriptor.source_url,
        arch = %descriptor.architecture,
        "importing mirror"
    );

    let repomd = fetch_verified_descriptor(&client, verifier, workdir).await?;
    let packages = fetch_package_list(&client, workdir, &repomd).await?;

    tracing::info!(count = packages.len(), "primary listing verified");

    std::fs::create_dir_all(bucket)?;
    let mut imported = Vec::with_capacity(packages.len());
    for (hash, location) in packages.iter() {
        let local = fetch_package(&client, workdir, hash, location).await?;
        let name = file_name(&location.href)?;
        std::fs::copy(&local, bucket.join(name))?;
        imported.push(location.href.clone());
    }

    tracing::info!(count = imported.len(), "mirror import complete");
    Ok(imported)
}

/// Steps 1 and 2: the descriptor text, only once its signature verified
async fn fetch_verified_descriptor(
    client: &MirrorClient,
    verifier: &GpgVerifier,
    workdir: &Path,
) -> Result<String> {
    let repomd = client.get_bytes(REPOMD).await?;
    let signature = client.get_bytes(REPOMD_SIGNATURE).await?;

    let repomd_path = workdir.join(REPOMD);
    let signature_path = workdir.join(REPOMD_SIGNATURE);
    write_atomic(&repomd_path, &repomd)?;
    write_atomic(&signature_path, &signature)?;

    let check = verifier.verify(&repomd_path, &signature_path)?;
    if !check.valid {
        return Err(RepoError::UntrustedIndex {
            url: client.url_for(REPOMD)?.to_string(),
            output: check.output,
        });
    }

    String::from_utf8(repomd).map_err(|e| RepoError::InvalidMetadata {
        message: format!("repomd.xml is not valid UTF-8: {}", e),
    })
}

/// Steps 3 to 5
async fn fetch_package_list(
    client: &MirrorClient,
    workdir: &Path,
    repomd: &str,
) -> Result<PackageHashMap> {
    let primary = metadata::parse_repomd(repomd)?;
    check_location(&primary.href)?;

    let data = client.get_bytes(&primary.href).await?;
    let actual = primary.digest.algorithm.digest(&data);
    if !digest_matches(&primary.digest.value, &actual) {
        return Err(RepoError::HashMismatch {
            name: primary.href,
            expected: primary.digest.value,
            actual,
        });
    }
    write_atomic(
        &workdir.join("repodata").join(file_name(&primary.href)?),
        &data,
    )?;

    let xml = metadata::decompress(&primary.href, &data)?;
    metadata::parse_primary(&xml)
}

/// Step 6 for one package; returns the verified local copy
async fn fetch_package(
    client: &MirrorClient,
    workdir: &Path,
    hash: &str,
    location: &PackageLocation,
) -> Result<PathBuf> {
    check_location(&location.href)?;
    let local = workdir.join(file_name(&location.href)?);

    if local.exists() {
        tracing::debug!(package = %location.href, "using cached download");
    } else {
        let data = client.get_bytes(&location.href).await?;
        write_atomic(&local, &data)?;
    }

    let actual = location.algorithm.digest_file(&local)?;
    if !digest_matches(hash, &actual) {
        tracing::warn!(
            package = %location.href,
            "discarding download with unexpected checksum"
        );
        std::fs::remove_file(&local)?;
        return Err(RepoError::HashMismatch {
            name: location.href.clone(),
            expected: hash.to_string(),
            actual,
        });
    }

    Ok(local)
}

/// Reject locations that could escape the mirror or the cache directory
fn check_location(href: &str) -> Result<()> {
    let unsafe_href = href.is_empty()
        || href.starts_with('/')
        || href.contains('\\')
        || href.contains("://")
        || href.split('/').any(|seg| seg == ".." || seg == ".");
    if unsafe_href {
        return Err(RepoError::UnsafeLocation {
            href: href.to_string(),
        });
    }
    Ok(())
}

fn file_name(href: &str) -> Result<&str> {
    match href.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(RepoError::UnsafeLocation {
            href: href.to_string(),
        }),
    }
}
