//! Content digests used by repository metadata

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::error::{RepoError, Result};

/// Digest algorithm named by a `<checksum type="...">` element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Parse the `type` attribute value
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha" | "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            other => Err(RepoError::UnsupportedDigest {
                algorithm: other.to_string(),
            }),
        }
    }

    /// Length of the hex encoding
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        }
    }

    /// Lowercase hex digest of `data`
    pub fn digest(self, data: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }

    /// Lowercase hex digest of a file, read in chunks
    pub fn digest_file(self, path: &Path) -> Result<String> {
        let file = std::fs::File::open(path)?;
        match self {
            DigestAlgorithm::Sha1 => stream::<Sha1>(file),
            DigestAlgorithm::Sha256 => stream::<Sha256>(file),
            DigestAlgorithm::Sha512 => stream::<Sha512>(file),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha1 => f.write_str("sha1"),
            DigestAlgorithm::Sha256 => f.write_str("sha256"),
            DigestAlgorithm::Sha512 => f.write_str("sha512"),
        }
    }
}

fn stream<D: Digest>(mut reader: impl Read) -> Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare two hex digests ignoring case and surrounding whitespace
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_algorithm_names() {
        assert_eq!(DigestAlgorithm::parse("sha").unwrap(), DigestAlgorithm::Sha1);
        assert_eq!(DigestAlgorithm::parse("SHA256").unwrap(), DigestAlgorithm::Sha256);
        assert_eq!(DigestAlgorithm::parse("sha512").unwrap(), DigestAlgorithm::Sha512);
        assert!(matches!(
            DigestAlgorithm::parse("md5"),
            Err(RepoError::UnsupportedDigest { .. })
        ));
    }

    #[test]
    fn test_known_sha256() {
        assert_eq!(
            DigestAlgorithm::Sha256.digest(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hex_lengths() {
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(alg.digest(b"x").len(), alg.hex_len());
        }
    }

    #[test]
    fn test_file_digest_matches_memory_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(
            DigestAlgorithm::Sha512.digest_file(&path).unwrap(),
            DigestAlgorithm::Sha512.digest(&data)
        );
    }

    #[test]
    fn test_digest_matches() {
        assert!(digest_matches("ABCdef", "abcDEF"));
        assert!(digest_matches(" abc\n", "abc"));
        assert!(!digest_matches("cafebabe", "deadbeef"));
    }
}
