//! RPM repository metadata
//!
//! Parses the two documents the mirror pipeline needs: `repomd.xml`, which
//! names the primary listing and its checksum, and the primary listing
//! itself, which gives every package's checksum and relative location.

use indexmap::IndexMap;
use serde::Deserialize;
use std::io::Read;

use crate::digest::DigestAlgorithm;
use crate::error::{RepoError, Result};

#[derive(Debug, Deserialize)]
struct RepoMdDocument {
    #[serde(rename = "data", default)]
    data: Vec<RepoMdData>,
}

#[derive(Debug, Deserialize)]
struct RepoMdData {
    #[serde(rename = "@type")]
    kind: String,
    checksum: ChecksumElement,
    location: LocationElement,
}

#[derive(Debug, Deserialize)]
struct ChecksumElement {
    #[serde(rename = "@type")]
    algorithm: String,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct LocationElement {
    #[serde(rename = "@href")]
    href: String,
}

#[derive(Debug, Deserialize)]
struct PrimaryDocument {
    #[serde(rename = "package", default)]
    packages: Vec<PrimaryPackage>,
}

#[derive(Debug, Deserialize)]
struct PrimaryPackage {
    checksum: ChecksumElement,
    location: LocationElement,
}

/// A checksum declared by metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDigest {
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex
    pub value: String,
}

impl DeclaredDigest {
    fn from_element(element: &ChecksumElement, context: &str) -> Result<Self> {
        let algorithm = DigestAlgorithm::parse(&element.algorithm)?;
        let value = element.value.trim().to_ascii_lowercase();
        if value.len() != algorithm.hex_len() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RepoError::InvalidMetadata {
                message: format!("malformed {} checksum for {}", algorithm, context),
            });
        }
        Ok(Self { algorithm, value })
    }
}

/// The primary listing reference from `repomd.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryReference {
    pub digest: DeclaredDigest,
    /// Relative to the architecture directory, e.g. `repodata/<hash>-primary.xml.gz`
    pub href: String,
}

/// Find the primary listing in a verified `repomd.xml`
pub fn parse_repomd(xml: &str) -> Result<PrimaryReference> {
    let doc: RepoMdDocument = quick_xml::de::from_str(xml)?;
    let data = doc
        .data
        .iter()
        .find(|d| d.kind == "primary")
        .ok_or_else(|| RepoError::InvalidMetadata {
            message: "repomd.xml has no primary data entry".to_string(),
        })?;

    Ok(PrimaryReference {
        digest: DeclaredDigest::from_element(&data.checksum, &data.location.href)?,
        href: data.location.href.clone(),
    })
}

/// Where a package lives and which algorithm its hash uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLocation {
    pub algorithm: DigestAlgorithm,
    pub href: String,
}

/// Package content hash to location, in listing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageHashMap {
    entries: IndexMap<String, PackageLocation>,
}

impl PackageHashMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, hash: &str) -> Option<&PackageLocation> {
        self.entries.get(&hash.to_ascii_lowercase())
    }

    /// `(hash, location)` pairs in listing order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PackageLocation)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Build the package hash map from a decompressed primary listing
pub fn parse_primary(xml: &str) -> Result<PackageHashMap> {
    let doc: PrimaryDocument = quick_xml::de::from_str(xml)?;
    let mut entries = IndexMap::with_capacity(doc.packages.len());

    for pkg in &doc.packages {
        let digest = DeclaredDigest::from_element(&pkg.checksum, &pkg.location.href)?;
        entries.entry(digest.value).or_insert(PackageLocation {
            algorithm: digest.algorithm,
            href: pkg.location.href.clone(),
        });
    }

    Ok(PackageHashMap { entries })
}

/// Decompress a metadata file according to its location suffix
pub fn decompress(href: &str, data: &[u8]) -> Result<String> {
    let bytes = if href.ends_with(".gz") {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
        out
    } else if href.ends_with(".zst") {
        zstd::stream::decode_all(data)?
    } else if href.ends_with(".xml") {
        data.to_vec()
    } else {
        return Err(RepoError::InvalidMetadata {
            message: format!("unsupported metadata compression: {}", href),
        });
    };

    String::from_utf8(bytes).map_err(|e| RepoError::InvalidMetadata {
        message: format!("{} is not valid UTF-8: {}", href, e),
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HASH_B: &str = "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";

    #[test]
    fn test_parse_repomd_finds_primary() {
        let xml = fixtures::repomd(HASH_A, "repodata/abc-primary.xml.gz");
        let primary = parse_repomd(&xml).unwrap();

        assert_eq!(primary.href, "repodata/abc-primary.xml.gz");
        assert_eq!(primary.digest.algorithm, DigestAlgorithm::Sha256);
        assert_eq!(primary.digest.value, HASH_A);
    }

    #[test]
    fn test_parse_repomd_without_primary() {
        let xml = r#"<repomd><revision>1</revision>
            <data type="other"><checksum type="sha256">x</checksum><location href="o.xml"/></data>
            </repomd>"#;
        assert!(matches!(
            parse_repomd(xml),
            Err(RepoError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn test_parse_repomd_rejects_malformed_checksum() {
        let xml = fixtures::repomd("cafebabe", "repodata/primary.xml.gz");
        assert!(matches!(
            parse_repomd(&xml),
            Err(RepoError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn test_parse_primary_preserves_order_and_lowercases() {
        let xml = fixtures::primary(&[
            ("zeta", HASH_B, "Packages/z/zeta-1.0-1.x86_64.rpm"),
            ("alpha", HASH_A, "Packages/a/alpha-1.0-1.x86_64.rpm"),
        ]);
        let map = parse_primary(&xml).unwrap();

        let hrefs: Vec<_> = map.iter().map(|(_, loc)| loc.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec![
                "Packages/z/zeta-1.0-1.x86_64.rpm",
                "Packages/a/alpha-1.0-1.x86_64.rpm"
            ]
        );
        assert!(map.get(&HASH_B.to_ascii_lowercase()).is_some());
        assert!(map.iter().all(|(hash, _)| hash == hash.to_ascii_lowercase()));
    }

    #[test]
    fn test_parse_empty_primary() {
        let map = parse_primary(&fixtures::primary(&[])).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_decompress_variants() {
        let xml = "<metadata packages=\"0\"></metadata>";

        let gz = fixtures::gzip(xml.as_bytes());
        assert_eq!(decompress("repodata/p-primary.xml.gz", &gz).unwrap(), xml);

        let zst = zstd::stream::encode_all(xml.as_bytes(), 0).unwrap();
        assert_eq!(decompress("repodata/p-primary.xml.zst", &zst).unwrap(), xml);

        assert_eq!(decompress("repodata/primary.xml", xml.as_bytes()).unwrap(), xml);

        assert!(matches!(
            decompress("repodata/p-primary.xml.xz", b"whatever"),
            Err(RepoError::InvalidMetadata { .. })
        ));
    }
}
