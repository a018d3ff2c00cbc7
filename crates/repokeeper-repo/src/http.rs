//! HTTP access to remote repositories
//!
//! Only plain GETs are needed: metadata documents, the detached signature and
//! package files, all below `<source_url>/<architecture>/`.

use url::Url;

use crate::error::{RepoError, Result};

/// HTTP client for mirror sources
pub struct MirrorClient {
    client: reqwest::Client,
    base: Url,
}

impl MirrorClient {
    /// Client rooted at `<source_url>/<architecture>/`
    pub fn new(source_url: &str, architecture: &str) -> Result<Self> {
        let mut base = Url::parse(source_url.trim_end_matches('/'))?;
        if base.cannot_be_a_base() {
            return Err(RepoError::InvalidConfig {
                message: format!("{} cannot be used as a mirror source", source_url),
            });
        }
        base.path_segments_mut()
            .map_err(|_| RepoError::InvalidConfig {
                message: format!("{} cannot be used as a mirror source", source_url),
            })?
            .pop_if_empty()
            .push(architecture)
            .push("");

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client, base })
    }

    /// Absolute URL of a path relative to the architecture directory
    pub fn url_for(&self, relative: &str) -> Result<Url> {
        Ok(self.base.join(relative)?)
    }

    /// Fetch a relative path, failing on any non-success status
    pub async fn get_bytes(&self, relative: &str) -> Result<Vec<u8>> {
        let url = self.url_for(relative)?;
        tracing::debug!(%url, "GET");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("Request to {} failed", url),
            });
        }

        let bytes = response.bytes().await.map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
