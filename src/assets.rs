use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;

/// Scoped handle to a downloaded file. The file is removed when the handle is
/// dropped, on success and failure paths alike; removal errors are logged and
/// swallowed.
#[derive(Debug)]
pub struct TempAsset {
    path: PathBuf,
}

impl TempAsset {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAsset {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("could not remove temp asset {}: {}", self.path.display(), e);
        }
    }
}

fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let suffix: u32 = rand::thread_rng().gen();
    dir.join(format!("{}-{:08x}.img", stem, suffix))
}

pub async fn write_temp(dir: &Path, stem: &str, bytes: &[u8]) -> Result<TempAsset> {
    let path = unique_path(dir, stem);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(TempAsset { path })
}

/// Raw image download collaborator, behind a trait so the pipeline can be
/// driven without a network.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetching {}", url))?;
        if !resp.status().is_success() {
            anyhow::bail!("download of {} returned {}", url, resp.status());
        }
        Ok(resp
            .bytes()
            .await
            .with_context(|| format!("reading body of {}", url))?
            .to_vec())
    }
}

/// Fetch a URL and stash the body under `dir` with a unique name.
pub async fn download_to_temp(
    fetcher: &dyn MediaFetcher,
    url: &str,
    dir: &Path,
    stem: &str,
) -> Result<TempAsset> {
    let bytes = fetcher.fetch(url).await?;
    write_temp(dir, stem, &bytes).await
}

/// Chat-photo collaborator. Passed in explicitly so the pipeline never touches
/// a process-wide bot handle.
#[async_trait]
pub trait AvatarSource: Send + Sync {
    /// Latest profile photo of the given user, `None` when the user has none.
    async fn user_photo(&self, user_id: &str) -> Result<Option<Vec<u8>>>;

    /// The bot's own profile photo, used when the requester has none.
    async fn self_photo(&self) -> Result<Vec<u8>>;
}

pub struct HttpAvatarSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAvatarSource {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn photo_at(&self, segment: &str) -> Result<reqwest::Response> {
        let url = format!("{}/{}/photo", self.base_url.trim_end_matches('/'), segment);
        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("fetching {}", url))
    }
}

#[async_trait]
impl AvatarSource for HttpAvatarSource {
    async fn user_photo(&self, user_id: &str) -> Result<Option<Vec<u8>>> {
        let resp = self.photo_at(user_id).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("avatar service returned {} for {}", resp.status(), user_id);
        }
        Ok(Some(resp.bytes().await.context("reading avatar body")?.to_vec()))
    }

    async fn self_photo(&self) -> Result<Vec<u8>> {
        let resp = self.photo_at("me").await?;
        if !resp.status().is_success() {
            anyhow::bail!("avatar service returned {} for own photo", resp.status());
        }
        Ok(resp.bytes().await.context("reading avatar body")?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn temp_asset_is_deleted_on_drop() {
        let dir = std::env::temp_dir();
        let asset = write_temp(&dir, "nowplaying-test", b"payload").await.unwrap();
        let path = asset.path().to_path_buf();
        assert!(path.is_file());

        drop(asset);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn temp_assets_get_unique_names() {
        let dir = std::env::temp_dir();
        let a = write_temp(&dir, "nowplaying-test", b"a").await.unwrap();
        let b = write_temp(&dir, "nowplaying-test", b"b").await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn dropping_a_missing_file_is_silent() {
        let asset = TempAsset {
            path: std::env::temp_dir().join("nowplaying-never-created.img"),
        };
        drop(asset);
    }
}
