use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbaImage;

use crate::assets::{self, AvatarSource, MediaFetcher};
use crate::config::Config;
use crate::metadata::{VideoMetadata, VideoSearch};
use crate::render::{self, FontSet};

/// Sequential fetch-then-draw pipeline behind a disk cache keyed by
/// `(video id, requester id)`.
///
/// Concurrent calls for the same cold key are not deduplicated: both run the
/// full pipeline and race to write the same output path, last writer wins.
/// The output is idempotent for a given key, so this is acceptable.
pub struct Generator {
    fetcher: Box<dyn MediaFetcher>,
    config: Config,
    search: Box<dyn VideoSearch>,
    avatars: Box<dyn AvatarSource>,
}

impl Generator {
    pub fn new(
        fetcher: Box<dyn MediaFetcher>,
        config: Config,
        search: Box<dyn VideoSearch>,
        avatars: Box<dyn AvatarSource>,
    ) -> Self {
        Self {
            fetcher,
            config,
            search,
            avatars,
        }
    }

    /// Returns the path of the generated PNG, or the configured fallback URL
    /// when anything along the pipeline fails. Failure causes are only
    /// distinguishable from the logs.
    pub async fn get_thumb(&self, video_id: &str, requester_id: Option<&str>) -> String {
        let out = self.output_path(video_id, requester_id);
        if out.is_file() {
            debug!("cache hit for {}", out.display());
            return out.to_string_lossy().into_owned();
        }

        match self.build(video_id, requester_id, &out).await {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                error!("thumbnail generation for {} failed: {:#}", video_id, e);
                self.config.fallback_url.clone()
            }
        }
    }

    fn output_path(&self, video_id: &str, requester_id: Option<&str>) -> PathBuf {
        let name = match requester_id {
            Some(user) => format!("{}_{}.png", video_id, user),
            None => format!("{}_plain.png", video_id),
        };
        self.config.cache_dir.join(name)
    }

    async fn build(
        &self,
        video_id: &str,
        requester_id: Option<&str>,
        out: &Path,
    ) -> Result<PathBuf> {
        let hit = self.search.lookup(video_id).await?;
        let meta = VideoMetadata::from_hit(&hit);
        let thumb_url = meta
            .thumbnail_url
            .as_deref()
            .context("search result had no thumbnail")?;

        // temp handles are dropped (and the files removed) on every exit path
        let thumb_asset = assets::download_to_temp(
            self.fetcher.as_ref(),
            thumb_url,
            &self.config.cache_dir,
            &format!("thumb_{}", video_id),
        )
        .await?;
        let thumb = load_rgba(thumb_asset.path())?;

        let avatar = match requester_id {
            Some(user) => self.fetch_avatar(user).await,
            None => None,
        };
        let avatar_asset = match avatar {
            Some(bytes) => {
                let stem = format!("avatar_{}", requester_id.unwrap_or("bot"));
                Some(assets::write_temp(&self.config.cache_dir, &stem, &bytes).await?)
            }
            None => None,
        };
        let avatar_img = avatar_asset.as_ref().and_then(|asset| {
            match load_rgba(asset.path()) {
                Ok(img) => Some(img),
                Err(e) => {
                    warn!("avatar image unusable, using plain layout: {:#}", e);
                    None
                }
            }
        });

        let fonts = FontSet::load(&self.config.assets_dir)?;
        let canvas = render::compose(&meta, &thumb, avatar_img.as_ref(), &fonts);
        canvas
            .save(out)
            .with_context(|| format!("saving {}", out.display()))?;

        info!("generated {}", out.display());
        Ok(out.to_path_buf())
    }

    /// Requester's photo first, the bot's own photo as fallback. `None` when
    /// neither is available; the plain layout is used then.
    async fn fetch_avatar(&self, user_id: &str) -> Option<Vec<u8>> {
        match self.avatars.user_photo(user_id).await {
            Ok(Some(bytes)) => return Some(bytes),
            Ok(None) => debug!("{} has no profile photo", user_id),
            Err(e) => warn!("profile photo fetch for {} failed: {:#}", user_id, e),
        }
        match self.avatars.self_photo().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("fallback self photo fetch failed: {:#}", e);
                None
            }
        }
    }
}

fn load_rgba(path: &Path) -> Result<RgbaImage> {
    let img = image::io::Reader::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("sniffing format of {}", path.display()))?
        .decode()
        .with_context(|| format!("decoding {}", path.display()))?;
    Ok(img.to_rgba8())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::metadata::SearchHit;

    struct FailingSearch {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VideoSearch for FailingSearch {
        async fn lookup(&self, _video_id: &str) -> anyhow::Result<SearchHit> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("provider unreachable")
        }
    }

    struct StubSearch;

    #[async_trait]
    impl VideoSearch for StubSearch {
        async fn lookup(&self, _video_id: &str) -> anyhow::Result<SearchHit> {
            Ok(serde_json::from_str(
                r#"{
                    "title": "integration song",
                    "duration": "3:45",
                    "thumbnails": [{"url": "stub://thumb.png"}],
                    "viewCount": {"short": "10K views"},
                    "channel": {"name": "Stub Channel"}
                }"#,
            )?)
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl MediaFetcher for FailingFetcher {
        async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("no network in tests, asked for {}", url)
        }
    }

    struct StubFetcher {
        png: Vec<u8>,
    }

    #[async_trait]
    impl MediaFetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
            Ok(self.png.clone())
        }
    }

    struct NoAvatars;

    #[async_trait]
    impl AvatarSource for NoAvatars {
        async fn user_photo(&self, _user_id: &str) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn self_photo(&self) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("no self photo configured")
        }
    }

    fn test_config() -> Config {
        let cache_dir =
            std::env::temp_dir().join(format!("nowplaying-test-{:08x}", rand::random::<u32>()));
        std::fs::create_dir_all(&cache_dir).unwrap();
        Config {
            cache_dir,
            assets_dir: PathBuf::from("assets"),
            search_api: "http://127.0.0.1:9".to_string(),
            avatar_api: "http://127.0.0.1:9".to_string(),
            fallback_url: "https://example.com/fallback.jpg".to_string(),
        }
    }

    fn test_generator(config: Config, calls: Arc<AtomicUsize>) -> Generator {
        Generator::new(
            Box::new(FailingFetcher),
            config,
            Box::new(FailingSearch { calls }),
            Box::new(NoAvatars),
        )
    }

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = image::ImageBuffer::from_pixel(w, h, image::Rgba([180, 30, 30, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, image::ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_without_a_lookup() {
        let config = test_config();
        let cache_dir = config.cache_dir.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let generator = test_generator(config, calls.clone());

        let cached = cache_dir.join("vid123_user9.png");
        std::fs::write(&cached, b"already rendered").unwrap();

        let out = generator.get_thumb("vid123", Some("user9")).await;
        assert_eq!(out, cached.to_string_lossy());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        std::fs::remove_dir_all(&cache_dir).unwrap();
    }

    #[tokio::test]
    async fn search_failure_returns_fallback_and_writes_nothing() {
        let config = test_config();
        let cache_dir = config.cache_dir.clone();
        let fallback = config.fallback_url.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let generator = test_generator(config, calls.clone());

        let out = generator.get_thumb("vid123", None).await;
        assert_eq!(out, fallback);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache_dir.join("vid123_plain.png").exists());
        // no temp downloads leaked either
        assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 0);

        std::fs::remove_dir_all(&cache_dir).unwrap();
    }

    #[tokio::test]
    async fn concurrent_cold_key_calls_both_succeed() {
        let config = test_config();
        let cache_dir = config.cache_dir.clone();
        let generator = Arc::new(Generator::new(
            Box::new(StubFetcher {
                png: png_bytes(640, 360),
            }),
            config,
            Box::new(StubSearch),
            Box::new(NoAvatars),
        ));

        let g1 = generator.clone();
        let g2 = generator.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { g1.get_thumb("vid42", Some("u1")).await }),
            tokio::spawn(async move { g2.get_thumb("vid42", Some("u1")).await }),
        );

        let expected = cache_dir.join("vid42_u1.png");
        assert_eq!(a.unwrap(), expected.to_string_lossy());
        assert_eq!(b.unwrap(), expected.to_string_lossy());

        // whichever writer won, the file on disk is a decodable full canvas
        let rendered = image::open(&expected).unwrap().to_rgba8();
        assert_eq!((rendered.width(), rendered.height()), (1280, 720));

        // only the final output remains, no leaked temp downloads
        assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 1);

        std::fs::remove_dir_all(&cache_dir).unwrap();
    }

    #[tokio::test]
    async fn cache_keys_separate_requesters() {
        let config = test_config();
        let cache_dir = config.cache_dir.clone();
        let generator = test_generator(config, Arc::new(AtomicUsize::new(0)));

        let a = generator.output_path("vid", Some("alice"));
        let b = generator.output_path("vid", Some("bob"));
        let plain = generator.output_path("vid", None);
        assert_ne!(a, b);
        assert_ne!(a, plain);
        assert!(plain.ends_with("vid_plain.png"));

        std::fs::remove_dir_all(&cache_dir).unwrap();
    }
}
