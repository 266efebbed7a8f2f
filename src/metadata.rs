use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;

pub const DEFAULT_TITLE: &str = "Unsupported Title";
pub const DEFAULT_DURATION: &str = "Unknown Mins";
pub const DEFAULT_VIEWS: &str = "Unknown Views";
pub const DEFAULT_CHANNEL: &str = "Unknown Channel";

/// Raw search-provider response for a single video. Every field is optional;
/// missing or malformed pieces are defaulted per field in [`VideoMetadata`].
#[derive(Debug, Default, Deserialize)]
pub struct SearchHit {
    pub title: Option<String>,
    pub duration: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    #[serde(rename = "viewCount")]
    pub view_count: Option<ViewCount>,
    pub channel: Option<Channel>,
}

#[derive(Debug, Deserialize)]
pub struct Thumbnail {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ViewCount {
    pub short: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Channel {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub duration: String,
    /// `None` when the provider returned no usable thumbnail; the pipeline
    /// cannot proceed without one.
    pub thumbnail_url: Option<String>,
    pub views: String,
    pub channel: String,
}

impl VideoMetadata {
    /// Best-effort extraction: each field falls back independently, so a
    /// malformed duration never blocks a valid title.
    pub fn from_hit(hit: &SearchHit) -> Self {
        let title = hit
            .title
            .as_deref()
            .map(normalize_title)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let thumbnail_url = hit
            .thumbnails
            .iter()
            .filter_map(|t| t.url.as_deref())
            .next()
            .map(strip_query);

        Self {
            title,
            duration: hit
                .duration
                .clone()
                .unwrap_or_else(|| DEFAULT_DURATION.to_string()),
            thumbnail_url,
            views: hit
                .view_count
                .as_ref()
                .and_then(|v| v.short.clone())
                .unwrap_or_else(|| DEFAULT_VIEWS.to_string()),
            channel: hit
                .channel
                .as_ref()
                .and_then(|c| c.name.clone())
                .unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
        }
    }
}

/// Collapse runs of non-word characters and title-case the rest.
fn normalize_title(raw: &str) -> String {
    let re = Regex::new(r"\W+").expect("static regex");
    let cleaned = re.replace_all(raw, " ");
    cleaned
        .split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// CDN thumbnail URLs carry signing parameters that break plain GETs.
fn strip_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => base.to_string(),
        None => url.to_string(),
    }
}

#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn lookup(&self, video_id: &str) -> Result<SearchHit>;
}

pub struct HttpVideoSearch {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVideoSearch {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl VideoSearch for HttpVideoSearch {
    async fn lookup(&self, video_id: &str) -> Result<SearchHit> {
        let url = format!(
            "{}/api/v1/videos/{}",
            self.base_url.trim_end_matches('/'),
            video_id
        );
        debug!("looking up video metadata at {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("search request for {}", video_id))?;
        if !resp.status().is_success() {
            anyhow::bail!("search returned {} for {}", resp.status(), video_id);
        }

        resp.json::<SearchHit>()
            .await
            .with_context(|| format!("decoding search response for {}", video_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let hit: SearchHit = serde_json::from_str(r#"{"title": "hello world"}"#).unwrap();
        let meta = VideoMetadata::from_hit(&hit);

        assert_eq!(meta.title, "Hello World");
        assert_eq!(meta.duration, DEFAULT_DURATION);
        assert_eq!(meta.views, DEFAULT_VIEWS);
        assert_eq!(meta.channel, DEFAULT_CHANNEL);
        assert_eq!(meta.thumbnail_url, None);
    }

    #[test]
    fn missing_duration_does_not_block_other_fields() {
        let hit: SearchHit = serde_json::from_str(
            r#"{
                "title": "some song",
                "thumbnails": [{"url": "https://img.example/v/abc.jpg?sqp=xyz"}],
                "viewCount": {"short": "1.2M views"},
                "channel": {"name": "Some Channel"}
            }"#,
        )
        .unwrap();
        let meta = VideoMetadata::from_hit(&hit);

        assert_eq!(meta.duration, DEFAULT_DURATION);
        assert_eq!(meta.title, "Some Song");
        assert_eq!(meta.views, "1.2M views");
        assert_eq!(meta.channel, "Some Channel");
        assert_eq!(
            meta.thumbnail_url.as_deref(),
            Some("https://img.example/v/abc.jpg")
        );
    }

    #[test]
    fn empty_hit_is_fully_defaulted() {
        let meta = VideoMetadata::from_hit(&SearchHit::default());
        assert_eq!(meta.title, DEFAULT_TITLE);
        assert_eq!(meta.duration, DEFAULT_DURATION);
        assert!(meta.thumbnail_url.is_none());
    }

    #[test]
    fn title_is_sanitized_and_title_cased() {
        let hit = SearchHit {
            title: Some("never GONNA (give) you--up!!".to_string()),
            ..Default::default()
        };
        let meta = VideoMetadata::from_hit(&hit);
        assert_eq!(meta.title, "Never Gonna Give You Up");
    }

    #[test]
    fn symbol_only_title_falls_back() {
        let hit = SearchHit {
            title: Some("!!! ---".to_string()),
            ..Default::default()
        };
        assert_eq!(VideoMetadata::from_hit(&hit).title, DEFAULT_TITLE);
    }

    #[test]
    fn first_thumbnail_with_url_wins() {
        let hit: SearchHit = serde_json::from_str(
            r#"{"thumbnails": [{"url": null}, {"url": "https://a/b.jpg"}]}"#,
        )
        .unwrap();
        let meta = VideoMetadata::from_hit(&hit);
        assert_eq!(meta.thumbnail_url.as_deref(), Some("https://a/b.jpg"));
    }
}
