use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result};

const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_ASSETS_DIR: &str = "assets";
const DEFAULT_SEARCH_API: &str = "https://search.invidious.io";
const DEFAULT_AVATAR_API: &str = "http://127.0.0.1:8080/avatars";
const DEFAULT_FALLBACK_URL: &str = "https://te.legra.ph/file/6298d377ad3eb46711644.jpg";

/// Runtime configuration, read once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory holding both final outputs and short-lived downloads.
    pub cache_dir: PathBuf,
    /// Directory with the bundled font files.
    pub assets_dir: PathBuf,
    /// Base URL of the video search provider.
    pub search_api: String,
    /// Base URL of the chat-photo service.
    pub avatar_api: String,
    /// Placeholder image URL returned whenever generation fails.
    pub fallback_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cache_dir = PathBuf::from(var_or("CACHE_DIR", DEFAULT_CACHE_DIR));
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("creating cache dir {}", cache_dir.display()))?;

        Ok(Self {
            cache_dir,
            assets_dir: PathBuf::from(var_or("ASSETS_DIR", DEFAULT_ASSETS_DIR)),
            search_api: var_or("SEARCH_API_URL", DEFAULT_SEARCH_API),
            avatar_api: var_or("AVATAR_API_URL", DEFAULT_AVATAR_API),
            fallback_url: var_or("FALLBACK_THUMB_URL", DEFAULT_FALLBACK_URL),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
