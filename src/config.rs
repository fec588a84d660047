use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "FMC";

pub const DEFAULT_BASE_URL: &str = "https://fmcbackend-hpcs.onrender.com/api";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("fmc-client/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_post_page_size")]
    pub post_page_size: u32,
    #[serde(default = "default_video_page_size")]
    pub video_page_size: u32,
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: u32,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            post_page_size: default_post_page_size(),
            video_page_size: default_video_page_size(),
            scroll_threshold: default_scroll_threshold(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_post_page_size() -> u32 {
    7
}

fn default_video_page_size() -> u32 {
    5
}

fn default_scroll_threshold() -> u32 {
    200
}

fn default_preview_chars() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.trim().is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.trim().is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if !other.api.timeout.is_zero() {
        base.api.timeout = other.api.timeout;
    }

    if other.feed.post_page_size != 0 {
        base.feed.post_page_size = other.feed.post_page_size;
    }
    if other.feed.video_page_size != 0 {
        base.feed.video_page_size = other.feed.video_page_size;
    }
    base.feed.scroll_threshold = other.feed.scroll_threshold;
    if other.feed.preview_chars != 0 {
        base.feed.preview_chars = other.feed.preview_chars;
    }

    if other.storage.path.is_some() {
        base.storage.path = other.storage.path;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "feed.post_page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.feed.post_page_size = parsed.max(1);
            }
        }
        "feed.video_page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.feed.video_page_size = parsed.max(1);
            }
        }
        "feed.scroll_threshold" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.feed.scroll_threshold = parsed;
            }
        }
        "feed.preview_chars" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.preview_chars = parsed;
            }
        }
        "storage.path" => cfg.storage.path = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fmc-client").join("config.yaml"))
}

/// Writes the API endpoint into the config file, keeping the other sections.
pub fn save_api_endpoint(path: Option<PathBuf>, base_url: &str) -> Result<PathBuf> {
    let base_url = base_url.trim();
    anyhow::ensure!(!base_url.is_empty(), "config: api.base_url is required");
    url::Url::parse(base_url)
        .with_context(|| format!("config: api.base_url {base_url:?} is not a valid url"))?;

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };
    cfg.api.base_url = base_url.to_string();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}
