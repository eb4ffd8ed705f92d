use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::carousel;
use crate::content;
use crate::news;

const DEFAULT_ENV_PREFIX: &str = "PRARANG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub carousel: CarouselConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortalConfig {
    #[serde(default = "default_portal_base")]
    pub portal_base: String,
    #[serde(default = "default_analytics_base")]
    pub analytics_base: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub auth_type: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_city_slug")]
    pub city_slug: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            portal_base: default_portal_base(),
            analytics_base: default_analytics_base(),
            auth_token: String::new(),
            auth_type: String::new(),
            user_agent: default_user_agent(),
            language: default_language(),
            location: default_location(),
            city_slug: default_city_slug(),
            page_size: default_page_size(),
        }
    }
}

fn default_portal_base() -> String {
    content::DEFAULT_PORTAL_BASE.to_string()
}

fn default_analytics_base() -> String {
    content::DEFAULT_ANALYTICS_BASE.to_string()
}

fn default_user_agent() -> String {
    "prarang-tui/0.1 (+https://github.com/prarang/prarang-tui)".to_string()
}

fn default_language() -> String {
    content::DEFAULT_LANGUAGE.to_string()
}

fn default_location() -> String {
    "c2".to_string()
}

fn default_city_slug() -> String {
    "meerut".to_string()
}

fn default_page_size() -> u32 {
    content::DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsConfig {
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_tick_interval", with = "humantime_serde")]
    pub tick_interval: Duration,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            max_items: default_max_items(),
            tick_interval: default_tick_interval(),
        }
    }
}

fn default_feed_url() -> String {
    news::DEFAULT_FEED_URL.to_string()
}

fn default_max_items() -> usize {
    news::MAX_ITEMS
}

fn default_tick_interval() -> Duration {
    news::TICK_INTERVAL
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarouselConfig {
    #[serde(default = "default_autoplay_delay", with = "humantime_serde")]
    pub autoplay_delay: Duration,
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            autoplay_delay: default_autoplay_delay(),
        }
    }
}

fn default_autoplay_delay() -> Duration {
    carousel::AUTOPLAY_DELAY
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
    if !other.portal.portal_base.is_empty() {
        base.portal.portal_base = other.portal.portal_base;
    }
    if !other.portal.analytics_base.is_empty() {
        base.portal.analytics_base = other.portal.analytics_base;
    }
    if !other.portal.auth_token.is_empty() {
        base.portal.auth_token = other.portal.auth_token;
    }
    if !other.portal.auth_type.is_empty() {
        base.portal.auth_type = other.portal.auth_type;
    }
    if !other.portal.user_agent.is_empty() {
        base.portal.user_agent = other.portal.user_agent;
    }
    if !other.portal.language.is_empty() {
        base.portal.language = other.portal.language;
    }
    if !other.portal.location.is_empty() {
        base.portal.location = other.portal.location;
    }
    if !other.portal.city_slug.is_empty() {
        base.portal.city_slug = other.portal.city_slug;
    }
    if other.portal.page_size != 0 {
        base.portal.page_size = other.portal.page_size;
    }

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }

    if !other.news.feed_url.is_empty() {
        base.news.feed_url = other.news.feed_url;
    }
    if other.news.max_items != 0 {
        base.news.max_items = other.news.max_items;
    }
    base.news.tick_interval = other.news.tick_interval;

    base.carousel.autoplay_delay = other.carousel.autoplay_delay;

    base
}

/// Applies `PREFIX_`-scoped environment variables on top of the config;
/// values land directly so file-provided settings survive where no variable
/// is set.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "portal.portal_base" => cfg.portal.portal_base = value,
        "portal.analytics_base" => cfg.portal.analytics_base = value,
        "portal.auth_token" => cfg.portal.auth_token = value,
        "portal.auth_type" => cfg.portal.auth_type = value,
        "portal.user_agent" => cfg.portal.user_agent = value,
        "portal.language" => cfg.portal.language = value,
        "portal.location" => cfg.portal.location = value,
        "portal.city_slug" => cfg.portal.city_slug = value,
        "portal.page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.portal.page_size = parsed;
            }
        }
        "ui.theme" => cfg.ui.theme = value,
        "news.feed_url" => cfg.news.feed_url = value,
        "news.max_items" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.news.max_items = parsed;
            }
        }
        "news.tick_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.news.tick_interval = duration;
            }
        }
        "carousel.autoplay_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.carousel.autoplay_delay = duration;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("prarang").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            env_prefix: Some("PRARANG_TEST_NONE".into()),
            ..LoadOptions::default()
        })
        .unwrap();
        assert_eq!(cfg.portal.language, "hi");
        assert_eq!(cfg.portal.location, "c2");
        assert_eq!(cfg.portal.page_size, 31);
        assert_eq!(cfg.news.max_items, 30);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "portal:\n  city_slug: agra\n  location: c5\nnews:\n  tick_interval: 5s\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("PRARANG_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.portal.city_slug, "agra");
        assert_eq!(cfg.portal.location, "c5");
        assert_eq!(cfg.news.tick_interval, Duration::from_secs(5));
        assert_eq!(cfg.portal.language, "hi");
    }

    #[test]
    fn env_layer_keeps_file_values_for_unset_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "portal:\n  city_slug: agra\n").unwrap();

        env::set_var("PRARANG_TEST_LAYER_PORTAL__LOCATION", "c5");
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("PRARANG_TEST_LAYER".into()),
        })
        .unwrap();
        env::remove_var("PRARANG_TEST_LAYER_PORTAL__LOCATION");

        assert_eq!(cfg.portal.location, "c5");
        assert_eq!(cfg.portal.city_slug, "agra");
    }

    #[test]
    fn env_overrides() {
        env::set_var("PRARANG_PORTAL__AUTH_TOKEN", "token-123");
        let cfg = load(LoadOptions::default()).unwrap();
        assert_eq!(cfg.portal.auth_token, "token-123");
        env::remove_var("PRARANG_PORTAL__AUTH_TOKEN");
    }
}
