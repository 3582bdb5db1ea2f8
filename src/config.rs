use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "TUBE_REMOTE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub devtools: DevToolsConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub navigator: NavigatorConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DevToolsConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_tab_match")]
    pub tab_match: String,
    #[serde(default = "default_watch_marker")]
    pub watch_marker: String,
    #[serde(default = "default_discovery_timeout", with = "humantime_serde")]
    pub discovery_timeout: Duration,
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for DevToolsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            tab_match: default_tab_match(),
            watch_marker: default_watch_marker(),
            discovery_timeout: default_discovery_timeout(),
            retry_interval: default_retry_interval(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:9222".to_string()
}

fn default_tab_match() -> String {
    "youtube.com".to_string()
}

fn default_watch_marker() -> String {
    "/watch?v=".to_string()
}

fn default_discovery_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:65432".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_skip_seconds")]
    pub skip_seconds: u32,
    #[serde(default = "default_skip_options")]
    pub skip_options: Vec<u32>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            skip_seconds: default_skip_seconds(),
            skip_options: default_skip_options(),
        }
    }
}

impl PlayerConfig {
    /// Skip length actually used; values outside `skip_options` fall back to the first option.
    pub fn effective_skip_seconds(&self) -> u32 {
        if self.skip_options.is_empty() || self.skip_options.contains(&self.skip_seconds) {
            return self.skip_seconds;
        }
        self.skip_options[0]
    }
}

fn default_skip_seconds() -> u32 {
    5
}

fn default_skip_options() -> Vec<u32> {
    vec![5, 10, 30, 60]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigatorConfig {
    #[serde(default = "default_container_paths")]
    pub container_paths: Vec<Vec<String>>,
    #[serde(default = "default_card_selectors")]
    pub card_selectors: Vec<String>,
    #[serde(default = "default_thumbnail_template")]
    pub thumbnail_template: String,
    #[serde(default = "default_scroll_settle", with = "humantime_serde")]
    pub scroll_settle: Duration,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_extend_timeout", with = "humantime_serde")]
    pub extend_timeout: Duration,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            container_paths: default_container_paths(),
            card_selectors: default_card_selectors(),
            thumbnail_template: default_thumbnail_template(),
            scroll_settle: default_scroll_settle(),
            poll_interval: default_poll_interval(),
            extend_timeout: default_extend_timeout(),
        }
    }
}

fn default_container_paths() -> Vec<Vec<String>> {
    vec![vec![
        "div#items.style-scope.ytd-watch-next-secondary-results-renderer".into(),
        "ytd-item-section-renderer".into(),
        "#contents".into(),
    ]]
}

fn default_card_selectors() -> Vec<String> {
    vec![
        "ytd-compact-video-renderer".into(),
        "ytd-video-renderer".into(),
        "ytd-rich-item-renderer".into(),
        "yt-lockup-view-model".into(),
        "yt-lockup-view-model-wiz".into(),
    ]
}

fn default_thumbnail_template() -> String {
    "https://i.ytimg.com/vi/{id}/hqdefault.jpg".into()
}

fn default_scroll_settle() -> Duration {
    Duration::from_millis(50)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_extend_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
        let from_file = read_config_file(path)?;
        cfg = merge_config(cfg, from_file);
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
    if !other.devtools.endpoint.is_empty() {
        base.devtools.endpoint = other.devtools.endpoint;
    }
    if !other.devtools.tab_match.is_empty() {
        base.devtools.tab_match = other.devtools.tab_match;
    }
    if !other.devtools.watch_marker.is_empty() {
        base.devtools.watch_marker = other.devtools.watch_marker;
    }
    base.devtools.discovery_timeout = other.devtools.discovery_timeout;
    base.devtools.retry_interval = other.devtools.retry_interval;
    base.devtools.connect_timeout = other.devtools.connect_timeout;

    if !other.remote.listen_addr.is_empty() {
        base.remote.listen_addr = other.remote.listen_addr;
    }

    if other.player.skip_seconds != 0 {
        base.player.skip_seconds = other.player.skip_seconds;
    }
    if !other.player.skip_options.is_empty() {
        base.player.skip_options = other.player.skip_options;
    }

    if !other.navigator.container_paths.is_empty() {
        base.navigator.container_paths = other.navigator.container_paths;
    }
    if !other.navigator.card_selectors.is_empty() {
        base.navigator.card_selectors = other.navigator.card_selectors;
    }
    if !other.navigator.thumbnail_template.is_empty() {
        base.navigator.thumbnail_template = other.navigator.thumbnail_template;
    }
    base.navigator.scroll_settle = other.navigator.scroll_settle;
    base.navigator.poll_interval = other.navigator.poll_interval;
    base.navigator.extend_timeout = other.navigator.extend_timeout;

    if !other.log.level.is_empty() {
        base.log.level = other.log.level;
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
        "devtools.endpoint" => cfg.devtools.endpoint = value,
        "devtools.tab_match" => cfg.devtools.tab_match = value,
        "devtools.watch_marker" => cfg.devtools.watch_marker = value,
        "devtools.discovery_timeout" => set_duration(&mut cfg.devtools.discovery_timeout, &value),
        "devtools.retry_interval" => set_duration(&mut cfg.devtools.retry_interval, &value),
        "devtools.connect_timeout" => set_duration(&mut cfg.devtools.connect_timeout, &value),
        "remote.listen_addr" => cfg.remote.listen_addr = value,
        "player.skip_seconds" => {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                cfg.player.skip_seconds = parsed;
            }
        }
        "player.skip_options" => {
            let parsed: Vec<u32> = value
                .split(',')
                .filter_map(|s| s.trim().parse::<u32>().ok())
                .collect();
            if !parsed.is_empty() {
                cfg.player.skip_options = parsed;
            }
        }
        "navigator.card_selectors" => {
            cfg.navigator.card_selectors = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "navigator.container_path" => {
            let path: Vec<String> = value
                .split('>')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !path.is_empty() {
                cfg.navigator.container_paths = vec![path];
            }
        }
        "navigator.thumbnail_template" => cfg.navigator.thumbnail_template = value,
        "navigator.scroll_settle" => set_duration(&mut cfg.navigator.scroll_settle, &value),
        "navigator.poll_interval" => set_duration(&mut cfg.navigator.poll_interval, &value),
        "navigator.extend_timeout" => set_duration(&mut cfg.navigator.extend_timeout, &value),
        "log.level" => cfg.log.level = value,
        _ => {}
    }
}

fn set_duration(slot: &mut Duration, value: &str) {
    if let Ok(duration) = humantime::parse_duration(value.trim()) {
        *slot = duration;
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tube-remote").join("config.yaml"))
}
