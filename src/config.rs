use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Refresh interval used when a page does not set one.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(30_000);

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// Where a transport delivers notifications.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Discord webhook, either as a full URL or as an id/token pair.
    Discord {
        url: Option<String>,
        id: Option<String>,
        token: Option<String>,
    },
    Telegram { bot_token: String, chat_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FormatConfig {
    Page,
    Directory,
    News,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FetcherConfig {
    Basic,
    Etf,
    Moodle {
        url: String,
        username: String,
        password: String,
    },
}

/// A watched page and the names of the submodules it is wired to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageConfig {
    pub url: String,
    pub title: Option<String>,
    /// Refresh interval in milliseconds.
    pub interval: Option<u64>,
    pub fetcher: Option<String>,
    pub format: Option<String>,
    pub transport: Option<String>,
}

impl PageConfig {
    pub fn refresh_interval(&self) -> Duration {
        match self.interval {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => DEFAULT_REFRESH_INTERVAL,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Directory for state files (cache, history, logs). Defaults to current directory.
    data_dir: Option<String>,
    user_agent: Option<String>,
    /// Whether relayed snapshots are written under `hist/`.
    #[serde(default = "default_history")]
    history: bool,
    /// Discord webhook receiving the bot's own log output.
    log_webhook: Option<String>,
    #[serde(default)]
    transports: BTreeMap<String, Value>,
    #[serde(default)]
    formats: BTreeMap<String, Value>,
    #[serde(default)]
    fetchers: BTreeMap<String, Value>,
    #[serde(default)]
    pages: BTreeMap<String, PageConfig>,
}

fn default_history() -> bool {
    true
}

pub fn default_user_agent() -> String {
    format!(
        "{} v{}: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_DESCRIPTION")
    )
}

pub struct Config {
    /// Path to the config file (re-read on reload)
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub user_agent: String,
    pub history: bool,
    pub log_webhook: Option<Url>,
    pub transports: BTreeMap<String, TransportConfig>,
    pub formats: BTreeMap<String, FormatConfig>,
    pub fetchers: BTreeMap<String, FetcherConfig>,
    pub pages: BTreeMap<String, PageConfig>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.pages.is_empty() {
            return Err(ConfigError::Validation("pages must contain at least one page".into()));
        }

        let log_webhook = match file.log_webhook {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| {
                ConfigError::Validation(format!("log_webhook is not a valid URL: {e}"))
            })?),
            None => None,
        };

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            config_path,
            data_dir,
            user_agent: file.user_agent.unwrap_or_else(default_user_agent),
            history: file.history,
            log_webhook,
            transports: parse_submodules("transport", file.transports),
            formats: parse_submodules("format", file.formats),
            fetchers: parse_submodules("fetcher", file.fetchers),
            pages: file.pages,
        })
    }
}

/// Parse each named submodule on its own so one bad entry doesn't take the
/// others down with it.
fn parse_submodules<T: serde::de::DeserializeOwned>(
    kind: &str,
    entries: BTreeMap<String, Value>,
) -> BTreeMap<String, T> {
    entries
        .into_iter()
        .filter_map(|(name, value)| {
            if !value.is_object() {
                warn!("'{name}' {kind} has invalid configuration.");
                return None;
            }
            match serde_json::from_value(value) {
                Ok(parsed) => Some((name, parsed)),
                Err(e) => {
                    warn!("'{name}' {kind} has invalid configuration: {e}");
                    None
                }
            }
        })
        .collect()
}
