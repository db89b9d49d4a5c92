//! Configuration management for ZIM Archiver
//!
//! Configuration is read from a TOML or JSON file (chosen by extension) after
//! `${VAR}` environment substitution. The parsed tree is kept as a
//! [`ConfigStore`], which answers dotted-key lookups with caller-supplied
//! defaults, and is also deserialized into the typed [`AppConfig`] sections.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app::models::SourceConfig;
use crate::app::ClientConfig;
use crate::constants::{config as config_constants, http, limits, logging};
use crate::errors::{ConfigError, ConfigResult};

/// Key-value lookup with defaults
///
/// Keys are dotted paths (`http.listing_timeout`); a missing key or a value
/// of the wrong shape yields the default and never an error.
pub trait ConfigLookup {
    /// Raw value at a dotted key
    fn get_value(&self, key: &str) -> Option<&Value>;

    /// Typed value at a dotted key, or `default`
    fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T
    where
        Self: Sized,
    {
        match self.get_value(key) {
            Some(value) => match T::deserialize(value) {
                Ok(parsed) => {
                    debug!("Retrieved config {}", key);
                    parsed
                }
                Err(e) => {
                    warn!("Config key {} has unexpected shape ({}), using default", key, e);
                    default
                }
            },
            None => {
                debug!("Config key not found: {}, returning default", key);
                default
            }
        }
    }

    /// Whether a dotted key is present
    fn contains(&self, key: &str) -> bool {
        self.get_value(key).is_some()
    }
}

/// Parsed configuration tree
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    root: Value,
    path: Option<PathBuf>,
}

impl ConfigLookup for ConfigStore {
    fn get_value(&self, key: &str) -> Option<&Value> {
        let segments: Vec<&str> = key.split('.').collect();
        self.get_nested(&segments)
    }
}

impl ConfigStore {
    /// Wrap an already-parsed tree
    pub fn from_value(root: Value) -> Self {
        Self { root, path: None }
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let root: Value = toml::from_str(&substitute_env_vars(content))?;
        Ok(Self::from_value(root))
    }

    /// Parse JSON text
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let root: Value = serde_json::from_str(&substitute_env_vars(content))?;
        Ok(Self::from_value(root))
    }

    /// Load a file, choosing the format by extension (`.json` or TOML)
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let mut store = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        store.path = Some(path.to_path_buf());

        info!("Loaded configuration from: {}", path.display());
        Ok(store)
    }

    /// File the store was loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Walk explicit path segments
    pub fn get_nested(&self, segments: &[&str]) -> Option<&Value> {
        let mut current = &self.root;
        for segment in segments {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    /// Deserialize a whole section, defaulting when absent or malformed
    pub fn section<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get(key, T::default())
    }

    /// All `[[sources]]` entries, validated
    pub fn sources(&self) -> ConfigResult<Vec<SourceConfig>> {
        let Some(raw) = self.get_value("sources") else {
            return Ok(Vec::new());
        };
        let entries = raw.as_array().ok_or_else(|| ConfigError::InvalidValue {
            field: "sources".to_string(),
            value: raw.to_string(),
            reason: "Expected an array of source tables".to_string(),
        })?;

        let mut sources = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let source =
                SourceConfig::deserialize(entry).map_err(|e| ConfigError::InvalidValue {
                    field: format!("sources[{}]", index),
                    value: entry.to_string(),
                    reason: e.to_string(),
                })?;
            source.validate()?;
            if sources.iter().any(|s: &SourceConfig| s.name == source.name) {
                return Err(ConfigError::InvalidValue {
                    field: format!("sources[{}].name", index),
                    value: source.name,
                    reason: "Source names must be unique".to_string(),
                });
            }
            sources.push(source);
        }
        Ok(sources)
    }

    /// Find a configured source by name
    pub fn source(&self, name: &str) -> ConfigResult<Option<SourceConfig>> {
        Ok(self.sources()?.into_iter().find(|s| s.name == name))
    }
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_]+)\}").expect("static env regex"))
}

/// Replace `${VAR}` with the environment value; unset variables become empty
pub fn substitute_env_vars(content: &str) -> String {
    env_var_regex()
        .replace_all(content, |caps: &Captures| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(value) if !value.is_empty() => value,
                _ => {
                    warn!("Environment variable {} not found", name);
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// HTTP client settings
    pub http: HttpConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Metrics output
    pub metrics: MetricsConfig,
    /// Configured archive sources
    pub sources: Vec<SourceConfig>,
    /// Lookup over the raw tree, for prefix-addressed legacy sections
    pub store: ConfigStore,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfigToml {
    /// Timeout for listing requests
    #[serde(with = "humantime_serde")]
    pub listing_timeout: Duration,
    /// Timeout for a whole archive transfer
    #[serde(with = "humantime_serde")]
    pub download_timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Retries for listing requests
    pub max_retries: u32,
    /// Base delay for exponential backoff
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    /// User agent override
    pub user_agent: Option<String>,
}

impl Default for HttpConfigToml {
    fn default() -> Self {
        Self {
            listing_timeout: http::LISTING_TIMEOUT,
            download_timeout: http::DOWNLOAD_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay: limits::RETRY_BASE_DELAY,
            user_agent: None,
        }
    }
}

impl HttpConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            listing_timeout: self.listing_timeout,
            download_timeout: self.download_timeout,
            connect_timeout: self.connect_timeout,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| http::USER_AGENT.to_string()),
            ..ClientConfig::default()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
    /// Directory for the log file
    pub log_dir: PathBuf,
    /// Enable file logging
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
            log_dir: PathBuf::from(logging::DEFAULT_LOG_DIR),
            file_logging: true,
        }
    }
}

/// Metrics output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus textfile written after each run
    pub textfile: Option<PathBuf>,
}

impl AppConfig {
    /// Build typed configuration from a parsed store
    pub fn from_store(store: ConfigStore) -> ConfigResult<Self> {
        Ok(Self {
            http: store.section("http"),
            logging: store.section("logging"),
            metrics: store.section("metrics"),
            sources: store.sources()?,
            store,
        })
    }

    /// Load configuration from an explicit file or the standard locations
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let path = match config_file_override {
            Some(path) => path,
            None => Self::find_config_file().ok_or_else(|| ConfigError::NoConfigFile {
                hint: Self::default_config_path()
                    .unwrap_or_else(|| PathBuf::from(config_constants::LOCAL_CONFIG_FILE)),
            })?,
        };
        let store = ConfigStore::load(&path).await?;
        Self::from_store(store)
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![
            PathBuf::from(format!("./{}", config_constants::LOCAL_CONFIG_FILE)),
            PathBuf::from("./config.toml"),
        ];
        if let Some(user) = Self::default_config_path() {
            search_paths.push(user);
        }
        if cfg!(unix) {
            search_paths.push(
                PathBuf::from("/etc")
                    .join(config_constants::APP_DIR_NAME)
                    .join("config.toml"),
            );
        }

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }
        debug!("No config file found in standard locations");
        None
    }

    /// Default config file path for the current user
    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(config_constants::APP_DIR_NAME).join("config.toml"))
    }

    /// Resolve a source by name, falling back to a legacy section of that name
    pub fn resolve_source(&self, name: &str) -> ConfigResult<SourceConfig> {
        if let Some(source) = self.sources.iter().find(|s| s.name == name) {
            return Ok(source.clone());
        }
        if self.store.contains(name) {
            let source = source_from_prefix(&self.store, name, name);
            source.validate()?;
            return Ok(source);
        }
        Err(ConfigError::UnknownSource {
            name: name.to_string(),
        })
    }
}

/// Read `<prefix>.<key>` entries into a source, applying the usual defaults
pub fn source_from_prefix<L: ConfigLookup>(lookup: &L, source_name: &str, prefix: &str) -> SourceConfig {
    let defaults = SourceConfig::new(source_name, crate::constants::sources::DEFAULT_SOURCE_URL);
    SourceConfig {
        name: lookup.get(&format!("{prefix}.name"), source_name.to_string()),
        source_url: lookup.get(&format!("{prefix}.source_url"), defaults.source_url),
        file_pattern: lookup.get(&format!("{prefix}.file_pattern"), defaults.file_pattern),
        storage_path: lookup.get(&format!("{prefix}.storage_path"), None),
        backup_path: lookup.get(&format!("{prefix}.backup_path"), None),
        max_backups: lookup.get(&format!("{prefix}.max_backups"), defaults.max_backups),
    }
}
