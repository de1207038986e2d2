use crate::errors::{DataHubError, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.nseindia.com";
pub const DEFAULT_COOKIE_TRIGGER_URL: &str = "https://www.nseindia.com/market-data/live-equity-market";
pub const DEFAULT_PROBE_PATH: &str = "/api/allIndices";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.6422.112 Safari/537.36";

/// Cookie names the origin's bot-detection layer sets on a solved challenge.
pub const REQUIRED_NSE_COOKIES: &[&str] = &[
    "_ga",
    "AKA_A2",
    "_abck",
    "ak_bmsc",
    "nsit",
    "nseappid",
    "_ga_87M7PJ3R97",
    "bm_sz",
    "bm_sv",
    "RT",
];

/// Upper bound for the post-navigation wait in the browser.
pub const MAX_BROWSER_SETTLE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Arrow,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = DataHubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "arrow" => Ok(StorageBackend::Arrow),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(DataHubError::ConfigError(format!("unknown storage backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub cookie_trigger_url: String,
    pub probe_path: String,
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    pub cookie_file: PathBuf,
    pub cookie_ttl: Duration,
    pub required_cookies: Vec<String>,
    pub max_concurrency: usize,
    pub browser_settle: Duration,
    pub navigation_timeout: Duration,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,
    pub storage: StorageBackend,
    pub data_dir: String,
    pub database_path: PathBuf,
    pub index_names: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cookie_trigger_url: DEFAULT_COOKIE_TRIGGER_URL.to_string(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            cookie_file: PathBuf::from("nse_cookies.json"),
            cookie_ttl: Duration::from_secs(3600),
            required_cookies: REQUIRED_NSE_COOKIES.iter().map(|s| s.to_string()).collect(),
            max_concurrency: 8,
            browser_settle: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(30),
            headless: true,
            chrome_executable: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            storage: StorageBackend::Arrow,
            data_dir: "data".to_string(),
            database_path: PathBuf::from("nse_data.db"),
            index_names: crate::scrapers::datasets::DEFAULT_INDEX_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_cookie_trigger_url(mut self, url: &str) -> Self {
        self.cookie_trigger_url = url.to_string();
        self
    }

    pub fn with_probe_path(mut self, path: &str) -> Self {
        self.probe_path = path.to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_file = path.into();
        self
    }

    pub fn with_cookie_ttl(mut self, ttl: Duration) -> Self {
        self.cookie_ttl = ttl;
        self
    }

    pub fn with_required_cookies(mut self, names: Vec<String>) -> Self {
        self.required_cookies = names;
        self
    }

    // A zero limit would deadlock the semaphore
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_browser_settle(mut self, settle: Duration) -> Self {
        self.browser_settle = settle.min(MAX_BROWSER_SETTLE);
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_chrome_executable(mut self, path: Option<PathBuf>) -> Self {
        self.chrome_executable = path;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn with_storage(mut self, storage: StorageBackend) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_data_dir(mut self, dir: &str) -> Self {
        self.data_dir = dir.to_string();
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_index_names(mut self, names: Vec<String>) -> Self {
        self.index_names = names;
        self
    }

    /// Absolute URL of the cookie validation probe.
    pub fn probe_url(&self) -> String {
        format!("{}{}", self.base_url, self.probe_path)
    }

    /// Build a config from defaults overlaid with whatever `source` defines.
    ///
    /// Keys are `section.name`, e.g. `nse.base_url` or `scraping.timeout_secs`.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let mut config = Config::new();

        if let Some(v) = source.get("nse.base_url") {
            config = config.with_base_url(&v);
        }
        if let Some(v) = source.get("nse.cookies_url") {
            config = config.with_cookie_trigger_url(&v);
        }
        if let Some(v) = source.get("nse.probe_path") {
            config = config.with_probe_path(&v);
        }
        if let Some(v) = source.get("nse.cookies_file") {
            config = config.with_cookie_file(v);
        }
        if let Some(secs) = parse_key::<u64>(source, "nse.cookie_ttl_secs")? {
            config = config.with_cookie_ttl(Duration::from_secs(secs));
        }
        if let Some(v) = source.get("nse.required_cookies") {
            config = config.with_required_cookies(split_list(&v));
        }
        if let Some(v) = source.get("nse.indices") {
            config = config.with_index_names(split_list(&v));
        }
        if let Some(secs) = parse_key::<u64>(source, "scraping.timeout_secs")? {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_key::<u64>(source, "scraping.probe_timeout_secs")? {
            config = config.with_probe_timeout(Duration::from_secs(secs));
        }
        if let Some(n) = parse_key::<usize>(source, "scraping.max_concurrency")? {
            config = config.with_max_concurrency(n);
        }
        if let Some(v) = source.get("scraping.user_agent") {
            config = config.with_user_agent(&v);
        }
        if let Some(secs) = parse_key::<u64>(source, "browser.settle_secs")? {
            config = config.with_browser_settle(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_key::<u64>(source, "browser.navigation_timeout_secs")? {
            config = config.with_navigation_timeout(Duration::from_secs(secs));
        }
        if let Some(headless) = parse_key::<bool>(source, "browser.headless")? {
            config = config.with_headless(headless);
        }
        if let Some(v) = source.get("browser.chrome_executable") {
            config = config.with_chrome_executable(Some(PathBuf::from(v)));
        }
        if let Some(backend) = parse_key::<StorageBackend>(source, "storage.backend")? {
            config = config.with_storage(backend);
        }
        if let Some(v) = source.get("storage.data_dir") {
            config = config.with_data_dir(&v);
        }
        if let Some(v) = source.get("storage.database_path") {
            config = config.with_database_path(v);
        }

        debug!("Resolved config: {:?}", config);
        Ok(config)
    }
}

fn parse_key<T>(source: &dyn ConfigSource, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match source.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| DataHubError::ConfigError(format!("invalid value for {}: {} ({})", key, raw, e))),
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Key-value configuration lookup.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Reads `NSE_DATAHUB_<SECTION>_<NAME>` variables, e.g. `NSE_DATAHUB_SCRAPING_TIMEOUT_SECS`.
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::with_prefix("NSE_DATAHUB")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn var_name(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.replace('.', "_")).to_uppercase()
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.var_name(key)).ok()
    }
}

/// A TOML file flattened to `section.name` keys.
pub struct TomlSource {
    values: HashMap<String, String>,
}

impl TomlSource {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let source = Self::parse(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(source)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = content.parse()?;
        let mut values = HashMap::new();
        flatten("", &toml::Value::Table(table), &mut values);
        Ok(Self { values })
    }
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut HashMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (k, v) in table {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(&key, v, out);
            }
        }
        toml::Value::Array(items) => {
            let joined = items
                .iter()
                .map(|item| match item {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        toml::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

impl ConfigSource for TomlSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Sources consulted in order; the first one defining a key wins.
pub struct LayeredSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn with_layer(mut self, layer: Box<dyn ConfigSource>) -> Self {
        self.layers.push(layer);
        self
    }
}

impl Default for LayeredSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}
