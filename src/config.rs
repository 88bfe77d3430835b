use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use ::config::{
    builder::DefaultState, Config, ConfigBuilder, Environment, File, FileFormat, FileSourceFile,
};
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};

use crate::errors::ConfigError;

/// Which platform store implementation to run against. Chosen once at
/// startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorePlatform {
    AppStore,
    GooglePlay,
    WindowsStore,
    /// In-process store backed by a local ledger file. Used on desktop builds
    /// and in tests.
    Generic,
}

/// Where the catalog comes from. With `Both`, the two lists are merged by item
/// id and backend entries win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    #[default]
    Backend,
    Store,
    Both,
}

impl CatalogSource {
    pub fn uses_backend(self) -> bool {
        matches!(self, CatalogSource::Backend | CatalogSource::Both)
    }

    pub fn uses_store(self) -> bool {
        matches!(self, CatalogSource::Store | CatalogSource::Both)
    }
}

/// Bounded retry of backend submissions. Store calls are never retried.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_backoff", rename = "backoff_ms")]
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Linear backoff: the n-th retry (1-based) waits n times the base delay.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(retry)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff: default_backoff(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct IapConfig {
    pub store_platform: StorePlatform,
    pub backend_base_url: String,
    #[serde(default)]
    pub catalog_source: CatalogSource,
    /// SKUs to ask the platform store about when it is a catalog source, and
    /// the SKUs the generic store sells.
    #[serde(default)]
    pub store_item_ids: Vec<String>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_store_timeout", rename = "store_timeout_ms")]
    pub store_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_backend_timeout", rename = "backend_timeout_ms")]
    pub backend_timeout: Duration,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Unfinished-transaction ledger of the generic store. Without it the
    /// ledger only lives in memory.
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
}

impl IapConfig {
    pub fn new(store_platform: StorePlatform, backend_base_url: impl Into<String>) -> Self {
        Self {
            store_platform,
            backend_base_url: backend_base_url.into(),
            catalog_source: CatalogSource::default(),
            store_item_ids: Vec::new(),
            store_timeout: default_store_timeout(),
            backend_timeout: default_backend_timeout(),
            retry: RetryPolicy::default(),
            ledger_path: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(json, FileFormat::Json)))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(json_file(path.as_ref())))
    }

    /// Reads `IAP_*` environment variables. Nested keys use a double
    /// underscore (`IAP_RETRY__MAX_RETRIES`), `IAP_STORE_ITEM_IDS` is comma
    /// separated. `IAP_STORE_PLATFORM` and `IAP_BACKEND_BASE_URL` are
    /// required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(environment()))
    }

    /// JSON file first, then `IAP_*` environment variables on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::build(
            Config::builder()
                .add_source(json_file(path.as_ref()))
                .add_source(environment()),
        )
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        Ok(builder.build()?.try_deserialize()?)
    }
}

fn json_file(path: &Path) -> File<FileSourceFile, FileFormat> {
    File::from(path).format(FileFormat::Json)
}

fn environment() -> Environment {
    Environment::with_prefix("IAP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("store_item_ids")
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_backend_timeout() -> Duration {
    Duration::from_secs(15)
}
