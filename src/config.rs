//! Pipeline configuration, loaded from environment variables with the
//! same `from_env()` + `validate()` + `Default`-per-section shape as the
//! rest of this corpus.
//!
//! Environment variables follow the pattern `TWIN_UPDATER_<SECTION>_<KEY>`.

use std::env;
use std::time::Duration;

use crate::ask::AskConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub search: SearchConfig,
    pub cache: CachesConfig,
    pub ask: AskConfig,
    pub updater: UpdaterConfig,
    pub shutdown: ShutdownConfig,
    pub logging: LoggingConfig,
}

/// Enforcement-flow and bulk-writer tuning (`maxArraySize`, `maxBulkSize`,
/// `maxBulkDelay`, `parallelism`, `patchSizeThreshold`).
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_array_size: usize,
    pub max_bulk_size: usize,
    pub max_bulk_delay: Duration,
    pub parallelism: usize,
    pub patch_size_threshold: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_array_size: 100,
            max_bulk_size: 100,
            max_bulk_delay: Duration::from_millis(500),
            parallelism: 8,
            patch_size_threshold: 4096,
        }
    }
}

/// One `cache.{thing,policy}.{capacity,ttl,dispatcher,retryDelay}` section.
/// `dispatcher` names the logical executor the upstream (actor-based)
/// source ran the cache's loader on; this runtime has a single shared
/// tokio thread pool, so the value is carried through for parity and
/// surfaced only in the startup log, never consulted by the cache itself.
#[derive(Debug, Clone)]
pub struct CacheSection {
    pub capacity: usize,
    pub ttl: Duration,
    pub dispatcher: String,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct CachesConfig {
    pub thing: CacheSection,
    pub policy: CacheSection,
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            thing: CacheSection {
                capacity: 10_000,
                ttl: Duration::from_secs(300),
                dispatcher: "default".to_string(),
                retry_delay: Duration::from_millis(0),
            },
            policy: CacheSection {
                capacity: 5_000,
                ttl: Duration::from_secs(300),
                dispatcher: "default".to_string(),
                retry_delay: Duration::from_millis(50),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub idle_timeout: Duration,
    pub max_retries: u32,
    pub max_stash_events: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            max_retries: 3,
            max_stash_events: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout: Duration::from_secs(30) }
    }
}

/// Log level (default: "info") and format (default: "pretty", also
/// accepts "json"/"compact").
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            cache: CachesConfig::default(),
            ask: AskConfig::default(),
            updater: UpdaterConfig::default(),
            shutdown: ShutdownConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn env_usize(name: &str, current: &mut usize) {
    if let Ok(v) = env::var(name) {
        if let Ok(v) = v.parse() {
            *current = v;
        }
    }
}

fn env_u32(name: &str, current: &mut u32) {
    if let Ok(v) = env::var(name) {
        if let Ok(v) = v.parse() {
            *current = v;
        }
    }
}

fn env_millis(name: &str, current: &mut Duration) {
    if let Ok(v) = env::var(name) {
        if let Ok(ms) = v.parse::<u64>() {
            *current = Duration::from_millis(ms);
        }
    }
}

fn env_string(name: &str, current: &mut String) {
    if let Ok(v) = env::var(name) {
        *current = v;
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        env_usize("TWIN_UPDATER_SEARCH_MAX_ARRAY_SIZE", &mut config.search.max_array_size);
        env_usize("TWIN_UPDATER_SEARCH_MAX_BULK_SIZE", &mut config.search.max_bulk_size);
        env_millis("TWIN_UPDATER_SEARCH_MAX_BULK_DELAY_MS", &mut config.search.max_bulk_delay);
        env_usize("TWIN_UPDATER_SEARCH_PARALLELISM", &mut config.search.parallelism);
        env_usize("TWIN_UPDATER_SEARCH_PATCH_SIZE_THRESHOLD", &mut config.search.patch_size_threshold);

        env_usize("TWIN_UPDATER_CACHE_THING_CAPACITY", &mut config.cache.thing.capacity);
        env_millis("TWIN_UPDATER_CACHE_THING_TTL_MS", &mut config.cache.thing.ttl);
        env_string("TWIN_UPDATER_CACHE_THING_DISPATCHER", &mut config.cache.thing.dispatcher);
        env_millis("TWIN_UPDATER_CACHE_THING_RETRY_DELAY_MS", &mut config.cache.thing.retry_delay);

        env_usize("TWIN_UPDATER_CACHE_POLICY_CAPACITY", &mut config.cache.policy.capacity);
        env_millis("TWIN_UPDATER_CACHE_POLICY_TTL_MS", &mut config.cache.policy.ttl);
        env_string("TWIN_UPDATER_CACHE_POLICY_DISPATCHER", &mut config.cache.policy.dispatcher);
        env_millis("TWIN_UPDATER_CACHE_POLICY_RETRY_DELAY_MS", &mut config.cache.policy.retry_delay);

        env_millis("TWIN_UPDATER_ASK_TIMEOUT_MS", &mut config.ask.timeout);
        env_u32("TWIN_UPDATER_ASK_RETRIES", &mut config.ask.retries);
        env_millis("TWIN_UPDATER_ASK_BACKOFF_MS", &mut config.ask.backoff);

        env_millis("TWIN_UPDATER_UPDATER_IDLE_TIMEOUT_MS", &mut config.updater.idle_timeout);
        env_u32("TWIN_UPDATER_UPDATER_MAX_RETRIES", &mut config.updater.max_retries);
        env_usize("TWIN_UPDATER_UPDATER_MAX_STASH_EVENTS", &mut config.updater.max_stash_events);

        env_millis("TWIN_UPDATER_SHUTDOWN_DRAIN_TIMEOUT_MS", &mut config.shutdown.drain_timeout);

        env_string("TWIN_UPDATER_LOGGING_LEVEL", &mut config.logging.level);
        env_string("TWIN_UPDATER_LOGGING_FORMAT", &mut config.logging.format);

        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.search.max_array_size == 0 {
            return Err("search.max_array_size cannot be 0".to_string());
        }
        if self.search.max_bulk_size == 0 {
            return Err("search.max_bulk_size cannot be 0".to_string());
        }
        if self.search.parallelism == 0 {
            return Err("search.parallelism cannot be 0".to_string());
        }
        if self.cache.thing.capacity == 0 || self.cache.policy.capacity == 0 {
            return Err("cache capacity cannot be 0".to_string());
        }
        if self.ask.timeout.is_zero() {
            return Err("ask.timeout cannot be 0".to_string());
        }
        if self.updater.idle_timeout.is_zero() {
            return Err("updater.idle_timeout cannot be 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "invalid logging.level '{}': valid values are {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(format!(
                "invalid logging.format '{}': valid values are {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        Ok(())
    }
}
