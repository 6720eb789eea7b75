use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::locale::LocalePair;
use crate::media::{CdnMediaResolver, ImageSize};
use crate::ranking::{RankingSettings, RankingWeights, DEFAULT_WEIGHTS};
use crate::sync_engine::SyncEngineConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub locales: LocalesConfig,
    pub sync: SyncConfig,
    pub ranking: RankingConfig,
    pub media: MediaConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LocalesConfig {
    pub default: String,
    pub alternate: String,
}

impl LocalesConfig {
    pub fn pair(&self) -> LocalePair {
        LocalePair::new(self.default.clone(), self.alternate.clone())
    }
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub max_retries: u32,
    pub retry_base_delay_secs: i64,
    pub retry_backoff_multiplier: u32,
    pub claim_timeout_secs: i64,
    pub worker_concurrency: usize,
    pub poll_interval_millis: u64,
    /// Periodic re-enqueue of every published variant; 0 disables the sweep.
    pub sweep_interval_secs: u64,
}

impl SyncConfig {
    pub fn engine_config(&self) -> SyncEngineConfig {
        SyncEngineConfig {
            claim_timeout_seconds: self.claim_timeout_secs,
            default_max_retries: self.max_retries,
            retry_backoff_multiplier: self.retry_backoff_multiplier,
            retry_base_delay_seconds: self.retry_base_delay_secs,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RankingConfig {
    pub limit: usize,
    pub computation_version: u32,
    pub bucket_cap: usize,
    pub price_band_pct: u32,
    pub weights: RankingWeights,
}

impl RankingConfig {
    pub fn settings(&self) -> RankingSettings {
        RankingSettings {
            weights: self.weights,
            price_band_pct: self.price_band_pct,
            bucket_cap: self.bucket_cap,
            computation_version: self.computation_version,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MediaConfig {
    pub base_url: String,
    pub primary_size: ImageSize,
}

impl MediaConfig {
    pub fn resolver(&self) -> CdnMediaResolver {
        CdnMediaResolver::new(self.base_url.clone(), self.primary_size)
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub sync_max_retries: Option<u32>,
    pub ranking_limit: Option<usize>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://vinoteka.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            locales: LocalesConfig { default: "sl".to_string(), alternate: "en".to_string() },
            sync: SyncConfig {
                max_retries: 2,
                retry_base_delay_secs: 5,
                retry_backoff_multiplier: 2,
                claim_timeout_secs: 300,
                worker_concurrency: 4,
                poll_interval_millis: 500,
                sweep_interval_secs: 0,
            },
            ranking: RankingConfig {
                limit: crate::ranking::DEFAULT_RELATED_LIMIT,
                computation_version: crate::ranking::DEFAULT_COMPUTATION_VERSION,
                bucket_cap: crate::ranking::DEFAULT_BUCKET_CAP,
                price_band_pct: crate::ranking::DEFAULT_PRICE_BAND_PCT,
                weights: DEFAULT_WEIGHTS,
            },
            media: MediaConfig {
                base_url: "http://localhost:8081/media".to_string(),
                primary_size: ImageSize::Card,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("vinoteka.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(locales) = patch.locales {
            if let Some(default) = locales.default {
                self.locales.default = default;
            }
            if let Some(alternate) = locales.alternate {
                self.locales.alternate = alternate;
            }
        }

        if let Some(sync) = patch.sync {
            if let Some(max_retries) = sync.max_retries {
                self.sync.max_retries = max_retries;
            }
            if let Some(retry_base_delay_secs) = sync.retry_base_delay_secs {
                self.sync.retry_base_delay_secs = retry_base_delay_secs;
            }
            if let Some(retry_backoff_multiplier) = sync.retry_backoff_multiplier {
                self.sync.retry_backoff_multiplier = retry_backoff_multiplier;
            }
            if let Some(claim_timeout_secs) = sync.claim_timeout_secs {
                self.sync.claim_timeout_secs = claim_timeout_secs;
            }
            if let Some(worker_concurrency) = sync.worker_concurrency {
                self.sync.worker_concurrency = worker_concurrency;
            }
            if let Some(poll_interval_millis) = sync.poll_interval_millis {
                self.sync.poll_interval_millis = poll_interval_millis;
            }
            if let Some(sweep_interval_secs) = sync.sweep_interval_secs {
                self.sync.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(ranking) = patch.ranking {
            if let Some(limit) = ranking.limit {
                self.ranking.limit = limit;
            }
            if let Some(computation_version) = ranking.computation_version {
                self.ranking.computation_version = computation_version;
            }
            if let Some(bucket_cap) = ranking.bucket_cap {
                self.ranking.bucket_cap = bucket_cap;
            }
            if let Some(price_band_pct) = ranking.price_band_pct {
                self.ranking.price_band_pct = price_band_pct;
            }
            if let Some(weights) = ranking.weights {
                let current = &mut self.ranking.weights;
                current.producer = weights.producer.unwrap_or(current.producer);
                current.grape_variety = weights.grape_variety.unwrap_or(current.grape_variety);
                current.region = weights.region.unwrap_or(current.region);
                current.price_band = weights.price_band.unwrap_or(current.price_band);
                current.curated = weights.curated.unwrap_or(current.curated);
            }
        }

        if let Some(media) = patch.media {
            if let Some(base_url) = media.base_url {
                self.media.base_url = base_url;
            }
            if let Some(primary_size) = media.primary_size {
                self.media.primary_size = parse_image_size("media.primary_size", &primary_size)?;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("VINOTEKA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("VINOTEKA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("VINOTEKA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("VINOTEKA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("VINOTEKA_LOCALES_DEFAULT") {
            self.locales.default = value;
        }
        if let Some(value) = read_env("VINOTEKA_LOCALES_ALTERNATE") {
            self.locales.alternate = value;
        }

        if let Some(value) = read_env("VINOTEKA_SYNC_MAX_RETRIES") {
            self.sync.max_retries = parse_env("VINOTEKA_SYNC_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_SYNC_RETRY_BASE_DELAY_SECS") {
            self.sync.retry_base_delay_secs =
                parse_env("VINOTEKA_SYNC_RETRY_BASE_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_SYNC_RETRY_BACKOFF_MULTIPLIER") {
            self.sync.retry_backoff_multiplier =
                parse_env("VINOTEKA_SYNC_RETRY_BACKOFF_MULTIPLIER", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_SYNC_CLAIM_TIMEOUT_SECS") {
            self.sync.claim_timeout_secs = parse_env("VINOTEKA_SYNC_CLAIM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_SYNC_WORKER_CONCURRENCY") {
            self.sync.worker_concurrency =
                parse_env("VINOTEKA_SYNC_WORKER_CONCURRENCY", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_SYNC_POLL_INTERVAL_MILLIS") {
            self.sync.poll_interval_millis =
                parse_env("VINOTEKA_SYNC_POLL_INTERVAL_MILLIS", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_SYNC_SWEEP_INTERVAL_SECS") {
            self.sync.sweep_interval_secs =
                parse_env("VINOTEKA_SYNC_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("VINOTEKA_RANKING_LIMIT") {
            self.ranking.limit = parse_env("VINOTEKA_RANKING_LIMIT", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_RANKING_COMPUTATION_VERSION") {
            self.ranking.computation_version =
                parse_env("VINOTEKA_RANKING_COMPUTATION_VERSION", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_RANKING_BUCKET_CAP") {
            self.ranking.bucket_cap = parse_env("VINOTEKA_RANKING_BUCKET_CAP", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_RANKING_PRICE_BAND_PCT") {
            self.ranking.price_band_pct = parse_env("VINOTEKA_RANKING_PRICE_BAND_PCT", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_RANKING_WEIGHT_PRODUCER") {
            self.ranking.weights.producer = parse_env("VINOTEKA_RANKING_WEIGHT_PRODUCER", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_RANKING_WEIGHT_GRAPE_VARIETY") {
            self.ranking.weights.grape_variety =
                parse_env("VINOTEKA_RANKING_WEIGHT_GRAPE_VARIETY", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_RANKING_WEIGHT_REGION") {
            self.ranking.weights.region = parse_env("VINOTEKA_RANKING_WEIGHT_REGION", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_RANKING_WEIGHT_PRICE_BAND") {
            self.ranking.weights.price_band =
                parse_env("VINOTEKA_RANKING_WEIGHT_PRICE_BAND", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_RANKING_WEIGHT_CURATED") {
            self.ranking.weights.curated = parse_env("VINOTEKA_RANKING_WEIGHT_CURATED", &value)?;
        }

        if let Some(value) = read_env("VINOTEKA_MEDIA_BASE_URL") {
            self.media.base_url = value;
        }
        if let Some(value) = read_env("VINOTEKA_MEDIA_PRIMARY_SIZE") {
            self.media.primary_size = parse_image_size("VINOTEKA_MEDIA_PRIMARY_SIZE", &value)?;
        }

        if let Some(value) = read_env("VINOTEKA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("VINOTEKA_SERVER_PORT") {
            self.server.port = parse_env("VINOTEKA_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("VINOTEKA_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("VINOTEKA_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("VINOTEKA_LOGGING_LEVEL").or_else(|| read_env("VINOTEKA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("VINOTEKA_LOGGING_FORMAT").or_else(|| read_env("VINOTEKA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(max_retries) = overrides.sync_max_retries {
            self.sync.max_retries = max_retries;
        }
        if let Some(limit) = overrides.ranking_limit {
            self.ranking.limit = limit;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_locales(&self.locales)?;
        validate_sync(&self.sync)?;
        validate_ranking(&self.ranking)?;
        validate_media(&self.media)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("vinoteka.toml"), PathBuf::from("config/vinoteka.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_locales(locales: &LocalesConfig) -> Result<(), ConfigError> {
    let default = locales.default.trim();
    let alternate = locales.alternate.trim();
    if default.is_empty() || alternate.is_empty() {
        return Err(ConfigError::Validation(
            "locales.default and locales.alternate are both required".to_string(),
        ));
    }
    if default.eq_ignore_ascii_case(alternate) {
        return Err(ConfigError::Validation(format!(
            "locales.default and locales.alternate must differ (both are `{default}`)"
        )));
    }
    Ok(())
}

fn validate_sync(sync: &SyncConfig) -> Result<(), ConfigError> {
    if sync.max_retries > 10 {
        return Err(ConfigError::Validation("sync.max_retries must be at most 10".to_string()));
    }
    if sync.retry_base_delay_secs < 0 {
        return Err(ConfigError::Validation(
            "sync.retry_base_delay_secs must not be negative".to_string(),
        ));
    }
    if sync.retry_backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "sync.retry_backoff_multiplier must be at least 1".to_string(),
        ));
    }
    if sync.claim_timeout_secs <= 0 {
        return Err(ConfigError::Validation(
            "sync.claim_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if sync.worker_concurrency == 0 || sync.worker_concurrency > 64 {
        return Err(ConfigError::Validation(
            "sync.worker_concurrency must be in range 1..=64".to_string(),
        ));
    }
    if sync.poll_interval_millis == 0 {
        return Err(ConfigError::Validation(
            "sync.poll_interval_millis must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_ranking(ranking: &RankingConfig) -> Result<(), ConfigError> {
    if ranking.limit == 0 || ranking.limit > 200 {
        return Err(ConfigError::Validation("ranking.limit must be in range 1..=200".to_string()));
    }
    if ranking.computation_version == 0 {
        return Err(ConfigError::Validation(
            "ranking.computation_version must be at least 1".to_string(),
        ));
    }
    if ranking.bucket_cap == 0 {
        return Err(ConfigError::Validation(
            "ranking.bucket_cap must be greater than zero".to_string(),
        ));
    }
    if ranking.price_band_pct == 0 || ranking.price_band_pct >= 100 {
        return Err(ConfigError::Validation(
            "ranking.price_band_pct must be in range 1..=99".to_string(),
        ));
    }

    let weights = [
        ("producer", ranking.weights.producer),
        ("grape_variety", ranking.weights.grape_variety),
        ("region", ranking.weights.region),
        ("price_band", ranking.weights.price_band),
        ("curated", ranking.weights.curated),
    ];
    for (name, weight) in weights {
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            return Err(ConfigError::Validation(format!(
                "ranking.weights.{name} must be within 0.0..=1.0 (got {weight})"
            )));
        }
    }

    Ok(())
}

fn validate_media(media: &MediaConfig) -> Result<(), ConfigError> {
    let base_url = media.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "media.base_url must start with http:// or https://".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_image_size(key: &str, value: &str) -> Result<ImageSize, ConfigError> {
    ImageSize::parse(value).ok_or_else(|| {
        ConfigError::Validation(format!(
            "{key} must be one of thumbnail|card|hero (got `{value}`)"
        ))
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    locales: Option<LocalesPatch>,
    sync: Option<SyncPatch>,
    ranking: Option<RankingPatch>,
    media: Option<MediaPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LocalesPatch {
    default: Option<String>,
    alternate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncPatch {
    max_retries: Option<u32>,
    retry_base_delay_secs: Option<i64>,
    retry_backoff_multiplier: Option<u32>,
    claim_timeout_secs: Option<i64>,
    worker_concurrency: Option<usize>,
    poll_interval_millis: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RankingPatch {
    limit: Option<usize>,
    computation_version: Option<u32>,
    bucket_cap: Option<usize>,
    price_band_pct: Option<u32>,
    weights: Option<WeightsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WeightsPatch {
    producer: Option<f64>,
    grape_variety: Option<f64>,
    region: Option<f64>,
    price_band: Option<f64>,
    curated: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaPatch {
    base_url: Option<String>,
    primary_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::media::ImageSize;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_carry_ranking_constants() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.sync.max_retries == 2, "default retry budget should be 2")?;
        ensure(config.ranking.limit == 20, "default related limit should be 20")?;
        ensure(config.ranking.price_band_pct == 30, "default price band should be 30%")?;
        ensure(config.ranking.weights.producer == 0.8, "producer weight should be 0.8")?;
        ensure(config.ranking.weights.price_band == 0.5, "price weight should be 0.5")?;
        ensure(config.sync.sweep_interval_secs == 0, "sweep should be disabled by default")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_VINOTEKA_CDN", "https://cdn.vinoteka.test");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("vinoteka.toml");
            fs::write(
                &path,
                r#"
[media]
base_url = "${TEST_VINOTEKA_CDN}/images"
primary_size = "hero"

[ranking.weights]
region = 0.65
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.media.base_url == "https://cdn.vinoteka.test/images",
                "media base url should be interpolated from environment",
            )?;
            ensure(config.media.primary_size == ImageSize::Hero, "primary size should be hero")?;
            ensure(config.ranking.weights.region == 0.65, "region weight should come from file")?;
            ensure(
                config.ranking.weights.producer == 0.8,
                "unset weights should keep their defaults",
            )
        })();

        clear_vars(&["TEST_VINOTEKA_CDN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VINOTEKA_LOG_LEVEL", "warn");
        env::set_var("VINOTEKA_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["VINOTEKA_LOG_LEVEL", "VINOTEKA_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VINOTEKA_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("VINOTEKA_SYNC_MAX_RETRIES", "4");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("vinoteka.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[sync]
max_retries = 3
worker_concurrency = 8

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.sync.max_retries == 4, "env retry budget should win over file")?;
            ensure(config.sync.worker_concurrency == 8, "file concurrency should win over default")
        })();

        clear_vars(&["VINOTEKA_DATABASE_URL", "VINOTEKA_SYNC_MAX_RETRIES"]);
        result
    }

    #[test]
    fn identical_locales_fail_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VINOTEKA_LOCALES_ALTERNATE", "SL");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("must differ")
            );
            ensure(has_message, "validation failure should mention that locales must differ")
        })();

        clear_vars(&["VINOTEKA_LOCALES_ALTERNATE"]);
        result
    }

    #[test]
    fn out_of_range_weight_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VINOTEKA_RANKING_WEIGHT_PRODUCER", "1.5");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected weight validation failure".to_string()),
            Err(ConfigError::Validation(message)) => ensure(
                message.contains("ranking.weights.producer"),
                "validation failure should name the weight",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["VINOTEKA_RANKING_WEIGHT_PRODUCER"]);
        result
    }

    #[test]
    fn malformed_env_number_reports_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VINOTEKA_RANKING_LIMIT", "twenty");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected env override failure".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "VINOTEKA_RANKING_LIMIT", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["VINOTEKA_RANKING_LIMIT"]);
        result
    }
}
