use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use vinoteka_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in effective_values(&config) {
        let source = field_source(key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    let weights = &config.ranking.weights;
    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("locales.default", config.locales.default.clone()),
        ("locales.alternate", config.locales.alternate.clone()),
        ("sync.max_retries", config.sync.max_retries.to_string()),
        ("sync.retry_base_delay_secs", config.sync.retry_base_delay_secs.to_string()),
        ("sync.retry_backoff_multiplier", config.sync.retry_backoff_multiplier.to_string()),
        ("sync.claim_timeout_secs", config.sync.claim_timeout_secs.to_string()),
        ("sync.worker_concurrency", config.sync.worker_concurrency.to_string()),
        ("sync.poll_interval_millis", config.sync.poll_interval_millis.to_string()),
        ("sync.sweep_interval_secs", config.sync.sweep_interval_secs.to_string()),
        ("ranking.limit", config.ranking.limit.to_string()),
        ("ranking.computation_version", config.ranking.computation_version.to_string()),
        ("ranking.bucket_cap", config.ranking.bucket_cap.to_string()),
        ("ranking.price_band_pct", config.ranking.price_band_pct.to_string()),
        ("ranking.weights.producer", weights.producer.to_string()),
        ("ranking.weights.grape_variety", weights.grape_variety.to_string()),
        ("ranking.weights.region", weights.region.to_string()),
        ("ranking.weights.price_band", weights.price_band.to_string()),
        ("ranking.weights.curated", weights.curated.to_string()),
        ("media.base_url", config.media.base_url.clone()),
        ("media.primary_size", format!("{:?}", config.media.primary_size)),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ]
}

/// `ranking.weights.curated` -> `VINOTEKA_RANKING_WEIGHT_CURATED`.
fn env_key(key_path: &str) -> String {
    let flattened = key_path.replace("weights.", "weight_").replace('.', "_");
    format!("VINOTEKA_{}", flattened.to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("vinoteka.toml"), PathBuf::from("config/vinoteka.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let env_key = env_key(key_path);
    if env::var_os(&env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
