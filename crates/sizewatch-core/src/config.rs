use std::env::VarError;
use std::path::PathBuf;

use crate::app_config::{AppConfig, InvalidationPolicy};
use crate::ConfigError;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Load application configuration from environment variables already in the process.
///
/// Does NOT load `.env` files; the binary calls `dotenvy::dotenv()` once at startup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// `SIZEWATCH_LOG_LEVEL`, read without requiring the rest of the configuration.
#[must_use]
pub fn log_level_from_env() -> String {
    log_level(|key| std::env::var(key))
}

/// `SIZEWATCH_SOURCES_PATH`, read without requiring the rest of the configuration.
#[must_use]
pub fn sources_path_from_env() -> Option<PathBuf> {
    sources_path(|key| std::env::var(key))
}

fn log_level<F>(lookup: F) -> String
where
    F: Fn(&str) -> Result<String, VarError>,
{
    lookup("SIZEWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn sources_path<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    lookup("SIZEWATCH_SOURCES_PATH").ok().map(PathBuf::from)
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = require("DATABASE_URL")?;

    let log_level = log_level(&lookup);
    let catalog_path = PathBuf::from(or_default(
        "SIZEWATCH_CATALOG_PATH",
        "./config/catalog.yaml",
    ));
    let sources_path = sources_path(&lookup);

    let db_max_connections = parse_u32("SIZEWATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SIZEWATCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SIZEWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "SIZEWATCH_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        });
    }

    let fetch_timeout_secs = parse_u64("SIZEWATCH_FETCH_TIMEOUT_SECS", "120")?;
    let user_agent = or_default("SIZEWATCH_USER_AGENT", DEFAULT_USER_AGENT);
    let scroll_iterations = parse_u32("SIZEWATCH_SCROLL_ITERATIONS", "5")?;
    let scroll_pause_ms = parse_u64("SIZEWATCH_SCROLL_PAUSE_MS", "1200")?;
    let settle_pause_ms = parse_u64("SIZEWATCH_SETTLE_PAUSE_MS", "3000")?;
    let detail_pause_ms = parse_u64("SIZEWATCH_DETAIL_PAUSE_MS", "1500")?;
    let max_attempts = parse_u32("SIZEWATCH_MAX_ATTEMPTS", "2")?;
    let retry_backoff_ms = parse_u64("SIZEWATCH_RETRY_BACKOFF_MS", "2000")?;
    let keyword_cooldown_ms = parse_u64("SIZEWATCH_KEYWORD_COOLDOWN_MS", "3000")?;
    let min_page_text_len = parse_usize("SIZEWATCH_MIN_PAGE_TEXT_LEN", "200")?;
    let facet_poll_attempts = parse_u32("SIZEWATCH_FACET_POLL_ATTEMPTS", "10")?;
    let invalidation = parse_invalidation(&or_default("SIZEWATCH_INVALIDATION", "zero"))?;

    if max_attempts == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "SIZEWATCH_MAX_ATTEMPTS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(AppConfig {
        database_url,
        log_level,
        catalog_path,
        sources_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        fetch_timeout_secs,
        user_agent,
        scroll_iterations,
        scroll_pause_ms,
        settle_pause_ms,
        detail_pause_ms,
        max_attempts,
        retry_backoff_ms,
        keyword_cooldown_ms,
        min_page_text_len,
        facet_poll_attempts,
        invalidation,
    })
}

fn parse_invalidation(s: &str) -> Result<InvalidationPolicy, ConfigError> {
    match s {
        "zero" => Ok(InvalidationPolicy::ZeroMissing),
        "keep" => Ok(InvalidationPolicy::KeepOnlyFound),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SIZEWATCH_INVALIDATION".to_string(),
            reason: format!("unknown policy '{other}'; expected zero or keep"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
