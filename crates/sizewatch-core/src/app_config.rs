use std::path::PathBuf;

/// What the reconciler does with a previously stored size that the current
/// run did not reconfirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationPolicy {
    /// Rewrite the row with `price = 0` and an empty URL.
    #[default]
    ZeroMissing,
    /// Leave the stored row untouched; only write what was found.
    KeepOnlyFound,
}

impl std::fmt::Display for InvalidationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationPolicy::ZeroMissing => write!(f, "zero"),
            InvalidationPolicy::KeepOnlyFound => write!(f, "keep"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_level: String,
    pub catalog_path: PathBuf,
    pub sources_path: Option<PathBuf>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub scroll_iterations: u32,
    pub scroll_pause_ms: u64,
    pub settle_pause_ms: u64,
    pub detail_pause_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub keyword_cooldown_ms: u64,
    pub min_page_text_len: usize,
    pub facet_poll_attempts: u32,
    pub invalidation: InvalidationPolicy,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("log_level", &self.log_level)
            .field("catalog_path", &self.catalog_path)
            .field("sources_path", &self.sources_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("scroll_iterations", &self.scroll_iterations)
            .field("scroll_pause_ms", &self.scroll_pause_ms)
            .field("settle_pause_ms", &self.settle_pause_ms)
            .field("detail_pause_ms", &self.detail_pause_ms)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("keyword_cooldown_ms", &self.keyword_cooldown_ms)
            .field("min_page_text_len", &self.min_page_text_len)
            .field("facet_poll_attempts", &self.facet_poll_attempts)
            .field("invalidation", &self.invalidation)
            .finish()
    }
}
