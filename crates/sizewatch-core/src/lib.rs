pub mod app_config;
pub mod catalog;
pub mod config;
pub mod rows;
pub mod sources;

pub use app_config::{AppConfig, InvalidationPolicy};
pub use catalog::{load_catalog, parse_catalog, CatalogFile, CatalogProduct};
pub use config::{load_app_config_from_env, log_level_from_env, sources_path_from_env};
pub use rows::{
    AggregatedEntry, CanonicalSize, ListingCandidate, PriceRow, ResolvedSize, RowKey, SizeMap,
};
pub use sources::{
    builtin_sources, load_sources, validate_sources, DetailRules, FacetSize, ListingRules,
    QueryParam, SearchMode, SizeFacet, SourceConfig,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    FileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation error: {0}")]
    Validation(String),
}
