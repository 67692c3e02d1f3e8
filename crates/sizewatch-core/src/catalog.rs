//! Product catalog: the `(id, name, update)` rows that drive a run.
//!
//! Catalogs are usually exported from a spreadsheet, so both the id and the
//! update flag accept whatever a cell export produces: `id: 1001` and
//! `id: "1001"` are the same product, and `update` accepts `true`, `1`,
//! `"1"`, or `"yes"`.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Display name; also used as the marketplace search keyword.
    pub name: String,
    /// Only products with the flag set are processed in a run.
    #[serde(default, deserialize_with = "deserialize_update_flag")]
    pub update: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub products: Vec<CatalogProduct>,
}

impl CatalogFile {
    /// Products flagged for update, in catalog order.
    pub fn targets(&self) -> impl Iterator<Item = &CatalogProduct> {
        self.products.iter().filter(|p| p.update)
    }
}

/// Load and validate the catalog from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<CatalogFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_catalog(&content, &path.display().to_string())
}

/// Parse and validate catalog YAML. `origin` is only used in error messages.
///
/// # Errors
///
/// Returns `ConfigError::FileParse` for malformed YAML and
/// `ConfigError::Validation` for empty or duplicate ids and names.
pub fn parse_catalog(content: &str, origin: &str) -> Result<CatalogFile, ConfigError> {
    let catalog: CatalogFile =
        serde_yaml::from_str(content).map_err(|e| ConfigError::FileParse {
            path: origin.to_string(),
            source: e,
        })?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &CatalogFile) -> Result<(), ConfigError> {
    let mut seen_ids = HashSet::new();

    for product in &catalog.products {
        if product.id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "catalog product '{}' has an empty id",
                product.name
            )));
        }

        if product.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "catalog product '{}' has an empty name",
                product.id
            )));
        }

        if !seen_ids.insert(product.id.trim().to_string()) {
            return Err(ConfigError::Validation(format!(
                "duplicate catalog id: '{}'",
                product.id
            )));
        }
    }

    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Bool(bool),
    Int(i64),
    Text(String),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Cell::deserialize(deserializer)? {
        Cell::Int(n) => Ok(n.to_string()),
        Cell::Text(s) => Ok(s.trim().to_string()),
        Cell::Bool(_) => Err(serde::de::Error::custom("catalog id must be a string or integer")),
    }
}

fn deserialize_update_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let flag = match Option::<Cell>::deserialize(deserializer)? {
        None => false,
        Some(Cell::Bool(b)) => b,
        Some(Cell::Int(n)) => n == 1,
        Some(Cell::Text(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        ),
    };
    Ok(flag)
}
