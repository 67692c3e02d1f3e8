//! Marketplace source definitions.
//!
//! A [`SourceConfig`] carries everything that differs between marketplaces:
//! URL shapes, search filters, the JSON field names used for eligibility,
//! the detail-page size lookup chain, and (for facet-searchable sources) the
//! size-facet table. One engine runs every source from this description.

use std::collections::HashSet;
use std::path::Path;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// RFC 3986 unreserved characters stay literal; everything else is escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// One keyword search, then a detail-page visit per candidate to learn its size.
    #[default]
    Candidates,
    /// One search per size using the marketplace's size facet; no detail visits.
    SizeFacet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    pub value: String,
}

impl QueryParam {
    #[must_use]
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Field names and sentinel values used to decide whether a search-result
/// entry is an eligible candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingRules {
    /// JSON paths to the item array; the first non-empty array wins.
    pub items_paths: Vec<Vec<String>>,
    /// Synonymous id fields, tried in order.
    pub id_fields: Vec<String>,
    /// Synonymous price fields, tried in order.
    pub price_fields: Vec<String>,
    /// Condition-code field. `None` when the search URL already filters on condition.
    pub condition_field: Option<String>,
    pub new_condition_values: Vec<String>,
    /// When set, an entry must positively confirm it is for sale.
    pub require_on_sale: bool,
    pub status_fields: Vec<String>,
    pub on_sale_values: Vec<String>,
}

impl Default for ListingRules {
    fn default() -> Self {
        Self {
            items_paths: vec![path(&["items"])],
            id_fields: strings(&["id", "itemId"]),
            price_fields: strings(&["price"]),
            condition_field: None,
            new_condition_values: strings(&["1"]),
            require_on_sale: false,
            status_fields: strings(&["status", "itemStatus", "saleStatus", "open"]),
            on_sale_values: strings(&["open", "on_sale", "1", "true"]),
        }
    }
}

/// Detail-page size lookup chain and listing re-checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailRules {
    /// Path inside the embedded `__NEXT_DATA__` block to the item-size label.
    pub size_path: Vec<String>,
    /// Visible-text fallbacks, tried in order; group 1 is the size label.
    pub size_patterns: Vec<String>,
    /// Optional on-sale flag inside `__NEXT_DATA__`.
    pub status_path: Option<Vec<String>>,
    pub on_sale_values: Vec<String>,
    /// Optional condition code inside `__NEXT_DATA__`.
    pub condition_path: Option<Vec<String>>,
    pub new_condition_values: Vec<String>,
}

impl Default for DetailRules {
    fn default() -> Self {
        Self {
            size_path: Vec::new(),
            size_patterns: Vec::new(),
            status_path: None,
            on_sale_values: strings(&["open", "on_sale", "1", "true"]),
            condition_path: None,
            new_condition_values: strings(&["1"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetSize {
    /// Size label as the marketplace shows it, e.g. `"27.5cm"`.
    pub label: String,
    pub value_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeFacet {
    /// Query parameter carrying the facet filter.
    pub param: String,
    pub facet_id: u64,
    /// `{facet}` and `{value}` are substituted.
    #[serde(default = "default_facet_format")]
    pub value_format: String,
    pub sizes: Vec<FacetSize>,
}

impl SizeFacet {
    #[must_use]
    pub fn filter_for(&self, size: &FacetSize) -> QueryParam {
        QueryParam {
            name: self.param.clone(),
            value: self
                .value_format
                .replace("{facet}", &self.facet_id.to_string())
                .replace("{value}", &size.value_id.to_string()),
        }
    }
}

fn default_facet_format() -> String {
    "C_{facet}:{value}".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Short code written to the store's `SOURCE` column, e.g. `"ME"`.
    pub code: String,
    pub name: String,
    pub base_url: String,
    /// Search URL; a `{keyword}` placeholder is replaced by the encoded keyword.
    pub search_url: String,
    /// Query parameter for the keyword when the URL has no placeholder.
    #[serde(default)]
    pub keyword_param: Option<String>,
    /// Fixed search filters (condition, status, sort order).
    #[serde(default)]
    pub search_params: Vec<QueryParam>,
    #[serde(default)]
    pub mode: SearchMode,
    /// URL substrings identifying search-result JSON responses.
    #[serde(default)]
    pub search_endpoint_patterns: Vec<String>,
    /// Page-number parameter used to emulate infinite scroll over plain HTTP.
    #[serde(default)]
    pub scroll_page_param: Option<String>,
    /// Detail path relative to `base_url`; `{id}` is substituted.
    pub detail_path: String,
    /// Tracking parameter appended to stored URLs only.
    #[serde(default)]
    pub affiliate: Option<QueryParam>,
    #[serde(default)]
    pub listing: ListingRules,
    #[serde(default)]
    pub detail: DetailRules,
    #[serde(default)]
    pub size_facet: Option<SizeFacet>,
}

impl SourceConfig {
    /// Builds the search URL for `keyword` plus the fixed filters and any
    /// `extra` parameters (e.g. a facet filter).
    #[must_use]
    pub fn search_url(&self, keyword: &str, extra: &[QueryParam]) -> String {
        let has_placeholder = self.search_url.contains("{keyword}");
        let mut url = if has_placeholder {
            self.search_url.replace(
                "{keyword}",
                &utf8_percent_encode(keyword, QUERY_VALUE).to_string(),
            )
        } else {
            self.search_url.clone()
        };

        let mut pairs: Vec<(&str, &str)> = Vec::new();
        if !has_placeholder {
            if let Some(param) = &self.keyword_param {
                pairs.push((param.as_str(), keyword));
            }
        }
        pairs.extend(
            self.search_params
                .iter()
                .chain(extra)
                .map(|p| (p.name.as_str(), p.value.as_str())),
        );

        append_query(&mut url, &pairs);
        url
    }

    /// Bare detail URL used for navigation.
    #[must_use]
    pub fn detail_url(&self, item_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.detail_path
                .replace("{id}", &utf8_percent_encode(item_id, QUERY_VALUE).to_string())
        )
    }

    /// Detail URL as written to the store: the bare URL plus the affiliate parameter.
    #[must_use]
    pub fn stored_url(&self, item_id: &str) -> String {
        let mut url = self.detail_url(item_id);
        if let Some(affiliate) = &self.affiliate {
            append_query(&mut url, &[(affiliate.name.as_str(), affiliate.value.as_str())]);
        }
        url
    }

    /// Mercari: keyword search, detail visits, `__NEXT_DATA__` item size.
    #[must_use]
    pub fn mercari() -> Self {
        Self {
            code: "ME".to_string(),
            name: "Mercari".to_string(),
            base_url: "https://jp.mercari.com".to_string(),
            search_url: "https://jp.mercari.com/search".to_string(),
            keyword_param: Some("keyword".to_string()),
            search_params: vec![QueryParam::new("status", "on_sale")],
            mode: SearchMode::Candidates,
            search_endpoint_patterns: strings(&["entities:search", "search_items"]),
            scroll_page_param: Some("page".to_string()),
            detail_path: "/item/{id}".to_string(),
            affiliate: Some(QueryParam::new("afid", "4997609843")),
            listing: ListingRules {
                condition_field: Some("itemConditionId".to_string()),
                ..ListingRules::default()
            },
            detail: DetailRules {
                size_path: path(&["props", "pageProps", "item", "item", "itemSize", "name"]),
                size_patterns: strings(&[
                    r"表記サイズ[：:\s]*([0-9]{2}\.?[0-9]?\s*cm)",
                    r"サイズ[：:\s]*([0-9]{2}\.?[0-9]?\s*cm)",
                    r"\b([0-9]{2}\.?[0-9]?)\s*cm\b",
                    r"\bUS\s*([0-9]{1,2}\.?[0-9]?)\b",
                    r"JAPAN\s*([0-9]{1,2}\.?[0-9]?)",
                    r"JP\s*([0-9]{1,2}\.?[0-9]?)",
                    r"([0-9]{2}\.?[0-9]?)cm",
                ]),
                ..DetailRules::default()
            },
            size_facet: None,
        }
    }

    /// PayPay Fleamarket: one facet-filtered, price-sorted search per size.
    #[must_use]
    pub fn paypay() -> Self {
        let sizes = [
            ("23cm", 236_665),
            ("23.5cm", 236_666),
            ("24cm", 236_667),
            ("24.5cm", 236_668),
            ("25cm", 236_669),
            ("25.5cm", 236_670),
            ("26cm", 236_671),
            ("26.5cm", 236_672),
            ("27cm", 236_673),
            ("27.5cm", 236_674),
            ("28cm", 236_675),
            ("28.5cm", 236_676),
            ("29cm", 236_677),
            ("29.5cm", 236_678),
            ("30cm", 236_679),
            ("30.5cm", 260_922),
            ("31cm", 260_923),
            ("31.5cm", 260_924),
            ("32cm", 260_925),
        ]
        .into_iter()
        .map(|(label, value_id)| FacetSize {
            label: label.to_string(),
            value_id,
        })
        .collect();

        Self {
            code: "YA".to_string(),
            name: "PayPay Fleamarket".to_string(),
            base_url: "https://paypayfleamarket.yahoo.co.jp".to_string(),
            search_url: "https://paypayfleamarket.yahoo.co.jp/search/{keyword}".to_string(),
            keyword_param: None,
            search_params: vec![
                QueryParam::new("sort", "price"),
                QueryParam::new("order", "asc"),
                QueryParam::new("conditions", "NEW"),
                QueryParam::new("open", "1"),
            ],
            mode: SearchMode::SizeFacet,
            search_endpoint_patterns: strings(&["api/v1/search"]),
            scroll_page_param: None,
            detail_path: "/item/{id}".to_string(),
            affiliate: None,
            listing: ListingRules {
                items_paths: vec![
                    path(&["props", "pageProps", "searchResult", "items"]),
                    path(&[
                        "props",
                        "initialState",
                        "searchState",
                        "search",
                        "result",
                        "items",
                    ]),
                    path(&["items"]),
                ],
                id_fields: strings(&["id"]),
                ..ListingRules::default()
            },
            detail: DetailRules {
                size_patterns: strings(&[r"\b(2[3-9](?:\.5)?|3[0-2](?:\.5)?)cm\b"]),
                ..DetailRules::default()
            },
            size_facet: Some(SizeFacet {
                param: "specs".to_string(),
                facet_id: 27_435,
                value_format: default_facet_format(),
                sizes,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SourcesFile {
    pub sources: Vec<SourceConfig>,
}

/// Built-in source presets, used when no sources file is configured.
#[must_use]
pub fn builtin_sources() -> Vec<SourceConfig> {
    vec![SourceConfig::mercari(), SourceConfig::paypay()]
}

/// Load and validate source definitions from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_sources(path: &Path) -> Result<Vec<SourceConfig>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: SourcesFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
        path: path.display().to_string(),
        source: e,
    })?;

    validate_sources(&file.sources)?;
    Ok(file.sources)
}

/// Checks codes, URL shapes, facet tables, and that every size pattern compiles.
///
/// # Errors
///
/// Returns `ConfigError::Validation` describing the first problem found.
pub fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen_codes = HashSet::new();

    for source in sources {
        if source.code.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}' has an empty code",
                source.name
            )));
        }

        if !seen_codes.insert(source.code.to_ascii_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source code: '{}'",
                source.code
            )));
        }

        if !source.base_url.starts_with("http://") && !source.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "source '{}' base_url must be an http(s) URL, got '{}'",
                source.code, source.base_url
            )));
        }

        if !source.detail_path.contains("{id}") {
            return Err(ConfigError::Validation(format!(
                "source '{}' detail_path must contain an {{id}} placeholder",
                source.code
            )));
        }

        if !source.search_url.contains("{keyword}") && source.keyword_param.is_none() {
            return Err(ConfigError::Validation(format!(
                "source '{}' needs either a {{keyword}} placeholder or a keyword_param",
                source.code
            )));
        }

        if source.mode == SearchMode::SizeFacet
            && source.size_facet.as_ref().is_none_or(|f| f.sizes.is_empty())
        {
            return Err(ConfigError::Validation(format!(
                "source '{}' uses size_facet mode but has no facet sizes",
                source.code
            )));
        }

        for pattern in &source.detail.size_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConfigError::Validation(format!(
                    "source '{}' has an invalid size pattern '{pattern}': {e}",
                    source.code
                )));
            }
        }
    }

    Ok(())
}

fn append_query(url: &mut String, pairs: &[(&str, &str)]) {
    for (name, value) in pairs {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&utf8_percent_encode(name, QUERY_VALUE).to_string());
        url.push('=');
        url.push_str(&utf8_percent_encode(value, QUERY_VALUE).to_string());
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn path(segments: &[&str]) -> Vec<String> {
    strings(segments)
}

#[cfg(test)]
#[path = "sources_test.rs"]
mod tests;
