//! Detail-page size resolution.
//!
//! Two stages, first hit wins: the item-size field inside the embedded
//! `__NEXT_DATA__` JSON, then the configured regexes over the page's visible
//! text. The structured stage also re-checks listing flags so an item that
//! sold between search and visit is reported as no longer listed.

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use sizewatch_core::{DetailRules, ResolvedSize, SourceConfig};

use crate::error::FetchError;
use crate::fetcher::PageFetcher;
use crate::page::{next_data, scalar_text, visible_text, walk_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Size(ResolvedSize),
    NoSize,
    /// The detail page says the item is sold or no longer new.
    NoLongerListed,
}

#[derive(Debug)]
pub struct SizeResolver {
    rules: DetailRules,
    patterns: Vec<Regex>,
    min_text_len: usize,
}

impl SizeResolver {
    /// Compiles the source's size patterns (case-insensitive).
    ///
    /// `min_text_len` is the block-detection threshold: a page without
    /// embedded data whose visible text is shorter than this is treated as a
    /// bot check or an empty render.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidPattern`] for a pattern that does not compile.
    pub fn new(source: &SourceConfig, min_text_len: usize) -> Result<Self, FetchError> {
        let patterns = source
            .detail
            .size_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| FetchError::InvalidPattern {
                        pattern: pattern.clone(),
                        source: e,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules: source.detail.clone(),
            patterns,
            min_text_len,
        })
    }

    /// Navigates to `url` and resolves the size from the loaded page.
    ///
    /// # Errors
    ///
    /// Propagates navigation errors, and returns [`FetchError::Blocked`] for
    /// a page that looks blocked.
    pub async fn resolve<F: PageFetcher>(
        &self,
        fetcher: &F,
        url: &str,
    ) -> Result<Resolution, FetchError> {
        fetcher.navigate(url).await?;
        let html = fetcher.content().await?;
        self.resolve_html(url, &html)
    }

    /// Resolves the size from already-loaded page content.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Blocked`] when the page has no embedded data and
    /// too little visible text.
    pub fn resolve_html(&self, url: &str, html: &str) -> Result<Resolution, FetchError> {
        let embedded = next_data(html);

        if let Some(data) = &embedded {
            if !self.still_listed(data) {
                return Ok(Resolution::NoLongerListed);
            }
            if let Some(label) = self.structured_size(data) {
                return Ok(Resolution::Size(ResolvedSize { label }));
            }
        }

        let text = visible_text(html);
        let text_len = text.chars().count();
        if embedded.is_none() && text_len < self.min_text_len {
            return Err(FetchError::Blocked {
                url: url.to_owned(),
                text_len,
            });
        }

        let label = self.patterns.iter().find_map(|re| {
            let caps = re.captures(&text)?;
            caps.get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().trim().to_owned())
        });

        Ok(label.map_or(Resolution::NoSize, |label| {
            Resolution::Size(ResolvedSize { label })
        }))
    }

    fn structured_size(&self, data: &Value) -> Option<String> {
        if self.rules.size_path.is_empty() {
            return None;
        }
        walk_path(data, &self.rules.size_path).and_then(scalar_text)
    }

    /// A flag that is present but no longer holds fails the check; an absent
    /// flag passes.
    fn still_listed(&self, data: &Value) -> bool {
        let holds = |path: Option<&[String]>, accepted: &[String]| {
            path.and_then(|p| walk_path(data, p))
                .and_then(scalar_text)
                .is_none_or(|value| accepted.iter().any(|a| a.eq_ignore_ascii_case(&value)))
        };
        holds(self.rules.status_path.as_deref(), &self.rules.on_sale_values)
            && holds(
                self.rules.condition_path.as_deref(),
                &self.rules.new_condition_values,
            )
    }
}

#[cfg(test)]
#[path = "resolve_test.rs"]
mod tests;
