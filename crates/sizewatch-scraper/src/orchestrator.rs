//! Per-keyword driver: search, collect, extract, resolve, aggregate.

use std::time::Duration;

use serde_json::Value;
use sizewatch_core::{AppConfig, ListingCandidate, SearchMode, SizeMap, SourceConfig};

use crate::error::FetchError;
use crate::extract::{dedupe_and_sort, extract_candidates};
use crate::fetcher::{PageFetcher, ResponseCollector, SearchEndpointMatcher};
use crate::normalize::normalize_size;
use crate::page::next_data;
use crate::reduce::CheapestPerSize;
use crate::resolve::{Resolution, SizeResolver};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Timing, retry, and pagination knobs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub scroll_iterations: u32,
    /// Pause after each scroll; also the interval between facet-page polls.
    pub scroll_pause: Duration,
    /// Pause after scrolling so late search responses can land.
    pub settle_pause: Duration,
    /// Pause after each detail page (or facet search).
    pub detail_pause: Duration,
    pub retry: RetryPolicy,
    pub min_page_text_len: usize,
    pub facet_poll_attempts: u32,
}

impl FetchSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            scroll_iterations: config.scroll_iterations,
            scroll_pause: Duration::from_millis(config.scroll_pause_ms),
            settle_pause: Duration::from_millis(config.settle_pause_ms),
            detail_pause: Duration::from_millis(config.detail_pause_ms),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                backoff_ms: config.retry_backoff_ms,
            },
            min_page_text_len: config.min_page_text_len,
            facet_poll_attempts: config.facet_poll_attempts,
        }
    }
}

/// Result of one keyword: the per-size minimum plus what happened to every
/// candidate that did not make it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordOutcome {
    pub sizes: SizeMap,
    /// Unique eligible candidates found by the search.
    pub candidates: usize,
    pub resolved: usize,
    pub no_size: usize,
    /// Rejected on the detail page (sold or no longer new).
    pub filtered: usize,
    pub fetch_errors: usize,
}

pub struct FetchOrchestrator<'a, F> {
    pub(crate) fetcher: &'a F,
    pub(crate) source: &'a SourceConfig,
    pub(crate) settings: &'a FetchSettings,
    matcher: SearchEndpointMatcher,
    resolver: SizeResolver,
}

impl<'a, F: PageFetcher> FetchOrchestrator<'a, F> {
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidPattern`] if a source size pattern does not compile.
    pub fn new(
        fetcher: &'a F,
        source: &'a SourceConfig,
        settings: &'a FetchSettings,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher,
            source,
            settings,
            matcher: SearchEndpointMatcher::new(&source.search_endpoint_patterns),
            resolver: SizeResolver::new(source, settings.min_page_text_len)?,
        })
    }

    /// Finds the cheapest eligible listing per size for `keyword`.
    ///
    /// # Errors
    ///
    /// Returns the search navigation error once retries are exhausted. Errors
    /// on individual candidates or facet sizes are counted, not returned.
    pub async fn cheapest_per_size(&self, keyword: &str) -> Result<KeywordOutcome, FetchError> {
        let outcome = match self.source.mode {
            SearchMode::Candidates => self.by_candidates(keyword).await?,
            SearchMode::SizeFacet => self.by_size_facet(keyword).await?,
        };

        tracing::info!(
            keyword,
            source = %self.source.code,
            sizes = outcome.sizes.len(),
            candidates = outcome.candidates,
            no_size = outcome.no_size,
            filtered = outcome.filtered,
            fetch_errors = outcome.fetch_errors,
            "keyword aggregated"
        );
        Ok(outcome)
    }

    async fn by_candidates(&self, keyword: &str) -> Result<KeywordOutcome, FetchError> {
        let search_url = self.source.search_url(keyword, &[]);
        let candidates = self
            .search_candidates(&search_url, self.settings.scroll_iterations)
            .await?;

        let mut outcome = KeywordOutcome {
            candidates: candidates.len(),
            ..KeywordOutcome::default()
        };
        let mut reducer = CheapestPerSize::new();

        for candidate in &candidates {
            let detail_url = self.source.detail_url(&candidate.id);
            let resolution = retry_with_backoff(self.settings.retry, || {
                self.resolver.resolve(self.fetcher, &detail_url)
            })
            .await;

            match resolution {
                Ok(Resolution::Size(resolved)) => match normalize_size(&resolved.label) {
                    Some(size) => {
                        tracing::debug!(
                            keyword,
                            item_id = %candidate.id,
                            size = %size,
                            price = candidate.price,
                            "candidate resolved"
                        );
                        reducer.offer(size, candidate.price, self.source.stored_url(&candidate.id));
                        outcome.resolved += 1;
                    }
                    None => {
                        tracing::debug!(keyword, item_id = %candidate.id, label = %resolved.label, "size label has no number");
                        outcome.no_size += 1;
                    }
                },
                Ok(Resolution::NoSize) => {
                    tracing::debug!(keyword, item_id = %candidate.id, "no size on detail page");
                    outcome.no_size += 1;
                }
                Ok(Resolution::NoLongerListed) => {
                    tracing::debug!(keyword, item_id = %candidate.id, "listing no longer eligible");
                    outcome.filtered += 1;
                }
                Err(e) => {
                    tracing::warn!(keyword, item_id = %candidate.id, error = %e, "dropping candidate after fetch error");
                    outcome.fetch_errors += 1;
                }
            }

            tokio::time::sleep(self.settings.detail_pause).await;
        }

        outcome.sizes = reducer.into_map();
        Ok(outcome)
    }

    /// Loads a search page while capturing responses, scrolls `scrolls`
    /// times, and returns the deduplicated, price-sorted candidates from the
    /// captured search responses and the page's embedded data.
    pub(crate) async fn search_candidates(
        &self,
        search_url: &str,
        scrolls: u32,
    ) -> Result<Vec<ListingCandidate>, FetchError> {
        let (collector, sink) = ResponseCollector::new();
        self.fetcher.subscribe(sink);

        let navigated =
            retry_with_backoff(self.settings.retry, || self.fetcher.navigate(search_url)).await;
        if navigated.is_ok() {
            for iteration in 0..scrolls {
                if let Err(e) = self.fetcher.scroll().await {
                    tracing::warn!(iteration, error = %e, "scroll failed, keeping results so far");
                    break;
                }
                tokio::time::sleep(self.settings.scroll_pause).await;
            }
            tokio::time::sleep(self.settings.settle_pause).await;
        }

        self.fetcher.unsubscribe();
        let responses = collector.drain().await;
        navigated?;

        let mut raw = Vec::new();
        for response in responses.iter().filter(|r| self.matcher.matches(r)) {
            match serde_json::from_str::<Value>(&response.body) {
                Ok(payload) => raw.extend(extract_candidates(&payload, &self.source.listing)),
                Err(e) => {
                    tracing::debug!(url = %response.url, error = %e, "skipping undecodable search response");
                }
            }
        }
        raw.extend(self.embedded_candidates().await?);

        Ok(dedupe_and_sort(raw))
    }

    /// Candidates from the current page's `__NEXT_DATA__` block.
    pub(crate) async fn embedded_candidates(&self) -> Result<Vec<ListingCandidate>, FetchError> {
        let content = self.fetcher.content().await?;
        Ok(next_data(&content)
            .map(|data| extract_candidates(&data, &self.source.listing))
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
