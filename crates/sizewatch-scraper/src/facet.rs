//! Size-facet search: one facet-filtered, price-sorted search per size.
//!
//! The facet already pins the size, so the cheapest eligible item on each
//! filtered page is that size's entry and no detail page is visited.

use sizewatch_core::ListingCandidate;

use crate::error::FetchError;
use crate::extract::dedupe_and_sort;
use crate::fetcher::PageFetcher;
use crate::normalize::normalize_size;
use crate::orchestrator::{FetchOrchestrator, KeywordOutcome};
use crate::reduce::CheapestPerSize;

impl<F: PageFetcher> FetchOrchestrator<'_, F> {
    pub(crate) async fn by_size_facet(&self, keyword: &str) -> Result<KeywordOutcome, FetchError> {
        let facet = self
            .source
            .size_facet
            .as_ref()
            .ok_or_else(|| FetchError::MissingFacetTable {
                code: self.source.code.clone(),
            })?;

        let mut outcome = KeywordOutcome::default();
        let mut reducer = CheapestPerSize::new();
        let mut last_error = None;

        for size in &facet.sizes {
            let search_url = self.source.search_url(keyword, &[facet.filter_for(size)]);
            match self.cheapest_for_facet(&search_url).await {
                Ok(Some(candidate)) => {
                    outcome.candidates += 1;
                    if let Some(canonical) = normalize_size(&size.label) {
                        tracing::debug!(
                            keyword,
                            size = %canonical,
                            item_id = %candidate.id,
                            price = candidate.price,
                            "facet size resolved"
                        );
                        reducer.offer(
                            canonical,
                            candidate.price,
                            self.source.stored_url(&candidate.id),
                        );
                        outcome.resolved += 1;
                    } else {
                        tracing::debug!(keyword, label = %size.label, "facet label has no number");
                        outcome.no_size += 1;
                    }
                }
                Ok(None) => {
                    tracing::debug!(keyword, size = %size.label, "no eligible listing for facet size");
                }
                Err(e) => {
                    tracing::warn!(
                        keyword,
                        size = %size.label,
                        error = %e,
                        "skipping facet size after fetch error"
                    );
                    outcome.fetch_errors += 1;
                    last_error = Some(e);
                }
            }

            tokio::time::sleep(self.settings.detail_pause).await;
        }

        // A sweep where every size failed is reported as the keyword's error.
        if outcome.fetch_errors == facet.sizes.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        outcome.sizes = reducer.into_map();
        Ok(outcome)
    }

    /// Cheapest eligible listing on one facet-filtered search, polling the
    /// page for embedded results while the first reads come back empty.
    async fn cheapest_for_facet(
        &self,
        search_url: &str,
    ) -> Result<Option<ListingCandidate>, FetchError> {
        let mut candidates = self.search_candidates(search_url, 0).await?;

        let mut polls = 1;
        while candidates.is_empty() && polls < self.settings.facet_poll_attempts {
            tokio::time::sleep(self.settings.scroll_pause).await;
            candidates = dedupe_and_sort(self.embedded_candidates().await?);
            polls += 1;
        }

        Ok(candidates.into_iter().next())
    }
}
