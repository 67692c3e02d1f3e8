//! The `run` command: search, reconcile, and write each flagged product.
//!
//! The store is read once up front. Per-keyword fetch failures are logged
//! and skipped so one bad keyword does not abort the run; store failures
//! are fatal.

use std::time::Duration;

use chrono::Utc;
use sizewatch_core::{CatalogFile, CatalogProduct, InvalidationPolicy, SourceConfig};
use sizewatch_db::{apply_plan, reconcile, RowIndex, RowStore, WritePlan};
use sizewatch_scraper::{FetchOrchestrator, FetchSettings, PageFetcher};

#[derive(Debug, Clone)]
pub(crate) struct RunOptions {
    pub dry_run: bool,
    pub rebuild: bool,
    pub policy: InvalidationPolicy,
    /// Pause between keywords.
    pub cooldown: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeywordSummary {
    pub product_id: String,
    pub keyword: String,
    /// Sizes found, or the error that skipped the keyword.
    pub result: Result<usize, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub source: String,
    pub targets: usize,
    pub keywords: Vec<KeywordSummary>,
    pub removed: u64,
    pub updated: usize,
    pub added: usize,
    pub zeroed: usize,
}

impl RunSummary {
    pub(crate) fn failed(&self) -> usize {
        self.keywords.iter().filter(|k| k.result.is_err()).count()
    }

    pub(crate) fn print(&self, dry_run: bool) {
        let prefix = if dry_run { "dry-run: " } else { "" };
        println!(
            "{prefix}processed {} target(s) on source {}",
            self.targets, self.source
        );
        for keyword in &self.keywords {
            match &keyword.result {
                Ok(sizes) => println!("  {} {:?}: {sizes} size(s)", keyword.product_id, keyword.keyword),
                Err(e) => println!("  {} {:?}: skipped ({e})", keyword.product_id, keyword.keyword),
            }
        }
        if self.removed > 0 {
            println!("{prefix}removed {} row(s) before rebuild", self.removed);
        }
        println!(
            "{prefix}updated {}, added {}, zeroed {}, failed keywords {}",
            self.updated,
            self.added,
            self.zeroed,
            self.failed()
        );
    }
}

/// Catalog rows flagged for update, optionally narrowed to one id.
///
/// # Errors
///
/// Returns an error if `product` names an id that is not flagged for update.
pub(crate) fn select_targets<'a>(
    catalog: &'a CatalogFile,
    product: Option<&str>,
) -> anyhow::Result<Vec<&'a CatalogProduct>> {
    let targets: Vec<&CatalogProduct> = catalog
        .targets()
        .filter(|p| product.is_none_or(|id| p.id == id))
        .collect();

    if let Some(id) = product {
        if targets.is_empty() {
            anyhow::bail!("catalog product '{id}' not found or not flagged for update");
        }
    }
    Ok(targets)
}

/// Runs every target keyword against `source` and writes the reconciled rows.
///
/// # Errors
///
/// Returns an error if the orchestrator cannot be built or the store fails.
pub(crate) async fn run_targets<F: PageFetcher, S: RowStore>(
    fetcher: &F,
    store: &mut S,
    source: &SourceConfig,
    settings: &FetchSettings,
    targets: &[&CatalogProduct],
    options: &RunOptions,
) -> anyhow::Result<RunSummary> {
    let orchestrator = FetchOrchestrator::new(fetcher, source, settings)?;
    let mut index = RowIndex::build(&store.read_all().await?);
    let mut summary = RunSummary {
        source: source.code.clone(),
        targets: targets.len(),
        ..RunSummary::default()
    };

    for (position, product) in targets.iter().enumerate() {
        if position > 0 {
            tokio::time::sleep(options.cooldown).await;
        }

        let outcome = match orchestrator.cheapest_per_size(&product.name).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    product_id = %product.id,
                    keyword = %product.name,
                    error = %e,
                    "skipping keyword after fetch error"
                );
                summary.keywords.push(KeywordSummary {
                    product_id: product.id.clone(),
                    keyword: product.name.clone(),
                    result: Err(e.to_string()),
                });
                continue;
            }
        };

        if options.rebuild {
            let ids = [product.id.clone()];
            if !options.dry_run {
                summary.removed += store.remove_products(&ids, &source.code).await?;
            }
            index.forget_products(&ids, &source.code);
        }

        let prior = index.prior_sizes(&product.id, &source.code);
        let rows = reconcile(
            product,
            &source.code,
            &outcome.sizes,
            &prior,
            options.policy,
            Utc::now(),
        );
        let plan = WritePlan::build(rows, &index);

        summary.updated += plan.updated;
        summary.added += plan.added;
        summary.zeroed += plan.zeroed;
        summary.keywords.push(KeywordSummary {
            product_id: product.id.clone(),
            keyword: product.name.clone(),
            result: Ok(outcome.sizes.len()),
        });

        if options.dry_run {
            continue;
        }
        apply_plan(store, &plan, &mut index).await?;
        tracing::info!(
            product_id = %product.id,
            updated = plan.updated,
            added = plan.added,
            zeroed = plan.zeroed,
            "product written"
        );
    }

    Ok(summary)
}

#[cfg(test)]
#[path = "run_test.rs"]
mod tests;
