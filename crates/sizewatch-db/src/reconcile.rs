//! Stale-aware reconciliation of one keyword's result with stored rows.
//!
//! A size that was stored before but not reconfirmed by this run is
//! rewritten with `price = 0` and an empty URL (unless the policy keeps it),
//! so the table never shows a stale price as live.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sizewatch_core::{CanonicalSize, CatalogProduct, InvalidationPolicy, PriceRow, SizeMap};

use crate::store::{RowIndex, RowStore};
use crate::DbError;

/// Rows to write for `product` on `source`, in size order.
///
/// Fresh sizes are written as found. Prior sizes missing from `fresh` are
/// zeroed under [`InvalidationPolicy::ZeroMissing`] and left out under
/// [`InvalidationPolicy::KeepOnlyFound`]. The output depends only on the
/// inputs, so reconciling the same result twice yields the same rows.
#[must_use]
pub fn reconcile(
    product: &CatalogProduct,
    source: &str,
    fresh: &SizeMap,
    prior: &BTreeSet<CanonicalSize>,
    policy: InvalidationPolicy,
    now: DateTime<Utc>,
) -> Vec<PriceRow> {
    let sizes: BTreeSet<&CanonicalSize> = fresh.keys().chain(prior.iter()).collect();

    sizes
        .into_iter()
        .filter_map(|size| {
            let (price, url) = match fresh.get(size) {
                Some(entry) => (entry.price, entry.url.clone()),
                None if policy == InvalidationPolicy::ZeroMissing => (0, String::new()),
                None => return None,
            };
            Some(PriceRow {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                size: size.clone(),
                source: source.to_owned(),
                price,
                url,
                updated_at: now,
            })
        })
        .collect()
}

/// Reconciled rows split into in-place updates and appends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePlan {
    /// `(position, row)` for keys already in the store.
    pub updates: Vec<(i64, PriceRow)>,
    pub appends: Vec<PriceRow>,
    /// Updates carrying a live price.
    pub updated: usize,
    pub added: usize,
    /// Rows written as `price = 0`.
    pub zeroed: usize,
}

impl WritePlan {
    #[must_use]
    pub fn build(rows: Vec<PriceRow>, index: &RowIndex) -> Self {
        let mut plan = Self::default();
        for row in rows {
            if row.is_zeroed() {
                plan.zeroed += 1;
            }
            match index.position(&row.key()) {
                Some(position) => {
                    if !row.is_zeroed() {
                        plan.updated += 1;
                    }
                    plan.updates.push((position, row));
                }
                None => {
                    plan.added += 1;
                    plan.appends.push(row);
                }
            }
        }
        plan
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.appends.is_empty()
    }
}

/// Writes `plan` to `store` and records appended positions in `index`.
///
/// # Errors
///
/// Returns the first [`DbError`] from the store. Writes before the failure
/// are not rolled back.
pub async fn apply_plan<S: RowStore>(
    store: &mut S,
    plan: &WritePlan,
    index: &mut RowIndex,
) -> Result<(), DbError> {
    for (position, row) in &plan.updates {
        store.write_row(*position, row).await?;
    }

    if !plan.appends.is_empty() {
        let positions = store.append_rows(&plan.appends).await?;
        for (row, position) in plan.appends.iter().zip(positions) {
            index.record(row.key(), position);
        }
    }

    tracing::debug!(
        updates = plan.updates.len(),
        appends = plan.appends.len(),
        "write plan applied"
    );
    Ok(())
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
