//! Search-payload filtering: raw JSON in, eligible `{id, price}` candidates out.

use std::collections::HashMap;

use serde_json::Value;
use sizewatch_core::{ListingCandidate, ListingRules};

use crate::page::{scalar_text, walk_path};

/// Returns the eligible entries of `payload` in discovery order.
///
/// The item array is the first non-empty one found along `rules.items_paths`.
/// An entry is kept only when it is new stock, confirmed on sale (if the
/// rules require it), and carries a usable id and a positive price. Entries
/// that fail any check are skipped one by one.
#[must_use]
pub fn extract_candidates(payload: &Value, rules: &ListingRules) -> Vec<ListingCandidate> {
    let Some(items) = rules
        .items_paths
        .iter()
        .filter_map(|path| walk_path(payload, path).and_then(Value::as_array))
        .find(|items| !items.is_empty())
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|entry| {
            let candidate = candidate_from_entry(entry, rules);
            if candidate.is_none() {
                tracing::debug!(entry = %entry, "skipping ineligible search entry");
            }
            candidate
        })
        .collect()
}

fn candidate_from_entry(entry: &Value, rules: &ListingRules) -> Option<ListingCandidate> {
    if !entry.is_object() || !is_new_stock(entry, rules) || !is_on_sale(entry, rules) {
        return None;
    }

    let id = rules
        .id_fields
        .iter()
        .find_map(|field| entry.get(field).and_then(scalar_text))?;
    let price = rules
        .price_fields
        .iter()
        .find_map(|field| entry.get(field).and_then(parse_price))?;

    Some(ListingCandidate { id, price })
}

fn is_new_stock(entry: &Value, rules: &ListingRules) -> bool {
    let Some(field) = &rules.condition_field else {
        return true;
    };
    entry
        .get(field)
        .and_then(scalar_text)
        .is_some_and(|code| rules.new_condition_values.iter().any(|v| *v == code))
}

fn is_on_sale(entry: &Value, rules: &ListingRules) -> bool {
    if !rules.require_on_sale {
        return true;
    }
    rules.status_fields.iter().any(|field| {
        entry
            .get(field)
            .and_then(scalar_text)
            .is_some_and(|status| {
                rules
                    .on_sale_values
                    .iter()
                    .any(|v| v.eq_ignore_ascii_case(&status))
            })
    })
}

/// Parses a listing price: a JSON number or a string such as `"¥12,800"`.
///
/// Zero, negative, and fractional prices yield `None`.
pub(crate) fn parse_price(value: &Value) -> Option<u64> {
    let price = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => {
            let digits: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | '¥' | '￥' | '円') && !c.is_whitespace())
                .collect();
            digits.parse::<u64>().ok()?
        }
        _ => return None,
    };
    (price > 0).then_some(price)
}

/// Deduplicates by id (the last price seen wins) and sorts ascending by
/// price. Ties keep first-discovery order.
#[must_use]
pub fn dedupe_and_sort(candidates: Vec<ListingCandidate>) -> Vec<ListingCandidate> {
    let mut by_id: HashMap<String, (usize, u64)> = HashMap::with_capacity(candidates.len());
    for (index, candidate) in candidates.into_iter().enumerate() {
        by_id
            .entry(candidate.id)
            .and_modify(|(_, price)| *price = candidate.price)
            .or_insert((index, candidate.price));
    }

    let mut unique: Vec<(usize, ListingCandidate)> = by_id
        .into_iter()
        .map(|(id, (index, price))| (index, ListingCandidate { id, price }))
        .collect();
    unique.sort_by_key(|(index, candidate)| (candidate.price, *index));
    unique.into_iter().map(|(_, candidate)| candidate).collect()
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
