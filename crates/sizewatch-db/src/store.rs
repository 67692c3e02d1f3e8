//! The row-store seam, its in-memory implementation, and the key index
//! built from one full read.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use sizewatch_core::{CanonicalSize, PriceRow, RowKey};

use crate::DbError;

/// A persisted row and its stable position (the table's primary key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub position: i64,
    pub row: PriceRow,
}

/// Tabular storage for the price table.
///
/// Rows are addressed by position. Appending a row whose key already exists
/// overwrites that row in place, so a key never maps to two positions.
#[allow(async_fn_in_trait)]
pub trait RowStore {
    async fn read_all(&self) -> Result<Vec<StoredRow>, DbError>;

    async fn write_row(&mut self, position: i64, row: &PriceRow) -> Result<(), DbError>;

    /// Appends `rows` and returns their positions, in input order.
    async fn append_rows(&mut self, rows: &[PriceRow]) -> Result<Vec<i64>, DbError>;

    /// Removes the given products' rows for `source`. Returns the number removed.
    async fn remove_products(
        &mut self,
        product_ids: &[String],
        source: &str,
    ) -> Result<u64, DbError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryRowStore {
    rows: BTreeMap<i64, PriceRow>,
    next_position: i64,
}

impl MemoryRowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows in position order.
    #[must_use]
    pub fn rows(&self) -> Vec<&PriceRow> {
        self.rows.values().collect()
    }

    fn position_of(&self, key: &RowKey) -> Option<i64> {
        self.rows
            .iter()
            .find_map(|(position, row)| (row.key() == *key).then_some(*position))
    }
}

impl RowStore for MemoryRowStore {
    async fn read_all(&self) -> Result<Vec<StoredRow>, DbError> {
        Ok(self
            .rows
            .iter()
            .map(|(position, row)| StoredRow {
                position: *position,
                row: row.clone(),
            })
            .collect())
    }

    async fn write_row(&mut self, position: i64, row: &PriceRow) -> Result<(), DbError> {
        let slot = self
            .rows
            .get_mut(&position)
            .ok_or(DbError::UnknownPosition(position))?;
        *slot = row.clone();
        Ok(())
    }

    async fn append_rows(&mut self, rows: &[PriceRow]) -> Result<Vec<i64>, DbError> {
        let mut positions = Vec::with_capacity(rows.len());
        for row in rows {
            let position = if let Some(existing) = self.position_of(&row.key()) {
                existing
            } else {
                self.next_position += 1;
                self.next_position
            };
            self.rows.insert(position, row.clone());
            positions.push(position);
        }
        Ok(positions)
    }

    async fn remove_products(
        &mut self,
        product_ids: &[String],
        source: &str,
    ) -> Result<u64, DbError> {
        let before = self.rows.len();
        self.rows.retain(|_, row| {
            row.source != source || !product_ids.iter().any(|id| *id == row.product_id)
        });
        Ok(u64::try_from(before - self.rows.len()).unwrap_or(u64::MAX))
    }
}

/// Key → position map over the whole store, built once per run.
#[derive(Debug, Default, Clone)]
pub struct RowIndex {
    positions: HashMap<RowKey, i64>,
}

impl RowIndex {
    #[must_use]
    pub fn build(rows: &[StoredRow]) -> Self {
        let positions = rows
            .iter()
            .map(|stored| (stored.row.key(), stored.position))
            .collect();
        Self { positions }
    }

    #[must_use]
    pub fn position(&self, key: &RowKey) -> Option<i64> {
        self.positions.get(key).copied()
    }

    /// Sizes already stored for `(product_id, source)`.
    #[must_use]
    pub fn prior_sizes(&self, product_id: &str, source: &str) -> BTreeSet<CanonicalSize> {
        self.positions
            .keys()
            .filter(|key| key.product_id == product_id && key.source == source)
            .map(|key| key.size.clone())
            .collect()
    }

    pub fn record(&mut self, key: RowKey, position: i64) {
        self.positions.insert(key, position);
    }

    /// Drops the given products' entries for `source`, mirroring `remove_products`.
    pub fn forget_products(&mut self, product_ids: &[String], source: &str) {
        self.positions.retain(|key, _| {
            key.source != source || !product_ids.iter().any(|id| *id == key.product_id)
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
