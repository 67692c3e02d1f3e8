//! [`RowStore`] over the Postgres `size_prices` table.

use chrono::{DateTime, Utc};
use sizewatch_core::{CanonicalSize, PriceRow};
use sqlx::PgPool;

use crate::store::{RowStore, StoredRow};
use crate::DbError;

/// A row of `size_prices` as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SizePriceRecord {
    pub id: i64,
    pub product_id: String,
    pub product_name: String,
    pub size: String,
    pub source: String,
    pub price: i64,
    pub url: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SizePriceRecord> for StoredRow {
    type Error = DbError;

    fn try_from(record: SizePriceRecord) -> Result<Self, Self::Error> {
        let price = u64::try_from(record.price).map_err(|_| DbError::InvalidStoredPrice {
            id: record.id,
            price: record.price,
        })?;
        Ok(StoredRow {
            position: record.id,
            row: PriceRow {
                product_id: record.product_id,
                product_name: record.product_name,
                size: CanonicalSize::new(record.size),
                source: record.source,
                price,
                url: record.url,
                updated_at: record.updated_at,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn column_price(price: u64) -> Result<i64, DbError> {
    i64::try_from(price).map_err(|_| DbError::PriceOutOfRange(price))
}

impl RowStore for PgRowStore {
    async fn read_all(&self) -> Result<Vec<StoredRow>, DbError> {
        let records = sqlx::query_as::<_, SizePriceRecord>(
            "SELECT id, product_id, product_name, size, source, price, url, updated_at \
             FROM size_prices \
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(StoredRow::try_from).collect()
    }

    async fn write_row(&mut self, position: i64, row: &PriceRow) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE size_prices SET \
                 product_id   = $2, \
                 product_name = $3, \
                 size         = $4, \
                 source       = $5, \
                 price        = $6, \
                 url          = $7, \
                 updated_at   = $8 \
             WHERE id = $1",
        )
        .bind(position)
        .bind(&row.product_id)
        .bind(&row.product_name)
        .bind(row.size.as_str())
        .bind(&row.source)
        .bind(column_price(row.price)?)
        .bind(&row.url)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::UnknownPosition(position));
        }
        Ok(())
    }

    async fn append_rows(&mut self, rows: &[PriceRow]) -> Result<Vec<i64>, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut positions = Vec::with_capacity(rows.len());

        for row in rows {
            let id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO size_prices \
                     (product_id, product_name, size, source, price, url, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (product_id, size, source) DO UPDATE SET \
                     product_name = EXCLUDED.product_name, \
                     price        = EXCLUDED.price, \
                     url          = EXCLUDED.url, \
                     updated_at   = EXCLUDED.updated_at \
                 RETURNING id",
            )
            .bind(&row.product_id)
            .bind(&row.product_name)
            .bind(row.size.as_str())
            .bind(&row.source)
            .bind(column_price(row.price)?)
            .bind(&row.url)
            .bind(row.updated_at)
            .fetch_one(&mut *tx)
            .await?;
            positions.push(id);
        }

        tx.commit().await?;
        Ok(positions)
    }

    async fn remove_products(
        &mut self,
        product_ids: &[String],
        source: &str,
    ) -> Result<u64, DbError> {
        let result =
            sqlx::query("DELETE FROM size_prices WHERE product_id = ANY($1) AND source = $2")
                .bind(product_ids)
                .bind(source)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
