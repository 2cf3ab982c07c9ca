//! Read API over the statistics tables and the summary
//!
//! Pure read-through: no business logic, no writes.

use crate::aggregates::summary::{Summary, SummaryField};
use crate::aggregates::table::{AggregateRow, AggregateTable, StatisticRow};
use crate::error::{OmsError, Result};
use crate::store::{AggregateStore, Database, SqliteAggregateStore};
use rust_decimal::Decimal;

#[derive(Clone)]
pub struct StatisticsReader {
    db: Database,
}

impl StatisticsReader {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every row of one statistics table, typed
    ///
    /// ```ignore
    /// let sales: Vec<SalesByCountry> = reader.list().await?;
    /// ```
    pub async fn list<T: StatisticRow>(&self) -> Result<Vec<T>> {
        self.list_rows(T::TABLE)
            .await?
            .into_iter()
            .map(T::from_row)
            .collect()
    }

    pub async fn list_rows(&self, table: AggregateTable) -> Result<Vec<AggregateRow>> {
        self.db
            .read(move |conn| SqliteAggregateStore::new(conn).list(table))
            .await
    }

    pub async fn summary(&self) -> Result<Summary> {
        self.db
            .read(|conn| SqliteAggregateStore::new(conn).load_summary())
            .await?
            .ok_or_else(|| OmsError::not_found("summary", 1))
    }

    /// Scalar lookup by field name. Unknown names are a `BadRequest`;
    /// `Ok(None)` means the field has no data yet (no orders).
    pub async fn summary_value(&self, field: &str) -> Result<Option<Decimal>> {
        let field: SummaryField = field.parse()?;
        Ok(self.summary().await?.value(field))
    }
}
