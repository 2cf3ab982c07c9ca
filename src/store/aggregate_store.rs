//! Aggregate store: keyed statistics rows plus the singleton summary
//!
//! Tables written (see `sql/01_statistics.sql`):
//! - one table per `AggregateTable`, keyed by its natural key
//! - `summaries` - UPSERT on id = 1
//!
//! The store is only ever handed a connection that is already inside a
//! transaction; it never commits on its own.

use super::decimal::{get_decimal, get_optional_decimal, to_sql_text};
use crate::aggregates::summary::Summary;
use crate::aggregates::table::{AggregateKey, AggregateRow, AggregateTable, AggregateValue, ValueKind};
use crate::error::{OmsError, Result};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Storage contract the aggregate updater and seeder work against
pub trait AggregateStore {
    fn find_by_key(&self, table: AggregateTable, key: &AggregateKey) -> Result<Option<AggregateRow>>;

    fn insert(&self, table: AggregateTable, row: &AggregateRow) -> Result<()>;

    /// Add `delta` to the value of an existing row
    fn add_to_value(&self, table: AggregateTable, key: &AggregateKey, delta: AggregateValue) -> Result<()>;

    fn count_rows(&self, table: AggregateTable) -> Result<i64>;

    fn bulk_insert(&self, table: AggregateTable, rows: &[AggregateRow]) -> Result<usize>;

    fn list(&self, table: AggregateTable) -> Result<Vec<AggregateRow>>;

    fn load_summary(&self) -> Result<Option<Summary>>;

    fn replace_summary(&self, summary: &Summary) -> Result<()>;
}

pub struct SqliteAggregateStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteAggregateStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn select_sql(table: AggregateTable) -> String {
        format!(
            "SELECT {key}, {label}, {value} FROM {table}",
            key = table.key_column(),
            label = table.label_column().unwrap_or("NULL"),
            value = table.value_column(),
            table = table.table_name(),
        )
    }

    fn insert_sql(table: AggregateTable) -> String {
        match table.label_column() {
            Some(label) => format!(
                "INSERT INTO {} ({}, {}, {}) VALUES (?1, ?2, ?3)",
                table.table_name(),
                table.key_column(),
                label,
                table.value_column()
            ),
            None => format!(
                "INSERT INTO {} ({}, {}) VALUES (?1, ?2)",
                table.table_name(),
                table.key_column(),
                table.value_column()
            ),
        }
    }

    fn read_row(table: AggregateTable, row: &Row<'_>) -> rusqlite::Result<AggregateRow> {
        let key = match table {
            AggregateTable::SalesByEmployee => AggregateKey::Employee(row.get(0)?),
            _ => AggregateKey::Name(row.get(0)?),
        };
        let label: Option<String> = row.get(1)?;
        let value = match table.value_kind() {
            ValueKind::Count => AggregateValue::Count(row.get(2)?),
            ValueKind::Amount => AggregateValue::Amount(get_decimal(row, 2)?),
        };
        Ok(AggregateRow { key, label, value })
    }

    fn execute_insert(
        stmt: &mut rusqlite::CachedStatement<'_>,
        table: AggregateTable,
        row: &AggregateRow,
    ) -> Result<()> {
        Self::check_kind(table, &row.value)?;
        let value = value_param(&row.value);
        match table.label_column() {
            Some(_) => stmt.execute(params![row.key, row.label, value])?,
            None => stmt.execute(params![row.key, value])?,
        };
        Ok(())
    }

    fn check_kind(table: AggregateTable, value: &AggregateValue) -> Result<()> {
        if value.kind() == table.value_kind() {
            Ok(())
        } else {
            Err(OmsError::Internal(format!(
                "value {} does not fit table {}",
                value, table
            )))
        }
    }
}

fn value_param(value: &AggregateValue) -> Value {
    match value {
        AggregateValue::Count(n) => Value::Integer(*n),
        AggregateValue::Amount(d) => Value::Text(to_sql_text(d)),
    }
}

impl AggregateStore for SqliteAggregateStore<'_> {
    fn find_by_key(&self, table: AggregateTable, key: &AggregateKey) -> Result<Option<AggregateRow>> {
        let sql = format!("{} WHERE {} = ?1", Self::select_sql(table), table.key_column());
        let row = self
            .conn
            .prepare_cached(&sql)?
            .query_row([key], |row| Self::read_row(table, row))
            .optional()?;
        Ok(row)
    }

    fn insert(&self, table: AggregateTable, row: &AggregateRow) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&Self::insert_sql(table))?;
        Self::execute_insert(&mut stmt, table, row)
    }

    fn add_to_value(&self, table: AggregateTable, key: &AggregateKey, delta: AggregateValue) -> Result<()> {
        Self::check_kind(table, &delta)?;

        let updated = match delta {
            AggregateValue::Count(n) => {
                let sql = format!(
                    "UPDATE {t} SET {v} = {v} + ?1 WHERE {k} = ?2",
                    t = table.table_name(),
                    v = table.value_column(),
                    k = table.key_column()
                );
                self.conn.prepare_cached(&sql)?.execute(params![n, key])?
            }
            AggregateValue::Amount(_) => {
                // Money is TEXT, so accumulate in Rust. The enclosing
                // transaction already holds the write lock.
                let current = self
                    .find_by_key(table, key)?
                    .ok_or_else(|| OmsError::not_found(table.table_name(), key))?;
                let next = current.value.checked_add(delta)?;
                let sql = format!(
                    "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                    table.table_name(),
                    table.value_column(),
                    table.key_column()
                );
                self.conn
                    .prepare_cached(&sql)?
                    .execute(params![value_param(&next), key])?
            }
        };

        if updated == 0 {
            return Err(OmsError::not_found(table.table_name(), key));
        }
        Ok(())
    }

    fn count_rows(&self, table: AggregateTable) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.table_name());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn bulk_insert(&self, table: AggregateTable, rows: &[AggregateRow]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(&Self::insert_sql(table))?;
        for row in rows {
            Self::execute_insert(&mut stmt, table, row)?;
        }
        Ok(rows.len())
    }

    fn list(&self, table: AggregateTable) -> Result<Vec<AggregateRow>> {
        let sql = format!("{} ORDER BY {}", Self::select_sql(table), table.key_column());
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], |row| Self::read_row(table, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn load_summary(&self) -> Result<Option<Summary>> {
        let summary = self
            .conn
            .query_row(
                "SELECT overall_sales, orders_quantity, max_check, average_check, min_check, computed_at
                 FROM summaries WHERE id = 1",
                [],
                |row| {
                    Ok(Summary {
                        overall_sales: get_decimal(row, 0)?,
                        orders_quantity: row.get(1)?,
                        max_check: get_optional_decimal(row, 2)?,
                        average_check: get_optional_decimal(row, 3)?,
                        min_check: get_optional_decimal(row, 4)?,
                        computed_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    fn replace_summary(&self, summary: &Summary) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO summaries (
                id, overall_sales, orders_quantity, max_check, min_check, average_check, computed_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                overall_sales = excluded.overall_sales,
                orders_quantity = excluded.orders_quantity,
                max_check = excluded.max_check,
                min_check = excluded.min_check,
                average_check = excluded.average_check,
                computed_at = excluded.computed_at
            "#,
            params![
                to_sql_text(&summary.overall_sales),
                summary.orders_quantity,
                summary.max_check.as_ref().map(to_sql_text),
                summary.min_check.as_ref().map(to_sql_text),
                summary.average_check.as_ref().map(to_sql_text),
                summary.computed_at,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::apply_embedded_schema;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_embedded_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_find_or_create_then_accumulate_amount() {
        let conn = conn();
        let store = SqliteAggregateStore::new(&conn);
        let table = AggregateTable::SalesByCountry;
        let key = AggregateKey::name("US");

        assert!(store.find_by_key(table, &key).unwrap().is_none());

        store
            .insert(table, &AggregateRow::new(key.clone(), AggregateValue::Amount(dec!(30.00))))
            .unwrap();
        store
            .add_to_value(table, &key, AggregateValue::Amount(dec!(12.5)))
            .unwrap();

        let row = store.find_by_key(table, &key).unwrap().unwrap();
        assert_eq!(row.value, AggregateValue::Amount(dec!(42.5)));
        assert_eq!(store.count_rows(table).unwrap(), 1);
    }

    #[test]
    fn test_count_accumulates_in_sql() {
        let conn = conn();
        let store = SqliteAggregateStore::new(&conn);
        let table = AggregateTable::OrdersByCountry;
        let key = AggregateKey::name("Germany");

        store
            .insert(table, &AggregateRow::new(key.clone(), AggregateValue::Count(1)))
            .unwrap();
        store.add_to_value(table, &key, AggregateValue::Count(1)).unwrap();
        store.add_to_value(table, &key, AggregateValue::Count(-2)).unwrap();

        let row = store.find_by_key(table, &key).unwrap().unwrap();
        assert_eq!(row.value, AggregateValue::Count(0));
    }

    #[test]
    fn test_add_to_missing_row_is_not_found() {
        let conn = conn();
        let store = SqliteAggregateStore::new(&conn);

        let result = store.add_to_value(
            AggregateTable::OrdersByCountry,
            &AggregateKey::name("Nowhere"),
            AggregateValue::Count(1),
        );
        assert!(matches!(result, Err(OmsError::NotFound { .. })));
    }

    #[test]
    fn test_wrong_value_kind_is_rejected() {
        let conn = conn();
        let store = SqliteAggregateStore::new(&conn);

        let result = store.insert(
            AggregateTable::OrdersByCountry,
            &AggregateRow::new(AggregateKey::name("US"), AggregateValue::Amount(dec!(1))),
        );
        assert!(matches!(result, Err(OmsError::Internal(_))));
        assert_eq!(store.count_rows(AggregateTable::OrdersByCountry).unwrap(), 0);
    }

    #[test]
    fn test_employee_rows_carry_last_name() {
        let conn = conn();
        let store = SqliteAggregateStore::new(&conn);
        let rows = vec![
            AggregateRow::new(AggregateKey::Employee(2), AggregateValue::Amount(dec!(5)))
                .with_label("Fuller"),
            AggregateRow::new(AggregateKey::Employee(1), AggregateValue::Amount(dec!(0)))
                .with_label("Davolio"),
        ];

        assert_eq!(store.bulk_insert(AggregateTable::SalesByEmployee, &rows).unwrap(), 2);

        let listed = store.list(AggregateTable::SalesByEmployee).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key, AggregateKey::Employee(1));
        assert_eq!(listed[0].label.as_deref(), Some("Davolio"));
        assert_eq!(listed[1].value, AggregateValue::Amount(dec!(5)));
    }

    #[test]
    fn test_summary_upsert_keeps_single_row() {
        let conn = conn();
        let store = SqliteAggregateStore::new(&conn);

        assert!(store.load_summary().unwrap().is_none());

        store.replace_summary(&Summary::empty(Utc::now())).unwrap();
        let first = store.load_summary().unwrap().unwrap();
        assert_eq!(first.orders_quantity, 0);
        assert!(first.max_check.is_none());

        let summary = Summary::from_order_totals(&[dec!(30), dec!(50)], Utc::now()).unwrap();
        store.replace_summary(&summary).unwrap();

        let loaded = store.load_summary().unwrap().unwrap();
        assert_eq!(loaded.overall_sales, dec!(80));
        assert_eq!(loaded.average_check, Some(dec!(40)));

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM summaries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
