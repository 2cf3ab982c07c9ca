//! Money columns are TEXT holding the canonical decimal string.
//!
//! SQLite has no exact numeric type, so sums never happen in SQL: values are
//! read back as `Decimal` and reduced in Rust.

use rusqlite::types::Type;
use rusqlite::Row;
use rust_decimal::Decimal;
use std::str::FromStr;

pub fn to_sql_text(value: &Decimal) -> String {
    value.normalize().to_string()
}

pub fn from_sql_text(text: &str, column: usize) -> rusqlite::Result<Decimal> {
    Decimal::from_str(text.trim())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

pub fn get_decimal(row: &Row<'_>, column: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(column)?;
    from_sql_text(&text, column)
}

pub fn get_optional_decimal(row: &Row<'_>, column: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(column)?;
    text.map(|t| from_sql_text(&t, column)).transpose()
}
