//! Aggregate tables, their natural keys, and the typed rows the Read API returns

use crate::error::{OmsError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven per-entity statistics tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AggregateTable {
    ProductsByCategory,
    SalesByEmployee,
    CustomersByCountry,
    PurchasesByCustomer,
    OrdersByCountry,
    SalesByCategory,
    SalesByCountry,
}

/// Whether a table holds a count or a money amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Count,
    Amount,
}

impl AggregateTable {
    /// Seeding order
    pub const ALL: [AggregateTable; 7] = [
        AggregateTable::ProductsByCategory,
        AggregateTable::SalesByEmployee,
        AggregateTable::CustomersByCountry,
        AggregateTable::PurchasesByCustomer,
        AggregateTable::OrdersByCountry,
        AggregateTable::SalesByCategory,
        AggregateTable::SalesByCountry,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            AggregateTable::ProductsByCategory => "products_by_categories",
            AggregateTable::SalesByEmployee => "sales_by_employees",
            AggregateTable::CustomersByCountry => "customers_by_countries",
            AggregateTable::PurchasesByCustomer => "purchases_by_customers",
            AggregateTable::OrdersByCountry => "orders_by_countries",
            AggregateTable::SalesByCategory => "sales_by_categories",
            AggregateTable::SalesByCountry => "sales_by_countries",
        }
    }

    pub fn key_column(self) -> &'static str {
        match self {
            AggregateTable::ProductsByCategory | AggregateTable::SalesByCategory => "category_name",
            AggregateTable::SalesByEmployee => "employee_id",
            AggregateTable::CustomersByCountry
            | AggregateTable::OrdersByCountry
            | AggregateTable::SalesByCountry => "country_name",
            AggregateTable::PurchasesByCustomer => "company_name",
        }
    }

    pub fn value_column(self) -> &'static str {
        match self {
            AggregateTable::ProductsByCategory => "products_count",
            AggregateTable::CustomersByCountry => "customers_count",
            AggregateTable::OrdersByCountry => "orders_count",
            AggregateTable::PurchasesByCustomer => "purchases",
            AggregateTable::SalesByEmployee
            | AggregateTable::SalesByCategory
            | AggregateTable::SalesByCountry => "sales",
        }
    }

    /// Display metadata stored next to the value (only employees carry one)
    pub fn label_column(self) -> Option<&'static str> {
        match self {
            AggregateTable::SalesByEmployee => Some("last_name"),
            _ => None,
        }
    }

    pub fn value_kind(self) -> ValueKind {
        match self {
            AggregateTable::ProductsByCategory
            | AggregateTable::CustomersByCountry
            | AggregateTable::OrdersByCountry => ValueKind::Count,
            _ => ValueKind::Amount,
        }
    }

    /// Tables the order flow keeps in sync with the facts row by row
    pub fn is_order_driven(self) -> bool {
        !matches!(
            self,
            AggregateTable::ProductsByCategory | AggregateTable::CustomersByCountry
        )
    }

    /// Tables the consistency audit recomputes. CustomersByCountry is kept
    /// exact by customer registration; its rows appear lazily, so only the
    /// rows present are checked.
    pub fn is_audited(self) -> bool {
        self.is_order_driven() || self == AggregateTable::CustomersByCountry
    }

    /// Resolve a table from a user-supplied name.
    ///
    /// Accepts the SQL table name (`sales_by_countries`), the type name
    /// (`SalesByCountry`) and the endpoint style (`GetSalesByCountries`),
    /// ignoring case, `_` and `-`.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        let normalized = normalized.strip_prefix("get").unwrap_or(&normalized);

        AggregateTable::ALL.into_iter().find(|table| {
            let plural = table.table_name().replace('_', "");
            let singular = format!("{:?}", table).to_lowercase();
            normalized == plural || normalized == singular
        })
    }
}

impl fmt::Display for AggregateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Natural key of an aggregate row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregateKey {
    Employee(i64),
    Name(String),
}

impl AggregateKey {
    pub fn name(name: impl Into<String>) -> Self {
        AggregateKey::Name(name.into())
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateKey::Employee(id) => write!(f, "{}", id),
            AggregateKey::Name(name) => f.write_str(name),
        }
    }
}

impl rusqlite::ToSql for AggregateKey {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            AggregateKey::Employee(id) => id.to_sql(),
            AggregateKey::Name(name) => name.to_sql(),
        }
    }
}

/// A statistic value, or a delta to one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregateValue {
    Count(i64),
    Amount(Decimal),
}

impl AggregateValue {
    pub fn is_zero(&self) -> bool {
        match self {
            AggregateValue::Count(n) => *n == 0,
            AggregateValue::Amount(d) => d.is_zero(),
        }
    }

    /// Add `delta`; both sides must be the same kind.
    pub fn checked_add(self, delta: AggregateValue) -> Result<Self> {
        match (self, delta) {
            (AggregateValue::Count(a), AggregateValue::Count(b)) => a
                .checked_add(b)
                .map(AggregateValue::Count)
                .ok_or_else(|| OmsError::Internal("aggregate count overflow".to_string())),
            (AggregateValue::Amount(a), AggregateValue::Amount(b)) => a
                .checked_add(b)
                .map(AggregateValue::Amount)
                .ok_or_else(|| OmsError::InvalidDecimal("aggregate amount overflow".to_string())),
            (a, b) => Err(OmsError::Internal(format!(
                "cannot add {:?} to {:?}",
                b, a
            ))),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            AggregateValue::Count(_) => ValueKind::Count,
            AggregateValue::Amount(_) => ValueKind::Amount,
        }
    }
}

impl fmt::Display for AggregateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateValue::Count(n) => write!(f, "{}", n),
            AggregateValue::Amount(d) => write!(f, "{}", d),
        }
    }
}

/// Untyped aggregate row as the store sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub key: AggregateKey,
    pub label: Option<String>,
    pub value: AggregateValue,
}

impl AggregateRow {
    pub fn new(key: AggregateKey, value: AggregateValue) -> Self {
        Self {
            key,
            label: None,
            value,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn name_key(&self, table: AggregateTable) -> Result<String> {
        match &self.key {
            AggregateKey::Name(name) => Ok(name.clone()),
            other => Err(row_mismatch(table, other)),
        }
    }

    fn count(&self, table: AggregateTable) -> Result<i64> {
        match self.value {
            AggregateValue::Count(n) => Ok(n),
            _ => Err(row_mismatch(table, &self.key)),
        }
    }

    fn amount(&self, table: AggregateTable) -> Result<Decimal> {
        match self.value {
            AggregateValue::Amount(d) => Ok(d),
            _ => Err(row_mismatch(table, &self.key)),
        }
    }
}

fn row_mismatch(table: AggregateTable, key: &AggregateKey) -> OmsError {
    OmsError::Internal(format!("row {} does not fit table {}", key, table))
}

/// Typed projection of one statistics table
pub trait StatisticRow: Sized + Serialize {
    const TABLE: AggregateTable;

    fn from_row(row: AggregateRow) -> Result<Self>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsByCategory {
    pub category_name: String,
    pub products_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesByEmployee {
    pub id: i64,
    pub last_name: Option<String>,
    pub sales: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomersByCountry {
    pub country_name: String,
    pub customers_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasesByCustomer {
    pub company_name: String,
    pub purchases: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersByCountry {
    pub country_name: String,
    pub orders_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesByCategory {
    pub category_name: String,
    pub sales: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesByCountry {
    pub country_name: String,
    pub sales: Decimal,
}

impl StatisticRow for ProductsByCategory {
    const TABLE: AggregateTable = AggregateTable::ProductsByCategory;

    fn from_row(row: AggregateRow) -> Result<Self> {
        Ok(Self {
            category_name: row.name_key(Self::TABLE)?,
            products_count: row.count(Self::TABLE)?,
        })
    }
}

impl StatisticRow for SalesByEmployee {
    const TABLE: AggregateTable = AggregateTable::SalesByEmployee;

    fn from_row(row: AggregateRow) -> Result<Self> {
        let id = match row.key {
            AggregateKey::Employee(id) => id,
            ref other => return Err(row_mismatch(Self::TABLE, other)),
        };
        Ok(Self {
            id,
            sales: row.amount(Self::TABLE)?,
            last_name: row.label,
        })
    }
}

impl StatisticRow for CustomersByCountry {
    const TABLE: AggregateTable = AggregateTable::CustomersByCountry;

    fn from_row(row: AggregateRow) -> Result<Self> {
        Ok(Self {
            country_name: row.name_key(Self::TABLE)?,
            customers_count: row.count(Self::TABLE)?,
        })
    }
}

impl StatisticRow for PurchasesByCustomer {
    const TABLE: AggregateTable = AggregateTable::PurchasesByCustomer;

    fn from_row(row: AggregateRow) -> Result<Self> {
        Ok(Self {
            company_name: row.name_key(Self::TABLE)?,
            purchases: row.amount(Self::TABLE)?,
        })
    }
}

impl StatisticRow for OrdersByCountry {
    const TABLE: AggregateTable = AggregateTable::OrdersByCountry;

    fn from_row(row: AggregateRow) -> Result<Self> {
        Ok(Self {
            country_name: row.name_key(Self::TABLE)?,
            orders_count: row.count(Self::TABLE)?,
        })
    }
}

impl StatisticRow for SalesByCategory {
    const TABLE: AggregateTable = AggregateTable::SalesByCategory;

    fn from_row(row: AggregateRow) -> Result<Self> {
        Ok(Self {
            category_name: row.name_key(Self::TABLE)?,
            sales: row.amount(Self::TABLE)?,
        })
    }
}

impl StatisticRow for SalesByCountry {
    const TABLE: AggregateTable = AggregateTable::SalesByCountry;

    fn from_row(row: AggregateRow) -> Result<Self> {
        Ok(Self {
            country_name: row.name_key(Self::TABLE)?,
            sales: row.amount(Self::TABLE)?,
        })
    }
}
