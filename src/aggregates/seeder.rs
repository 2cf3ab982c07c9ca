//! Startup bootstrap of the aggregate tables
//!
//! Every statistics table that is empty is rebuilt from a full group-by over
//! the facts; tables that already hold rows are left alone, so running the
//! seeder twice over the same facts is a no-op for them. The summary is
//! recomputed on every run.
//!
//! Three phases:
//! 1. load the fact groups for the empty tables (one read transaction)
//! 2. reduce them to aggregate rows on the blocking pool, holding no lock
//! 3. flush every new row plus the summary in a single transaction

use super::delta::{group_sums, line_value, sum_lines};
use super::summary::Summary;
use super::table::{AggregateKey, AggregateRow, AggregateTable, AggregateValue};
use crate::error::Result;
use crate::store::facts::{CustomerLedger, EmployeeLedger, Line};
use crate::store::{AggregateStore, Database, FactStore, SqliteAggregateStore};
use chrono::Utc;

/// Fact groups a recomputation needs. Only the groups of the requested
/// tables are loaded; the rest stay empty.
#[derive(Debug, Clone, Default)]
pub struct SeedSource {
    pub products_per_category: Vec<(String, i64)>,
    pub customers_per_country: Vec<(String, i64)>,
    pub orders_per_country: Vec<(String, i64)>,
    pub lines_by_category: Vec<(String, Line)>,
    pub lines_by_country: Vec<(String, Line)>,
    pub employee_ledgers: Vec<EmployeeLedger>,
    pub customer_ledgers: Vec<CustomerLedger>,
}

impl SeedSource {
    pub fn load(facts: &FactStore<'_>, tables: &[AggregateTable]) -> Result<Self> {
        let mut source = SeedSource::default();
        for table in tables {
            match table {
                AggregateTable::ProductsByCategory => {
                    source.products_per_category = facts.products_per_category()?
                }
                AggregateTable::SalesByEmployee => source.employee_ledgers = facts.employee_ledgers()?,
                AggregateTable::CustomersByCountry => {
                    source.customers_per_country = facts.customers_per_country()?
                }
                AggregateTable::PurchasesByCustomer => {
                    source.customer_ledgers = facts.customer_ledgers()?
                }
                AggregateTable::OrdersByCountry => {
                    source.orders_per_country = facts.orders_per_country()?
                }
                AggregateTable::SalesByCategory => source.lines_by_category = facts.lines_by_category()?,
                AggregateTable::SalesByCountry => source.lines_by_country = facts.lines_by_country()?,
            }
        }
        Ok(source)
    }

    /// Recompute the full contents of one table
    pub fn reduce(&self, table: AggregateTable) -> Result<Vec<AggregateRow>> {
        match table {
            AggregateTable::ProductsByCategory => Ok(count_groups(&self.products_per_category)),
            AggregateTable::CustomersByCountry => Ok(count_groups(&self.customers_per_country)),
            AggregateTable::OrdersByCountry => Ok(count_groups(&self.orders_per_country)),
            AggregateTable::SalesByCategory => amount_groups(&self.lines_by_category),
            AggregateTable::SalesByCountry => amount_groups(&self.lines_by_country),
            AggregateTable::SalesByEmployee => self
                .employee_ledgers
                .iter()
                .map(|ledger| {
                    Ok(AggregateRow::new(
                        AggregateKey::Employee(ledger.employee_id),
                        AggregateValue::Amount(sum_lines(ledger.lines.iter().copied())?),
                    )
                    .with_label(ledger.last_name.as_str()))
                })
                .collect(),
            AggregateTable::PurchasesByCustomer => {
                // two customers may share a company name; the key is the name
                let per_customer = self
                    .customer_ledgers
                    .iter()
                    .map(|ledger| Ok((ledger.company_name.clone(), sum_lines(ledger.lines.iter().copied())?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(group_sums(per_customer)?
                    .into_iter()
                    .map(|(name, amount)| {
                        AggregateRow::new(AggregateKey::Name(name), AggregateValue::Amount(amount))
                    })
                    .collect())
            }
        }
    }
}

fn count_groups(groups: &[(String, i64)]) -> Vec<AggregateRow> {
    groups
        .iter()
        .map(|(key, count)| AggregateRow::new(AggregateKey::name(key.as_str()), AggregateValue::Count(*count)))
        .collect()
}

fn amount_groups(lines: &[(String, Line)]) -> Result<Vec<AggregateRow>> {
    let valued = lines
        .iter()
        .map(|(key, (quantity, price))| Ok((key.as_str(), line_value(*quantity, *price)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(group_sums(valued)?
        .into_iter()
        .map(|(key, amount)| AggregateRow::new(AggregateKey::name(key), AggregateValue::Amount(amount)))
        .collect())
}

#[derive(Debug, Clone)]
pub struct SeedReport {
    /// Tables rebuilt by this run and the number of rows written to each
    pub seeded: Vec<(AggregateTable, usize)>,
    /// Tables that already held rows
    pub skipped: Vec<AggregateTable>,
    pub summary: Summary,
}

pub struct Seeder {
    db: Database,
}

impl Seeder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn run(&self) -> Result<SeedReport> {
        log::info!("🌱 Seeding statistics tables");

        let (empty, source) = self
            .db
            .transaction(|tx| {
                let store = SqliteAggregateStore::new(tx);
                let mut empty = Vec::new();
                for table in AggregateTable::ALL {
                    if store.count_rows(table)? == 0 {
                        empty.push(table);
                    }
                }
                let source = SeedSource::load(&FactStore::new(tx), &empty)?;
                Ok((empty, source))
            })
            .await?;

        let computed = tokio::task::spawn_blocking(move || {
            empty
                .into_iter()
                .map(|table| Ok((table, source.reduce(table)?)))
                .collect::<Result<Vec<_>>>()
        })
        .await??;

        let report = self
            .db
            .transaction(move |tx| {
                let store = SqliteAggregateStore::new(tx);
                let mut seeded = Vec::new();
                let mut skipped = Vec::new();

                for table in AggregateTable::ALL {
                    let rows = computed.iter().find(|(t, _)| *t == table).map(|(_, rows)| rows);
                    match rows {
                        // Re-check under the write lock: someone may have
                        // populated the table since it was read as empty.
                        Some(rows) if store.count_rows(table)? == 0 => {
                            let written = store.bulk_insert(table, rows)?;
                            log::info!("   ├─ {}: seeded {} rows", table, written);
                            seeded.push((table, written));
                        }
                        _ => {
                            log::info!("   ├─ {}: not empty, skipped", table);
                            skipped.push(table);
                        }
                    }
                }

                let summary = Summary::from_order_totals(&FactStore::new(tx).order_totals()?, Utc::now())?;
                store.replace_summary(&summary)?;
                log::info!(
                    "   └─ summary: {} orders, overall sales {}",
                    summary.orders_quantity,
                    summary.overall_sales
                );

                Ok(SeedReport {
                    seeded,
                    skipped,
                    summary,
                })
            })
            .await?;

        log::info!(
            "✅ Seeding complete: {} seeded, {} skipped",
            report.seeded.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reduce_sums_per_key() {
        let source = SeedSource {
            lines_by_country: vec![
                ("US".to_string(), (3, dec!(10))),
                ("UK".to_string(), (1, dec!(7.5))),
                ("US".to_string(), (2, dec!(10))),
            ],
            ..Default::default()
        };

        let rows = source.reduce(AggregateTable::SalesByCountry).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, AggregateKey::name("UK"));
        assert_eq!(rows[1].value, AggregateValue::Amount(dec!(50)));
    }

    #[test]
    fn test_ledgers_include_idle_entities() {
        let source = SeedSource {
            employee_ledgers: vec![
                EmployeeLedger {
                    employee_id: 1,
                    last_name: "Davolio".to_string(),
                    lines: vec![(3, dec!(10)), (1, dec!(5))],
                },
                EmployeeLedger {
                    employee_id: 2,
                    last_name: "Fuller".to_string(),
                    lines: Vec::new(),
                },
            ],
            customer_ledgers: vec![
                CustomerLedger {
                    company_name: "Acme".to_string(),
                    lines: vec![(1, dec!(1))],
                },
                CustomerLedger {
                    company_name: "Acme".to_string(),
                    lines: vec![(2, dec!(1))],
                },
            ],
            ..Default::default()
        };

        let employees = source.reduce(AggregateTable::SalesByEmployee).unwrap();
        assert_eq!(employees.len(), 2);
        assert_eq!(employees[0].value, AggregateValue::Amount(dec!(35)));
        assert_eq!(employees[1].label.as_deref(), Some("Fuller"));
        assert!(employees[1].value.is_zero());

        let customers = source.reduce(AggregateTable::PurchasesByCustomer).unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].value, AggregateValue::Amount(dec!(3)));
    }
}
