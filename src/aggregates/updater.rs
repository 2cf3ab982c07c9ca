//! Incremental aggregate maintenance
//!
//! `apply` runs once per inserted order and `retract` once per deleted order,
//! both inside the transaction that writes the facts. Each row is updated
//! find-or-create-then-accumulate by its natural key. The first failing step
//! returns its error and the caller rolls the whole transaction back, so a
//! partially updated set of aggregates is never committed.

use super::delta::OrderDeltas;
use super::table::{AggregateKey, AggregateRow, AggregateTable, AggregateValue};
use crate::error::Result;
use crate::model::ResolvedOrder;
use crate::store::AggregateStore;

pub struct AggregateUpdater<'s, S: AggregateStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: AggregateStore + ?Sized> AggregateUpdater<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Add a newly inserted order to every order-driven aggregate.
    pub fn apply(&self, order: &ResolvedOrder) -> Result<()> {
        let deltas = OrderDeltas::from_order(order)?;
        self.apply_deltas(&deltas)?;
        log::debug!(
            "📈 Applied order {} ({} lines, total {})",
            order.order_id,
            order.lines.len(),
            deltas.order_total
        );
        Ok(())
    }

    /// Take a deleted order back out. Rows that reach zero are kept.
    pub fn retract(&self, order: &ResolvedOrder) -> Result<()> {
        let deltas = OrderDeltas::from_order(order)?.negated();
        self.apply_deltas(&deltas)?;
        log::debug!(
            "📉 Retracted order {} (total {})",
            order.order_id,
            deltas.order_total
        );
        Ok(())
    }

    fn apply_deltas(&self, deltas: &OrderDeltas) -> Result<()> {
        let country = AggregateKey::name(deltas.country.as_str());

        self.accumulate(
            AggregateTable::PurchasesByCustomer,
            AggregateRow::new(
                AggregateKey::name(deltas.company_name.as_str()),
                AggregateValue::Amount(deltas.order_total),
            ),
        )?;

        self.accumulate(
            AggregateTable::OrdersByCountry,
            AggregateRow::new(country.clone(), AggregateValue::Count(deltas.order_count)),
        )?;

        self.ensure_customers_by_country(&country, deltas.customers_in_country)?;

        for (category, amount) in &deltas.by_category {
            self.accumulate(
                AggregateTable::SalesByCategory,
                AggregateRow::new(
                    AggregateKey::name(category.as_str()),
                    AggregateValue::Amount(*amount),
                ),
            )?;
        }

        self.accumulate(
            AggregateTable::SalesByEmployee,
            AggregateRow::new(
                AggregateKey::Employee(deltas.employee_id),
                AggregateValue::Amount(deltas.order_total),
            )
            .with_label(deltas.employee_last_name.as_str()),
        )?;

        self.accumulate(
            AggregateTable::SalesByCountry,
            AggregateRow::new(country, AggregateValue::Amount(deltas.order_total)),
        )?;

        Ok(())
    }

    /// A customer was just registered in `country`. An existing row counts
    /// it; a missing one is materialized later with the full registry count.
    pub fn register_customer(&self, country: &str) -> Result<()> {
        let table = AggregateTable::CustomersByCountry;
        let key = AggregateKey::name(country);
        if self.store.find_by_key(table, &key)?.is_some() {
            self.store.add_to_value(table, &key, AggregateValue::Count(1))?;
        }
        Ok(())
    }

    /// Find-or-create-then-accumulate. A missing row is created holding the
    /// delta itself, which is what accumulating onto zero would give.
    fn accumulate(&self, table: AggregateTable, delta: AggregateRow) -> Result<()> {
        match self.store.find_by_key(table, &delta.key)? {
            Some(_) => self.store.add_to_value(table, &delta.key, delta.value),
            None => self.store.insert(table, &delta),
        }
    }

    /// Customer counts come from the customer registry, not from orders:
    /// the row is only materialized when an order reaches an unseen country.
    fn ensure_customers_by_country(&self, country: &AggregateKey, customers: i64) -> Result<()> {
        let table = AggregateTable::CustomersByCountry;
        if self.store.find_by_key(table, country)?.is_none() {
            self.store.insert(
                table,
                &AggregateRow::new(country.clone(), AggregateValue::Count(customers)),
            )?;
        }
        Ok(())
    }
}
