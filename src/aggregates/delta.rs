//! Grouping and delta helpers shared by the updater, the seeder and the audit

use super::table::{AggregateKey, AggregateValue};
use crate::error::{OmsError, Result};
use crate::model::ResolvedOrder;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// quantity × unit price
pub fn line_value(quantity: i64, unit_price: Decimal) -> Result<Decimal> {
    Decimal::from(quantity)
        .checked_mul(unit_price)
        .ok_or_else(|| OmsError::InvalidDecimal(format!("line value overflow ({} x {})", quantity, unit_price)))
}

/// Overflow-checked addition of two money amounts
pub fn add_amounts(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| OmsError::InvalidDecimal("amount overflow".to_string()))
}

/// Sum of line values
pub fn sum_lines<I>(lines: I) -> Result<Decimal>
where
    I: IntoIterator<Item = (i64, Decimal)>,
{
    lines.into_iter().try_fold(Decimal::ZERO, |total, (quantity, unit_price)| {
        add_amounts(total, line_value(quantity, unit_price)?)
    })
}

/// Group `(key, amount)` pairs and sum each group
pub fn group_sums<K, I>(items: I) -> Result<BTreeMap<K, Decimal>>
where
    K: Ord,
    I: IntoIterator<Item = (K, Decimal)>,
{
    let mut groups = BTreeMap::new();
    for (key, amount) in items {
        let total = groups.entry(key).or_insert(Decimal::ZERO);
        *total = add_amounts(*total, amount)?;
    }
    Ok(groups)
}

/// Drop zero-valued entries so an absent key and a zero row compare equal
pub fn without_zeros(
    rows: impl IntoIterator<Item = (AggregateKey, AggregateValue)>,
) -> BTreeMap<AggregateKey, AggregateValue> {
    rows.into_iter().filter(|(_, value)| !value.is_zero()).collect()
}

/// Everything one order contributes to the order-driven aggregates
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDeltas {
    pub country: String,
    pub company_name: String,
    pub employee_id: i64,
    pub employee_last_name: String,
    /// +1 on apply, -1 on retract
    pub order_count: i64,
    pub order_total: Decimal,
    /// One entry per distinct category among the order's lines
    pub by_category: BTreeMap<String, Decimal>,
    /// Distinct customers in `country`, used when that row must be created
    pub customers_in_country: i64,
}

impl OrderDeltas {
    pub fn from_order(order: &ResolvedOrder) -> Result<Self> {
        let valued = order
            .lines
            .iter()
            .map(|line| Ok((line.category_name.clone(), line.value()?)))
            .collect::<Result<Vec<_>>>()?;
        let order_total = valued
            .iter()
            .try_fold(Decimal::ZERO, |total, (_, value)| add_amounts(total, *value))?;
        let by_category = group_sums(valued)?;

        Ok(Self {
            country: order.customer.country.clone(),
            company_name: order.customer.company_name.clone(),
            employee_id: order.employee.employee_id,
            employee_last_name: order.employee.last_name.clone(),
            order_count: 1,
            order_total,
            by_category,
            customers_in_country: order.customers_in_country,
        })
    }

    /// The deltas that undo this order
    pub fn negated(&self) -> Self {
        Self {
            order_count: -self.order_count,
            order_total: -self.order_total,
            by_category: self
                .by_category
                .iter()
                .map(|(category, amount)| (category.clone(), -*amount))
                .collect(),
            ..self.clone()
        }
    }
}
