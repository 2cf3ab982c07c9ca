//! Overall sales summary, always recomputed wholesale from per-order totals

use super::delta::add_amounts;
use crate::error::{OmsError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fractional digits kept for the average check (the money column scale)
pub const AVERAGE_CHECK_SCALE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub overall_sales: Decimal,
    pub orders_quantity: i64,
    /// `None` while there are no orders
    pub max_check: Option<Decimal>,
    pub average_check: Option<Decimal>,
    pub min_check: Option<Decimal>,
    pub computed_at: DateTime<Utc>,
}

impl Summary {
    /// Reduce per-order totals (one entry per order, zero for an order
    /// without lines) into the summary statistics.
    pub fn from_order_totals(totals: &[Decimal], computed_at: DateTime<Utc>) -> Result<Self> {
        let overall_sales = totals
            .iter()
            .try_fold(Decimal::ZERO, |total, check| add_amounts(total, *check))?;
        let orders_quantity = totals.len() as i64;

        let average_check = if totals.is_empty() {
            None
        } else {
            let average = overall_sales
                .checked_div(Decimal::from(orders_quantity))
                .ok_or_else(|| OmsError::InvalidDecimal("average check overflow".to_string()))?;
            Some(average.round_dp(AVERAGE_CHECK_SCALE))
        };

        Ok(Self {
            overall_sales,
            orders_quantity,
            max_check: totals.iter().max().copied(),
            average_check,
            min_check: totals.iter().min().copied(),
            computed_at,
        })
    }

    pub fn empty(computed_at: DateTime<Utc>) -> Self {
        Self {
            overall_sales: Decimal::ZERO,
            orders_quantity: 0,
            max_check: None,
            average_check: None,
            min_check: None,
            computed_at,
        }
    }

    /// Scalar lookup. `None` means "no data" (no orders yet).
    pub fn value(&self, field: SummaryField) -> Option<Decimal> {
        match field {
            SummaryField::OverallSales => Some(self.overall_sales),
            SummaryField::OrdersQuantity => Some(Decimal::from(self.orders_quantity)),
            SummaryField::AverageCheck => self.average_check,
            SummaryField::MaxCheck => self.max_check,
            SummaryField::MinCheck => self.min_check,
        }
    }
}

/// The closed set of fields a summary lookup may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SummaryField {
    OverallSales,
    OrdersQuantity,
    AverageCheck,
    MaxCheck,
    MinCheck,
}

impl SummaryField {
    pub const ALL: [SummaryField; 5] = [
        SummaryField::OverallSales,
        SummaryField::OrdersQuantity,
        SummaryField::AverageCheck,
        SummaryField::MaxCheck,
        SummaryField::MinCheck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SummaryField::OverallSales => "OverallSales",
            SummaryField::OrdersQuantity => "OrdersQuantity",
            SummaryField::AverageCheck => "AverageCheck",
            SummaryField::MaxCheck => "MaxCheck",
            SummaryField::MinCheck => "MinCheck",
        }
    }
}

impl fmt::Display for SummaryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryField {
    type Err = OmsError;

    /// Accepts `OverallSales`, `overall_sales`, `overall-sales` (any case).
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        SummaryField::ALL
            .into_iter()
            .find(|field| field.as_str().to_lowercase() == normalized)
            .ok_or_else(|| OmsError::BadRequest(format!("unknown summary field '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_two_orders() {
        let summary = Summary::from_order_totals(&[dec!(30.00), dec!(50.00)], Utc::now()).unwrap();

        assert_eq!(summary.overall_sales, dec!(80.00));
        assert_eq!(summary.orders_quantity, 2);
        assert_eq!(summary.max_check, Some(dec!(50.00)));
        assert_eq!(summary.min_check, Some(dec!(30.00)));
        assert_eq!(summary.average_check, Some(dec!(40.00)));
    }

    #[test]
    fn test_zero_orders_has_no_checks() {
        let summary = Summary::empty(Utc::now());

        assert_eq!(summary.overall_sales, Decimal::ZERO);
        assert_eq!(summary.orders_quantity, 0);
        assert_eq!(summary.value(SummaryField::OrdersQuantity), Some(Decimal::ZERO));
        assert_eq!(summary.value(SummaryField::MaxCheck), None);
        assert_eq!(summary.value(SummaryField::AverageCheck), None);
        assert_eq!(summary.value(SummaryField::MinCheck), None);
    }

    #[test]
    fn test_average_is_rounded_to_money_scale() {
        let summary = Summary::from_order_totals(&[dec!(1), dec!(1), dec!(2)], Utc::now()).unwrap();
        assert_eq!(summary.average_check, Some(dec!(1.3333333333)));
    }

    #[test]
    fn test_empty_order_counts_as_zero_check() {
        let summary = Summary::from_order_totals(&[dec!(0), dec!(20)], Utc::now()).unwrap();
        assert_eq!(summary.min_check, Some(dec!(0)));
        assert_eq!(summary.average_check, Some(dec!(10)));
    }

    #[test]
    fn test_overflowing_totals_are_rejected() {
        let err = Summary::from_order_totals(&[Decimal::MAX, dec!(1)], Utc::now()).unwrap_err();
        assert!(matches!(err, OmsError::InvalidDecimal(_)));
    }

    #[test]
    fn test_field_parsing() {
        assert_eq!("OverallSales".parse::<SummaryField>().unwrap(), SummaryField::OverallSales);
        assert_eq!("orders_quantity".parse::<SummaryField>().unwrap(), SummaryField::OrdersQuantity);
        assert_eq!("max-check".parse::<SummaryField>().unwrap(), SummaryField::MaxCheck);

        let err = "MedianCheck".parse::<SummaryField>().unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }
}
