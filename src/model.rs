//! Fact entities and the order projections handed across the service boundary
//!
//! Orders serialize as a flat projection: an order carries its details, a
//! detail carries only the order id. Nothing points back at the customer or
//! employee graph.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub category_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: i64,
    pub product_name: String,
    pub category_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Short customer code, e.g. "ALFKI"
    pub customer_id: String,
    pub company_name: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: i64,
    pub last_name: String,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i64,
    pub customer_id: String,
    pub employee_id: i64,
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<OrderDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order_detail_id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Decimal,
}

/// Order submitted for creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub employee_id: i64,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Vec<NewOrderDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderDetail {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl NewOrder {
    pub fn new(customer_id: impl Into<String>, employee_id: i64) -> Self {
        Self {
            customer_id: customer_id.into(),
            employee_id,
            order_date: None,
            details: Vec::new(),
        }
    }

    pub fn with_line(mut self, product_id: i64, quantity: i64, unit_price: Decimal) -> Self {
        self.details.push(NewOrderDetail {
            product_id,
            quantity,
            unit_price,
        });
        self
    }
}

/// Replacement header for an existing order. Details are not editable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: i64,
    pub customer_id: String,
    pub employee_id: i64,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
}

/// An order with every reference the aggregates need already joined in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOrder {
    pub order_id: i64,
    pub customer: Customer,
    pub employee: Employee,
    pub lines: Vec<ResolvedLine>,
    /// Distinct customers registered in `customer.country`
    pub customers_in_country: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLine {
    pub product_id: i64,
    pub category_name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl ResolvedLine {
    pub fn value(&self) -> crate::error::Result<Decimal> {
        crate::aggregates::delta::line_value(self.quantity, self.unit_price)
    }
}
