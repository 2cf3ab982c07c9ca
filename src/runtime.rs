//! JSON-lines request dispatch for the runtime binary
//!
//! One request object per input line, tagged by `op`:
//!
//! ```text
//! {"op":"create_order","order":{"customer_id":"ACME","employee_id":1,"details":[...]}}
//! {"op":"statistics","table":"SalesByCountries"}
//! {"op":"summary","field":"AverageCheck"}
//! ```
//!
//! Success is `{"result": ...}`; failure is `{"error": kind, "message": ...}`.

use crate::aggregates::audit::verify_consistency;
use crate::aggregates::table::{
    AggregateTable, CustomersByCountry, OrdersByCountry, ProductsByCategory, PurchasesByCustomer,
    SalesByCategory, SalesByCountry, SalesByEmployee, StatisticRow,
};
use crate::catalog::Catalog;
use crate::config::OmsConfig;
use crate::error::{OmsError, Result};
use crate::model::{Customer, Employee, NewOrder, OrderUpdate};
use crate::orders::{OrderRepository, OrderService};
use crate::stats::StatisticsReader;
use crate::store::Database;
use serde::Deserialize;
use serde_json::{json, to_value, Value};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateOrder { order: NewOrder },
    GetOrder { order_id: i64 },
    ListOrders,
    UpdateOrder { order_id: i64, order: OrderUpdate },
    DeleteOrder { order_id: i64 },
    Statistics { table: String },
    /// Whole summary when `field` is absent
    Summary { field: Option<String> },
    AddCategory { category_name: String },
    AddProduct { product_name: String, category_id: i64 },
    AddCustomer { customer: Customer },
    AddEmployee { employee: Employee },
    Audit,
}

#[derive(Clone)]
pub struct RuntimeContext {
    db: Database,
    orders: OrderService,
    catalog: Catalog,
    stats: StatisticsReader,
}

impl RuntimeContext {
    pub fn new(db: Database, config: &OmsConfig) -> Self {
        Self::with_orders(db.clone(), OrderService::from_config(db, config))
    }

    pub fn with_orders(db: Database, orders: OrderService) -> Self {
        Self {
            catalog: Catalog::new(db.clone()),
            stats: StatisticsReader::new(db.clone()),
            orders,
            db,
        }
    }

    /// Handle one input line and build its response
    pub async fn handle_line(&self, line: &str) -> Value {
        let outcome = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => Err(OmsError::BadRequest(format!("malformed request: {}", e))),
        };

        match outcome {
            Ok(result) => json!({ "result": result }),
            Err(err) => {
                if err.kind() == "internal" {
                    log::error!("❌ Request failed: {}", err);
                } else {
                    log::debug!("Request rejected: {}", err);
                }
                json!({ "error": err.kind(), "message": err.to_string() })
            }
        }
    }

    pub async fn dispatch(&self, request: Request) -> Result<Value> {
        let value = match request {
            Request::CreateOrder { order } => to_value(self.orders.create_order(order).await?)?,
            Request::GetOrder { order_id } => to_value(self.orders.get_order(order_id).await?)?,
            Request::ListOrders => to_value(self.orders.list_orders().await?)?,
            Request::UpdateOrder { order_id, order } => {
                self.orders.update_order(order_id, order).await?;
                Value::Null
            }
            Request::DeleteOrder { order_id } => {
                json!({ "deleted_detail_ids": self.orders.delete_order(order_id).await? })
            }
            Request::Statistics { table } => {
                let table = AggregateTable::from_name(&table)
                    .ok_or_else(|| OmsError::BadRequest(format!("unknown statistics table '{}'", table)))?;
                self.statistics(table).await?
            }
            Request::Summary { field: Some(field) } => to_value(self.stats.summary_value(&field).await?)?,
            Request::Summary { field: None } => to_value(self.stats.summary().await?)?,
            Request::AddCategory { category_name } => to_value(self.catalog.add_category(category_name).await?)?,
            Request::AddProduct {
                product_name,
                category_id,
            } => to_value(self.catalog.add_product(product_name, category_id).await?)?,
            Request::AddCustomer { customer } => to_value(self.catalog.add_customer(customer).await?)?,
            Request::AddEmployee { employee } => to_value(self.catalog.add_employee(employee).await?)?,
            Request::Audit => to_value(self.db.read(|conn| verify_consistency(conn)).await?)?,
        };
        Ok(value)
    }

    async fn statistics(&self, table: AggregateTable) -> Result<Value> {
        match table {
            AggregateTable::ProductsByCategory => self.typed::<ProductsByCategory>().await,
            AggregateTable::SalesByEmployee => self.typed::<SalesByEmployee>().await,
            AggregateTable::CustomersByCountry => self.typed::<CustomersByCountry>().await,
            AggregateTable::PurchasesByCustomer => self.typed::<PurchasesByCustomer>().await,
            AggregateTable::OrdersByCountry => self.typed::<OrdersByCountry>().await,
            AggregateTable::SalesByCategory => self.typed::<SalesByCategory>().await,
            AggregateTable::SalesByCountry => self.typed::<SalesByCountry>().await,
        }
    }

    async fn typed<T: StatisticRow>(&self) -> Result<Value> {
        Ok(to_value(self.stats.list::<T>().await?)?)
    }
}
