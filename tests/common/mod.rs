//! Shared fixtures for the integration tests
//!
//! Catalog: Beverages (Chai), Seafood (Ikura), Confections (no products)
//! Customers: ACME/Acme (US), GLOBX/Globex (US), BERGS/Berglunds (Sweden)
//! Employees: 1 Davolio, 2 Fuller

#![allow(dead_code)]

use omsmini::aggregates::{AggregateKey, AggregateTable, AggregateValue};
use omsmini::model::{Customer, Employee};
use omsmini::orders::{AggregatePolicy, OrderService};
use omsmini::retry::ExponentialBackoff;
use omsmini::store::schema::apply_embedded_schema;
use omsmini::store::{AggregateStore, Database, FactStore, SqliteAggregateStore};
use std::path::Path;
use std::time::Duration;

pub struct Fixture {
    pub db: Database,
    pub chai: i64,
    pub ikura: i64,
}

impl Fixture {
    pub fn in_memory() -> Self {
        Self::with_db(Database::open_in_memory().unwrap())
    }

    /// File-backed database, for tests that need several connections
    pub fn on_disk(path: &Path) -> Self {
        let db = Database::open(path, Duration::from_secs(5)).unwrap();
        db.with_connection(|conn| apply_embedded_schema(conn)).unwrap();
        Self::with_db(db)
    }

    fn with_db(db: Database) -> Self {
        let (chai, ikura) = db
            .with_transaction(|tx| {
                let facts = FactStore::new(tx);
                let beverages = facts.insert_category("Beverages")?;
                let seafood = facts.insert_category("Seafood")?;
                facts.insert_category("Confections")?;
                let chai = facts.insert_product("Chai", beverages.category_id)?;
                let ikura = facts.insert_product("Ikura", seafood.category_id)?;

                for (id, name, country) in [
                    ("ACME", "Acme", "US"),
                    ("GLOBX", "Globex", "US"),
                    ("BERGS", "Berglunds", "Sweden"),
                ] {
                    facts.insert_customer(&Customer {
                        customer_id: id.to_string(),
                        company_name: name.to_string(),
                        country: country.to_string(),
                    })?;
                }
                for (id, last_name) in [(1, "Davolio"), (2, "Fuller")] {
                    facts.insert_employee(&Employee {
                        employee_id: id,
                        last_name: last_name.to_string(),
                        first_name: String::new(),
                    })?;
                }
                Ok((chai.product_id, ikura.product_id))
            })
            .unwrap();

        Self { db, chai, ikura }
    }

    pub fn service(&self, policy: AggregatePolicy) -> OrderService {
        OrderService::new(self.db.clone(), policy, ExponentialBackoff::new(5, 50, 10))
    }

    pub fn value(&self, table: AggregateTable, key: AggregateKey) -> Option<AggregateValue> {
        self.db
            .with_connection(|conn| SqliteAggregateStore::new(conn).find_by_key(table, &key))
            .unwrap()
            .map(|row| row.value)
    }

    pub fn rows(&self, table: AggregateTable) -> usize {
        self.db
            .with_connection(|conn| SqliteAggregateStore::new(conn).count_rows(table))
            .unwrap() as usize
    }

    pub fn order_count(&self) -> i64 {
        self.db
            .with_connection(|conn| Ok(FactStore::new(conn).list_orders()?.len() as i64))
            .unwrap()
    }

    /// Drop every aggregate row and the summary
    pub fn clear_aggregates(&self) {
        self.db
            .with_transaction(|tx| {
                for table in AggregateTable::ALL {
                    tx.execute(&format!("DELETE FROM {}", table.table_name()), [])?;
                }
                tx.execute("DELETE FROM summaries", [])?;
                Ok(())
            })
            .unwrap();
    }
}

pub fn name(key: &str) -> AggregateKey {
    AggregateKey::name(key)
}
