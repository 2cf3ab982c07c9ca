//! Fact registration: categories, products, customers, employees
//!
//! Product counts are seed-time statistics, rebuilt by the seeder when their
//! table is empty. A new customer is counted in its country's
//! CustomersByCountry row within the same transaction.

use crate::aggregates::updater::AggregateUpdater;
use crate::error::Result;
use crate::model::{Category, Customer, Employee, Product};
use crate::store::{Database, FactStore, SqliteAggregateStore};

#[derive(Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn add_category(&self, category_name: impl Into<String>) -> Result<Category> {
        let category_name = category_name.into();
        self.db
            .transaction(move |tx| FactStore::new(tx).insert_category(&category_name))
            .await
    }

    /// Fails with `NotFound` when the category does not exist
    pub async fn add_product(&self, product_name: impl Into<String>, category_id: i64) -> Result<Product> {
        let product_name = product_name.into();
        self.db
            .transaction(move |tx| FactStore::new(tx).insert_product(&product_name, category_id))
            .await
    }

    pub async fn add_customer(&self, customer: Customer) -> Result<Customer> {
        self.db
            .transaction(move |tx| {
                FactStore::new(tx).insert_customer(&customer)?;
                AggregateUpdater::new(&SqliteAggregateStore::new(tx)).register_customer(&customer.country)?;
                Ok(customer)
            })
            .await
    }

    pub async fn add_employee(&self, employee: Employee) -> Result<Employee> {
        self.db
            .transaction(move |tx| {
                FactStore::new(tx).insert_employee(&employee)?;
                Ok(employee)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OmsError;

    #[tokio::test]
    async fn test_register_catalog() {
        let catalog = Catalog::new(Database::open_in_memory().unwrap());

        let beverages = catalog.add_category("Beverages").await.unwrap();
        let chai = catalog.add_product("Chai", beverages.category_id).await.unwrap();
        assert_eq!(chai.category_id, beverages.category_id);

        let err = catalog.add_product("Orphan", 999).await.unwrap_err();
        assert!(matches!(err, OmsError::NotFound { entity: "category", .. }));

        catalog
            .add_customer(Customer {
                customer_id: "ACME".to_string(),
                company_name: "Acme".to_string(),
                country: "US".to_string(),
            })
            .await
            .unwrap();

        let employee = catalog
            .add_employee(Employee {
                employee_id: 7,
                last_name: "King".to_string(),
                first_name: "Robert".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(employee.employee_id, 7);
    }

    #[tokio::test]
    async fn test_duplicate_category_is_a_database_error() {
        let catalog = Catalog::new(Database::open_in_memory().unwrap());
        catalog.add_category("Seafood").await.unwrap();

        let err = catalog.add_category("Seafood").await.unwrap_err();
        assert_eq!(err.kind(), "internal");
    }
}
