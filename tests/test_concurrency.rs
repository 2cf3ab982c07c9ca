//! Concurrent order creation against one database file
//!
//! Several `Database` handles (one connection each) write orders for the
//! same country at once. SQLite serializes the IMMEDIATE transactions; a
//! writer that loses the lock waits or retries, so no increment is lost.
//!
//! Also covers an update that keeps losing the lock: it reports a conflict
//! while the order exists and not-found once the order is gone.

mod common;

#[cfg(test)]
mod concurrency_tests {
    use super::common::{name, Fixture};
    use omsmini::aggregates::{verify_consistency, AggregateTable, AggregateValue};
    use omsmini::model::{NewOrder, OrderUpdate};
    use omsmini::orders::{AggregatePolicy, OrderRepository, OrderService};
    use omsmini::retry::ExponentialBackoff;
    use omsmini::store::Database;
    use omsmini::OmsError;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tempfile::tempdir;

    const WRITERS: usize = 4;
    const ORDERS_PER_WRITER: usize = 5;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_lose_no_increment() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("oms.db");
        let fx = Fixture::on_disk(&db_path);
        let chai = fx.chai;

        let mut handles = Vec::new();
        for writer in 0..WRITERS {
            let db = Database::open(&db_path, Duration::from_secs(5)).unwrap();
            let service = OrderService::new(db, AggregatePolicy::default(), ExponentialBackoff::new(5, 100, 10));
            let customer = if writer % 2 == 0 { "ACME" } else { "GLOBX" };

            handles.push(tokio::spawn(async move {
                for _ in 0..ORDERS_PER_WRITER {
                    service
                        .create_order(NewOrder::new(customer, 1).with_line(chai, 1, dec!(2.50)))
                        .await?;
                }
                Ok::<_, omsmini::OmsError>(())
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let total = (WRITERS * ORDERS_PER_WRITER) as i64;
        assert_eq!(fx.order_count(), total);
        assert_eq!(
            fx.value(AggregateTable::OrdersByCountry, name("US")),
            Some(AggregateValue::Count(total))
        );
        assert_eq!(
            fx.value(AggregateTable::SalesByCountry, name("US")),
            Some(AggregateValue::Amount(dec!(2.50) * Decimal::from(total)))
        );

        let audit = fx.db.with_connection(|conn| verify_consistency(conn)).unwrap();
        assert!(audit.is_empty(), "{:?}", audit);
    }

    fn hold_write_lock(db: &Database) {
        db.with_connection(|conn| Ok(conn.execute_batch("BEGIN IMMEDIATE")?))
            .unwrap();
    }

    fn release_write_lock(db: &Database) {
        db.with_connection(|conn| Ok(conn.execute_batch("ROLLBACK")?))
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_under_lock_reports_conflict_then_not_found() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("oms.db");
        let fx = Fixture::on_disk(&db_path);
        let created = fx
            .service(AggregatePolicy::default())
            .create_order(NewOrder::new("ACME", 1).with_line(fx.chai, 1, dec!(4)))
            .await
            .unwrap();

        let impatient = OrderService::new(
            Database::open(&db_path, Duration::ZERO).unwrap(),
            AggregatePolicy::default(),
            ExponentialBackoff::new(1, 1, 1),
        );
        let update = OrderUpdate {
            order_id: created.order_id,
            customer_id: "GLOBX".to_string(),
            employee_id: 2,
            order_date: None,
        };
        let holder = Database::open(&db_path, Duration::ZERO).unwrap();

        hold_write_lock(&holder);
        let err = impatient
            .update_order(created.order_id, update.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, OmsError::Conflict(_)), "{:?}", err);
        release_write_lock(&holder);

        fx.service(AggregatePolicy::default())
            .delete_order(created.order_id)
            .await
            .unwrap();

        hold_write_lock(&holder);
        let err = impatient
            .update_order(created.order_id, update)
            .await
            .unwrap_err();
        assert!(matches!(err, OmsError::NotFound { entity: "order", .. }), "{:?}", err);
        release_write_lock(&holder);

        // nothing was moved to the new customer while the lock was held
        assert_eq!(fx.value(AggregateTable::PurchasesByCustomer, name("Globex")), None);
    }
}
