//! Order service: transactional order writes with aggregate maintenance
//!
//! Every write runs as one IMMEDIATE transaction:
//! - create: insert order + lines, apply deltas, refresh summary
//! - update: retract old references, rewrite header, apply new ones
//! - delete: retract deltas, remove lines + order, refresh summary
//!
//! The `*_in_tx` functions are the transaction bodies. They take the
//! aggregate store as a trait object so tests can inject failures.

use crate::aggregates::summary::Summary;
use crate::aggregates::updater::AggregateUpdater;
use crate::config::OmsConfig;
use crate::error::{OmsError, Result};
use crate::model::{NewOrder, Order, OrderUpdate};
use crate::retry::{retry_on_conflict, ExponentialBackoff};
use crate::store::{AggregateStore, Database, FactStore, SqliteAggregateStore};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use rust_decimal::Decimal;

/// How order writes touch the aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatePolicy {
    /// Retract a deleted order's deltas. Also makes updates move the
    /// order's contribution from the old references to the new ones.
    pub retract_on_delete: bool,
    /// Recompute the summary inside every order transaction
    pub refresh_summary: bool,
}

impl Default for AggregatePolicy {
    fn default() -> Self {
        Self {
            retract_on_delete: true,
            refresh_summary: true,
        }
    }
}

impl AggregatePolicy {
    /// Deletes and updates leave aggregates alone; the summary only
    /// changes at bootstrap.
    pub fn legacy() -> Self {
        Self {
            retract_on_delete: false,
            refresh_summary: false,
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    async fn get_order(&self, order_id: i64) -> Result<Order>;

    /// Order headers, without details
    async fn list_orders(&self) -> Result<Vec<Order>>;

    async fn update_order(&self, order_id: i64, update: OrderUpdate) -> Result<()>;

    /// Returns the ids of the removed order details
    async fn delete_order(&self, order_id: i64) -> Result<Vec<i64>>;
}

/// Money columns are decimal(18,10): 8 integer digits, 10 fractional
const UNIT_PRICE_SCALE: u32 = 10;
const UNIT_PRICE_INTEGER_DIGITS: u32 = 8;

fn validate(order: &NewOrder) -> Result<()> {
    let price_limit = Decimal::from(10i64.pow(UNIT_PRICE_INTEGER_DIGITS));
    for detail in &order.details {
        if detail.quantity < 0 {
            return Err(OmsError::BadRequest(format!(
                "quantity must not be negative (product {})",
                detail.product_id
            )));
        }
        if detail.unit_price < Decimal::ZERO {
            return Err(OmsError::BadRequest(format!(
                "unit price must not be negative (product {})",
                detail.product_id
            )));
        }
        if detail.unit_price >= price_limit || detail.unit_price.normalize().scale() > UNIT_PRICE_SCALE {
            return Err(OmsError::BadRequest(format!(
                "unit price {} does not fit decimal(18,10) (product {})",
                detail.unit_price, detail.product_id
            )));
        }
    }
    Ok(())
}

fn refresh_summary(facts: &FactStore<'_>, store: &dyn AggregateStore) -> Result<()> {
    let summary = Summary::from_order_totals(&facts.order_totals()?, Utc::now())?;
    store.replace_summary(&summary)
}

pub fn create_in_tx(
    conn: &Connection,
    order: &NewOrder,
    store: &dyn AggregateStore,
    policy: AggregatePolicy,
) -> Result<Order> {
    validate(order)?;

    let facts = FactStore::new(conn);
    let order_id = facts.insert_order(order)?;
    let resolved = facts
        .resolve_order(order_id)?
        .ok_or_else(|| OmsError::not_found("order", order_id))?;

    AggregateUpdater::new(store).apply(&resolved)?;
    if policy.refresh_summary {
        refresh_summary(&facts, store)?;
    }

    facts
        .find_order_with_details(order_id)?
        .ok_or_else(|| OmsError::not_found("order", order_id))
}

pub fn delete_in_tx(
    conn: &Connection,
    order_id: i64,
    store: &dyn AggregateStore,
    policy: AggregatePolicy,
) -> Result<Vec<i64>> {
    let facts = FactStore::new(conn);
    let resolved = facts
        .resolve_order(order_id)?
        .ok_or_else(|| OmsError::not_found("order", order_id))?;

    let detail_ids = facts.delete_order(order_id)?;

    if policy.retract_on_delete {
        AggregateUpdater::new(store).retract(&resolved)?;
    }
    if policy.refresh_summary {
        refresh_summary(&facts, store)?;
    }

    Ok(detail_ids)
}

pub fn update_in_tx(
    conn: &Connection,
    update: &OrderUpdate,
    store: &dyn AggregateStore,
    policy: AggregatePolicy,
) -> Result<()> {
    let facts = FactStore::new(conn);
    let before = facts
        .resolve_order(update.order_id)?
        .ok_or_else(|| OmsError::not_found("order", update.order_id))?;

    if facts.update_order_refs(update)? == 0 {
        return Err(OmsError::not_found("order", update.order_id));
    }

    if policy.retract_on_delete {
        let after = facts
            .resolve_order(update.order_id)?
            .ok_or_else(|| OmsError::not_found("order", update.order_id))?;
        let updater = AggregateUpdater::new(store);
        updater.retract(&before)?;
        updater.apply(&after)?;
    }
    if policy.refresh_summary {
        refresh_summary(&facts, store)?;
    }

    Ok(())
}

#[derive(Clone)]
pub struct OrderService {
    db: Database,
    policy: AggregatePolicy,
    backoff: ExponentialBackoff,
}

impl OrderService {
    pub fn new(db: Database, policy: AggregatePolicy, backoff: ExponentialBackoff) -> Self {
        Self {
            db,
            policy,
            backoff,
        }
    }

    pub fn from_config(db: Database, config: &OmsConfig) -> Self {
        Self::new(db, config.policy(), config.backoff())
    }

    pub fn policy(&self) -> AggregatePolicy {
        self.policy
    }
}

#[async_trait]
impl OrderRepository for OrderService {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        validate(&order)?;

        let created = retry_on_conflict(self.backoff.clone(), || {
            let order = order.clone();
            let policy = self.policy;
            self.db.transaction(move |tx| {
                create_in_tx(tx, &order, &SqliteAggregateStore::new(tx), policy)
            })
        })
        .await?;

        log::debug!(
            "🧾 Created order {} ({} lines)",
            created.order_id,
            created.details.len()
        );
        Ok(created)
    }

    async fn get_order(&self, order_id: i64) -> Result<Order> {
        self.db
            .read(move |conn| FactStore::new(conn).find_order_with_details(order_id))
            .await?
            .ok_or_else(|| OmsError::not_found("order", order_id))
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        self.db.read(|conn| FactStore::new(conn).list_orders()).await
    }

    async fn update_order(&self, order_id: i64, update: OrderUpdate) -> Result<()> {
        if order_id != update.order_id {
            return Err(OmsError::BadRequest(format!(
                "order id {} does not match payload order id {}",
                order_id, update.order_id
            )));
        }

        let result = retry_on_conflict(self.backoff.clone(), || {
            let update = update.clone();
            let policy = self.policy;
            self.db.transaction(move |tx| {
                update_in_tx(tx, &update, &SqliteAggregateStore::new(tx), policy)
            })
        })
        .await;

        match result {
            // an order deleted while we retried is reported as not found
            Err(err @ OmsError::Conflict(_)) => {
                let exists = self
                    .db
                    .read(move |conn| FactStore::new(conn).order_exists(order_id))
                    .await?;
                if exists {
                    Err(err)
                } else {
                    Err(OmsError::not_found("order", order_id))
                }
            }
            Ok(()) => {
                log::debug!("✏️  Updated order {}", order_id);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_order(&self, order_id: i64) -> Result<Vec<i64>> {
        let detail_ids = retry_on_conflict(self.backoff.clone(), || {
            let policy = self.policy;
            self.db.transaction(move |tx| {
                delete_in_tx(tx, order_id, &SqliteAggregateStore::new(tx), policy)
            })
        })
        .await?;

        log::debug!(
            "🗑️  Deleted order {} ({} details)",
            order_id,
            detail_ids.len()
        );
        Ok(detail_ids)
    }
}
