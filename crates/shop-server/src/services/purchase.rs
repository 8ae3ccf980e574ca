//! Purchase workflow: price resolution, payment, and atomic recording.
//!
//! The requested ids are a set. Only products that are still active when the
//! order is priced are charged for and recorded; the rest are reported back as
//! `skipped`. The store is never touched while the gateway call is in flight,
//! so a declined or timed-out charge cannot leave rows behind.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;

use crate::auth::identity::Identity;
use crate::db::{DbPool, DATE_FORMAT};
use crate::error::{AppError, AppResult};
use crate::models::PurchaseRecord;
use crate::services::payment_methods::linked_payment_method;
use crate::services::payments::{Charge, ChargeRequest, PaymentGateway, PaymentSource};

/// Gateway settings that stay fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub payment_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub message: &'static str,
    /// `None` when nothing in the order was still for sale.
    pub charge_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub product_ids: Vec<i64>,
    pub skipped: Vec<i64>,
    pub purchase_date: String,
}

pub async fn purchase(
    pool: &DbPool,
    gateway: &dyn PaymentGateway,
    settings: &CheckoutSettings,
    buyer: &Identity,
    product_ids: &[i64],
    source_token: Option<String>,
) -> AppResult<PurchaseReceipt> {
    let requested: BTreeSet<i64> = product_ids.iter().copied().collect();
    if requested.is_empty() {
        return Err(AppError::InvalidArgument("At least one product id is required".into()));
    }

    let (prices, stored_card) = {
        let conn = pool.get()?;
        let prices = resolve_prices(&conn, &requested)?;
        let stored_card = match source_token {
            Some(_) => None,
            None => linked_payment_method(&conn, buyer.user_id)?,
        };
        (prices, stored_card)
    };

    let purchase_date = chrono::Utc::now().date_naive().format(DATE_FORMAT).to_string();

    if prices.is_empty() {
        tracing::info!(
            user_id = buyer.user_id,
            skipped = requested.len(),
            "Purchase skipped: no requested product is for sale"
        );
        return Ok(PurchaseReceipt {
            message: "No purchasable products; nothing was charged",
            charge_id: None,
            amount: 0,
            currency: settings.currency.clone(),
            product_ids: Vec::new(),
            skipped: requested.into_iter().collect(),
            purchase_date,
        });
    }

    let skipped: Vec<i64> = requested
        .iter()
        .filter(|id| !prices.contains_key(*id))
        .copied()
        .collect();
    let total = prices
        .values()
        .try_fold(0i64, |acc, price| acc.checked_add(*price))
        .ok_or_else(|| AppError::InvalidArgument("Order total is too large".into()))?;

    let source = source_token
        .map(PaymentSource::Token)
        .or(stored_card.map(PaymentSource::StoredCard));

    let request = ChargeRequest {
        amount: total,
        currency: settings.currency.clone(),
        description: format!("Purchase by user {}", buyer.user_id),
        source,
        idempotency_key: uuid::Uuid::new_v4().to_string(),
    };
    let idempotency_key = request.idempotency_key.clone();
    let description = request.description.clone();

    let charge = match tokio::time::timeout(settings.payment_timeout, gateway.charge(request)).await {
        Ok(result) => result?,
        Err(_) => {
            // The gateway may still have accepted it; the key lets the charge be found.
            tracing::warn!(
                user_id = buyer.user_id,
                amount = total,
                idempotency_key = %idempotency_key,
                description = %description,
                "Charge timed out; it may have been accepted by the gateway"
            );
            return Err(AppError::PaymentUnavailable(format!(
                "charge did not complete within {:?}",
                settings.payment_timeout
            )));
        }
    };

    let purchased: Vec<i64> = prices.keys().copied().collect();

    if let Err(e) = record_purchase(pool, buyer.user_id, &purchased, &purchase_date) {
        refund_after_failed_record(gateway, settings, &charge).await;
        return Err(e);
    }

    tracing::info!(
        user_id = buyer.user_id,
        amount = total,
        charge_id = %charge.id,
        items = purchased.len(),
        skipped = skipped.len(),
        "Purchase recorded"
    );

    Ok(PurchaseReceipt {
        message: "Purchase successful",
        charge_id: Some(charge.id),
        amount: charge.amount,
        currency: charge.currency,
        product_ids: purchased,
        skipped,
        purchase_date,
    })
}

/// Prices of the active products among `ids`, keyed by id.
fn resolve_prices(conn: &rusqlite::Connection, ids: &BTreeSet<i64>) -> AppResult<BTreeMap<i64, i64>> {
    let placeholders = (1..=ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT id, price FROM products WHERE deleted = 0 AND id IN ({placeholders})");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    let prices: Result<BTreeMap<_, _>, _> = rows.collect();
    Ok(prices?)
}

/// Insert one purchase row per product, all in a single transaction.
fn record_purchase(pool: &DbPool, user_id: i64, product_ids: &[i64], purchase_date: &str) -> AppResult<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO purchases (user_id, product_id, purchase_date) VALUES (?1, ?2, ?3)",
        )?;
        for product_id in product_ids {
            stmt.execute(rusqlite::params![user_id, product_id, purchase_date])?;
        }
    }
    tx.commit()?;
    Ok(())
}

async fn refund_after_failed_record(gateway: &dyn PaymentGateway, settings: &CheckoutSettings, charge: &Charge) {
    match tokio::time::timeout(settings.payment_timeout, gateway.refund(&charge.id)).await {
        Ok(Ok(())) => tracing::warn!(charge_id = %charge.id, "Refunded charge after failed purchase recording"),
        Ok(Err(e)) => tracing::error!(charge_id = %charge.id, "Refund after failed recording failed: {e}"),
        Err(_) => tracing::error!(charge_id = %charge.id, "Refund after failed recording timed out"),
    }
}

/// The user's purchase history, newest first. Deleted products still show.
pub fn list_user_purchases(pool: &DbPool, user_id: i64) -> AppResult<Vec<PurchaseRecord>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.description, p.price, pu.purchase_date
         FROM purchases pu
         JOIN products p ON p.id = pu.product_id
         WHERE pu.user_id = ?1
         ORDER BY pu.purchase_date DESC, pu.id DESC",
    )?;
    let rows = stmt.query_map(rusqlite::params![user_id], |row| {
        Ok(PurchaseRecord {
            product_id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            price: row.get(3)?,
            purchase_date: row.get(4)?,
        })
    })?;
    let purchases: Result<Vec<_>, _> = rows.collect();
    Ok(purchases?)
}
