use rusqlite::OptionalExtension;
use serde::Deserialize;

use crate::db::{now_timestamp, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::PaymentMethod;

#[derive(Deserialize)]
pub struct CardDetails {
    #[serde(default)]
    pub card_number: String,
    #[serde(default)]
    pub exp_month: u32,
    #[serde(default)]
    pub exp_year: u32,
    #[serde(default)]
    pub cvc: String,
}

impl CardDetails {
    fn validate(&self) -> AppResult<()> {
        let number = self.card_number.trim();
        if number.is_empty() || self.cvc.trim().is_empty() || self.exp_month == 0 || self.exp_year == 0 {
            return Err(AppError::InvalidArgument("Missing card fields".into()));
        }
        if !(12..=19).contains(&number.len()) || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::InvalidArgument("Card number must be 12 to 19 digits".into()));
        }
        if !(1..=12).contains(&self.exp_month) {
            return Err(AppError::InvalidArgument("Expiry month must be between 1 and 12".into()));
        }
        if !(3..=4).contains(&self.cvc.trim().len()) || !self.cvc.trim().chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::InvalidArgument("CVC must be 3 or 4 digits".into()));
        }
        Ok(())
    }
}

/// Store a card and link it to the user, replacing (and deleting) any card already on file.
/// Insert, link and cleanup commit together or not at all.
pub fn add_payment_method(pool: &DbPool, user_id: i64, card: &CardDetails) -> AppResult<PaymentMethod> {
    card.validate()?;

    let mut conn = pool.get()?;
    let tx = conn.transaction()?;

    let previous: Option<i64> = tx
        .query_row(
            "SELECT payment_method_id FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    tx.execute(
        "INSERT INTO payment_methods (card_number, exp_month, exp_year, cvc, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            card.card_number.trim(),
            card.exp_month,
            card.exp_year,
            card.cvc.trim(),
            now_timestamp()
        ],
    )?;
    let payment_method_id = tx.last_insert_rowid();

    tx.execute(
        "UPDATE users SET payment_method_id = ?1 WHERE id = ?2",
        rusqlite::params![payment_method_id, user_id],
    )?;

    if let Some(old_id) = previous {
        tx.execute(
            "DELETE FROM payment_methods WHERE id = ?1",
            rusqlite::params![old_id],
        )?;
    }

    tx.commit()?;

    let method = PaymentMethod {
        id: payment_method_id,
        card_number: card.card_number.trim().to_string(),
        exp_month: card.exp_month,
        exp_year: card.exp_year,
        cvc: card.cvc.trim().to_string(),
    };
    tracing::info!(user_id, payment_method_id, last4 = method.last4(), "Payment method linked");
    Ok(method)
}

/// Unlink and delete the user's card in one transaction.
pub fn remove_payment_method(pool: &DbPool, user_id: i64) -> AppResult<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;

    let linked: Option<i64> = tx
        .query_row(
            "SELECT payment_method_id FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let payment_method_id = linked.ok_or(AppError::NoPaymentMethodOnFile)?;

    tx.execute(
        "UPDATE users SET payment_method_id = NULL WHERE id = ?1",
        rusqlite::params![user_id],
    )?;
    tx.execute(
        "DELETE FROM payment_methods WHERE id = ?1",
        rusqlite::params![payment_method_id],
    )?;

    tx.commit()?;
    tracing::info!(user_id, payment_method_id, "Payment method removed");
    Ok(())
}

pub fn linked_payment_method(
    conn: &rusqlite::Connection,
    user_id: i64,
) -> AppResult<Option<PaymentMethod>> {
    let method = conn
        .query_row(
            "SELECT pm.id, pm.card_number, pm.exp_month, pm.exp_year, pm.cvc
             FROM users u
             JOIN payment_methods pm ON pm.id = u.payment_method_id
             WHERE u.id = ?1",
            rusqlite::params![user_id],
            |row| {
                Ok(PaymentMethod {
                    id: row.get(0)?,
                    card_number: row.get(1)?,
                    exp_month: row.get(2)?,
                    exp_year: row.get(3)?,
                    cvc: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(method)
}

#[cfg(test)]
pub(crate) fn test_card() -> CardDetails {
    CardDetails {
        card_number: "4242424242424242".into(),
        exp_month: 12,
        exp_year: 2031,
        cvc: "123".into(),
    }
}
