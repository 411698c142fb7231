//! Credit ledger.
//!
//! Balances only change through single-statement atomic updates; `consume`
//! is guarded so a balance never goes below zero.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::postgres::is_uuid;

/// Credits granted to a newly created user.
pub const DEFAULT_USER_CREDITS: i32 = 3;

/// Per-user credit balance operations.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Take one credit. `None` if the user is unknown or has no credits left.
    async fn consume(&self, user_id: &str) -> StoreResult<Option<i32>>;

    /// Give one credit back. `None` if the user is unknown.
    async fn refund(&self, user_id: &str) -> StoreResult<Option<i32>>;

    async fn balance(&self, user_id: &str) -> StoreResult<Option<i32>>;

    /// Add a positive amount of credits.
    async fn add_credits(&self, user_id: &str, amount: i32) -> StoreResult<Option<i32>>;

    /// Create the user with the default balance if missing; returns the balance.
    async fn ensure_user(&self, user_id: &str, email: &str) -> StoreResult<i32>;
}

fn check_amount(amount: i32) -> StoreResult<()> {
    if amount <= 0 {
        return Err(StoreError::invalid_input(
            "INVALID_CREDIT_AMOUNT",
            "amount must be a positive integer",
        ));
    }
    Ok(())
}

/// Ledger backed by the `users` table.
#[derive(Clone)]
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn consume(&self, user_id: &str) -> StoreResult<Option<i32>> {
        if !is_uuid(user_id) {
            return Ok(None);
        }
        let row = sqlx::query(
            "UPDATE users SET credits = credits - 1, updated_at = NOW() \
             WHERE id = $1::uuid AND credits > 0 RETURNING credits",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get("credits")).transpose().map_err(Into::into)
    }

    async fn refund(&self, user_id: &str) -> StoreResult<Option<i32>> {
        if !is_uuid(user_id) {
            return Ok(None);
        }
        let row = sqlx::query(
            "UPDATE users SET credits = credits + 1, updated_at = NOW() \
             WHERE id = $1::uuid RETURNING credits",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get("credits")).transpose().map_err(Into::into)
    }

    async fn balance(&self, user_id: &str) -> StoreResult<Option<i32>> {
        if !is_uuid(user_id) {
            return Ok(None);
        }
        let row = sqlx::query("SELECT credits FROM users WHERE id = $1::uuid")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_get("credits")).transpose().map_err(Into::into)
    }

    async fn add_credits(&self, user_id: &str, amount: i32) -> StoreResult<Option<i32>> {
        check_amount(amount)?;
        if !is_uuid(user_id) {
            return Ok(None);
        }
        let row = sqlx::query(
            "UPDATE users SET credits = credits + $2, updated_at = NOW() \
             WHERE id = $1::uuid RETURNING credits",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get("credits")).transpose().map_err(Into::into)
    }

    async fn ensure_user(&self, user_id: &str, email: &str) -> StoreResult<i32> {
        let row = sqlx::query(
            "INSERT INTO users (id, email, credits) VALUES ($1::uuid, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, updated_at = NOW() \
             RETURNING credits",
        )
        .bind(user_id)
        .bind(email)
        .bind(DEFAULT_USER_CREDITS)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("credits")?)
    }
}

/// Process-local ledger.
#[derive(Default)]
pub struct MemoryCreditLedger {
    balances: Mutex<HashMap<String, i32>>,
}

impl MemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user with a balance.
    pub fn with_user(mut self, user_id: impl Into<String>, credits: i32) -> Self {
        self.balances.get_mut().insert(user_id.into(), credits.max(0));
        self
    }
}

#[async_trait]
impl CreditLedger for MemoryCreditLedger {
    async fn consume(&self, user_id: &str) -> StoreResult<Option<i32>> {
        let mut balances = self.balances.lock().await;
        Ok(match balances.get_mut(user_id) {
            Some(credits) if *credits > 0 => {
                *credits -= 1;
                Some(*credits)
            }
            _ => None,
        })
    }

    async fn refund(&self, user_id: &str) -> StoreResult<Option<i32>> {
        let mut balances = self.balances.lock().await;
        Ok(balances.get_mut(user_id).map(|credits| {
            *credits += 1;
            *credits
        }))
    }

    async fn balance(&self, user_id: &str) -> StoreResult<Option<i32>> {
        Ok(self.balances.lock().await.get(user_id).copied())
    }

    async fn add_credits(&self, user_id: &str, amount: i32) -> StoreResult<Option<i32>> {
        check_amount(amount)?;
        let mut balances = self.balances.lock().await;
        Ok(balances.get_mut(user_id).map(|credits| {
            *credits += amount;
            *credits
        }))
    }

    async fn ensure_user(&self, user_id: &str, _email: &str) -> StoreResult<i32> {
        let mut balances = self.balances.lock().await;
        let credits = *balances
            .entry(user_id.to_string())
            .or_insert(DEFAULT_USER_CREDITS);
        debug!(user_id = %user_id, credits, "Ensured user");
        Ok(credits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_consume_never_goes_negative() {
        let ledger = MemoryCreditLedger::new().with_user("u1", 1);
        assert_eq!(ledger.consume("u1").await.unwrap(), Some(0));
        assert_eq!(ledger.consume("u1").await.unwrap(), None);
        assert_eq!(ledger.balance("u1").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let ledger = MemoryCreditLedger::new();
        assert_eq!(ledger.consume("ghost").await.unwrap(), None);
        assert_eq!(ledger.refund("ghost").await.unwrap(), None);
        assert_eq!(ledger.balance("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refund_and_add_credits() {
        let ledger = MemoryCreditLedger::new().with_user("u1", 0);
        assert_eq!(ledger.refund("u1").await.unwrap(), Some(1));
        assert_eq!(ledger.add_credits("u1", 5).await.unwrap(), Some(6));

        let err = ledger.add_credits("u1", 0).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_CREDIT_AMOUNT");
    }

    #[tokio::test]
    async fn test_ensure_user_defaults() {
        let ledger = MemoryCreditLedger::new();
        assert_eq!(ledger.ensure_user("u1", "a@b.c").await.unwrap(), DEFAULT_USER_CREDITS);
        ledger.consume("u1").await.unwrap();
        assert_eq!(ledger.ensure_user("u1", "a@b.c").await.unwrap(), DEFAULT_USER_CREDITS - 1);
    }

    #[tokio::test]
    async fn test_concurrent_consume_is_exact() {
        use std::sync::Arc;

        let ledger = Arc::new(MemoryCreditLedger::new().with_user("u1", 3));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.consume("u1").await.unwrap() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
        assert_eq!(ledger.balance("u1").await.unwrap(), Some(0));
    }
}
