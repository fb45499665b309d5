//! PostgreSQL implementation of the durable settlement log.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{BuilderRow, ContributionRow, PayoutTreeRow, PointsReceiptRow};
use crate::domain::{BuilderAccount, ContributionEvent, GemReceipt, PayoutTree, PointsReceipt};
use crate::error::EngineError;

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// PostgreSQL-backed write-behind log using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Saves a builder account. Duplicate ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceError`] on database failure.
    pub async fn save_builder(&self, account: &BuilderAccount) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO builders (id, wallet, claim_id, season, email, registered_at) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO NOTHING",
        )
        .bind(*account.id.as_uuid())
        .bind(account.wallet.as_str())
        .bind(to_i64(account.claim_id.0))
        .bind(i64::from(account.season.0))
        .bind(&account.email)
        .bind(account.registered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        Ok(())
    }

    /// Loads every builder account, for startup replay.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceError`] on database failure.
    pub async fn load_builders(&self) -> Result<Vec<BuilderRow>, EngineError> {
        let rows = sqlx::query_as::<_, (Uuid, String, i64, i64, String, DateTime<Utc>)>(
            "SELECT id, wallet, claim_id, season, email, registered_at \
             FROM builders ORDER BY registered_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::PersistenceError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, wallet, claim_id, season, email, registered_at)| BuilderRow {
                    id,
                    wallet,
                    claim_id,
                    season,
                    email,
                    registered_at,
                },
            )
            .collect())
    }

    /// Appends a contribution event. Duplicate ids are ignored, matching
    /// the ledger's ingest idempotency.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceError`] on database failure.
    pub async fn save_contribution(&self, event: &ContributionEvent) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO contribution_events (id, builder_id, kind, week, season, gems_awarded, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (id) DO NOTHING",
        )
        .bind(event.id)
        .bind(*event.builder_id.as_uuid())
        .bind(event.kind.as_str())
        .bind(event.week.to_string())
        .bind(i64::from(event.season.0))
        .bind(to_i64(event.gems_awarded))
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        Ok(())
    }

    /// Upserts a gem receipt keyed by (builder, week).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceError`] on database failure.
    pub async fn save_gem_receipt(&self, receipt: &GemReceipt) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO gem_receipts (id, builder_id, week, season, total_gems, event_count, recomputed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (builder_id, week) DO UPDATE \
             SET total_gems = EXCLUDED.total_gems, \
                 event_count = EXCLUDED.event_count, \
                 recomputed_at = EXCLUDED.recomputed_at",
        )
        .bind(receipt.id)
        .bind(*receipt.builder_id.as_uuid())
        .bind(receipt.week.to_string())
        .bind(i64::from(receipt.season.0))
        .bind(to_i64(receipt.total_gems))
        .bind(to_i64(receipt.event_count as u64))
        .bind(receipt.recomputed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        Ok(())
    }

    /// Appends a batch of points receipts.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceError`] on database failure.
    pub async fn save_points_receipts(
        &self,
        receipts: &[PointsReceipt],
    ) -> Result<(), EngineError> {
        for receipt in receipts {
            sqlx::query(
                "INSERT INTO points_receipts \
                 (id, recipient, value, kind, event_id, builder_id, week, season, claimed_at, voided_at, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (id) DO UPDATE \
                 SET claimed_at = EXCLUDED.claimed_at, voided_at = EXCLUDED.voided_at",
            )
            .bind(receipt.id)
            .bind(receipt.recipient.as_str())
            .bind(to_i64(receipt.value))
            .bind(match receipt.kind {
                crate::domain::PointsReceiptKind::BuilderReward => "builder_reward",
                crate::domain::PointsReceiptKind::BackerReward => "backer_reward",
            })
            .bind(receipt.event_id)
            .bind(*receipt.builder_id.as_uuid())
            .bind(receipt.week.to_string())
            .bind(i64::from(receipt.season.0))
            .bind(receipt.claimed_at)
            .bind(receipt.voided_at)
            .bind(receipt.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        }
        Ok(())
    }

    /// Saves a published payout tree, with the full leaf/proof set as JSONB.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceError`] on database or
    /// serialization failure.
    pub async fn save_payout_tree(&self, tree: &PayoutTree) -> Result<(), EngineError> {
        let tree_json = serde_json::to_value(tree)
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        sqlx::query(
            "INSERT INTO payout_trees \
             (id, merkle_root, tree_json, total_amount, recipient_count, contract_address, \
              chain_id, deployed_block, expires_at, artifact_url, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET tree_json = EXCLUDED.tree_json",
        )
        .bind(tree.id)
        .bind(&tree.merkle_root)
        .bind(tree_json)
        .bind(to_i64(tree.total_amount))
        .bind(to_i64(tree.leaves.len() as u64))
        .bind(tree.contract_address.as_str())
        .bind(to_i64(tree.chain_id))
        .bind(to_i64(tree.deployed_block))
        .bind(tree.expires_at)
        .bind(&tree.artifact_url)
        .bind(tree.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        Ok(())
    }

    /// Loads the full contribution event log, oldest first. Used at startup
    /// to replay the log into the in-memory ledger.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceError`] on database failure.
    pub async fn load_contributions(&self) -> Result<Vec<ContributionRow>, EngineError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, String, i64, i64, DateTime<Utc>)>(
            "SELECT id, builder_id, kind, week, season, gems_awarded, created_at \
             FROM contribution_events ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::PersistenceError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, builder_id, kind, week, season, gems_awarded, created_at)| ContributionRow {
                    id,
                    builder_id,
                    kind,
                    week,
                    season,
                    gems_awarded,
                    created_at,
                },
            )
            .collect())
    }

    /// Loads the full points-receipt log, oldest first. Used at startup to
    /// rebuild balances and the double-distribution guard.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceError`] on database failure.
    pub async fn load_points_receipts(&self) -> Result<Vec<PointsReceiptRow>, EngineError> {
        type Row = (
            Uuid,
            String,
            i64,
            String,
            Uuid,
            Uuid,
            String,
            i64,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
            DateTime<Utc>,
        );
        let rows = sqlx::query_as::<_, Row>(
            "SELECT id, recipient, value, kind, event_id, builder_id, week, season, \
                    claimed_at, voided_at, created_at \
             FROM points_receipts ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::PersistenceError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    recipient,
                    value,
                    kind,
                    event_id,
                    builder_id,
                    week,
                    season,
                    claimed_at,
                    voided_at,
                    created_at,
                )| PointsReceiptRow {
                    id,
                    recipient,
                    value,
                    kind,
                    event_id,
                    builder_id,
                    week,
                    season,
                    claimed_at,
                    voided_at,
                    created_at,
                },
            )
            .collect())
    }

    /// Loads the most recent payout tree rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceError`] on database failure.
    pub async fn load_recent_trees(&self, limit: i64) -> Result<Vec<PayoutTreeRow>, EngineError> {
        type Row = (
            Uuid,
            String,
            serde_json::Value,
            i64,
            i64,
            String,
            i64,
            i64,
            DateTime<Utc>,
            String,
            DateTime<Utc>,
        );
        let rows = sqlx::query_as::<_, Row>(
            "SELECT id, merkle_root, tree_json, total_amount, recipient_count, contract_address, \
                    chain_id, deployed_block, expires_at, artifact_url, created_at \
             FROM payout_trees ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::PersistenceError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    merkle_root,
                    tree_json,
                    total_amount,
                    recipient_count,
                    contract_address,
                    chain_id,
                    deployed_block,
                    expires_at,
                    artifact_url,
                    created_at,
                )| PayoutTreeRow {
                    id,
                    merkle_root,
                    tree_json,
                    total_amount,
                    recipient_count,
                    contract_address,
                    chain_id,
                    deployed_block,
                    expires_at,
                    artifact_url,
                    created_at,
                },
            )
            .collect())
    }
}
