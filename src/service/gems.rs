//! Weekly gem rollups.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{BuilderId, GemReceipt, LedgerStore, Season, Week};
use crate::error::EngineError;
use crate::persistence::PostgresPersistence;

/// Result of one batch recompute run.
#[derive(Debug, Clone, Serialize)]
pub struct RecomputeSummary {
    /// Builders that had at least one event in the week.
    pub builders: usize,
    /// Receipts successfully recomputed.
    pub recomputed: usize,
    /// Builders skipped because their recompute failed.
    pub failed: usize,
}

/// Derives gem receipts from the contribution event log.
///
/// A receipt is a pure aggregate over the builder-week's events, so a
/// recompute after a back-dated correction always converges on the log.
#[derive(Debug, Clone)]
pub struct GemsLedger {
    ledger: Arc<LedgerStore>,
    persistence: Option<Arc<PostgresPersistence>>,
}

impl GemsLedger {
    /// Creates a gems ledger over the given store.
    #[must_use]
    pub fn new(ledger: Arc<LedgerStore>, persistence: Option<Arc<PostgresPersistence>>) -> Self {
        Self {
            ledger,
            persistence,
        }
    }

    /// Recomputes the gem receipt for one builder-week from scratch.
    ///
    /// The receipt id is stable across recomputes; only the totals and the
    /// timestamp change.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownBuilder`] if the builder is not
    /// registered.
    pub async fn recompute_weekly_gems(
        &self,
        builder_id: BuilderId,
        week: Week,
        season: Season,
    ) -> Result<GemReceipt, EngineError> {
        let account = self.ledger.builder(builder_id).await?;
        let events = self.ledger.contributions_for(builder_id, week).await;
        let total_gems = events.iter().map(|e| e.gems_awarded).sum();
        let receipt = self
            .ledger
            .upsert_gem_receipt(account.id, week, season, total_gems, events.len())
            .await;
        info!(
            %builder_id,
            %week,
            total_gems,
            event_count = events.len(),
            "gem receipt recomputed"
        );
        if let Some(persistence) = &self.persistence
            && let Err(e) = persistence.save_gem_receipt(&receipt).await
        {
            warn!(%builder_id, %week, error = %e, "gem receipt write-behind failed");
        }
        Ok(receipt)
    }

    /// Recomputes receipts for every builder with events in the week.
    ///
    /// One builder's failure does not abort the batch; it is logged and
    /// counted, and the run continues.
    pub async fn recompute_week(&self, week: Week, season: Season) -> RecomputeSummary {
        let builders = self.ledger.builders_with_events(week).await;
        let mut summary = RecomputeSummary {
            builders: builders.len(),
            recomputed: 0,
            failed: 0,
        };
        for builder_id in builders {
            match self.recompute_weekly_gems(builder_id, week, season).await {
                Ok(_) => summary.recomputed += 1,
                Err(e) => {
                    warn!(%builder_id, %week, error = %e, "gem recompute failed; continuing");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{
        BuilderAccount, ClaimId, ContributionEvent, ContributionKind, WalletAddress,
    };
    use chrono::Utc;
    use uuid::Uuid;

    async fn seed_builder(ledger: &LedgerStore, claim: u64) -> BuilderId {
        let wallet = WalletAddress::parse(&format!("0x{:040x}", claim + 1)).ok();
        let Some(wallet) = wallet else {
            panic!("valid wallet");
        };
        let account = BuilderAccount {
            id: BuilderId::new(),
            wallet,
            claim_id: ClaimId(claim),
            season: Season(1),
            email: "builder@example.com".to_string(),
            registered_at: Utc::now(),
        };
        let id = account.id;
        let Ok(()) = ledger.register_builder(account).await else {
            panic!("registration failed");
        };
        id
    }

    async fn seed_event(ledger: &LedgerStore, builder_id: BuilderId, week: Week, gems: u64) {
        let event = ContributionEvent {
            id: Uuid::new_v4(),
            builder_id,
            kind: ContributionKind::Commit,
            week,
            season: Season(1),
            gems_awarded: gems,
            created_at: Utc::now(),
        };
        let Ok(_) = ledger.append_contribution(event).await else {
            panic!("append failed");
        };
    }

    #[tokio::test]
    async fn rollup_sums_events_and_converges_after_correction() {
        let ledger = Arc::new(LedgerStore::new());
        let gems = GemsLedger::new(Arc::clone(&ledger), None);
        let week = Week::new(2026, 8);
        let builder = seed_builder(&ledger, 1).await;
        seed_event(&ledger, builder, week, 10).await;
        seed_event(&ledger, builder, week, 15).await;

        let first = gems.recompute_weekly_gems(builder, week, Season(1)).await;
        let Ok(first) = first else {
            panic!("recompute failed");
        };
        assert_eq!(first.total_gems, 25);
        assert_eq!(first.event_count, 2);

        // Back-dated correction lands after the first rollup.
        seed_event(&ledger, builder, week, 5).await;
        let second = gems.recompute_weekly_gems(builder, week, Season(1)).await;
        let Ok(second) = second else {
            panic!("recompute failed");
        };
        assert_eq!(second.total_gems, 30);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn builder_with_no_events_gets_zero_receipt() {
        let ledger = Arc::new(LedgerStore::new());
        let gems = GemsLedger::new(Arc::clone(&ledger), None);
        let builder = seed_builder(&ledger, 1).await;
        let receipt = gems
            .recompute_weekly_gems(builder, Week::new(2026, 8), Season(1))
            .await;
        let Ok(receipt) = receipt else {
            panic!("recompute failed");
        };
        assert_eq!(receipt.total_gems, 0);
        assert_eq!(receipt.event_count, 0);
    }

    #[tokio::test]
    async fn batch_covers_only_builders_with_events() {
        let ledger = Arc::new(LedgerStore::new());
        let gems = GemsLedger::new(Arc::clone(&ledger), None);
        let week = Week::new(2026, 8);
        let active = seed_builder(&ledger, 1).await;
        let _idle = seed_builder(&ledger, 2).await;
        seed_event(&ledger, active, week, 7).await;

        let summary = gems.recompute_week(week, Season(1)).await;
        assert_eq!(summary.builders, 1);
        assert_eq!(summary.recomputed, 1);
        assert_eq!(summary.failed, 0);
    }
}
