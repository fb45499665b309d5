//! Contribution event ingest and builder registration.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{BuilderAccount, ContributionEvent, LedgerStore, Season, WalletAddress};
use crate::error::EngineError;
use crate::persistence::PostgresPersistence;

/// Accepts classifier output into the ledger.
///
/// Ingest is append-only and idempotent: the classifier may deliver the same
/// event more than once, and a replayed id is a no-op. Gems are never
/// recomputed here; the ingestor only records facts for the weekly rollup.
#[derive(Debug, Clone)]
pub struct EventIngestor {
    ledger: Arc<LedgerStore>,
    persistence: Option<Arc<PostgresPersistence>>,
}

impl EventIngestor {
    /// Creates an ingestor over the given ledger.
    #[must_use]
    pub fn new(ledger: Arc<LedgerStore>, persistence: Option<Arc<PostgresPersistence>>) -> Self {
        Self {
            ledger,
            persistence,
        }
    }

    /// Registers a builder account.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRequest`] if the builder or claim id is
    /// already registered.
    pub async fn register_builder(&self, account: BuilderAccount) -> Result<(), EngineError> {
        let builder_id = account.id;
        let claim_id = account.claim_id;
        self.ledger.register_builder(account.clone()).await?;
        info!(%builder_id, %claim_id, "builder registered");
        if let Some(persistence) = &self.persistence
            && let Err(e) = persistence.save_builder(&account).await
        {
            warn!(%builder_id, error = %e, "builder write-behind failed");
        }
        Ok(())
    }

    /// Appends one contribution event. Returns `true` if the event was new,
    /// `false` if its id was already ingested.
    ///
    /// The durable log is written behind the in-memory append; a persistence
    /// failure is logged but does not reject the event, since the log insert
    /// is idempotent and will be retried by the next startup replay gap scan.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownBuilder`] if the event names a builder
    /// that is not registered.
    pub async fn ingest(&self, event: ContributionEvent) -> Result<bool, EngineError> {
        let inserted = self.ledger.append_contribution(event.clone()).await?;
        if !inserted {
            debug!(event_id = %event.id, "duplicate contribution event ignored");
            return Ok(false);
        }
        debug!(
            event_id = %event.id,
            builder_id = %event.builder_id,
            kind = event.kind.as_str(),
            week = %event.week,
            gems = event.gems_awarded,
            "contribution event ingested"
        );
        if let Some(persistence) = &self.persistence
            && let Err(e) = persistence.save_contribution(&event).await
        {
            warn!(event_id = %event.id, error = %e, "contribution write-behind failed");
        }
        Ok(true)
    }

    /// Credits a partner-sponsored reward to a wallet, scoped to the
    /// partner's own payout cohort.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRequest`] if the amount is zero or the
    /// partner id is empty.
    pub async fn credit_partner_reward(
        &self,
        partner_id: &str,
        season: Season,
        wallet: WalletAddress,
        amount: u64,
    ) -> Result<(), EngineError> {
        if partner_id.is_empty() {
            return Err(EngineError::InvalidRequest(
                "partner id must not be empty".to_string(),
            ));
        }
        if amount == 0 {
            return Err(EngineError::InvalidRequest(
                "partner reward amount must be positive".to_string(),
            ));
        }
        self.ledger
            .credit_partner_reward(partner_id, season, wallet.clone(), amount)
            .await;
        info!(partner_id, %season, %wallet, amount, "partner reward credited");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{BuilderId, ClaimId, ContributionKind, Week};
    use chrono::Utc;
    use uuid::Uuid;

    fn wallet(c: char) -> WalletAddress {
        let addr = WalletAddress::parse(&format!("0x{}", c.to_string().repeat(40))).ok();
        let Some(addr) = addr else {
            panic!("valid wallet");
        };
        addr
    }

    fn account() -> BuilderAccount {
        BuilderAccount {
            id: BuilderId::new(),
            wallet: wallet('b'),
            claim_id: ClaimId(1),
            season: Season(1),
            email: "builder@example.com".to_string(),
            registered_at: Utc::now(),
        }
    }

    fn event(builder_id: BuilderId) -> ContributionEvent {
        ContributionEvent {
            id: Uuid::new_v4(),
            builder_id,
            kind: ContributionKind::MergedPullRequest,
            week: Week::new(2026, 8),
            season: Season(1),
            gems_awarded: 25,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn replayed_event_is_not_double_counted() {
        let ledger = Arc::new(LedgerStore::new());
        let ingestor = EventIngestor::new(Arc::clone(&ledger), None);
        let acct = account();
        let builder_id = acct.id;
        let Ok(()) = ingestor.register_builder(acct).await else {
            panic!("registration failed");
        };

        let ev = event(builder_id);
        assert_eq!(ingestor.ingest(ev.clone()).await.ok(), Some(true));
        assert_eq!(ingestor.ingest(ev).await.ok(), Some(false));
        assert_eq!(
            ledger
                .contributions_for(builder_id, Week::new(2026, 8))
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn unknown_builder_rejected() {
        let ledger = Arc::new(LedgerStore::new());
        let ingestor = EventIngestor::new(ledger, None);
        let result = ingestor.ingest(event(BuilderId::new())).await;
        assert!(matches!(result, Err(EngineError::UnknownBuilder(_))));
    }

    #[tokio::test]
    async fn zero_partner_reward_rejected() {
        let ledger = Arc::new(LedgerStore::new());
        let ingestor = EventIngestor::new(ledger, None);
        let result = ingestor
            .credit_partner_reward("acme", Season(1), wallet('a'), 0)
            .await;
        assert!(result.is_err());
    }
}
