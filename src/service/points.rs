//! Stake-proportional points distribution.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    BuilderId, LedgerStore, PointsReceipt, PointsReceiptKind, ResidualPolicy, Season, SeasonPolicy,
    WalletAddress, Week,
};
use crate::error::EngineError;
use crate::persistence::PostgresPersistence;

/// Result of one distribution run.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionSummary {
    /// Builder whose pool was distributed.
    pub builder_id: BuilderId,
    /// Week settled.
    pub week: Week,
    /// Total pool for the builder's rank.
    pub pool: u64,
    /// Points credited to the builder.
    pub builder_points: u64,
    /// Points credited across all backers.
    pub backer_points: u64,
    /// Number of receipts written.
    pub receipts: usize,
}

/// Counters for one ranked-list distribution run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeekDistributionSummary {
    /// Week settled.
    pub week: Option<Week>,
    /// Builder-weeks distributed.
    pub distributed: usize,
    /// Builder-weeks skipped (missing receipt, live distribution, unknown
    /// builder).
    pub skipped: usize,
    /// Points credited across all distributed pools.
    pub total_points: u64,
}

/// Splits a builder's weekly pool between the builder and their backers.
///
/// The pool is conserved exactly: the builder share plus every backer share
/// always sums to the rank pool, with integer truncation residuals placed
/// by the season's [`ResidualPolicy`]. Distribution never mutates stakes;
/// the stake table is read as a snapshot at call time.
#[derive(Debug, Clone)]
pub struct PointsDistributor {
    ledger: Arc<LedgerStore>,
    persistence: Option<Arc<PostgresPersistence>>,
    policy: SeasonPolicy,
}

impl PointsDistributor {
    /// Creates a distributor with the given season policy.
    #[must_use]
    pub fn new(
        ledger: Arc<LedgerStore>,
        persistence: Option<Arc<PostgresPersistence>>,
        policy: SeasonPolicy,
    ) -> Self {
        Self {
            ledger,
            persistence,
            policy,
        }
    }

    /// The active season policy.
    #[must_use]
    pub const fn policy(&self) -> &SeasonPolicy {
        &self.policy
    }

    /// Distributes the weekly pool for one builder at the given leaderboard
    /// rank.
    ///
    /// Requires a gem receipt for the builder-week. Rejects if live receipts
    /// already exist; a re-run after [`Self::void_distribution`] is the
    /// supported correction path.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownBuilder`] if the builder is not registered,
    /// [`EngineError::MissingGemReceipt`] if the weekly rollup has not run,
    /// [`EngineError::AlreadyDistributed`] if live receipts exist.
    pub async fn distribute(
        &self,
        builder_id: BuilderId,
        week: Week,
        rank: u32,
    ) -> Result<DistributionSummary, EngineError> {
        let account = self.ledger.builder(builder_id).await?;
        let gem_receipt = self
            .ledger
            .gem_receipt(builder_id, week)
            .await
            .ok_or(EngineError::MissingGemReceipt {
                builder: builder_id,
                week,
            })?;

        let pool = self.policy.weekly_pool(rank);
        let builder_share = mul_bps(pool, self.policy.builder_share_bps);
        let backer_pool = pool - builder_share;

        // Snapshot at call time; transfers landing after this read count
        // toward the next week.
        let stakes = self.ledger.stakes_for_claim(account.claim_id).await;
        let total_stake: u64 = stakes.iter().map(|s| s.quantity).sum();

        let mut builder_points = builder_share;
        let mut backer_shares: Vec<(WalletAddress, u64)> = Vec::new();

        if total_stake == 0 {
            // No backers: the whole pool belongs to the builder.
            builder_points = pool;
        } else {
            let mut distributed: u64 = 0;
            let mut remainders: Vec<(usize, u128, u64)> = Vec::new();
            for (index, stake) in stakes.iter().enumerate() {
                let product = u128::from(backer_pool) * u128::from(stake.quantity);
                let share = u64::try_from(product / u128::from(total_stake)).unwrap_or(0);
                let remainder = product % u128::from(total_stake);
                distributed += share;
                remainders.push((index, remainder, stake.quantity));
                backer_shares.push((stake.backer_wallet.clone(), share));
            }
            let residual = backer_pool - distributed;
            match self.policy.residual {
                ResidualPolicy::CreditBuilder => builder_points += residual,
                ResidualPolicy::LargestRemainder => {
                    // One extra unit per backer, largest fractional remainder
                    // first, larger stake breaking ties.
                    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
                    for (index, _, _) in remainders.iter().take(
                        usize::try_from(residual).unwrap_or(usize::MAX),
                    ) {
                        if let Some(entry) = backer_shares.get_mut(*index) {
                            entry.1 += 1;
                        }
                    }
                }
            }
        }

        let now = Utc::now();
        let season = gem_receipt.season;
        let mut receipts: Vec<PointsReceipt> = Vec::new();
        if builder_points > 0 {
            receipts.push(PointsReceipt {
                id: Uuid::new_v4(),
                recipient: account.wallet.clone(),
                value: builder_points,
                kind: PointsReceiptKind::BuilderReward,
                event_id: gem_receipt.id,
                builder_id,
                week,
                season,
                claimed_at: None,
                voided_at: None,
                created_at: now,
            });
        }
        let mut backer_points: u64 = 0;
        for (wallet, value) in backer_shares {
            if value == 0 {
                continue;
            }
            backer_points += value;
            receipts.push(PointsReceipt {
                id: Uuid::new_v4(),
                recipient: wallet,
                value,
                kind: PointsReceiptKind::BackerReward,
                event_id: gem_receipt.id,
                builder_id,
                week,
                season,
                claimed_at: None,
                voided_at: None,
                created_at: now,
            });
        }

        debug_assert_eq!(builder_points + backer_points, pool);

        let count = receipts.len();
        self.ledger
            .insert_distribution(builder_id, week, receipts.clone())
            .await?;
        info!(
            %builder_id,
            %week,
            rank,
            pool,
            builder_points,
            backer_points,
            receipts = count,
            "points distributed"
        );
        if let Some(persistence) = &self.persistence
            && let Err(e) = persistence.save_points_receipts(&receipts).await
        {
            warn!(%builder_id, %week, error = %e, "points receipt write-behind failed");
        }
        Ok(DistributionSummary {
            builder_id,
            week,
            pool,
            builder_points,
            backer_points,
            receipts: count,
        })
    }

    /// Distributes a week's ranked builder list, skip-and-continue: a
    /// builder-week that cannot be settled (missing receipt, live
    /// distribution) is logged and skipped, and the rest of the list still
    /// commits.
    pub async fn distribute_week(
        &self,
        week: Week,
        rankings: &[(BuilderId, u32)],
    ) -> WeekDistributionSummary {
        let mut summary = WeekDistributionSummary {
            week: Some(week),
            ..WeekDistributionSummary::default()
        };
        for (builder_id, rank) in rankings {
            match self.distribute(*builder_id, week, *rank).await {
                Ok(s) => {
                    summary.distributed += 1;
                    summary.total_points += s.pool;
                }
                Err(e) => {
                    warn!(%builder_id, %week, rank, error = %e, "builder-week skipped");
                    summary.skipped += 1;
                }
            }
        }
        info!(
            %week,
            distributed = summary.distributed,
            skipped = summary.skipped,
            total_points = summary.total_points,
            "ranked distribution run finished"
        );
        summary
    }

    /// Voids every live receipt for a builder-week, reversing the balance
    /// credits and reopening the week for redistribution. Returns the number
    /// of receipts voided.
    pub async fn void_distribution(&self, builder_id: BuilderId, week: Week) -> usize {
        let voided = self.ledger.void_distribution(builder_id, week).await;
        if voided > 0 {
            let receipts = self.ledger.receipts_for(builder_id, week).await;
            info!(%builder_id, %week, voided, "distribution voided");
            if let Some(persistence) = &self.persistence
                && let Err(e) = persistence.save_points_receipts(&receipts).await
            {
                warn!(%builder_id, %week, error = %e, "void write-behind failed");
            }
        }
        voided
    }
}

fn mul_bps(value: u64, bps: u64) -> u64 {
    u64::try_from(u128::from(value) * u128::from(bps) / 10_000).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{
        BuilderAccount, ClaimId, PayoutCohort, PointsCurve, TransferEvent, TxHash,
    };

    fn wallet(n: u8) -> WalletAddress {
        let addr = WalletAddress::parse(&format!("0x{:040x}", u128::from(n) + 0x10)).ok();
        let Some(addr) = addr else {
            panic!("valid wallet");
        };
        addr
    }

    async fn seed_builder(ledger: &LedgerStore, claim: u64) -> BuilderId {
        let account = BuilderAccount {
            id: BuilderId::new(),
            wallet: wallet(0),
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

    async fn seed_stake(ledger: &LedgerStore, claim: u64, backer: u8, quantity: u64, nonce: u8) {
        let hash = TxHash::parse(&format!("0x{:064x}", u128::from(nonce) + 1)).ok();
        let Some(tx_hash) = hash else {
            panic!("valid hash");
        };
        let event = TransferEvent {
            tx_hash,
            log_index: 0,
            from: WalletAddress::zero(),
            to: wallet(backer),
            claim_id: ClaimId(claim),
            quantity,
            block_number: 1,
        };
        let Ok(_) = ledger.apply_transfer(&event, Season(1)).await else {
            panic!("mint failed");
        };
    }

    async fn seed_gems(ledger: &LedgerStore, builder: BuilderId, week: Week) {
        let _ = ledger
            .upsert_gem_receipt(builder, week, Season(1), 100, 4)
            .await;
    }

    fn flat_policy(pool: u64, builder_share_bps: u64, residual: ResidualPolicy) -> SeasonPolicy {
        SeasonPolicy {
            weekly_allocated_points: pool,
            normalisation_factor: 10_000,
            builder_share_bps,
            curve: PointsCurve::Table {
                weights: vec![10_000],
            },
            residual,
        }
    }

    #[tokio::test]
    async fn even_split_is_exact() {
        let ledger = Arc::new(LedgerStore::new());
        let builder = seed_builder(&ledger, 7).await;
        let week = Week::new(2026, 8);
        seed_gems(&ledger, builder, week).await;
        seed_stake(&ledger, 7, 1, 3, 1).await;
        seed_stake(&ledger, 7, 2, 1, 2).await;

        // Pool 40, no builder share: stakes [3, 1] split as [30, 10].
        let distributor = PointsDistributor::new(
            Arc::clone(&ledger),
            None,
            flat_policy(40, 0, ResidualPolicy::CreditBuilder),
        );
        let summary = distributor.distribute(builder, week, 1).await;
        let Ok(summary) = summary else {
            panic!("distribute failed");
        };
        assert_eq!(summary.pool, 40);
        assert_eq!(summary.builder_points, 0);
        assert_eq!(summary.backer_points, 40);
        assert_eq!(ledger.balance(&wallet(1)).await, 30);
        assert_eq!(ledger.balance(&wallet(2)).await, 10);
    }

    #[tokio::test]
    async fn largest_remainder_places_residual_on_backers() {
        let ledger = Arc::new(LedgerStore::new());
        let builder = seed_builder(&ledger, 7).await;
        let week = Week::new(2026, 8);
        seed_gems(&ledger, builder, week).await;
        for backer in 1..=3 {
            seed_stake(&ledger, 7, backer, 1, backer).await;
        }

        // Pool 10 over stakes [1, 1, 1]: truncation gives 3 each, the one
        // residual unit goes to the first backer by wallet order.
        let distributor = PointsDistributor::new(
            Arc::clone(&ledger),
            None,
            flat_policy(10, 0, ResidualPolicy::LargestRemainder),
        );
        let Ok(summary) = distributor.distribute(builder, week, 1).await else {
            panic!("distribute failed");
        };
        assert_eq!(summary.backer_points, 10);
        let mut balances = Vec::new();
        for backer in 1..=3 {
            balances.push(ledger.balance(&wallet(backer)).await);
        }
        balances.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(balances, vec![4, 3, 3]);
    }

    #[tokio::test]
    async fn credit_builder_places_residual_on_builder() {
        let ledger = Arc::new(LedgerStore::new());
        let builder = seed_builder(&ledger, 7).await;
        let week = Week::new(2026, 8);
        seed_gems(&ledger, builder, week).await;
        for backer in 1..=3 {
            seed_stake(&ledger, 7, backer, 1, backer).await;
        }

        let distributor = PointsDistributor::new(
            Arc::clone(&ledger),
            None,
            flat_policy(10, 0, ResidualPolicy::CreditBuilder),
        );
        let Ok(summary) = distributor.distribute(builder, week, 1).await else {
            panic!("distribute failed");
        };
        assert_eq!(summary.builder_points, 1);
        assert_eq!(summary.backer_points, 9);
        assert_eq!(summary.builder_points + summary.backer_points, summary.pool);
        assert_eq!(ledger.balance(&wallet(0)).await, 1);
    }

    #[tokio::test]
    async fn builder_share_and_conservation() {
        let ledger = Arc::new(LedgerStore::new());
        let builder = seed_builder(&ledger, 7).await;
        let week = Week::new(2026, 8);
        seed_gems(&ledger, builder, week).await;
        seed_stake(&ledger, 7, 1, 7, 1).await;
        seed_stake(&ledger, 7, 2, 13, 2).await;
        seed_stake(&ledger, 7, 3, 29, 3).await;

        // 20% builder share over an awkward pool; conservation must be exact.
        let distributor = PointsDistributor::new(
            Arc::clone(&ledger),
            None,
            flat_policy(99_991, 2_000, ResidualPolicy::CreditBuilder),
        );
        let Ok(summary) = distributor.distribute(builder, week, 1).await else {
            panic!("distribute failed");
        };
        assert_eq!(summary.builder_points + summary.backer_points, 99_991);
        let mut total = ledger.balance(&wallet(0)).await;
        for backer in 1..=3 {
            total += ledger.balance(&wallet(backer)).await;
        }
        assert_eq!(total, 99_991);
    }

    #[tokio::test]
    async fn no_backers_means_whole_pool_to_builder() {
        let ledger = Arc::new(LedgerStore::new());
        let builder = seed_builder(&ledger, 7).await;
        let week = Week::new(2026, 8);
        seed_gems(&ledger, builder, week).await;

        let distributor = PointsDistributor::new(
            Arc::clone(&ledger),
            None,
            flat_policy(40, 2_000, ResidualPolicy::CreditBuilder),
        );
        let Ok(summary) = distributor.distribute(builder, week, 1).await else {
            panic!("distribute failed");
        };
        assert_eq!(summary.builder_points, 40);
        assert_eq!(summary.backer_points, 0);
    }

    #[tokio::test]
    async fn missing_gem_receipt_rejected() {
        let ledger = Arc::new(LedgerStore::new());
        let builder = seed_builder(&ledger, 7).await;
        let distributor = PointsDistributor::new(
            Arc::clone(&ledger),
            None,
            flat_policy(40, 0, ResidualPolicy::CreditBuilder),
        );
        let result = distributor.distribute(builder, Week::new(2026, 8), 1).await;
        assert!(matches!(result, Err(EngineError::MissingGemReceipt { .. })));
    }

    #[tokio::test]
    async fn double_distribution_rejected_until_voided() {
        let ledger = Arc::new(LedgerStore::new());
        let builder = seed_builder(&ledger, 7).await;
        let week = Week::new(2026, 8);
        seed_gems(&ledger, builder, week).await;
        seed_stake(&ledger, 7, 1, 1, 1).await;

        let distributor = PointsDistributor::new(
            Arc::clone(&ledger),
            None,
            flat_policy(40, 0, ResidualPolicy::CreditBuilder),
        );
        let Ok(_) = distributor.distribute(builder, week, 1).await else {
            panic!("first distribute failed");
        };
        let again = distributor.distribute(builder, week, 1).await;
        assert!(matches!(again, Err(EngineError::AlreadyDistributed { .. })));
        assert_eq!(ledger.balance(&wallet(1)).await, 40);

        // Void, then redistribute at a corrected rank.
        assert_eq!(distributor.void_distribution(builder, week).await, 1);
        assert_eq!(ledger.balance(&wallet(1)).await, 0);
        let Ok(redo) = distributor.distribute(builder, week, 1).await else {
            panic!("redistribute failed");
        };
        assert_eq!(redo.pool, 40);
        assert_eq!(ledger.balance(&wallet(1)).await, 40);
    }

    #[tokio::test]
    async fn ranked_run_commits_past_a_bad_builder_week() {
        let ledger = Arc::new(LedgerStore::new());
        let first = seed_builder(&ledger, 7).await;
        let second = seed_builder(&ledger, 8).await;
        let week = Week::new(2026, 8);
        // Only the first builder has a gem receipt for the week.
        seed_gems(&ledger, first, week).await;
        seed_stake(&ledger, 7, 1, 1, 1).await;

        let distributor = PointsDistributor::new(
            Arc::clone(&ledger),
            None,
            flat_policy(40, 0, ResidualPolicy::CreditBuilder),
        );
        let summary = distributor
            .distribute_week(week, &[(first, 1), (second, 2)])
            .await;
        assert_eq!(summary.distributed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total_points, 40);
        assert_eq!(ledger.balance(&wallet(1)).await, 40);
    }

    #[tokio::test]
    async fn unclaimed_season_cohort_tracks_credits() {
        let ledger = Arc::new(LedgerStore::new());
        let builder = seed_builder(&ledger, 7).await;
        let week = Week::new(2026, 8);
        seed_gems(&ledger, builder, week).await;
        seed_stake(&ledger, 7, 1, 1, 1).await;

        let distributor = PointsDistributor::new(
            Arc::clone(&ledger),
            None,
            flat_policy(40, 0, ResidualPolicy::CreditBuilder),
        );
        let Ok(_) = distributor.distribute(builder, week, 1).await else {
            panic!("distribute failed");
        };
        let cohort = PayoutCohort::Season { season: Season(1) };
        assert_eq!(ledger.unclaimed(&wallet(1), &cohort).await, 40);
    }
}
