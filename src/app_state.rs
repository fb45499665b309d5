//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::chain::ChainClient;
use crate::domain::{LedgerStore, Season, WalletAddress};
use crate::service::{
    EventIngestor, GemsLedger, PendingTxOrchestrator, PointsDistributor, PurchaseReconciler,
    SettlementEngine,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Authoritative ledger, for read-side handlers.
    pub ledger: Arc<LedgerStore>,
    /// Contribution ingest and builder registration.
    pub ingestor: Arc<EventIngestor>,
    /// Weekly gem rollups.
    pub gems: Arc<GemsLedger>,
    /// Points distribution.
    pub distributor: Arc<PointsDistributor>,
    /// Purchase reconciliation.
    pub reconciler: Arc<PurchaseReconciler>,
    /// Pending transaction orchestration.
    pub orchestrator: Arc<PendingTxOrchestrator>,
    /// Payout tree settlement and claims.
    pub settlement: Arc<SettlementEngine>,
    /// Chain access for the reconciliation task.
    pub chain: Arc<dyn ChainClient>,
    /// Claim-token contract scanned by the reconciliation task.
    pub claim_contract: WalletAddress,
    /// Chain the claim token lives on.
    pub claim_chain_id: u64,
    /// Season new stake credits are applied in.
    pub active_season: Season,
    /// When `false`, task endpoints report `skipped` without running.
    pub tasks_enabled: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("claim_contract", &self.claim_contract)
            .field("claim_chain_id", &self.claim_chain_id)
            .field("active_season", &self.active_season)
            .field("tasks_enabled", &self.tasks_enabled)
            .finish_non_exhaustive()
    }
}
