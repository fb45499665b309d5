//! scout-settlement server entry point.
//!
//! Wires the ledger, services, chain client, and HTTP server together,
//! replaying the durable log into the in-memory ledger when persistence is
//! enabled.

use std::str::FromStr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use scout_settlement::api;
use scout_settlement::app_state::AppState;
use scout_settlement::artifact::FsArtifactStore;
use scout_settlement::chain::rpc::JsonRpcChainClient;
use scout_settlement::chain::ChainClient;
use scout_settlement::config::EngineConfig;
use scout_settlement::domain::{
    BuilderAccount, BuilderId, ClaimId, ContributionEvent, ContributionKind, LedgerStore,
    PayoutTree, PointsReceipt, PointsReceiptKind, Season, WalletAddress, Week,
};
use scout_settlement::notify::{EmailNotifier, LogNotifier, Notifier};
use scout_settlement::persistence::PostgresPersistence;
use scout_settlement::service::{
    EventIngestor, GemsLedger, PendingTxOrchestrator, PointsDistributor, PurchaseReconciler,
    SettlementEngine,
};
use scout_settlement::service::pending::PendingTxConfig;
use scout_settlement::service::settlement::SettlementConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = EngineConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting scout-settlement");

    // Build domain layer
    let ledger = Arc::new(LedgerStore::new());

    // Optional durable log + startup replay
    let persistence = if config.persistence_enabled {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                config.database_connect_timeout_secs,
            ))
            .connect(&config.database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        let persistence = Arc::new(PostgresPersistence::new(pool));
        replay_log(&persistence, &ledger).await;
        Some(persistence)
    } else {
        tracing::warn!("persistence disabled; ledger state will not survive restarts");
        None
    };

    // Chain access
    let chain: Arc<dyn ChainClient> = Arc::new(JsonRpcChainClient::new(
        config.chain_endpoints.clone(),
        config.operator_address.clone(),
    ));

    // Collaborators
    let notifier: Arc<dyn Notifier> = if config.notify_api_url.is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(EmailNotifier::new(
            config.notify_api_url.clone(),
            config.notify_api_key.clone(),
            config.notify_from.clone(),
        ))
    };
    let artifact = Arc::new(FsArtifactStore::new(config.artifact_dir.clone()));

    // Build service layer
    let ingestor = Arc::new(EventIngestor::new(
        Arc::clone(&ledger),
        persistence.clone(),
    ));
    let gems = Arc::new(GemsLedger::new(Arc::clone(&ledger), persistence.clone()));
    let distributor = Arc::new(PointsDistributor::new(
        Arc::clone(&ledger),
        persistence.clone(),
        config.season_policy.clone(),
    ));
    let reconciler = Arc::new(PurchaseReconciler::new(Arc::clone(&ledger)));
    let orchestrator = Arc::new(PendingTxOrchestrator::new(
        Arc::clone(&ledger),
        Arc::clone(&chain),
        notifier,
        PendingTxConfig {
            dest_chain_id: config.claim_chain_id,
            claim_contract: config.claim_contract.clone(),
            timeout_secs: config.pending_timeout_secs,
            scan_blocks: config.pending_scan_blocks,
            retry_attempts: config.chain_retry_attempts,
            retry_base_ms: config.chain_retry_base_ms,
        },
    ));
    let settlement = Arc::new(SettlementEngine::new(
        Arc::clone(&ledger),
        Arc::clone(&chain),
        artifact,
        persistence.clone(),
        config.partner_rules.clone(),
        SettlementConfig {
            payout_contract: config.payout_contract.clone(),
            payout_chain_id: config.payout_chain_id,
            claim_window_days: config.claim_window_days,
            retry_attempts: config.chain_retry_attempts,
            retry_base_ms: config.chain_retry_base_ms,
        },
    ));

    // Build application state
    let app_state = AppState {
        ledger,
        ingestor,
        gems,
        distributor,
        reconciler,
        orchestrator,
        settlement,
        chain,
        claim_contract: config.claim_contract.clone(),
        claim_chain_id: config.claim_chain_id,
        active_season: Season(config.active_season),
        tasks_enabled: !config.tasks_disabled,
    };

    // Build router
    let app = api::build_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Replays the durable log into the in-memory ledger: builders, then
/// contribution events, then points receipts, then payout trees (receipts
/// before trees, so claimed leaves settle the rebuilt unclaimed balances).
/// Rows that fail to parse are logged and skipped.
async fn replay_log(persistence: &PostgresPersistence, ledger: &LedgerStore) {
    let builders = match persistence.load_builders().await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "builder replay failed");
            return;
        }
    };
    let mut registered = 0usize;
    for row in builders {
        let Ok(wallet) = WalletAddress::parse(&row.wallet) else {
            tracing::warn!(builder_id = %row.id, "skipping builder with malformed wallet");
            continue;
        };
        let account = BuilderAccount {
            id: BuilderId::from_uuid(row.id),
            wallet,
            claim_id: ClaimId(u64::try_from(row.claim_id).unwrap_or(0)),
            season: Season(u32::try_from(row.season).unwrap_or(0)),
            email: row.email,
            registered_at: row.registered_at,
        };
        if ledger.register_builder(account).await.is_ok() {
            registered += 1;
        }
    }

    let events = match persistence.load_contributions().await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "contribution replay failed");
            return;
        }
    };
    let mut replayed = 0usize;
    for row in events {
        let (Ok(kind), Ok(week)) = (
            ContributionKind::from_str(&row.kind),
            Week::from_str(&row.week),
        ) else {
            tracing::warn!(event_id = %row.id, "skipping malformed contribution row");
            continue;
        };
        let event = ContributionEvent {
            id: row.id,
            builder_id: BuilderId::from_uuid(row.builder_id),
            kind,
            week,
            season: Season(u32::try_from(row.season).unwrap_or(0)),
            gems_awarded: u64::try_from(row.gems_awarded).unwrap_or(0),
            created_at: row.created_at,
        };
        match ledger.append_contribution(event).await {
            Ok(true) => replayed += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(event_id = %row.id, error = %e, "contribution replay skipped");
            }
        }
    }

    let receipts = match persistence.load_points_receipts().await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "points receipt replay failed");
            return;
        }
    };
    let mut restored_receipts = 0usize;
    for row in receipts {
        let (Ok(week), Ok(recipient)) = (
            Week::from_str(&row.week),
            WalletAddress::parse(&row.recipient),
        ) else {
            tracing::warn!(receipt_id = %row.id, "skipping malformed points receipt row");
            continue;
        };
        let kind = match row.kind.as_str() {
            "builder_reward" => PointsReceiptKind::BuilderReward,
            "backer_reward" => PointsReceiptKind::BackerReward,
            _ => {
                tracing::warn!(receipt_id = %row.id, kind = %row.kind, "skipping receipt with unknown kind");
                continue;
            }
        };
        ledger
            .restore_receipt(PointsReceipt {
                id: row.id,
                recipient,
                value: u64::try_from(row.value).unwrap_or(0),
                kind,
                event_id: row.event_id,
                builder_id: BuilderId::from_uuid(row.builder_id),
                week,
                season: Season(u32::try_from(row.season).unwrap_or(0)),
                claimed_at: row.claimed_at,
                voided_at: row.voided_at,
                created_at: row.created_at,
            })
            .await;
        restored_receipts += 1;
    }

    let trees = match persistence.load_recent_trees(500).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "payout tree replay failed");
            return;
        }
    };
    let mut restored_trees = 0usize;
    for row in trees {
        match serde_json::from_value::<PayoutTree>(row.tree_json) {
            Ok(tree) => {
                ledger.restore_tree(tree).await;
                restored_trees += 1;
            }
            Err(e) => {
                tracing::warn!(tree_id = %row.id, error = %e, "skipping undecodable payout tree row");
            }
        }
    }
    tracing::info!(
        registered,
        replayed,
        restored_receipts,
        restored_trees,
        "durable log replayed"
    );
}
