//! Service layer: the settlement engine's business operations.
//!
//! Each service owns one operation family and composes the ledger, the
//! chain client, and the collaborators it needs. Handlers stay thin; all
//! invariants are enforced here or in the ledger itself.

pub mod gems;
pub mod ingest;
pub mod pending;
pub mod points;
pub mod reconcile;
pub mod settlement;

pub use gems::{GemsLedger, RecomputeSummary};
pub use ingest::EventIngestor;
pub use pending::{PendingTxOrchestrator, PollSummary};
pub use points::{DistributionSummary, PointsDistributor};
pub use reconcile::{PurchaseReconciler, ReconcileSummary};
pub use settlement::{ClaimCheck, ClaimReceipt, SettlementEngine};
