//! Domain layer: identifiers, immutable events, derived aggregates, payout
//! policies, the merkle tree, and the transactional ledger store.
//!
//! Contribution and transfer events are the only mutation sources; every
//! aggregate (gem receipts, stakes, points receipts, balances) is a
//! replayable projection over them.

pub mod contribution;
pub mod ids;
pub mod ledger;
pub mod merkle;
pub mod payout;
pub mod pending;
pub mod policy;
pub mod receipts;
pub mod stake;

pub use contribution::{BuilderAccount, ContributionEvent, ContributionKind};
pub use ids::{BuilderId, ClaimId, Season, TxHash, WalletAddress, Week};
pub use ledger::{LedgerStore, TransferOutcome};
pub use payout::{PartnerPayoutRule, PayoutCohort, PayoutLeaf, PayoutTree};
pub use pending::{PendingTransaction, PendingTxState};
pub use policy::{PointsCurve, ResidualPolicy, SeasonPolicy};
pub use receipts::{GemReceipt, PointsReceipt, PointsReceiptKind};
pub use stake::{BackerStake, NftPurchaseEvent, ReconciliationKey, TransferEvent};
