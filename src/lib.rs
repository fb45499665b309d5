//! # scout-settlement
//!
//! Points and rewards settlement engine for a builder-funding marketplace.
//!
//! Builders earn gems for scored GitHub contributions; backers buy on-chain
//! claim tokens against builders; weekly points pools are split between a
//! builder and their backers in proportion to stake; unclaimed balances are
//! settled into on-chain merkle payout trees. The in-memory ledger is the
//! transactional source of truth, with PostgreSQL as a write-behind durable
//! log and EVM chains reached through a pluggable client.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler + Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── EventIngestor / GemsLedger / PointsDistributor (service/)
//!     ├── PurchaseReconciler / PendingTxOrchestrator (service/)
//!     ├── SettlementEngine (service/)
//!     │
//!     ├── LedgerStore (domain/)
//!     ├── ChainClient (chain/) ── EVM nodes
//!     ├── ArtifactStore (artifact/) ── payout tree blobs
//!     ├── Notifier (notify/)
//!     │
//!     └── PostgreSQL write-behind log (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod artifact;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod service;
