//! Persistence layer: PostgreSQL durability for settlement facts.
//!
//! The in-memory [`crate::domain::LedgerStore`] is authoritative at
//! runtime; this layer is a write-behind durable log (contribution events,
//! gem and points receipts, payout trees) used for startup replay,
//! reconciliation jobs, and audit. The concrete implementation uses
//! `sqlx::PgPool` for async PostgreSQL access.

pub mod models;
pub mod postgres;

pub use postgres::PostgresPersistence;
