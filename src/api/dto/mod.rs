//! Data Transfer Objects for REST request/response serialization.
//!
//! Wallet addresses, transaction hashes, and week keys are serialized as
//! strings and validated at the handler boundary.

pub mod claim_dto;
pub mod event_dto;
pub mod task_dto;

pub use claim_dto::*;
pub use event_dto::*;
pub use task_dto::*;
