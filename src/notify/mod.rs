//! Outbound notifications.
//!
//! The engine sends exactly one notification per terminal pending-transaction
//! failure. [`Notifier`] is the seam; [`EmailNotifier`] posts to a
//! transactional-email HTTP API, [`LogNotifier`] just logs (useful when no
//! mail provider is configured, and as the default in local runs).

use async_trait::async_trait;
use serde_json::json;

use crate::domain::pending::PendingTransaction;
use crate::error::EngineError;

/// Delivers user-facing notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notifies the initiating user that their bridge transaction failed
    /// terminally (revert or timeout) and will not be retried.
    async fn pending_tx_failed(
        &self,
        tx: &PendingTransaction,
        reason: &str,
    ) -> Result<(), EngineError>;
}

/// Notifier that posts to a transactional-email HTTP API.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_address: String,
}

impl EmailNotifier {
    /// Creates a notifier for the given mail API.
    #[must_use]
    pub fn new(api_url: String, api_key: String, from_address: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from_address,
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn pending_tx_failed(
        &self,
        tx: &PendingTransaction,
        reason: &str,
    ) -> Result<(), EngineError> {
        let body = json!({
            "from": self.from_address,
            "to": tx.backer_email,
            "subject": "Your claim-token purchase could not be completed",
            "text": format!(
                "Your purchase of {} unit(s) of claim {} could not be completed: {reason}. \
                 No stake was credited and no retry will be attempted. \
                 Source transaction: {}.",
                tx.quantity, tx.claim_id, tx.source_tx_hash
            ),
        });
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::NotifyError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::NotifyError(format!(
                "mail api returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Notifier that only logs. Default when no mail API is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn pending_tx_failed(
        &self,
        tx: &PendingTransaction,
        reason: &str,
    ) -> Result<(), EngineError> {
        tracing::warn!(
            pending_tx = %tx.id,
            backer = %tx.backer_wallet,
            reason,
            "pending transaction failed; notification logged only"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::ids::{ClaimId, Season, TxHash, WalletAddress};
    use crate::domain::pending::PendingTxState;
    use chrono::Utc;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let hash = TxHash::parse(&format!("0x{}", "33".repeat(32))).ok();
        let Some(source_tx_hash) = hash else {
            panic!("valid hash");
        };
        let tx = PendingTransaction {
            id: uuid::Uuid::new_v4(),
            backer_wallet: WalletAddress::zero(),
            backer_email: "backer@example.com".to_string(),
            claim_id: ClaimId(1),
            quantity: 1,
            season: Season(1),
            source_chain_id: 1,
            dest_chain_id: 8453,
            source_tx_hash,
            dest_tx_hash: None,
            state: PendingTxState::Failed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(LogNotifier.pending_tx_failed(&tx, "timeout").await.is_ok());
    }
}
