//! JSON-RPC implementation of [`ChainClient`].
//!
//! Talks plain `eth_*` JSON-RPC over HTTP: receipt lookups, `eth_getLogs`
//! for `TransferSingle` events, `eth_call` for claim-status reads, and
//! `eth_sendTransaction` (node-managed operator account) for root
//! publication and claim execution. ABI encoding is done by hand for the
//! three calls the engine makes; the contracts are otherwise opaque.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ChainClient, TxStatus};
use crate::domain::ids::{TxHash, WalletAddress};
use crate::domain::merkle::Digest;
use crate::domain::stake::TransferEvent;
use crate::error::EngineError;

/// `keccak256("TransferSingle(address,address,address,uint256,uint256)")`.
const TRANSFER_SINGLE_TOPIC: &str =
    "0xc3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62";

/// 4-byte selector of `isClaimed(uint256)`.
const SELECTOR_IS_CLAIMED: &str = "0x9e34070f";
/// 4-byte selector of `publishRoot(bytes32,uint256,uint256)`.
const SELECTOR_PUBLISH_ROOT: &str = "0x7e9d58c4";
/// 4-byte selector of `claim(uint256,address,uint256,bytes32[])`.
const SELECTOR_CLAIM: &str = "0x2e7ba6ef";

/// [`ChainClient`] over HTTP JSON-RPC endpoints, one per chain id.
#[derive(Debug, Clone)]
pub struct JsonRpcChainClient {
    client: reqwest::Client,
    endpoints: HashMap<u64, String>,
    operator: WalletAddress,
}

impl JsonRpcChainClient {
    /// Creates a client for the given chain-id → endpoint map. Writes are
    /// sent from the node-managed `operator` account.
    #[must_use]
    pub fn new(endpoints: HashMap<u64, String>, operator: WalletAddress) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            operator,
        }
    }

    fn endpoint(&self, chain_id: u64) -> Result<&str, EngineError> {
        self.endpoints
            .get(&chain_id)
            .map(String::as_str)
            .ok_or_else(|| {
                EngineError::InvalidRequest(format!("no RPC endpoint for chain {chain_id}"))
            })
    }

    async fn call(&self, chain_id: u64, method: &str, params: Value) -> Result<Value, EngineError> {
        let endpoint = self.endpoint(chain_id)?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::ChainError(format!("{method}: {e}")))?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| EngineError::ChainError(format!("{method}: bad response: {e}")))?;
        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error");
            if message.contains("revert") {
                return Err(EngineError::ChainReverted(message.to_string()));
            }
            return Err(EngineError::ChainError(format!("{method}: {message}")));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| EngineError::ChainError(format!("{method}: missing result")))
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn latest_block(&self, chain_id: u64) -> Result<u64, EngineError> {
        let result = self.call(chain_id, "eth_blockNumber", json!([])).await?;
        hex_quantity_result(&result, "eth_blockNumber")
    }

    async fn tx_status(&self, chain_id: u64, tx_hash: &TxHash) -> Result<TxStatus, EngineError> {
        let result = self
            .call(
                chain_id,
                "eth_getTransactionReceipt",
                json!([tx_hash.as_str()]),
            )
            .await?;
        if result.is_null() {
            return Ok(TxStatus::Pending);
        }
        let status = result
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::ChainError("receipt missing status".to_string()))?;
        Ok(if hex_u64(status)? == 1 {
            TxStatus::Confirmed
        } else {
            TxStatus::Reverted
        })
    }

    async fn transfer_logs(
        &self,
        chain_id: u64,
        contract: &WalletAddress,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, EngineError> {
        let params = json!([{
            "address": contract.as_str(),
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": format!("0x{to_block:x}"),
            "topics": [TRANSFER_SINGLE_TOPIC],
        }]);
        let result = self.call(chain_id, "eth_getLogs", params).await?;
        let entries = result
            .as_array()
            .ok_or_else(|| EngineError::ChainError("eth_getLogs: expected array".to_string()))?;
        let mut events = Vec::with_capacity(entries.len());
        for entry in entries {
            match parse_transfer_log(entry) {
                Ok(event) => events.push(event),
                Err(err) => {
                    // Unparseable logs are skipped, not fatal to the scan.
                    tracing::warn!(%err, "skipping malformed transfer log");
                }
            }
        }
        Ok(events)
    }

    async fn publish_payout_root(
        &self,
        chain_id: u64,
        contract: &WalletAddress,
        root: &Digest,
        total_amount: u64,
        expires_at_unix: u64,
    ) -> Result<TxHash, EngineError> {
        let mut data = String::from(SELECTOR_PUBLISH_ROOT);
        data.push_str(&word_bytes(root));
        data.push_str(&word_u64(total_amount));
        data.push_str(&word_u64(expires_at_unix));
        self.send_transaction(chain_id, contract, &data).await
    }

    async fn is_leaf_claimed(
        &self,
        chain_id: u64,
        contract: &WalletAddress,
        leaf_index: u64,
    ) -> Result<bool, EngineError> {
        let mut data = String::from(SELECTOR_IS_CLAIMED);
        data.push_str(&word_u64(leaf_index));
        let params = json!([{ "to": contract.as_str(), "data": data }, "latest"]);
        let result = self.call(chain_id, "eth_call", params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| EngineError::ChainError("eth_call: expected hex string".to_string()))?;
        Ok(hex_u64(raw)? != 0)
    }

    async fn execute_claim(
        &self,
        chain_id: u64,
        contract: &WalletAddress,
        leaf_index: u64,
        recipient: &WalletAddress,
        amount: u64,
        proof: &[Digest],
    ) -> Result<TxHash, EngineError> {
        let mut data = String::from(SELECTOR_CLAIM);
        data.push_str(&word_u64(leaf_index));
        data.push_str(&word_address(recipient)?);
        data.push_str(&word_u64(amount));
        // Offset of the bytes32[] tail: four head words.
        data.push_str(&word_u64(4 * 32));
        data.push_str(&word_u64(proof.len() as u64));
        for step in proof {
            data.push_str(&word_bytes(step));
        }
        self.send_transaction(chain_id, contract, &data).await
    }
}

impl JsonRpcChainClient {
    async fn send_transaction(
        &self,
        chain_id: u64,
        contract: &WalletAddress,
        data: &str,
    ) -> Result<TxHash, EngineError> {
        let params = json!([{
            "from": self.operator.as_str(),
            "to": contract.as_str(),
            "data": data,
        }]);
        let result = self.call(chain_id, "eth_sendTransaction", params).await?;
        let raw = result.as_str().ok_or_else(|| {
            EngineError::ChainError("eth_sendTransaction: expected tx hash".to_string())
        })?;
        TxHash::parse(raw).map_err(|_| EngineError::ChainError(format!("bad tx hash: {raw}")))
    }
}

/// Decodes an RPC result value holding a `0x`-prefixed hex quantity.
fn hex_quantity_result(result: &Value, method: &str) -> Result<u64, EngineError> {
    let raw = result
        .as_str()
        .ok_or_else(|| EngineError::ChainError(format!("{method}: expected hex string")))?;
    hex_u64(raw)
}

/// Parses a `0x`-prefixed hex quantity.
fn hex_u64(raw: &str) -> Result<u64, EngineError> {
    let hex = raw
        .strip_prefix("0x")
        .ok_or_else(|| EngineError::ChainError(format!("expected hex quantity: {raw}")))?;
    u64::from_str_radix(hex, 16)
        .map_err(|_| EngineError::ChainError(format!("expected hex quantity: {raw}")))
}

/// Extracts the address packed into a 32-byte log topic.
fn topic_address(topic: &str) -> Result<WalletAddress, EngineError> {
    let hex = topic
        .strip_prefix("0x")
        .filter(|h| h.len() == 64)
        .ok_or_else(|| EngineError::ChainError(format!("bad address topic: {topic}")))?;
    let tail = hex
        .get(24..)
        .ok_or_else(|| EngineError::ChainError(format!("bad address topic: {topic}")))?;
    WalletAddress::parse(&format!("0x{tail}"))
}

/// A u64 left-padded to one 32-byte ABI word (no `0x`).
fn word_u64(value: u64) -> String {
    format!("{value:064x}")
}

/// A 32-byte value as one ABI word (no `0x`).
fn word_bytes(bytes: &Digest) -> String {
    let mut out = String::with_capacity(64);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// An address left-padded to one 32-byte ABI word (no `0x`).
fn word_address(address: &WalletAddress) -> Result<String, EngineError> {
    let hex = address
        .as_str()
        .strip_prefix("0x")
        .ok_or_else(|| EngineError::Internal("address missing prefix".to_string()))?;
    Ok(format!("{:0>64}", hex))
}

/// Parses one `TransferSingle` log entry into a [`TransferEvent`].
fn parse_transfer_log(entry: &Value) -> Result<TransferEvent, EngineError> {
    let bad = |what: &str| EngineError::ChainError(format!("transfer log missing {what}"));
    let topics = entry
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| bad("topics"))?;
    // topics: [signature, operator, from, to]
    let from = topic_address(
        topics
            .get(2)
            .and_then(Value::as_str)
            .ok_or_else(|| bad("from topic"))?,
    )?;
    let to = topic_address(
        topics
            .get(3)
            .and_then(Value::as_str)
            .ok_or_else(|| bad("to topic"))?,
    )?;
    let data = entry
        .get("data")
        .and_then(Value::as_str)
        .and_then(|d| d.strip_prefix("0x"))
        .ok_or_else(|| bad("data"))?;
    // data: two words, token id then value.
    let id_word = data.get(..64).ok_or_else(|| bad("token id word"))?;
    let value_word = data.get(64..128).ok_or_else(|| bad("value word"))?;
    let claim_id = hex_u64(&format!("0x{id_word}"))?;
    let quantity = hex_u64(&format!("0x{value_word}"))?;
    let tx_hash = TxHash::parse(
        entry
            .get("transactionHash")
            .and_then(Value::as_str)
            .ok_or_else(|| bad("transactionHash"))?,
    )?;
    let log_index = hex_u64(
        entry
            .get("logIndex")
            .and_then(Value::as_str)
            .ok_or_else(|| bad("logIndex"))?,
    )?;
    let block_number = hex_u64(
        entry
            .get("blockNumber")
            .and_then(Value::as_str)
            .ok_or_else(|| bad("blockNumber"))?,
    )?;
    Ok(TransferEvent {
        tx_hash,
        log_index: u32::try_from(log_index).unwrap_or(u32::MAX),
        from,
        to,
        claim_id: crate::domain::ids::ClaimId(claim_id),
        quantity,
        block_number,
    })
}
