//! The node a composer submits to and polls for confirmation.

use crate::{Error, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, trace};

/// Rounds to wait when the caller passes 0.
pub const DEFAULT_WAIT_ROUNDS: u64 = 1000;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(rename = "last-round")]
    pub last_round: u64,
}

/// A transaction as reported by the node's pending pool.
///
/// `confirmed_round` stays 0 until the transaction is in a block; a
/// non-empty `pool_error` means it was evicted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PendingTransaction {
    #[serde(default)]
    pub confirmed_round: u64,
    #[serde(default)]
    pub pool_error: String,
    /// Base64 application logs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<u64>,
}

impl PendingTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_round > 0
    }

    /// The last log entry, decoded.
    pub fn last_log(&self) -> Option<std::result::Result<Vec<u8>, base64::DecodeError>> {
        self.logs.last().map(|log| general_purpose::STANDARD.decode(log))
    }
}

/// Operations the composer needs from a node.
pub trait Algod: Send + Sync {
    fn status(&self) -> impl Future<Output = Result<NodeStatus>> + Send;

    /// Blocks until the node has seen a block after `round`.
    fn status_after_block(&self, round: u64) -> impl Future<Output = Result<NodeStatus>> + Send;

    fn pending_transaction_info(
        &self,
        txid: &str,
    ) -> impl Future<Output = Result<PendingTransaction>> + Send;

    /// Submit concatenated signed transactions; returns the first id.
    fn send_raw_transaction(&self, bytes: Vec<u8>) -> impl Future<Output = Result<String>> + Send;
}

/// Poll `txid` round by round until it is confirmed, rejected, or
/// `wait_rounds` rounds (0 for [`DEFAULT_WAIT_ROUNDS`]) pass.
pub async fn wait_for_confirmation<A: Algod>(
    algod: &A,
    txid: &str,
    wait_rounds: u64,
) -> Result<PendingTransaction> {
    let wait_rounds = if wait_rounds == 0 {
        DEFAULT_WAIT_ROUNDS
    } else {
        wait_rounds
    };
    let last_round = algod.status().await?.last_round;
    let mut current_round = last_round + 1;
    loop {
        if current_round > last_round + wait_rounds {
            return Err(Error::ConfirmationTimeout {
                txid: txid.to_string(),
                rounds: wait_rounds,
            });
        }

        match algod.pending_transaction_info(txid).await {
            Ok(info) if !info.pool_error.is_empty() => {
                return Err(Error::Rejected(info.pool_error));
            }
            Ok(info) if info.is_confirmed() => {
                debug!(txid, round = info.confirmed_round, "transaction confirmed");
                return Ok(info);
            }
            Ok(_) => trace!(txid, round = current_round, "transaction pending"),
            // The node may not know the transaction yet.
            Err(Error::Failed(status)) | Err(Error::FailedWithBody { status, .. }) => {
                trace!(txid, %status, "pending lookup failed");
            }
            Err(err) => return Err(err),
        }

        algod.status_after_block(current_round).await?;
        current_round += 1;
    }
}

#[cfg(test)]
#[derive(Clone, Default)]
pub struct Mock {
    pub round: std::sync::Arc<std::sync::Mutex<u64>>,
    pub pending: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<String, PendingTransaction>>>,
    pub submitted: std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
    /// The transaction confirms once the node reaches this round.
    pub confirm_at: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<String, u64>>>,
}

#[cfg(test)]
impl Mock {
    pub fn new(round: u64) -> Self {
        let mock = Self::default();
        *mock.round.lock().unwrap() = round;
        mock
    }

    pub fn set_pending(&self, txid: &str, info: PendingTransaction) {
        self.pending.lock().unwrap().insert(txid.to_string(), info);
    }

    pub fn confirm_at(&self, txid: &str, round: u64, info: PendingTransaction) {
        self.set_pending(txid, info);
        self.confirm_at.lock().unwrap().insert(txid.to_string(), round);
    }

    pub fn current_round(&self) -> u64 {
        *self.round.lock().unwrap()
    }
}

#[cfg(test)]
impl Algod for Mock {
    async fn status(&self) -> Result<NodeStatus> {
        Ok(NodeStatus {
            last_round: self.current_round(),
        })
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus> {
        let mut current = self.round.lock().unwrap();
        *current = (*current).max(round + 1);
        Ok(NodeStatus {
            last_round: *current,
        })
    }

    async fn pending_transaction_info(&self, txid: &str) -> Result<PendingTransaction> {
        let round = self.current_round();
        let mut info = self
            .pending
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or(Error::Failed(reqwest::StatusCode::NOT_FOUND))?;
        if let Some(at) = self.confirm_at.lock().unwrap().get(txid) {
            info.confirmed_round = if round >= *at { *at } else { 0 };
        }
        Ok(info)
    }

    async fn send_raw_transaction(&self, bytes: Vec<u8>) -> Result<String> {
        self.submitted.lock().unwrap().push(bytes);
        Ok("SUBMITTED".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(round: u64) -> PendingTransaction {
        PendingTransaction {
            confirmed_round: round,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_returns_confirmed_transaction() {
        let algod = Mock::new(10);
        algod.set_pending("A", confirmed(9));
        let info = wait_for_confirmation(&algod, "A", 5).await.unwrap();
        assert_eq!(info.confirmed_round, 9);
        assert_eq!(algod.current_round(), 10);
    }

    #[tokio::test]
    async fn test_polls_until_confirmed() {
        let algod = Mock::new(10);
        algod.confirm_at("A", 13, PendingTransaction::default());
        let info = wait_for_confirmation(&algod, "A", 5).await.unwrap();
        assert_eq!(info.confirmed_round, 13);
    }

    #[tokio::test]
    async fn test_unknown_transaction_times_out() {
        let algod = Mock::new(10);
        let err = wait_for_confirmation(&algod, "A", 3).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ConfirmationTimeout { ref txid, rounds: 3 } if txid == "A"
        ));
        assert_eq!(algod.current_round(), 14);
    }

    #[tokio::test]
    async fn test_pool_error_is_rejection() {
        let algod = Mock::new(10);
        algod.set_pending(
            "A",
            PendingTransaction {
                pool_error: "overspend".to_string(),
                ..Default::default()
            },
        );
        let err = wait_for_confirmation(&algod, "A", 3).await.unwrap_err();
        assert!(matches!(err, Error::Rejected(ref reason) if reason == "overspend"));
    }

    #[test]
    fn test_pending_transaction_json() {
        let info: PendingTransaction = serde_json::from_str(
            r#"{"confirmed-round": 42, "pool-error": "", "logs": ["FR98dQAAAAAAAAAF"],
                "txn": {"sig": "ignored"}}"#,
        )
        .unwrap();
        assert!(info.is_confirmed());
        assert_eq!(
            info.last_log().unwrap().unwrap(),
            vec![0x15, 0x1f, 0x7c, 0x75, 0, 0, 0, 0, 0, 0, 0, 5]
        );

        let pending: PendingTransaction = serde_json::from_str("{}").unwrap();
        assert!(!pending.is_confirmed());
        assert!(pending.last_log().is_none());
    }
}
