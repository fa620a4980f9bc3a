pub mod algod;
pub mod client;
pub mod composer;
pub mod foreign;
pub mod signer;

pub use algod::{wait_for_confirmation, Algod, NodeStatus, PendingTransaction};
pub use client::{Client, RetryPolicy};
pub use composer::{
    AtomicGroup, ComposerError, ComposerStatus, ExecuteResult, MethodArg, MethodCall,
    MethodResult, ReturnError,
};
pub use signer::{
    AccountSigner, EmptySigner, LogicSigSigner, MultisigSigner, SignerError, TransactionSigner,
    TransactionWithSigner,
};
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
    #[error("API token is not a valid header value")]
    InvalidToken,
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction {txid} not confirmed after {rounds} rounds")]
    ConfirmationTimeout { txid: String, rounds: u64 },
    #[error(transparent)]
    Composer(#[from] ComposerError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
