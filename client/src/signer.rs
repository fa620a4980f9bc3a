//! Signers the composer hands transactions to.
//!
//! A signer receives the whole group together with the positions it is
//! responsible for and returns one encoded signed transaction per position,
//! in the same order.

use avmkit_types::{
    Address, LogicSigAccount, Multisig, SignError, SignedTransaction, Transaction,
};
use ed25519_dalek::SigningKey;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signer asked for index {index} of a {len}-transaction group")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Sign(#[from] SignError),
}

pub trait TransactionSigner: Send + Sync {
    fn sign_transactions(
        &self,
        txns: &[Transaction],
        indexes: &[usize],
    ) -> Result<Vec<Vec<u8>>, SignerError>;
}

fn each<F>(txns: &[Transaction], indexes: &[usize], sign: F) -> Result<Vec<Vec<u8>>, SignerError>
where
    F: Fn(&Transaction) -> Result<SignedTransaction, SignError>,
{
    indexes
        .iter()
        .map(|&index| {
            let txn = txns.get(index).ok_or(SignerError::IndexOutOfRange {
                index,
                len: txns.len(),
            })?;
            Ok(sign(txn)?.encode()?)
        })
        .collect()
}

/// Signs with a single Ed25519 key.
pub struct AccountSigner {
    key: SigningKey,
}

impl AccountSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn address(&self) -> Address {
        Address::from(self.key.verifying_key())
    }
}

impl fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSigner")
            .field("address", &self.address())
            .finish()
    }
}

impl TransactionSigner for AccountSigner {
    fn sign_transactions(
        &self,
        txns: &[Transaction],
        indexes: &[usize],
    ) -> Result<Vec<Vec<u8>>, SignerError> {
        trace!(address = %self.address(), count = indexes.len(), "signing with account");
        each(txns, indexes, |txn| txn.sign(&self.key))
    }
}

/// Authorizes with a logic signature; holds no private key.
#[derive(Debug)]
pub struct LogicSigSigner {
    account: LogicSigAccount,
}

impl LogicSigSigner {
    pub fn new(account: LogicSigAccount) -> Self {
        Self { account }
    }
}

impl TransactionSigner for LogicSigSigner {
    fn sign_transactions(
        &self,
        txns: &[Transaction],
        indexes: &[usize],
    ) -> Result<Vec<Vec<u8>>, SignerError> {
        trace!(count = indexes.len(), "signing with logic signature");
        each(txns, indexes, |txn| txn.sign_logicsig(&self.account))
    }
}

/// Signs as every member of a multisig account whose key it holds.
pub struct MultisigSigner {
    multisig: Multisig,
    keys: Vec<SigningKey>,
}

impl MultisigSigner {
    pub fn new(multisig: Multisig, keys: Vec<SigningKey>) -> Self {
        Self { multisig, keys }
    }

    pub fn address(&self) -> Address {
        self.multisig.address()
    }
}

impl fmt::Debug for MultisigSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultisigSigner")
            .field("address", &self.address())
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl TransactionSigner for MultisigSigner {
    fn sign_transactions(
        &self,
        txns: &[Transaction],
        indexes: &[usize],
    ) -> Result<Vec<Vec<u8>>, SignerError> {
        trace!(address = %self.address(), count = indexes.len(), "signing with multisig");
        each(txns, indexes, |txn| txn.sign_multisig(&self.multisig, &self.keys))
    }
}

/// Produces unsigned transactions, for simulation.
#[derive(Debug, Default)]
pub struct EmptySigner;

impl TransactionSigner for EmptySigner {
    fn sign_transactions(
        &self,
        txns: &[Transaction],
        indexes: &[usize],
    ) -> Result<Vec<Vec<u8>>, SignerError> {
        each(txns, indexes, |txn| Ok(SignedTransaction::unsigned(txn.clone())))
    }
}

/// A transaction and the signer that will authorize it.
#[derive(Clone)]
pub struct TransactionWithSigner {
    pub txn: Transaction,
    pub signer: Arc<dyn TransactionSigner>,
}

impl TransactionWithSigner {
    pub fn new(txn: Transaction, signer: Arc<dyn TransactionSigner>) -> Self {
        Self { txn, signer }
    }
}

impl fmt::Debug for TransactionWithSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionWithSigner")
            .field("txn", &self.txn)
            .finish_non_exhaustive()
    }
}
