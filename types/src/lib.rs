//! Core types for building, signing and grouping application transactions.
//!
//! Everything here is pure computation: the ABI codec, canonical msgpack,
//! transaction ids and group ids, and the signing primitives. Network access
//! lives in the client crate.

pub mod abi;
pub mod address;
pub mod hash;
pub mod logicsig;
pub mod msgpack;
pub mod multisig;
pub mod signed;
pub mod transaction;

pub use address::{Address, AddressError};
pub use logicsig::{LogicSig, LogicSigAccount, LogicSigError};
pub use multisig::{Multisig, MultisigError};
pub use signed::{Authorization, SignError, SignedTransaction};
pub use transaction::{
    ApplicationCallFields, BoxReference, Header, OnComplete, StateSchema, SuggestedParams,
    Transaction, TransactionError, TransactionFields, TransactionType,
};
