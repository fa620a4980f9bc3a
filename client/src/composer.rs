//! Builds, signs, submits, and confirms an atomic transaction group.
//!
//! A group moves through [`ComposerStatus`] in order and never goes back:
//! transactions are only added while building, the group id is fixed once
//! built, and signatures are gathered once and reused.

use crate::{
    algod::{wait_for_confirmation, Algod, PendingTransaction},
    foreign::populate_foreign_array,
    signer::{SignerError, TransactionSigner, TransactionWithSigner},
    Result,
};
use avmkit_types::{
    abi::{decode, encode, ArgKind, EncodingError, Method, ReferenceArg, Type, Value, RETURN_PREFIX},
    transaction::{compute_group_id, Digest, MAX_GROUP_SIZE},
    Address, ApplicationCallFields, BoxReference, OnComplete, StateSchema, SuggestedParams,
    Transaction, TransactionError, TransactionFields,
};
use futures::future::join_all;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Application arguments a single call may carry, selector included.
pub const MAX_APP_ARGS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComposerStatus {
    Building,
    Built,
    Signed,
    Submitted,
    Committed,
}

#[derive(Debug, Error)]
pub enum ComposerError {
    #[error("group is {0:?}; transactions can only be added while building")]
    NotBuilding(ComposerStatus),
    #[error("group is already committed")]
    AlreadyCommitted,
    #[error("group would hold {got} transactions, more than {max}", max = MAX_GROUP_SIZE)]
    GroupFull { got: usize },
    #[error("transaction already belongs to a group")]
    AlreadyGrouped,
    #[error("group is empty")]
    EmptyGroup,
    #[error("method {method} takes {expected} arguments, got {got}")]
    ArgCount {
        method: String,
        expected: usize,
        got: usize,
    },
    #[error("argument {index} must be a {expected} transaction, got {got}")]
    TransactionArgMismatch {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },
    #[error("argument {index} must be a transaction")]
    ExpectedTransaction { index: usize },
    #[error("argument {index} must be a value, got a transaction")]
    UnexpectedTransaction { index: usize },
    #[error("argument {index} is not a valid {expected} reference")]
    InvalidReference { index: usize, expected: &'static str },
    #[error("approval and clear programs are required to create or update an application")]
    MissingPrograms,
    #[error("creation fields are only allowed when creating or updating an application")]
    CreationFields,
    #[error("no signature for transaction {0}")]
    MissingSignature(usize),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Signer(#[from] SignerError),
}

/// An argument to an ABI method call.
#[derive(Clone, Debug)]
pub enum MethodArg {
    Value(Value),
    Transaction(TransactionWithSigner),
}

impl From<Value> for MethodArg {
    fn from(value: Value) -> Self {
        MethodArg::Value(value)
    }
}

impl From<TransactionWithSigner> for MethodArg {
    fn from(txn: TransactionWithSigner) -> Self {
        MethodArg::Transaction(txn)
    }
}

/// Everything needed to turn an ABI method invocation into an application
/// call. Reference arguments (`account`, `asset`, `application`) are given
/// as values and resolved against `accounts`, `foreign_assets` and
/// `foreign_apps`.
#[derive(Clone)]
pub struct MethodCall {
    /// 0 creates a new application.
    pub app_id: u64,
    pub method: Method,
    pub sender: Address,
    pub params: SuggestedParams,
    pub signer: Arc<dyn TransactionSigner>,
    pub args: Vec<MethodArg>,
    pub on_complete: OnComplete,
    pub approval_program: Vec<u8>,
    pub clear_program: Vec<u8>,
    pub global_schema: Option<StateSchema>,
    pub local_schema: Option<StateSchema>,
    pub extra_pages: u32,
    pub accounts: Vec<Address>,
    pub foreign_apps: Vec<u64>,
    pub foreign_assets: Vec<u64>,
    /// `(app_id, name)`; app id 0 is the called application.
    pub boxes: Vec<(u64, Vec<u8>)>,
    pub note: Vec<u8>,
    pub lease: Option<Digest>,
    pub rekey_to: Option<Address>,
}

impl MethodCall {
    pub fn new(
        app_id: u64,
        method: Method,
        sender: Address,
        params: SuggestedParams,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            app_id,
            method,
            sender,
            params,
            signer,
            args: Vec::new(),
            on_complete: OnComplete::NoOp,
            approval_program: Vec::new(),
            clear_program: Vec::new(),
            global_schema: None,
            local_schema: None,
            extra_pages: 0,
            accounts: Vec::new(),
            foreign_apps: Vec::new(),
            foreign_assets: Vec::new(),
            boxes: Vec::new(),
            note: Vec::new(),
            lease: None,
            rekey_to: None,
        }
    }

    pub fn with_args(mut self, args: Vec<MethodArg>) -> Self {
        self.args = args;
        self
    }

    pub fn with_on_complete(mut self, on_complete: OnComplete) -> Self {
        self.on_complete = on_complete;
        self
    }

    pub fn with_programs(mut self, approval: Vec<u8>, clear: Vec<u8>) -> Self {
        self.approval_program = approval;
        self.clear_program = clear;
        self
    }

    fn check_creation_fields(&self) -> std::result::Result<(), ComposerError> {
        let has_programs = !self.approval_program.is_empty() && !self.clear_program.is_empty();
        let has_any_program = !self.approval_program.is_empty() || !self.clear_program.is_empty();
        let has_schema =
            self.global_schema.is_some() || self.local_schema.is_some() || self.extra_pages > 0;

        if self.app_id == 0 {
            if !has_programs {
                return Err(ComposerError::MissingPrograms);
            }
        } else if self.on_complete == OnComplete::UpdateApplication {
            if !has_programs {
                return Err(ComposerError::MissingPrograms);
            }
            if has_schema {
                return Err(ComposerError::CreationFields);
            }
        } else if has_any_program || has_schema {
            return Err(ComposerError::CreationFields);
        }
        Ok(())
    }
}

/// Why a method's return value could not be read.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReturnError {
    #[error("transaction lookup failed: {0}")]
    Lookup(String),
    #[error("application call produced no logs")]
    MissingLog,
    #[error("last log is not valid base64")]
    InvalidLog,
    #[error("last log does not start with the return prefix")]
    MissingPrefix,
    #[error(transparent)]
    Decode(#[from] EncodingError),
}

/// Outcome of one method call in an executed group.
#[derive(Clone, Debug)]
pub struct MethodResult {
    pub tx_id: String,
    pub method: Method,
    /// Return bytes with the prefix stripped; `None` for `void` methods.
    pub raw_value: Option<Vec<u8>>,
    pub return_value: Option<Value>,
    pub decode_error: Option<ReturnError>,
    pub tx_info: Option<PendingTransaction>,
}

impl MethodResult {
    fn new(tx_id: String, method: Method, info: Result<PendingTransaction>) -> Self {
        let mut result = Self {
            tx_id,
            method,
            raw_value: None,
            return_value: None,
            decode_error: None,
            tx_info: None,
        };
        let info = match info {
            Ok(info) => info,
            Err(err) => {
                result.decode_error = Some(ReturnError::Lookup(err.to_string()));
                return result;
            }
        };
        if let Some(ty) = &result.method.returns.ty {
            match parse_return(ty, &info) {
                Ok((raw, value)) => {
                    result.raw_value = Some(raw);
                    result.return_value = Some(value);
                }
                Err(err) => result.decode_error = Some(err),
            }
        }
        result.tx_info = Some(info);
        result
    }
}

fn parse_return(
    ty: &Type,
    info: &PendingTransaction,
) -> std::result::Result<(Vec<u8>, Value), ReturnError> {
    let log = info
        .last_log()
        .ok_or(ReturnError::MissingLog)?
        .map_err(|_| ReturnError::InvalidLog)?;
    let raw = log
        .strip_prefix(&RETURN_PREFIX)
        .ok_or(ReturnError::MissingPrefix)?;
    let value = decode(ty, raw)?;
    Ok((raw.to_vec(), value))
}

#[derive(Clone, Debug)]
pub struct ExecuteResult {
    pub confirmed_round: u64,
    pub tx_ids: Vec<String>,
    /// One entry per method call, in group order.
    pub method_results: Vec<MethodResult>,
}

/// An atomic group under construction.
pub struct AtomicGroup {
    status: ComposerStatus,
    txns: Vec<TransactionWithSigner>,
    /// Group position of each method call.
    methods: BTreeMap<usize, Method>,
    signed: Vec<Vec<u8>>,
    tx_ids: Vec<String>,
}

impl Default for AtomicGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicGroup {
    pub fn new() -> Self {
        Self {
            status: ComposerStatus::Building,
            txns: Vec::new(),
            methods: BTreeMap::new(),
            signed: Vec::new(),
            tx_ids: Vec::new(),
        }
    }

    pub fn status(&self) -> ComposerStatus {
        self.status
    }

    pub fn len(&self) -> usize {
        self.txns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }

    pub fn transactions(&self) -> &[TransactionWithSigner] {
        &self.txns
    }

    /// Ids of every member; empty until built.
    pub fn tx_ids(&self) -> &[String] {
        &self.tx_ids
    }

    /// A copy of the group's transactions, back in the building state with
    /// group ids cleared.
    pub fn duplicate(&self) -> Self {
        let txns = self
            .txns
            .iter()
            .map(|txn| {
                let mut txn = txn.clone();
                txn.txn.header.group = None;
                txn
            })
            .collect();
        Self {
            status: ComposerStatus::Building,
            txns,
            methods: self.methods.clone(),
            signed: Vec::new(),
            tx_ids: Vec::new(),
        }
    }

    fn ensure_building(&self) -> std::result::Result<(), ComposerError> {
        match self.status {
            ComposerStatus::Building => Ok(()),
            status => Err(ComposerError::NotBuilding(status)),
        }
    }

    fn ensure_room(&self, adding: usize) -> std::result::Result<(), ComposerError> {
        let got = self.txns.len() + adding;
        if got > MAX_GROUP_SIZE {
            return Err(ComposerError::GroupFull { got });
        }
        Ok(())
    }

    pub fn add_transaction(
        &mut self,
        txn: TransactionWithSigner,
    ) -> std::result::Result<(), ComposerError> {
        self.ensure_building()?;
        self.ensure_room(1)?;
        if txn.txn.header.group.is_some() {
            return Err(ComposerError::AlreadyGrouped);
        }
        debug!(index = self.txns.len(), kind = txn.txn.kind().as_str(), "added transaction");
        self.txns.push(txn);
        Ok(())
    }

    /// Add an application call for `call.method`, preceded by any
    /// transaction arguments. Nothing is added if the call is invalid.
    pub fn add_method_call(&mut self, call: MethodCall) -> std::result::Result<(), ComposerError> {
        self.ensure_building()?;
        let method = call.method.clone();
        self.ensure_room(method.txn_calls())?;
        if call.args.len() != method.args.len() {
            return Err(ComposerError::ArgCount {
                method: method.signature(),
                expected: method.args.len(),
                got: call.args.len(),
            });
        }
        call.check_creation_fields()?;

        let MethodCall {
            app_id,
            sender,
            params,
            signer,
            args,
            on_complete,
            approval_program,
            clear_program,
            global_schema,
            local_schema,
            extra_pages,
            mut accounts,
            mut foreign_apps,
            mut foreign_assets,
            boxes,
            note,
            lease,
            rekey_to,
            ..
        } = call;

        let mut txn_args = Vec::new();
        let mut raw_args: Vec<(Type, Value)> = Vec::new();
        for (index, (arg, value)) in method.args.iter().zip(args).enumerate() {
            match (&arg.kind, value) {
                (ArgKind::Transaction(expected), MethodArg::Transaction(txn)) => {
                    if !expected.matches(txn.txn.kind()) {
                        return Err(ComposerError::TransactionArgMismatch {
                            index,
                            expected: expected.as_str(),
                            got: txn.txn.kind().as_str(),
                        });
                    }
                    txn_args.push(txn);
                }
                (ArgKind::Transaction(_), MethodArg::Value(_)) => {
                    return Err(ComposerError::ExpectedTransaction { index });
                }
                (_, MethodArg::Transaction(_)) => {
                    return Err(ComposerError::UnexpectedTransaction { index });
                }
                (ArgKind::Reference(reference), MethodArg::Value(value)) => {
                    let invalid = || ComposerError::InvalidReference {
                        index,
                        expected: reference.as_str(),
                    };
                    let position = match reference {
                        ReferenceArg::Account => {
                            let Value::Address(address) = value else {
                                return Err(invalid());
                            };
                            populate_foreign_array(address, &mut accounts, Some(&sender))
                        }
                        ReferenceArg::Asset => {
                            let id = value.as_u64().ok_or_else(invalid)?;
                            populate_foreign_array(id, &mut foreign_assets, None)
                        }
                        ReferenceArg::Application => {
                            let id = value.as_u64().ok_or_else(invalid)?;
                            // A creation call has no id of its own to reserve slot 0 for.
                            let this_app = (app_id != 0).then_some(app_id);
                            populate_foreign_array(id, &mut foreign_apps, this_app.as_ref())
                        }
                    };
                    raw_args.push((Type::Uint(8), Value::from(position as u64)));
                }
                (ArgKind::Value(ty), MethodArg::Value(value)) => {
                    raw_args.push((ty.clone(), value));
                }
            }
        }

        // Arguments past the 15th are packed into one trailing tuple.
        if raw_args.len() > MAX_APP_ARGS - 1 {
            let rest = raw_args.split_off(MAX_APP_ARGS - 2);
            let (types, values): (Vec<Type>, Vec<Value>) = rest.into_iter().unzip();
            raw_args.push((Type::Tuple(types), Value::Tuple(values)));
        }

        let mut app_args = Vec::with_capacity(raw_args.len() + 1);
        app_args.push(method.selector().to_vec());
        for (ty, value) in &raw_args {
            app_args.push(encode(ty, value)?);
        }

        let boxes = BoxReference::translate(&boxes, &foreign_apps, app_id)?;
        let fields = TransactionFields::ApplicationCall(ApplicationCallFields {
            app_id,
            on_complete,
            local_schema,
            global_schema,
            approval_program,
            clear_program,
            app_args,
            accounts,
            foreign_apps,
            foreign_assets,
            extra_pages,
            boxes,
        });
        let txn = Transaction::with_params(sender, &params, fields, |header| {
            let header = header.with_note(note);
            let header = match lease {
                Some(lease) => header.with_lease(lease),
                None => header,
            };
            match rekey_to {
                Some(rekey_to) => header.with_rekey_to(rekey_to),
                None => header,
            }
        })?;

        self.txns.extend(txn_args);
        self.txns.push(TransactionWithSigner::new(txn, signer));
        let index = self.txns.len() - 1;
        debug!(index, method = %method.signature(), app_id, "added method call");
        self.methods.insert(index, method);
        Ok(())
    }

    /// Fix the group id (for groups of two or more) and record transaction
    /// ids. Building an already built group returns it unchanged.
    pub fn build_group(&mut self) -> std::result::Result<&[TransactionWithSigner], ComposerError> {
        if self.status >= ComposerStatus::Built {
            return Ok(&self.txns);
        }
        if self.txns.is_empty() {
            return Err(ComposerError::EmptyGroup);
        }

        if self.txns.len() > 1 {
            let txns: Vec<Transaction> = self.txns.iter().map(|t| t.txn.clone()).collect();
            let group = compute_group_id(&txns)?;
            for txn in &mut self.txns {
                txn.txn.header.group = Some(group);
            }
        }
        self.tx_ids = self
            .txns
            .iter()
            .map(|t| t.txn.id())
            .collect::<std::result::Result<_, _>>()?;
        self.status = ComposerStatus::Built;
        debug!(size = self.txns.len(), "built group");
        Ok(&self.txns)
    }

    /// Ask each distinct signer, once, for the transactions it owns.
    pub fn gather_signatures(&mut self) -> std::result::Result<&[Vec<u8>], ComposerError> {
        if self.status >= ComposerStatus::Signed {
            return Ok(&self.signed);
        }
        self.build_group()?;

        let mut by_signer: Vec<(Arc<dyn TransactionSigner>, Vec<usize>)> = Vec::new();
        for (index, txn) in self.txns.iter().enumerate() {
            match by_signer
                .iter_mut()
                .find(|(signer, _)| Arc::ptr_eq(signer, &txn.signer))
            {
                Some((_, indexes)) => indexes.push(index),
                None => by_signer.push((txn.signer.clone(), vec![index])),
            }
        }

        let txns: Vec<Transaction> = self.txns.iter().map(|t| t.txn.clone()).collect();
        let mut signed: Vec<Option<Vec<u8>>> = vec![None; txns.len()];
        for (signer, indexes) in &by_signer {
            let stxns = signer.sign_transactions(&txns, indexes)?;
            for (&index, stxn) in indexes.iter().zip(stxns) {
                signed[index] = Some(stxn);
            }
        }
        self.signed = signed
            .into_iter()
            .enumerate()
            .map(|(index, stxn)| stxn.ok_or(ComposerError::MissingSignature(index)))
            .collect::<std::result::Result<_, _>>()?;
        self.status = ComposerStatus::Signed;
        debug!(signers = by_signer.len(), "gathered signatures");
        Ok(&self.signed)
    }

    /// Sign if needed and send the group. Returns the transaction ids.
    pub async fn submit<A: Algod>(&mut self, algod: &A) -> Result<Vec<String>> {
        if self.status > ComposerStatus::Submitted {
            return Err(ComposerError::AlreadyCommitted.into());
        }
        self.gather_signatures()?;
        algod.send_raw_transaction(self.signed.concat()).await?;
        self.status = ComposerStatus::Submitted;
        info!(size = self.txns.len(), first = ?self.tx_ids.first(), "submitted group");
        Ok(self.tx_ids.clone())
    }

    /// Submit the group, wait up to `wait_rounds` rounds for it to confirm,
    /// and read each method call's return value.
    ///
    /// A return value that cannot be read is reported in that call's
    /// [`MethodResult::decode_error`]; it does not fail the group.
    pub async fn execute<A: Algod>(&mut self, algod: &A, wait_rounds: u64) -> Result<ExecuteResult> {
        if self.status > ComposerStatus::Submitted {
            return Err(ComposerError::AlreadyCommitted.into());
        }
        self.submit(algod).await?;

        let first = self.tx_ids.first().ok_or(ComposerError::EmptyGroup)?;
        let confirmed = wait_for_confirmation(algod, first, wait_rounds).await?;
        self.status = ComposerStatus::Committed;
        info!(round = confirmed.confirmed_round, "group committed");

        let lookups = self.methods.iter().map(|(&index, method)| {
            let tx_id = self.tx_ids[index].clone();
            async move {
                let info = algod.pending_transaction_info(&tx_id).await;
                MethodResult::new(tx_id, method.clone(), info)
            }
        });
        let method_results = join_all(lookups).await;
        for result in &method_results {
            if let Some(err) = &result.decode_error {
                warn!(tx_id = %result.tx_id, method = %result.method.name, %err, "unreadable return value");
            }
        }

        Ok(ExecuteResult {
            confirmed_round: confirmed.confirmed_round,
            tx_ids: self.tx_ids.clone(),
            method_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algod::Mock,
        signer::{
            tests::{params, payment},
            AccountSigner, EmptySigner,
        },
        Error,
    };
    use avmkit_types::abi::TransactionArg;
    use base64::{engine::general_purpose, Engine as _};
    use ed25519_dalek::SigningKey;
    use num_bigint::BigUint;
    use rand::rngs::OsRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const APP_ID: u64 = 42;

    struct CountingSigner {
        inner: AccountSigner,
        calls: AtomicUsize,
    }

    impl TransactionSigner for CountingSigner {
        fn sign_transactions(
            &self,
            txns: &[Transaction],
            indexes: &[usize],
        ) -> std::result::Result<Vec<Vec<u8>>, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.sign_transactions(txns, indexes)
        }
    }

    /// Signs nothing.
    struct SilentSigner;

    impl TransactionSigner for SilentSigner {
        fn sign_transactions(
            &self,
            _txns: &[Transaction],
            _indexes: &[usize],
        ) -> std::result::Result<Vec<Vec<u8>>, SignerError> {
            Ok(Vec::new())
        }
    }

    fn account() -> (Address, Arc<dyn TransactionSigner>) {
        let signer = AccountSigner::new(SigningKey::generate(&mut OsRng));
        (signer.address(), Arc::new(signer))
    }

    fn with_signer(txn: Transaction, signer: &Arc<dyn TransactionSigner>) -> TransactionWithSigner {
        TransactionWithSigner::new(txn, signer.clone())
    }

    fn call(signature: &str, sender: Address, signer: &Arc<dyn TransactionSigner>) -> MethodCall {
        let method = Method::from_signature(signature).unwrap();
        MethodCall::new(APP_ID, method, sender, params(), signer.clone())
    }

    fn app_call(txn: &TransactionWithSigner) -> &ApplicationCallFields {
        match &txn.txn.fields {
            TransactionFields::ApplicationCall(fields) => fields,
            other => panic!("expected application call, got {:?}", other.kind()),
        }
    }

    fn returning(log: &[u8]) -> PendingTransaction {
        PendingTransaction {
            confirmed_round: 7,
            logs: vec![general_purpose::STANDARD.encode(log)],
            ..Default::default()
        }
    }

    // ========================================================================
    // Adding transactions
    // ========================================================================

    #[test]
    fn test_group_holds_at_most_sixteen() {
        let (sender, signer) = account();
        let mut group = AtomicGroup::new();
        for amount in 0..MAX_GROUP_SIZE as u64 {
            group
                .add_transaction(with_signer(payment(sender, amount), &signer))
                .unwrap();
        }
        assert!(matches!(
            group.add_transaction(with_signer(payment(sender, 99), &signer)),
            Err(ComposerError::GroupFull { got: 17 })
        ));
        assert_eq!(group.len(), MAX_GROUP_SIZE);
    }

    #[test]
    fn test_transaction_args_count_toward_group_size() {
        let (sender, signer) = account();
        let mut group = AtomicGroup::new();
        for amount in 0..15 {
            group
                .add_transaction(with_signer(payment(sender, amount), &signer))
                .unwrap();
        }
        let pay = with_signer(payment(sender, 1), &signer);
        let result = group.add_method_call(
            call("deposit(pay)void", sender, &signer).with_args(vec![pay.into()]),
        );
        assert!(matches!(result, Err(ComposerError::GroupFull { got: 17 })));
        assert_eq!(group.len(), 15);
    }

    #[test]
    fn test_rejects_grouped_transaction() {
        let (sender, signer) = account();
        let mut txn = payment(sender, 1);
        txn.header.group = Some([1; 32]);
        let mut group = AtomicGroup::new();
        assert!(matches!(
            group.add_transaction(with_signer(txn, &signer)),
            Err(ComposerError::AlreadyGrouped)
        ));
    }

    #[test]
    fn test_cannot_add_after_build() {
        let (sender, signer) = account();
        let mut group = AtomicGroup::new();
        group
            .add_transaction(with_signer(payment(sender, 1), &signer))
            .unwrap();
        group.build_group().unwrap();
        assert!(matches!(
            group.add_transaction(with_signer(payment(sender, 2), &signer)),
            Err(ComposerError::NotBuilding(ComposerStatus::Built))
        ));
        assert!(matches!(
            group.add_method_call(call("noop()void", sender, &signer)),
            Err(ComposerError::NotBuilding(ComposerStatus::Built))
        ));
    }

    // ========================================================================
    // Method calls
    // ========================================================================

    #[test]
    fn test_method_call_encodes_arguments() {
        let (sender, signer) = account();
        let other = Address::new([9; 32]);
        let pay = with_signer(payment(sender, 5), &signer);
        let mut group = AtomicGroup::new();
        group
            .add_method_call(
                call(
                    "refs(account,pay,asset,application,bool,uint64)void",
                    sender,
                    &signer,
                )
                .with_args(vec![
                    Value::from(other).into(),
                    pay.into(),
                    Value::from(10u64).into(),
                    Value::from(APP_ID).into(),
                    Value::from(true).into(),
                    Value::from(258u64).into(),
                ]),
            )
            .unwrap();

        let txns = group.transactions();
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].txn.kind(), avmkit_types::TransactionType::Payment);
        let fields = app_call(&txns[1]);
        let method =
            Method::from_signature("refs(account,pay,asset,application,bool,uint64)void").unwrap();
        assert_eq!(
            fields.app_args,
            vec![
                method.selector().to_vec(),
                vec![1],
                vec![0],
                vec![0],
                vec![0x80],
                vec![0, 0, 0, 0, 0, 0, 1, 2],
            ]
        );
        assert_eq!(fields.accounts, vec![other]);
        assert_eq!(fields.foreign_assets, vec![10]);
        assert!(fields.foreign_apps.is_empty());
        assert_eq!(fields.app_id, APP_ID);
    }

    #[test]
    fn test_repeated_account_shares_index() {
        let (sender, signer) = account();
        let other = Address::new([9; 32]);
        let mut group = AtomicGroup::new();
        for _ in 0..2 {
            group
                .add_method_call(call("pair(account,account,account)void", sender, &signer).with_args(
                    vec![
                        Value::from(other).into(),
                        Value::from(other).into(),
                        Value::from(sender).into(),
                    ],
                ))
                .unwrap();
        }
        for txn in group.transactions() {
            let fields = app_call(txn);
            assert_eq!(fields.app_args[1..], [vec![1], vec![1], vec![0]]);
            assert_eq!(fields.accounts, vec![other]);
        }
    }

    #[test]
    fn test_creation_call_has_no_reserved_app_slot() {
        let (sender, signer) = account();
        let method = Method::from_signature("create(application)void").unwrap();
        let mut group = AtomicGroup::new();
        group
            .add_method_call(
                MethodCall::new(0, method, sender, params(), signer)
                    .with_programs(vec![1, 2], vec![3])
                    .with_args(vec![Value::from(77u64).into()]),
            )
            .unwrap();
        let fields = app_call(&group.transactions()[0]);
        assert_eq!(fields.app_args[1], vec![0]);
        assert_eq!(fields.foreign_apps, vec![77]);
    }

    #[test]
    fn test_argument_validation() {
        let (sender, signer) = account();
        let mut group = AtomicGroup::new();

        let err = group
            .add_method_call(call("add(uint64,uint64)uint64", sender, &signer)
                .with_args(vec![Value::from(1u64).into()]))
            .unwrap_err();
        assert!(matches!(err, ComposerError::ArgCount { expected: 2, got: 1, .. }));

        let axfer = with_signer(payment(sender, 1), &signer);
        let err = group
            .add_method_call(call("optin(axfer)void", sender, &signer).with_args(vec![axfer.into()]))
            .unwrap_err();
        assert!(matches!(
            err,
            ComposerError::TransactionArgMismatch { index: 0, expected: "axfer", got: "pay" }
        ));

        let err = group
            .add_method_call(call("deposit(txn)void", sender, &signer)
                .with_args(vec![Value::from(1u64).into()]))
            .unwrap_err();
        assert!(matches!(err, ComposerError::ExpectedTransaction { index: 0 }));

        let pay = with_signer(payment(sender, 1), &signer);
        let err = group
            .add_method_call(call("set(uint64)void", sender, &signer).with_args(vec![pay.into()]))
            .unwrap_err();
        assert!(matches!(err, ComposerError::UnexpectedTransaction { index: 0 }));

        let err = group
            .add_method_call(call("close(account)void", sender, &signer)
                .with_args(vec![Value::from(3u64).into()]))
            .unwrap_err();
        assert!(matches!(
            err,
            ComposerError::InvalidReference { index: 0, expected: "account" }
        ));

        let err = group
            .add_method_call(call("set(uint8)void", sender, &signer)
                .with_args(vec![Value::from(256u64).into()]))
            .unwrap_err();
        assert!(matches!(err, ComposerError::Encoding(EncodingError::OutOfRange(_))));

        assert!(group.is_empty());
    }

    #[test]
    fn test_any_transaction_arg_accepts_payment() {
        assert!(TransactionArg::Any.matches(avmkit_types::TransactionType::Payment));
        let (sender, signer) = account();
        let pay = with_signer(payment(sender, 1), &signer);
        let mut group = AtomicGroup::new();
        group
            .add_method_call(call("deposit(txn)void", sender, &signer).with_args(vec![pay.into()]))
            .unwrap();
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_creation_fields() {
        let (sender, signer) = account();
        let method = Method::from_signature("create()void").unwrap();
        let mut group = AtomicGroup::new();

        let missing = MethodCall::new(0, method.clone(), sender, params(), signer.clone());
        assert!(matches!(
            group.add_method_call(missing),
            Err(ComposerError::MissingPrograms)
        ));

        let on_call = MethodCall::new(APP_ID, method.clone(), sender, params(), signer.clone())
            .with_programs(vec![1], vec![2]);
        assert!(matches!(
            group.add_method_call(on_call),
            Err(ComposerError::CreationFields)
        ));

        let mut update = MethodCall::new(APP_ID, method.clone(), sender, params(), signer.clone())
            .with_on_complete(OnComplete::UpdateApplication)
            .with_programs(vec![1], vec![2]);
        update.global_schema = Some(StateSchema {
            num_uints: 1,
            num_byte_slices: 0,
        });
        assert!(matches!(
            group.add_method_call(update.clone()),
            Err(ComposerError::CreationFields)
        ));

        update.global_schema = None;
        group.add_method_call(update).unwrap();

        let mut create = MethodCall::new(0, method, sender, params(), signer)
            .with_programs(vec![1], vec![2]);
        create.extra_pages = 1;
        create.local_schema = Some(StateSchema {
            num_uints: 0,
            num_byte_slices: 2,
        });
        group.add_method_call(create).unwrap();
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_many_arguments_are_packed_into_tuple() {
        let (sender, signer) = account();
        let method = Method::new("many", vec![ArgKind::Value(Type::Uint(64)); 17], None);
        let args = (0..17u64).map(|i| Value::from(i).into()).collect();
        let mut group = AtomicGroup::new();
        group
            .add_method_call(
                MethodCall::new(APP_ID, method, sender, params(), signer).with_args(args),
            )
            .unwrap();

        let fields = app_call(&group.transactions()[0]);
        assert_eq!(fields.app_args.len(), MAX_APP_ARGS);
        assert_eq!(fields.app_args[14], 13u64.to_be_bytes().to_vec());
        let packed: Vec<u8> = (14..17u64).flat_map(u64::to_be_bytes).collect();
        assert_eq!(fields.app_args[15], packed);
    }

    #[test]
    fn test_fifteen_arguments_are_not_packed() {
        let (sender, signer) = account();
        let method = Method::new("many", vec![ArgKind::Value(Type::Bool); 15], None);
        let args = (0..15).map(|_| Value::from(false).into()).collect();
        let mut group = AtomicGroup::new();
        group
            .add_method_call(
                MethodCall::new(APP_ID, method, sender, params(), signer).with_args(args),
            )
            .unwrap();
        let fields = app_call(&group.transactions()[0]);
        assert_eq!(fields.app_args.len(), 16);
        assert!(fields.app_args[1..].iter().all(|arg| arg == &vec![0]));
    }

    #[test]
    fn test_boxes_resolve_against_foreign_apps() {
        let (sender, signer) = account();
        let mut method_call =
            call("peek(application)void", sender, &signer).with_args(vec![Value::from(9u64).into()]);
        method_call.boxes = vec![
            (0, b"a".to_vec()),
            (APP_ID, b"b".to_vec()),
            (9, b"c".to_vec()),
        ];
        let mut group = AtomicGroup::new();
        group.add_method_call(method_call).unwrap();

        let fields = app_call(&group.transactions()[0]);
        assert_eq!(fields.foreign_apps, vec![9]);
        let indexes: Vec<u64> = fields.boxes.iter().map(|b| b.app_index).collect();
        assert_eq!(indexes, vec![0, 0, 1]);

        let mut unknown = call("noop()void", sender, &signer);
        unknown.boxes = vec![(1234, b"x".to_vec())];
        assert!(matches!(
            group.add_method_call(unknown),
            Err(ComposerError::Transaction(TransactionError::UnknownBoxApp(1234)))
        ));
    }

    #[test]
    fn test_header_options_are_applied() {
        let (sender, signer) = account();
        let mut method_call = call("noop()void", sender, &signer);
        method_call.note = b"hello".to_vec();
        method_call.lease = Some([4; 32]);
        method_call.rekey_to = Some(Address::new([8; 32]));
        let mut group = AtomicGroup::new();
        group.add_method_call(method_call).unwrap();

        let header = &group.transactions()[0].txn.header;
        assert_eq!(header.note, b"hello");
        assert_eq!(header.lease, Some([4; 32]));
        assert_eq!(header.rekey_to, Some(Address::new([8; 32])));
        assert_eq!(header.fee, 1000);
    }

    // ========================================================================
    // Building and signing
    // ========================================================================

    #[test]
    fn test_build_empty_group_fails() {
        let mut group = AtomicGroup::new();
        assert!(matches!(group.build_group(), Err(ComposerError::EmptyGroup)));
        assert_eq!(group.status(), ComposerStatus::Building);
    }

    #[test]
    fn test_single_transaction_is_not_grouped() {
        let (sender, signer) = account();
        let txn = payment(sender, 1);
        let id = txn.id().unwrap();
        let mut group = AtomicGroup::new();
        group.add_transaction(with_signer(txn, &signer)).unwrap();
        let built = group.build_group().unwrap();
        assert!(built[0].txn.header.group.is_none());
        assert_eq!(group.tx_ids(), [id]);
    }

    #[test]
    fn test_build_assigns_group_once() {
        let (sender, signer) = account();
        let txns = vec![payment(sender, 1), payment(sender, 2), payment(sender, 3)];
        let expected = compute_group_id(&txns).unwrap();

        let mut group = AtomicGroup::new();
        for txn in txns {
            group.add_transaction(with_signer(txn, &signer)).unwrap();
        }
        group.build_group().unwrap();
        let ids = group.tx_ids().to_vec();
        assert!(group
            .transactions()
            .iter()
            .all(|t| t.txn.header.group == Some(expected)));
        assert_eq!(ids[1], group.transactions()[1].txn.id().unwrap());

        group.build_group().unwrap();
        assert_eq!(group.tx_ids(), ids);
        assert_eq!(group.status(), ComposerStatus::Built);
    }

    #[test]
    fn test_each_signer_is_called_once() {
        let first = Arc::new(CountingSigner {
            inner: AccountSigner::new(SigningKey::from_bytes(&[1; 32])),
            calls: AtomicUsize::new(0),
        });
        let second = Arc::new(CountingSigner {
            inner: AccountSigner::new(SigningKey::from_bytes(&[2; 32])),
            calls: AtomicUsize::new(0),
        });
        let first_signer: Arc<dyn TransactionSigner> = first.clone();
        let second_signer: Arc<dyn TransactionSigner> = second.clone();

        let mut group = AtomicGroup::new();
        let a = first.inner.address();
        let b = second.inner.address();
        group.add_transaction(with_signer(payment(a, 1), &first_signer)).unwrap();
        group.add_transaction(with_signer(payment(b, 2), &second_signer)).unwrap();
        group.add_transaction(with_signer(payment(a, 3), &first_signer)).unwrap();

        let signed = group.gather_signatures().unwrap().to_vec();
        assert_eq!(signed.len(), 3);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.status(), ComposerStatus::Signed);

        let expected = group.transactions()[1]
            .txn
            .sign(&SigningKey::from_bytes(&[2; 32]))
            .unwrap()
            .encode()
            .unwrap();
        assert_eq!(signed[1], expected);

        assert_eq!(group.gather_signatures().unwrap(), signed);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_signature() {
        let (sender, signer) = account();
        let silent: Arc<dyn TransactionSigner> = Arc::new(SilentSigner);
        let mut group = AtomicGroup::new();
        group.add_transaction(with_signer(payment(sender, 1), &signer)).unwrap();
        group.add_transaction(with_signer(payment(sender, 2), &silent)).unwrap();
        assert!(matches!(
            group.gather_signatures(),
            Err(ComposerError::MissingSignature(1))
        ));
        assert_eq!(group.status(), ComposerStatus::Built);
    }

    #[test]
    fn test_duplicate_starts_over() {
        let (sender, signer) = account();
        let mut group = AtomicGroup::new();
        group.add_transaction(with_signer(payment(sender, 1), &signer)).unwrap();
        group.add_transaction(with_signer(payment(sender, 2), &signer)).unwrap();
        group.gather_signatures().unwrap();

        let mut copy = group.duplicate();
        assert_eq!(copy.status(), ComposerStatus::Building);
        assert!(copy.tx_ids().is_empty());
        assert!(copy.transactions().iter().all(|t| t.txn.header.group.is_none()));
        copy.add_transaction(with_signer(payment(sender, 3), &signer)).unwrap();
        assert_eq!(copy.len(), 3);
        assert_eq!(group.status(), ComposerStatus::Signed);
    }

    // ========================================================================
    // Submission
    // ========================================================================

    #[tokio::test]
    async fn test_submit_sends_concatenated_group() {
        let signer: Arc<dyn TransactionSigner> = Arc::new(EmptySigner);
        let sender = Address::new([1; 32]);
        let mut group = AtomicGroup::new();
        group.add_transaction(with_signer(payment(sender, 1), &signer)).unwrap();
        group.add_transaction(with_signer(payment(sender, 2), &signer)).unwrap();

        let algod = Mock::new(10);
        let ids = group.submit(&algod).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(group.status(), ComposerStatus::Submitted);

        let signed = group.gather_signatures().unwrap().concat();
        assert_eq!(*algod.submitted.lock().unwrap(), vec![signed]);
    }

    #[tokio::test]
    async fn test_execute_reads_return_values() {
        let (sender, signer) = account();
        let mut group = AtomicGroup::new();
        group
            .add_method_call(call("add(uint64,uint64)uint128", sender, &signer)
                .with_args(vec![Value::from(1u64).into(), Value::from(2u64).into()]))
            .unwrap();
        group.add_method_call(call("noop()void", sender, &signer)).unwrap();
        group.add_transaction(with_signer(payment(sender, 1), &signer)).unwrap();
        group
            .add_method_call(call("name()string", sender, &signer))
            .unwrap();
        group
            .add_method_call(call("count()uint64", sender, &signer))
            .unwrap();
        group.build_group().unwrap();
        let ids = group.tx_ids().to_vec();

        let algod = Mock::new(10);
        let mut sum = RETURN_PREFIX.to_vec();
        sum.extend_from_slice(&[0; 15]);
        sum.push(3);
        algod.set_pending(&ids[0], returning(&sum));
        algod.set_pending(&ids[1], PendingTransaction { confirmed_round: 7, ..Default::default() });
        algod.set_pending(&ids[3], returning(b"no prefix"));

        let result = group.execute(&algod, 4).await.unwrap();
        assert_eq!(result.confirmed_round, 7);
        assert_eq!(result.tx_ids, ids);
        assert_eq!(group.status(), ComposerStatus::Committed);

        let results = &result.method_results;
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].tx_id, ids[0]);
        assert_eq!(results[0].return_value, Some(Value::Uint(BigUint::from(3u8))));
        assert_eq!(results[0].raw_value.as_ref().map(Vec::len), Some(16));
        assert!(results[0].decode_error.is_none());

        assert!(results[1].return_value.is_none());
        assert!(results[1].decode_error.is_none());
        assert!(results[1].tx_info.is_some());

        assert_eq!(results[2].tx_id, ids[3]);
        assert_eq!(results[2].decode_error, Some(ReturnError::MissingPrefix));

        assert_eq!(results[3].tx_id, ids[4]);
        assert!(matches!(results[3].decode_error, Some(ReturnError::Lookup(_))));
        assert!(results[3].tx_info.is_none());

        assert!(matches!(
            group.submit(&algod).await,
            Err(Error::Composer(ComposerError::AlreadyCommitted))
        ));
    }

    #[tokio::test]
    async fn test_oversized_return_type_is_a_slot_error() {
        let (sender, signer) = account();
        let mut group = AtomicGroup::new();
        group
            .add_method_call(call("huge()(uint512[65535][65535][65535][65535])", sender, &signer))
            .unwrap();
        group.add_method_call(call("count()uint64", sender, &signer)).unwrap();
        group.build_group().unwrap();
        let ids = group.tx_ids().to_vec();

        let algod = Mock::new(10);
        let mut log = RETURN_PREFIX.to_vec();
        log.extend_from_slice(&[0; 4]);
        algod.set_pending(&ids[0], returning(&log));
        let mut count = RETURN_PREFIX.to_vec();
        count.extend_from_slice(&9u64.to_be_bytes());
        algod.set_pending(&ids[1], returning(&count));

        let result = group.execute(&algod, 4).await.unwrap();
        assert!(matches!(
            result.method_results[0].decode_error,
            Some(ReturnError::Decode(EncodingError::SizeOverflow(_)))
        ));
        assert_eq!(result.method_results[1].return_value, Some(Value::from(9u64)));
    }

    #[tokio::test]
    async fn test_execute_times_out_without_confirmation() {
        let (sender, signer) = account();
        let mut group = AtomicGroup::new();
        group.add_transaction(with_signer(payment(sender, 1), &signer)).unwrap();
        let algod = Mock::new(10);
        let err = group.execute(&algod, 2).await.unwrap_err();
        assert!(matches!(err, Error::ConfirmationTimeout { rounds: 2, .. }));
        assert_eq!(group.status(), ComposerStatus::Submitted);
    }
}
