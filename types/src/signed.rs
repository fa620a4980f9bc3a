//! Transactions paired with their authorization.

use crate::{
    address::Address,
    logicsig::{LogicSig, LogicSigAccount, LogicSigError},
    msgpack::{Map, ToMsgpack},
    multisig::{Multisig, MultisigError},
    transaction::{Transaction, TransactionError},
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Multisig(#[from] MultisigError),
    #[error(transparent)]
    LogicSig(#[from] LogicSigError),
    #[error("transaction is not authorized by a multisig")]
    NotMultisig,
    #[error("cannot merge signatures over different transactions")]
    TransactionMismatch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authorization {
    Unsigned,
    Signature(Signature),
    Multisig(Multisig),
    LogicSig(LogicSig),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub authorization: Authorization,
    /// The authorizing address when it differs from the sender (rekeyed
    /// accounts).
    pub auth_address: Option<Address>,
}

impl SignedTransaction {
    pub fn unsigned(transaction: Transaction) -> Self {
        Self {
            transaction,
            authorization: Authorization::Unsigned,
            auth_address: None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SignError> {
        Ok(self
            .encode_msgpack()
            .map_err(TransactionError::from)?)
    }

    pub fn id(&self) -> Result<String, SignError> {
        Ok(self.transaction.id()?)
    }

    /// Check the authorization against the sender (or `auth_address`).
    pub fn verify(&self) -> Result<bool, SignError> {
        let authorizer = self.auth_address.unwrap_or(*self.transaction.sender());
        let message = self.transaction.bytes_to_sign()?;
        Ok(match &self.authorization {
            Authorization::Unsigned => false,
            Authorization::Signature(signature) => {
                VerifyingKey::from_bytes(authorizer.as_bytes())
                    .map(|key| key.verify(&message, signature).is_ok())
                    .unwrap_or(false)
            }
            Authorization::Multisig(multisig) => {
                multisig.address() == authorizer && multisig.verify(&message)
            }
            Authorization::LogicSig(lsig) => lsig.verify(&authorizer),
        })
    }

    /// Combine partially signed copies of the same multisig transaction.
    pub fn merge_multisig(parts: &[SignedTransaction]) -> Result<Self, SignError> {
        let (first, _) = parts.split_first().ok_or(MultisigError::Empty)?;
        let id = first.transaction.raw_id()?;
        let mut multisigs = Vec::with_capacity(parts.len());
        for part in parts {
            if part.transaction.raw_id()? != id {
                return Err(SignError::TransactionMismatch);
            }
            match &part.authorization {
                Authorization::Multisig(multisig) => multisigs.push(multisig.clone()),
                _ => return Err(SignError::NotMultisig),
            }
        }
        Ok(Self {
            transaction: first.transaction.clone(),
            authorization: Authorization::Multisig(Multisig::merge(&multisigs)?),
            auth_address: first.auth_address,
        })
    }
}

impl ToMsgpack for SignedTransaction {
    fn to_msgpack(&self) -> Map {
        let map = match &self.authorization {
            Authorization::Unsigned => Map::new(),
            Authorization::Signature(signature) => Map::new().bin("sig", &signature.to_bytes()),
            Authorization::Multisig(multisig) => Map::new().map("msig", multisig.to_msgpack()),
            Authorization::LogicSig(lsig) => Map::new().map("lsig", lsig.to_msgpack()),
        };
        map.opt_address("sgnr", self.auth_address.as_ref())
            .map("txn", self.transaction.to_msgpack())
    }
}

fn auth_address(signer: Address, sender: &Address) -> Option<Address> {
    (signer != *sender).then_some(signer)
}

impl Transaction {
    /// Sign with a single key. A key other than the sender's is recorded as
    /// the authorizing address.
    pub fn sign(&self, key: &SigningKey) -> Result<SignedTransaction, SignError> {
        let signature = key.sign(&self.bytes_to_sign()?);
        Ok(SignedTransaction {
            transaction: self.clone(),
            authorization: Authorization::Signature(signature),
            auth_address: auth_address(Address::from(key.verifying_key()), self.sender()),
        })
    }

    /// Sign as every member of `multisig` whose key is given.
    pub fn sign_multisig(
        &self,
        multisig: &Multisig,
        keys: &[SigningKey],
    ) -> Result<SignedTransaction, SignError> {
        let message = self.bytes_to_sign()?;
        let mut multisig = multisig.without_signatures();
        for key in keys {
            multisig.sign(key, &message)?;
        }
        Ok(SignedTransaction {
            transaction: self.clone(),
            auth_address: auth_address(multisig.address(), self.sender()),
            authorization: Authorization::Multisig(multisig),
        })
    }

    pub fn sign_logicsig(
        &self,
        account: &LogicSigAccount,
    ) -> Result<SignedTransaction, SignError> {
        let signer = account.address()?;
        Ok(SignedTransaction {
            transaction: self.clone(),
            authorization: Authorization::LogicSig(account.lsig.clone()),
            auth_address: auth_address(signer, self.sender()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        multisig::MULTISIG_VERSION,
        transaction::{assign_group_id, tests::golden_payments},
    };
    use base64::{engine::general_purpose, Engine as _};

    fn sender_key() -> SigningKey {
        SigningKey::from_bytes(&[11; 32])
    }

    fn own_payment() -> Transaction {
        let (mut txn, _) = golden_payments();
        txn.header.sender = Address::from(sender_key().verifying_key());
        txn
    }

    #[test]
    fn test_grouped_unsigned_concatenation() {
        let (tx1, tx2) = golden_payments();
        let grouped = assign_group_id(vec![tx1, tx2], None).unwrap();
        let mut concatenated = Vec::new();
        for txn in grouped {
            concatenated.extend(SignedTransaction::unsigned(txn).encode().unwrap());
        }
        let golden = "gaN0eG6Lo2FtdM0H0KNmZWXNA+iiZnbOAArW/6NnZW6rZGV2bmV0LXYxLjCiZ2jEI\
            LAtz+3tknW6iiStLW4gnSvbXUqW3ul3ghinaDc5pY9Bo2dycMQgLiQ9OBup9H/bZL\
            SfQUH2S6iHUM6FQ3PLuv9FNKyt09SibHbOAAra56Rub3RlxAjBErDlwnQIyqNyY3b\
            EIKPwAqzyQ9iXHremmPXDnjXSqQxEZn0Vih81g9fEak0so3NuZMQgo/ACrPJD2Jce\
            t6aY9cOeNdKpDERmfRWKHzWD18RqTSykdHlwZaNwYXmBo3R4boujYW10zQfQo2ZlZ\
            c0D6KJmds4ACtdzo2dlbqtkZXZuZXQtdjEuMKJnaMQgsC3P7e2SdbqKJK0tbiCdK9\
            tdSpbe6XeCGKdoNzmlj0GjZ3JwxCAuJD04G6n0f9tktJ9BQfZLqIdQzoVDc8u6/0U\
            0rK3T1KJsds4ACttbpG5vdGXECHQZRyOgXayIo3JjdsQgo/ACrPJD2Jcet6aY9cOe\
            NdKpDERmfRWKHzWD18RqTSyjc25kxCCj8AKs8kPYlx63ppj1w5410qkMRGZ9FYofN\
            YPXxGpNLKR0eXBlo3BheQ==";
        assert_eq!(general_purpose::STANDARD.encode(concatenated), golden);
    }

    #[test]
    fn test_sign_by_sender() {
        let txn = own_payment();
        let signed = txn.sign(&sender_key()).unwrap();
        assert_eq!(signed.auth_address, None);
        assert!(signed.verify().unwrap());
        assert_eq!(signed.id().unwrap(), txn.id().unwrap());

        let map = signed.to_msgpack();
        assert!(map.get("sig").is_some());
        assert!(map.get("sgnr").is_none());
    }

    #[test]
    fn test_sign_by_rekeyed_key_sets_auth_address() {
        let txn = own_payment();
        let other = SigningKey::from_bytes(&[12; 32]);
        let signed = txn.sign(&other).unwrap();
        assert_eq!(signed.auth_address, Some(Address::from(other.verifying_key())));
        assert!(signed.verify().unwrap());
        assert!(signed.to_msgpack().get("sgnr").is_some());
    }

    #[test]
    fn test_multisig_sign_and_merge() {
        let keys: Vec<SigningKey> = (1u8..=3).map(|i| SigningKey::from_bytes(&[i; 32])).collect();
        let members = keys.iter().map(|k| Address::from(k.verifying_key())).collect();
        let msig = Multisig::new(MULTISIG_VERSION, 2, members).unwrap();

        let (mut txn, _) = golden_payments();
        txn.header.sender = msig.address();

        let a = txn.sign_multisig(&msig, &keys[..1]).unwrap();
        let b = txn.sign_multisig(&msig, &keys[2..]).unwrap();
        assert_eq!(a.auth_address, None);
        assert!(!a.verify().unwrap());

        let merged = SignedTransaction::merge_multisig(&[a.clone(), b]).unwrap();
        assert!(merged.verify().unwrap());

        let unsigned = SignedTransaction::unsigned(txn);
        assert_eq!(
            SignedTransaction::merge_multisig(&[a, unsigned]),
            Err(SignError::NotMultisig)
        );
    }

    #[test]
    fn test_logicsig_escrow_signing() {
        let account = LogicSigAccount::new(vec![0x01, 0x20, 0x01, 0x01, 0x22], vec![]).unwrap();
        let (mut txn, _) = golden_payments();
        txn.header.sender = account.address().unwrap();
        let signed = txn.sign_logicsig(&account).unwrap();
        assert_eq!(signed.auth_address, None);
        assert!(signed.verify().unwrap());
        assert!(signed.to_msgpack().get("lsig").is_some());
    }
}
