//! k-of-n multisignature accounts.

use crate::{
    address::Address,
    hash::{sha512_256_prefixed, MULTISIG_PREFIX},
    msgpack::{Item, Map, ToMsgpack},
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

/// The only multisig version the network understands.
pub const MULTISIG_VERSION: u8 = 1;
pub const MAX_MULTISIG_KEYS: usize = 255;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("unknown multisig version: {0}")]
    UnknownVersion(u8),
    #[error("invalid threshold {threshold} for {keys} keys")]
    InvalidThreshold { threshold: u8, keys: usize },
    #[error("multisig has {0} keys (max 255)")]
    TooManyKeys(usize),
    #[error("key {0} is not a member of the multisig")]
    KeyNotInMultisig(Address),
    #[error("cannot merge signatures of different multisig accounts")]
    AccountMismatch,
    #[error("conflicting signatures for member {0}")]
    ConflictingSignature(usize),
    #[error("nothing to merge")]
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subsignature {
    pub public_key: Address,
    pub signature: Option<Signature>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Multisig {
    pub version: u8,
    pub threshold: u8,
    pub subsigs: Vec<Subsignature>,
}

impl Multisig {
    pub fn new(version: u8, threshold: u8, keys: Vec<Address>) -> Result<Self, MultisigError> {
        let multisig = Self {
            version,
            threshold,
            subsigs: keys
                .into_iter()
                .map(|public_key| Subsignature {
                    public_key,
                    signature: None,
                })
                .collect(),
        };
        multisig.validate()?;
        Ok(multisig)
    }

    pub fn validate(&self) -> Result<(), MultisigError> {
        if self.version != MULTISIG_VERSION {
            return Err(MultisigError::UnknownVersion(self.version));
        }
        if self.threshold == 0
            || self.subsigs.is_empty()
            || self.threshold as usize > self.subsigs.len()
        {
            return Err(MultisigError::InvalidThreshold {
                threshold: self.threshold,
                keys: self.subsigs.len(),
            });
        }
        if self.subsigs.len() > MAX_MULTISIG_KEYS {
            return Err(MultisigError::TooManyKeys(self.subsigs.len()));
        }
        Ok(())
    }

    /// `SHA-512/256("MultisigAddr" || version || threshold || keys...)`.
    pub fn address(&self) -> Address {
        let mut preimage = vec![self.version, self.threshold];
        for subsig in &self.subsigs {
            preimage.extend_from_slice(subsig.public_key.as_bytes());
        }
        Address::new(sha512_256_prefixed(MULTISIG_PREFIX, &preimage))
    }

    pub fn public_keys(&self) -> Vec<Address> {
        self.subsigs.iter().map(|s| s.public_key).collect()
    }

    /// Same account with every signature cleared.
    pub fn without_signatures(&self) -> Self {
        Self {
            version: self.version,
            threshold: self.threshold,
            subsigs: self
                .subsigs
                .iter()
                .map(|s| Subsignature {
                    public_key: s.public_key,
                    signature: None,
                })
                .collect(),
        }
    }

    pub fn signature_count(&self) -> usize {
        self.subsigs.iter().filter(|s| s.signature.is_some()).count()
    }

    /// Sign `message` as the member owning `key`, replacing any previous
    /// signature of that member.
    pub fn sign(&mut self, key: &SigningKey, message: &[u8]) -> Result<(), MultisigError> {
        self.validate()?;
        let public_key = Address::from(key.verifying_key());
        let subsig = self
            .subsigs
            .iter_mut()
            .find(|s| s.public_key == public_key)
            .ok_or(MultisigError::KeyNotInMultisig(public_key))?;
        subsig.signature = Some(key.sign(message));
        Ok(())
    }

    /// At least `threshold` signatures present and every present one valid.
    pub fn verify(&self, message: &[u8]) -> bool {
        if self.validate().is_err() || self.signature_count() < self.threshold as usize {
            return false;
        }
        self.subsigs.iter().all(|subsig| match &subsig.signature {
            None => true,
            Some(signature) => VerifyingKey::from_bytes(subsig.public_key.as_bytes())
                .map(|key| key.verify(message, signature).is_ok())
                .unwrap_or(false),
        })
    }

    /// Combine partial signatures over the same account.
    pub fn merge(parts: &[Multisig]) -> Result<Multisig, MultisigError> {
        let (first, rest) = parts.split_first().ok_or(MultisigError::Empty)?;
        let address = first.address();
        let mut merged = first.clone();
        for part in rest {
            if part.address() != address {
                return Err(MultisigError::AccountMismatch);
            }
            let pairs = merged.subsigs.iter_mut().zip(&part.subsigs).enumerate();
            for (index, (into, from)) in pairs {
                match (into.signature, from.signature) {
                    (_, None) => {}
                    (None, Some(signature)) => into.signature = Some(signature),
                    (Some(existing), Some(signature)) if existing == signature => {}
                    (Some(_), Some(_)) => return Err(MultisigError::ConflictingSignature(index)),
                }
            }
        }
        Ok(merged)
    }
}

impl ToMsgpack for Multisig {
    fn to_msgpack(&self) -> Map {
        let subsigs = self
            .subsigs
            .iter()
            .map(|s| {
                let map = Map::new().bin("pk", s.public_key.as_bytes());
                let map = match &s.signature {
                    Some(signature) => map.bin("s", &signature.to_bytes()),
                    None => map,
                };
                Item::Map(map)
            })
            .collect();
        Map::new()
            .array("subsig", subsigs)
            .uint("thr", self.threshold as u64)
            .uint("v", self.version as u64)
    }
}
