//! Logic signatures: transactions authorized by a program, optionally
//! delegated by a single key or a multisig account.

use crate::{
    address::Address,
    hash::{prefixed, sha512_256_prefixed, PROGRAM_PREFIX},
    msgpack::{Item, Map, ToMsgpack},
    multisig::{Multisig, MultisigError},
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogicSigError {
    #[error("empty program")]
    EmptyProgram,
    /// Printable text was passed where compiled bytecode was expected.
    #[error("program is printable text, not bytecode")]
    NotBytecode,
    #[error("logic signature carries both a signature and a multisig")]
    Overspecified,
    #[error("delegated logic signature is missing its signing key")]
    MissingSigningKey,
    #[error("logic signature is not delegated to a multisig")]
    NotMultisig,
    #[error(transparent)]
    Multisig(#[from] MultisigError),
}

fn check_program(program: &[u8]) -> Result<(), LogicSigError> {
    if program.is_empty() {
        return Err(LogicSigError::EmptyProgram);
    }
    if program.iter().all(|b| *b == b'\n' || (b' '..=b'~').contains(b)) {
        return Err(LogicSigError::NotBytecode);
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicSig {
    pub program: Vec<u8>,
    /// Not signed; checked by the program itself.
    pub args: Vec<Vec<u8>>,
    pub signature: Option<Signature>,
    pub multisig: Option<Multisig>,
}

impl LogicSig {
    pub fn new(program: Vec<u8>, args: Vec<Vec<u8>>) -> Result<Self, LogicSigError> {
        check_program(&program)?;
        Ok(Self {
            program,
            args,
            signature: None,
            multisig: None,
        })
    }

    /// Escrow address of the program.
    pub fn address(&self) -> Address {
        Address::new(sha512_256_prefixed(PROGRAM_PREFIX, &self.program))
    }

    /// The bytes a delegating key signs: `"Program" || program`.
    pub fn bytes_to_sign(&self) -> Vec<u8> {
        prefixed(PROGRAM_PREFIX, &self.program)
    }

    /// Check the logic signature against the authorizing address.
    pub fn verify(&self, authorizer: &Address) -> bool {
        if check_program(&self.program).is_err() {
            return false;
        }
        match (&self.signature, &self.multisig) {
            (Some(_), Some(_)) => false,
            (None, None) => self.address() == *authorizer,
            (Some(signature), None) => VerifyingKey::from_bytes(authorizer.as_bytes())
                .map(|key| key.verify(&self.bytes_to_sign(), signature).is_ok())
                .unwrap_or(false),
            (None, Some(multisig)) => {
                multisig.address() == *authorizer && multisig.verify(&self.bytes_to_sign())
            }
        }
    }
}

impl ToMsgpack for LogicSig {
    fn to_msgpack(&self) -> Map {
        let map = Map::new()
            .array("arg", self.args.iter().map(|a| Item::Bin(a.clone())).collect())
            .bin("l", &self.program);
        match (&self.signature, &self.multisig) {
            (Some(signature), _) => map.bin("sig", &signature.to_bytes()),
            (None, Some(multisig)) => map.map("msig", multisig.to_msgpack()),
            (None, None) => map,
        }
    }
}

/// A logic signature together with the key that delegated it, so the
/// authorizing address is always known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicSigAccount {
    pub lsig: LogicSig,
    pub signing_key: Option<Address>,
}

impl LogicSigAccount {
    /// An escrow account; call [`Self::sign`] or [`Self::sign_multisig`] to
    /// delegate it.
    pub fn new(program: Vec<u8>, args: Vec<Vec<u8>>) -> Result<Self, LogicSigError> {
        Ok(Self {
            lsig: LogicSig::new(program, args)?,
            signing_key: None,
        })
    }

    pub fn is_delegated(&self) -> bool {
        self.lsig.signature.is_some() || self.lsig.multisig.is_some()
    }

    /// Delegate to a single account.
    pub fn sign(&mut self, key: &SigningKey) -> Result<(), LogicSigError> {
        if self.lsig.multisig.is_some() {
            return Err(LogicSigError::Overspecified);
        }
        self.lsig.signature = Some(key.sign(&self.lsig.bytes_to_sign()));
        self.signing_key = Some(Address::from(key.verifying_key()));
        Ok(())
    }

    /// Delegate to a multisig account, signing as one of its members.
    pub fn sign_multisig(
        &mut self,
        multisig: &Multisig,
        key: &SigningKey,
    ) -> Result<(), LogicSigError> {
        if self.lsig.signature.is_some() {
            return Err(LogicSigError::Overspecified);
        }
        let mut multisig = multisig.clone();
        multisig.sign(key, &self.lsig.bytes_to_sign())?;
        self.lsig.multisig = Some(multisig);
        Ok(())
    }

    /// Add another member's signature to a multisig delegation.
    pub fn append_to_multisig(&mut self, key: &SigningKey) -> Result<(), LogicSigError> {
        let message = self.lsig.bytes_to_sign();
        let multisig = self.lsig.multisig.as_mut().ok_or(LogicSigError::NotMultisig)?;
        multisig.sign(key, &message)?;
        Ok(())
    }

    /// The delegating account, or the program's escrow address.
    pub fn address(&self) -> Result<Address, LogicSigError> {
        match (&self.lsig.signature, &self.lsig.multisig) {
            (Some(_), Some(_)) => Err(LogicSigError::Overspecified),
            (Some(_), None) => self.signing_key.ok_or(LogicSigError::MissingSigningKey),
            (None, Some(multisig)) => Ok(multisig.address()),
            (None, None) => Ok(self.lsig.address()),
        }
    }

    pub fn verify(&self) -> bool {
        self.address()
            .map(|address| self.lsig.verify(&address))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multisig::MULTISIG_VERSION;

    // int 1
    const PROGRAM: &[u8] = &[0x01, 0x20, 0x01, 0x01, 0x22];

    #[test]
    fn test_program_sanity_checks() {
        assert_eq!(LogicSig::new(vec![], vec![]), Err(LogicSigError::EmptyProgram));
        assert_eq!(
            LogicSig::new(b"int 1\n".to_vec(), vec![]),
            Err(LogicSigError::NotBytecode)
        );
        assert!(LogicSig::new(PROGRAM.to_vec(), vec![]).is_ok());
    }

    #[test]
    fn test_escrow_account() {
        let account = LogicSigAccount::new(PROGRAM.to_vec(), vec![b"arg".to_vec()]).unwrap();
        assert!(!account.is_delegated());
        assert_eq!(account.address().unwrap(), account.lsig.address());
        assert!(account.verify());
        let map = account.lsig.to_msgpack();
        assert_eq!(map.get("l"), Some(&Item::Bin(PROGRAM.to_vec())));
        assert!(map.get("sig").is_none());
    }

    #[test]
    fn test_single_key_delegation() {
        let key = SigningKey::from_bytes(&[4; 32]);
        let mut account = LogicSigAccount::new(PROGRAM.to_vec(), vec![]).unwrap();
        account.sign(&key).unwrap();
        assert!(account.is_delegated());
        assert_eq!(account.address().unwrap(), Address::from(key.verifying_key()));
        assert!(account.verify());
        assert!(!account.lsig.verify(&Address::new([1; 32])));
    }

    #[test]
    fn test_multisig_delegation() {
        let keys: Vec<SigningKey> = (1u8..=2).map(|i| SigningKey::from_bytes(&[i; 32])).collect();
        let members = keys.iter().map(|k| Address::from(k.verifying_key())).collect();
        let msig = Multisig::new(MULTISIG_VERSION, 2, members).unwrap();

        let mut account = LogicSigAccount::new(PROGRAM.to_vec(), vec![]).unwrap();
        account.sign_multisig(&msig, &keys[0]).unwrap();
        assert!(!account.verify());
        account.append_to_multisig(&keys[1]).unwrap();
        assert!(account.verify());
        assert_eq!(account.address().unwrap(), msig.address());

        assert_eq!(account.sign(&keys[0]), Err(LogicSigError::Overspecified));
    }

    #[test]
    fn test_append_requires_multisig() {
        let mut account = LogicSigAccount::new(PROGRAM.to_vec(), vec![]).unwrap();
        assert_eq!(
            account.append_to_multisig(&SigningKey::from_bytes(&[1; 32])),
            Err(LogicSigError::NotMultisig)
        );
    }
}
