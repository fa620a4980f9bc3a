//! SHA-512/256 helpers and the domain-separation prefixes used across the
//! protocol.

use sha2::{Digest, Sha512_256};

/// Length of every digest produced by this module.
pub const DIGEST_LENGTH: usize = 32;

/// Prefix hashed in front of a transaction to obtain its id (and signing payload).
pub const TRANSACTION_PREFIX: &[u8] = b"TX";
/// Prefix hashed in front of a transaction group.
pub const GROUP_PREFIX: &[u8] = b"TG";
/// Prefix hashed in front of a logic program.
pub const PROGRAM_PREFIX: &[u8] = b"Program";
/// Prefix hashed in front of a multisig preimage.
pub const MULTISIG_PREFIX: &[u8] = b"MultisigAddr";
/// Prefix hashed in front of an application id to derive its escrow address.
pub const APPLICATION_PREFIX: &[u8] = b"appID";

pub fn sha512_256(data: &[u8]) -> [u8; DIGEST_LENGTH] {
    Sha512_256::digest(data).into()
}

/// Hash `prefix || data` without materializing the concatenation.
pub fn sha512_256_prefixed(prefix: &[u8], data: &[u8]) -> [u8; DIGEST_LENGTH] {
    let mut hasher = Sha512_256::new();
    hasher.update(prefix);
    hasher.update(data);
    hasher.finalize().into()
}

/// Concatenate a domain prefix and a payload (the bytes that get signed).
pub fn prefixed(prefix: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + data.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(data);
    out
}
