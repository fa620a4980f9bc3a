//! 32-byte account addresses and their checksummed base32 text form.

use crate::hash::{sha512_256, sha512_256_prefixed, APPLICATION_PREFIX};
use data_encoding::BASE32_NOPAD;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Number of trailing digest bytes appended to the key in the text form.
pub const CHECKSUM_LENGTH: usize = 4;

/// Length of the text form of an address.
pub const ADDRESS_STRING_LENGTH: usize = 58;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be {expected} characters, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("address is not valid base32: {0}")]
    InvalidEncoding(String),
    #[error("address checksum mismatch")]
    ChecksumMismatch,
    #[error("public key must be {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; Address::LENGTH]);

impl Address {
    pub const LENGTH: usize = 32;

    pub const ZERO: Address = Address([0u8; Address::LENGTH]);

    pub const fn new(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let bytes: [u8; Self::LENGTH] =
            bytes.try_into().map_err(|_| AddressError::InvalidKeyLength {
                expected: Self::LENGTH,
                got: bytes.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Escrow address controlled by an application.
    pub fn for_application(app_id: u64) -> Self {
        Self(sha512_256_prefixed(APPLICATION_PREFIX, &app_id.to_be_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; Self::LENGTH]
    }

    fn checksum(&self) -> [u8; CHECKSUM_LENGTH] {
        let digest = sha512_256(&self.0);
        let mut out = [0u8; CHECKSUM_LENGTH];
        out.copy_from_slice(&digest[digest.len() - CHECKSUM_LENGTH..]);
        out
    }
}

impl From<[u8; Address::LENGTH]> for Address {
    fn from(bytes: [u8; Address::LENGTH]) -> Self {
        Self(bytes)
    }
}

impl From<ed25519_dalek::VerifyingKey> for Address {
    fn from(key: ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = [0u8; Self::LENGTH + CHECKSUM_LENGTH];
        raw[..Self::LENGTH].copy_from_slice(&self.0);
        raw[Self::LENGTH..].copy_from_slice(&self.checksum());
        f.write_str(&BASE32_NOPAD.encode(&raw))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ADDRESS_STRING_LENGTH {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_STRING_LENGTH,
                got: s.len(),
            });
        }
        let raw = BASE32_NOPAD
            .decode(s.as_bytes())
            .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;
        let address = Address::from_slice(&raw[..Self::LENGTH])?;
        if raw[Self::LENGTH..] != address.checksum() {
            return Err(AddressError::ChecksumMismatch);
        }
        Ok(address)
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "UPYAFLHSIPMJOHVXU2MPLQ46GXJKSDCEMZ6RLCQ7GWB5PRDKJUWKKXECXI";

    #[test]
    fn test_parse_and_display() {
        let address: Address = SAMPLE.parse().unwrap();
        assert_eq!(address.to_string(), SAMPLE);
        assert_eq!(
            hex::encode(address.as_bytes()),
            "a3f002acf243d8971eb7a698f5c39e35d2a90c44667d158a1f3583d7c46a4d2c"
        );
    }

    #[test]
    fn test_zero_address() {
        assert_eq!(
            Address::ZERO.to_string(),
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ"
        );
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut corrupted = SAMPLE.to_string();
        corrupted.replace_range(0..1, "A");
        assert_eq!(
            corrupted.parse::<Address>(),
            Err(AddressError::ChecksumMismatch)
        );
    }

    #[test]
    fn test_wrong_length() {
        assert!(matches!(
            "ABC".parse::<Address>(),
            Err(AddressError::InvalidLength { got: 3, .. })
        ));
    }

    #[test]
    fn test_application_address() {
        assert_eq!(
            Address::for_application(77).to_string(),
            "PCYUFPA2ZTOYWTP43MX2MOX2OWAIAXUDNC2WFCXAGMRUZ3DYD6BWFDL5YM"
        );
    }

    #[test]
    fn test_serde_as_string() {
        let address: Address = SAMPLE.parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{SAMPLE}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
