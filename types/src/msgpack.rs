//! Canonical msgpack encoding.
//!
//! Every object hashed or signed by the network is serialized the same way:
//! map keys sorted, zero values omitted, unsigned integers in their shortest
//! form, and byte strings in the `bin` family. [`Map`] enforces all of this
//! at construction time so callers only describe fields.

use crate::address::Address;
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MsgpackError {
    #[error("msgpack write failed: {0}")]
    Write(String),
    #[error("collection too large: {0} entries")]
    TooLarge(usize),
}

fn write_error<E: fmt::Display>(e: E) -> MsgpackError {
    MsgpackError::Write(e.to_string())
}

fn collection_len(len: usize) -> Result<u32, MsgpackError> {
    u32::try_from(len).map_err(|_| MsgpackError::TooLarge(len))
}

/// A single encodable msgpack value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Item {
    Uint(u64),
    Bool(bool),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<Item>),
    Map(Map),
}

impl Item {
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MsgpackError> {
        match self {
            Item::Uint(v) => {
                rmp::encode::write_uint(buf, *v).map_err(write_error)?;
            }
            Item::Bool(v) => rmp::encode::write_bool(buf, *v).map_err(write_error)?,
            Item::Str(v) => rmp::encode::write_str(buf, v).map_err(write_error)?,
            Item::Bin(v) => rmp::encode::write_bin(buf, v).map_err(write_error)?,
            Item::Array(items) => {
                rmp::encode::write_array_len(buf, collection_len(items.len())?)
                    .map_err(write_error)?;
                for item in items {
                    item.write(buf)?;
                }
            }
            Item::Map(map) => map.write(buf)?,
        }
        Ok(())
    }
}

/// A msgpack map with canonical key order and zero-value omission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Map(BTreeMap<&'static str, Item>);

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Item> {
        self.0.get(key)
    }

    /// Insert unconditionally, even if the value is a zero value.
    #[must_use]
    pub fn item(mut self, key: &'static str, item: Item) -> Self {
        self.0.insert(key, item);
        self
    }

    #[must_use]
    pub fn uint(self, key: &'static str, value: u64) -> Self {
        if value == 0 {
            return self;
        }
        self.item(key, Item::Uint(value))
    }

    #[must_use]
    pub fn bool(self, key: &'static str, value: bool) -> Self {
        if !value {
            return self;
        }
        self.item(key, Item::Bool(value))
    }

    #[must_use]
    pub fn str(self, key: &'static str, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        self.item(key, Item::Str(value.to_string()))
    }

    #[must_use]
    pub fn bin(self, key: &'static str, value: &[u8]) -> Self {
        if value.is_empty() {
            return self;
        }
        self.item(key, Item::Bin(value.to_vec()))
    }

    #[must_use]
    pub fn opt_bin(self, key: &'static str, value: Option<&[u8]>) -> Self {
        match value {
            Some(value) => self.bin(key, value),
            None => self,
        }
    }

    /// Addresses are omitted when all-zero.
    #[must_use]
    pub fn address(self, key: &'static str, value: &Address) -> Self {
        if value.is_zero() {
            return self;
        }
        self.item(key, Item::Bin(value.as_bytes().to_vec()))
    }

    #[must_use]
    pub fn opt_address(self, key: &'static str, value: Option<&Address>) -> Self {
        match value {
            Some(value) => self.address(key, value),
            None => self,
        }
    }

    #[must_use]
    pub fn array(self, key: &'static str, items: Vec<Item>) -> Self {
        if items.is_empty() {
            return self;
        }
        self.item(key, Item::Array(items))
    }

    #[must_use]
    pub fn map(self, key: &'static str, map: Map) -> Self {
        if map.is_empty() {
            return self;
        }
        self.item(key, Item::Map(map))
    }

    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MsgpackError> {
        rmp::encode::write_map_len(buf, collection_len(self.0.len())?).map_err(write_error)?;
        for (key, value) in &self.0 {
            rmp::encode::write_str(buf, key).map_err(write_error)?;
            value.write(buf)?;
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, MsgpackError> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }
}

/// Types with a canonical msgpack map representation.
pub trait ToMsgpack {
    fn to_msgpack(&self) -> Map;

    fn encode_msgpack(&self) -> Result<Vec<u8>, MsgpackError> {
        self.to_msgpack().encode()
    }
}
