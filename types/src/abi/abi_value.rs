//! Values paired with ABI types at encode and decode time.

use super::{abi_type::Type, error::EncodingError};
use crate::address::Address;
use num_bigint::BigUint;
use serde_json::Value as Json;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// Both `uintN` and the numerator of `ufixedNxM`.
    Uint(BigUint),
    Byte(u8),
    Bool(bool),
    Address(Address),
    String(String),
    /// Static and dynamic arrays.
    Array(Vec<Value>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Uint(_) => "uint",
            Value::Byte(_) => "byte",
            Value::Bool(_) => "bool",
            Value::Address(_) => "address",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Bytes of a `byte[]` / `byte[N]` value.
    pub fn bytes(bytes: &[u8]) -> Self {
        Value::Array(bytes.iter().copied().map(Value::Byte).collect())
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => u64::try_from(v).ok(),
            Value::Byte(v) => Some(*v as u64),
            _ => None,
        }
    }

    /// Parse a JSON value according to `ty`.
    ///
    /// Integers may be given as JSON numbers or decimal strings (for widths
    /// beyond 64 bits), addresses as their text form, and `byte` arrays also
    /// accept a base64 string.
    pub fn from_json(ty: &Type, json: &Json) -> Result<Self, EncodingError> {
        let invalid = |reason: &str| EncodingError::Json {
            ty: ty.to_string(),
            reason: reason.to_string(),
        };
        match ty {
            Type::Uint(_) | Type::Ufixed { .. } => match json {
                Json::Number(n) => n
                    .as_u64()
                    .map(|n| Value::Uint(n.into()))
                    .ok_or_else(|| invalid("expected a non-negative integer")),
                Json::String(s) => BigUint::parse_bytes(s.as_bytes(), 10)
                    .map(Value::Uint)
                    .ok_or_else(|| invalid("expected a decimal integer string")),
                _ => Err(invalid("expected an integer")),
            },
            Type::Byte => json
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .map(Value::Byte)
                .ok_or_else(|| invalid("expected an integer in 0..=255")),
            Type::Bool => json
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| invalid("expected a boolean")),
            Type::Address => {
                let s = json.as_str().ok_or_else(|| invalid("expected an address string"))?;
                s.parse()
                    .map(Value::Address)
                    .map_err(|e: crate::address::AddressError| invalid(&e.to_string()))
            }
            Type::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| invalid("expected a string")),
            Type::StaticArray(elem, _) | Type::DynamicArray(elem) => match json {
                Json::String(s) if **elem == Type::Byte => {
                    use base64::{engine::general_purpose, Engine as _};
                    general_purpose::STANDARD
                        .decode(s)
                        .map(|bytes| Value::bytes(&bytes))
                        .map_err(|e| invalid(&e.to_string()))
                }
                Json::Array(items) => items
                    .iter()
                    .map(|item| Value::from_json(elem, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                _ => Err(invalid("expected an array")),
            },
            Type::Tuple(children) => {
                let items = json.as_array().ok_or_else(|| invalid("expected an array"))?;
                if items.len() != children.len() {
                    return Err(EncodingError::LengthMismatch {
                        expected: children.len(),
                        got: items.len(),
                    });
                }
                children
                    .iter()
                    .zip(items)
                    .map(|(child, item)| Value::from_json(child, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Tuple)
            }
        }
    }

    /// Integers that fit in 64 bits become JSON numbers, wider ones decimal
    /// strings.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Uint(v) => match u64::try_from(v) {
                Ok(n) => Json::from(n),
                Err(_) => Json::String(v.to_str_radix(10)),
            },
            Value::Byte(v) => Json::from(*v),
            Value::Bool(v) => Json::Bool(*v),
            Value::Address(a) => Json::String(a.to_string()),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) | Value::Tuple(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v.into())
    }
}

impl From<BigUint> for Value {
    fn from(v: BigUint) -> Self {
        Value::Uint(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Address> for Value {
    fn from(v: Address) -> Self {
        Value::Address(v)
    }
}
