//! ABI types and their canonical string grammar.

use super::error::{EncodingError, TypeError};
use std::{fmt, str::FromStr};

pub const MIN_BIT_SIZE: u16 = 8;
pub const MAX_BIT_SIZE: u16 = 512;
pub const MIN_PRECISION: u8 = 1;
pub const MAX_PRECISION: u8 = 160;

/// Byte length of an encoded address.
pub const ADDRESS_BYTE_LEN: usize = 32;

/// Largest number of children a tuple may carry.
pub const MAX_TUPLE_LEN: usize = u16::MAX as usize;

/// Deepest nesting of tuples and arrays a type string may have.
pub const MAX_NESTING_DEPTH: usize = 128;

/// An ABI type.
///
/// Build instances through [`Type::uint`], [`Type::ufixed`],
/// [`Type::static_array`] and [`Type::tuple`] (or by parsing) so the size
/// constraints hold.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Uint(u16),
    Ufixed { bits: u16, precision: u8 },
    Byte,
    Bool,
    Address,
    String,
    StaticArray(Box<Type>, u16),
    DynamicArray(Box<Type>),
    Tuple(Vec<Type>),
}

fn check_bit_size(bits: u64) -> Result<u16, TypeError> {
    if bits % 8 != 0 || bits < MIN_BIT_SIZE as u64 || bits > MAX_BIT_SIZE as u64 {
        return Err(TypeError::UnsupportedBitSize(bits));
    }
    Ok(bits as u16)
}

impl Type {
    pub fn uint(bits: u64) -> Result<Self, TypeError> {
        Ok(Type::Uint(check_bit_size(bits)?))
    }

    pub fn ufixed(bits: u64, precision: u64) -> Result<Self, TypeError> {
        let bits = check_bit_size(bits)?;
        if precision < MIN_PRECISION as u64 || precision > MAX_PRECISION as u64 {
            return Err(TypeError::UnsupportedPrecision(precision));
        }
        Ok(Type::Ufixed {
            bits,
            precision: precision as u8,
        })
    }

    pub fn static_array(elem: Type, len: u64) -> Result<Self, TypeError> {
        if len == 0 || len > u16::MAX as u64 {
            return Err(TypeError::InvalidArrayLength(len));
        }
        Ok(Type::StaticArray(Box::new(elem), len as u16))
    }

    pub fn dynamic_array(elem: Type) -> Self {
        Type::DynamicArray(Box::new(elem))
    }

    pub fn tuple(children: Vec<Type>) -> Result<Self, TypeError> {
        if children.len() > MAX_TUPLE_LEN {
            return Err(TypeError::TupleTooLarge(children.len()));
        }
        Ok(Type::Tuple(children))
    }

    /// Whether the encoded size depends on the value.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Type::String | Type::DynamicArray(_) => true,
            Type::StaticArray(elem, _) => elem.is_dynamic(),
            Type::Tuple(children) => children.iter().any(Type::is_dynamic),
            _ => false,
        }
    }

    /// Encoded length of a static type.
    pub fn byte_len(&self) -> Result<usize, EncodingError> {
        let overflow = || EncodingError::SizeOverflow(self.to_string());
        match self {
            Type::Address => Ok(ADDRESS_BYTE_LEN),
            Type::Byte | Type::Bool => Ok(1),
            Type::Uint(bits) | Type::Ufixed { bits, .. } => Ok(*bits as usize / 8),
            Type::StaticArray(elem, len) => {
                let len = *len as usize;
                if **elem == Type::Bool {
                    Ok(len.div_ceil(8))
                } else {
                    len.checked_mul(elem.byte_len()?).ok_or_else(overflow)
                }
            }
            Type::Tuple(children) => {
                let mut size: usize = 0;
                let mut i = 0;
                while i < children.len() {
                    let (child_len, consumed) = if children[i] == Type::Bool {
                        let run = bool_run(&children[i..]);
                        (run.div_ceil(8), run)
                    } else {
                        (children[i].byte_len()?, 1)
                    };
                    size = size.checked_add(child_len).ok_or_else(overflow)?;
                    i += consumed;
                }
                Ok(size)
            }
            Type::String | Type::DynamicArray(_) => {
                Err(EncodingError::DynamicType(self.to_string()))
            }
        }
    }
}

/// Length of the run of consecutive `bool` types at the start of `types`.
fn bool_run(types: &[Type]) -> usize {
    types.iter().take_while(|t| **t == Type::Bool).count()
}

/// Parse a canonical decimal literal: digits only, no sign, no leading zero.
fn parse_decimal(s: &str) -> Result<u64, TypeError> {
    let canonical = !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'));
    if !canonical {
        return Err(TypeError::MalformedNumber(s.to_string()));
    }
    s.parse()
        .map_err(|_| TypeError::MalformedNumber(s.to_string()))
}

/// Split a comma-separated list on top-level commas only.
///
/// Returns an empty list for empty input and rejects empty elements and
/// unbalanced parentheses.
pub(crate) fn split_top_level(list: &str) -> Result<Vec<&str>, TypeError> {
    if list.is_empty() {
        return Ok(Vec::new());
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| TypeError::UnbalancedParentheses(list.to_string()))?;
            }
            ',' if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(TypeError::UnbalancedParentheses(list.to_string()));
    }
    parts.push(&list[start..]);
    if parts.iter().any(|p| p.is_empty()) {
        return Err(TypeError::EmptyElement(list.to_string()));
    }
    Ok(parts)
}

impl FromStr for Type {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_nested(s, 0)
    }
}

fn parse_nested(s: &str, depth: usize) -> Result<Type, TypeError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(TypeError::TooDeep(MAX_NESTING_DEPTH));
    }
    let unrecognized = || TypeError::Unrecognized(s.to_string());
    let child = |elem: &str| parse_nested(elem, depth + 1);

    if let Some(elem) = s.strip_suffix("[]") {
        if elem.is_empty() {
            return Err(unrecognized());
        }
        return Ok(Type::dynamic_array(child(elem)?));
    }
    if let Some(rest) = s.strip_suffix(']') {
        let open = rest.rfind('[').ok_or_else(unrecognized)?;
        let (elem, len) = (&rest[..open], &rest[open + 1..]);
        if elem.is_empty() {
            return Err(unrecognized());
        }
        return Type::static_array(child(elem)?, parse_decimal(len)?);
    }
    if s.starts_with('(') {
        let inner = s
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| TypeError::UnbalancedParentheses(s.to_string()))?;
        let children = split_top_level(inner)?
            .into_iter()
            .map(child)
            .collect::<Result<Vec<_>, _>>()?;
        return Type::tuple(children);
    }
    if let Some(bits) = s.strip_prefix("uint") {
        return Type::uint(parse_decimal(bits)?);
    }
    if let Some(rest) = s.strip_prefix("ufixed") {
        let (bits, precision) = rest.split_once('x').ok_or_else(unrecognized)?;
        return Type::ufixed(parse_decimal(bits)?, parse_decimal(precision)?);
    }
    match s {
        "byte" => Ok(Type::Byte),
        "bool" => Ok(Type::Bool),
        "address" => Ok(Type::Address),
        "string" => Ok(Type::String),
        _ => Err(unrecognized()),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Uint(bits) => write!(f, "uint{bits}"),
            Type::Ufixed { bits, precision } => write!(f, "ufixed{bits}x{precision}"),
            Type::Byte => f.write_str("byte"),
            Type::Bool => f.write_str("bool"),
            Type::Address => f.write_str("address"),
            Type::String => f.write_str("string"),
            Type::StaticArray(elem, len) => write!(f, "{elem}[{len}]"),
            Type::DynamicArray(elem) => write!(f, "{elem}[]"),
            Type::Tuple(children) => {
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl serde::Serialize for Type {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Type {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
