//! Method descriptions: signatures, selectors and argument kinds.

use super::{abi_type::split_top_level, error::TypeError, Type};
use crate::{hash::sha512_256, transaction::TransactionType};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Length of a method selector.
pub const SELECTOR_LENGTH: usize = 4;

const VOID: &str = "void";

/// A transaction the caller passes alongside a method call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionArg {
    /// Any transaction type.
    Any,
    Payment,
    KeyRegistration,
    AssetConfig,
    AssetTransfer,
    AssetFreeze,
    ApplicationCall,
}

impl TransactionArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionArg::Any => "txn",
            TransactionArg::Payment => "pay",
            TransactionArg::KeyRegistration => "keyreg",
            TransactionArg::AssetConfig => "acfg",
            TransactionArg::AssetTransfer => "axfer",
            TransactionArg::AssetFreeze => "afrz",
            TransactionArg::ApplicationCall => "appl",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "txn" => TransactionArg::Any,
            "pay" => TransactionArg::Payment,
            "keyreg" => TransactionArg::KeyRegistration,
            "acfg" => TransactionArg::AssetConfig,
            "axfer" => TransactionArg::AssetTransfer,
            "afrz" => TransactionArg::AssetFreeze,
            "appl" => TransactionArg::ApplicationCall,
            _ => return None,
        })
    }

    pub fn matches(&self, kind: TransactionType) -> bool {
        match self {
            TransactionArg::Any => true,
            TransactionArg::Payment => kind == TransactionType::Payment,
            TransactionArg::KeyRegistration => kind == TransactionType::KeyRegistration,
            TransactionArg::AssetConfig => kind == TransactionType::AssetConfig,
            TransactionArg::AssetTransfer => kind == TransactionType::AssetTransfer,
            TransactionArg::AssetFreeze => kind == TransactionType::AssetFreeze,
            TransactionArg::ApplicationCall => kind == TransactionType::ApplicationCall,
        }
    }
}

/// An account, application or asset passed by index into the call's foreign
/// arrays. Encoded as a `uint8`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceArg {
    Account,
    Application,
    Asset,
}

impl ReferenceArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceArg::Account => "account",
            ReferenceArg::Application => "application",
            ReferenceArg::Asset => "asset",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "account" => Some(ReferenceArg::Account),
            "application" => Some(ReferenceArg::Application),
            "asset" => Some(ReferenceArg::Asset),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Value(Type),
    Transaction(TransactionArg),
    Reference(ReferenceArg),
}

impl ArgKind {
    pub fn is_transaction(&self) -> bool {
        matches!(self, ArgKind::Transaction(_))
    }
}

impl FromStr for ArgKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(txn) = TransactionArg::parse(s) {
            return Ok(ArgKind::Transaction(txn));
        }
        if let Some(reference) = ReferenceArg::parse(s) {
            return Ok(ArgKind::Reference(reference));
        }
        Ok(ArgKind::Value(s.parse()?))
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Value(ty) => write!(f, "{ty}"),
            ArgKind::Transaction(txn) => f.write_str(txn.as_str()),
            ArgKind::Reference(reference) => f.write_str(reference.as_str()),
        }
    }
}

impl Serialize for ArgKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArgKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arg {
    #[serde(rename = "type")]
    pub kind: ArgKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl Arg {
    pub fn new(kind: ArgKind) -> Self {
        Self {
            kind,
            name: None,
            desc: None,
        }
    }
}

fn parse_return(s: &str) -> Result<Option<Type>, TypeError> {
    match s {
        VOID => Ok(None),
        other => other.parse().map(Some),
    }
}

fn deserialize_return<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Type>, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse_return(&s).map_err(serde::de::Error::custom)
}

fn serialize_return<S: serde::Serializer>(
    ty: &Option<Type>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match ty {
        Some(ty) => serializer.collect_str(ty),
        None => serializer.serialize_str(VOID),
    }
}

/// Return type of a method; `None` is `void`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Returns {
    #[serde(
        rename = "type",
        serialize_with = "serialize_return",
        deserialize_with = "deserialize_return"
    )]
    pub ty: Option<Type>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl Returns {
    pub fn is_void(&self) -> bool {
        self.ty.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub args: Vec<Arg>,
    /// Absent in JSON means `void`.
    #[serde(default, skip_serializing_if = "Returns::is_void")]
    pub returns: Returns,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl Method {
    pub fn new(name: impl Into<String>, args: Vec<ArgKind>, returns: Option<Type>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Arg::new).collect(),
            returns: Returns {
                ty: returns,
                desc: None,
            },
            desc: None,
        }
    }

    /// Parse `name(arg1,...,argN)ret`.
    pub fn from_signature(signature: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidSignature(signature.to_string());
        let open = signature.find('(').ok_or_else(invalid)?;
        let mut depth = 0usize;
        let mut close = None;
        for (i, c) in signature[open..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(open + i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| TypeError::UnbalancedParentheses(signature.to_string()))?;
        let name = &signature[..open];
        if name.is_empty() {
            return Err(invalid());
        }
        let args = split_top_level(&signature[open + 1..close])?
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<ArgKind>, _>>()?;
        let returns = parse_return(&signature[close + 1..])?;
        Ok(Self::new(name, args, returns))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn signature(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|arg| arg.kind.to_string()).collect();
        let returns = match &self.returns.ty {
            Some(ty) => ty.to_string(),
            None => VOID.to_string(),
        };
        format!("{}({}){}", self.name, args.join(","), returns)
    }

    /// First four bytes of `SHA-512/256(signature)`.
    pub fn selector(&self) -> [u8; SELECTOR_LENGTH] {
        let digest = sha512_256(self.signature().as_bytes());
        let mut selector = [0u8; SELECTOR_LENGTH];
        selector.copy_from_slice(&digest[..SELECTOR_LENGTH]);
        selector
    }

    /// Transactions needed to invoke this method: the call itself plus one
    /// per transaction argument.
    pub fn txn_calls(&self) -> usize {
        1 + self.args.iter().filter(|arg| arg.kind.is_transaction()).count()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}
