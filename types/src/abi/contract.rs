//! Interface and contract descriptions (ARC-4 JSON).

use super::{error::ContractError, method::Method};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn find_method<'a>(methods: &'a [Method], name: &str) -> Result<&'a Method, ContractError> {
    let mut matching = methods.iter().filter(|m| m.name == name);
    match (matching.next(), matching.count()) {
        (None, _) => Err(ContractError::MethodNotFound(name.to_string())),
        (Some(method), 0) => Ok(method),
        (Some(_), rest) => Err(ContractError::AmbiguousMethod {
            name: name.to_string(),
            count: rest + 1,
        }),
    }
}

/// A named group of methods, without deployment information.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    pub methods: Vec<Method>,
}

impl Interface {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The single method called `name`. Overloaded names must be resolved by
    /// signature instead.
    pub fn get_method_by_name(&self, name: &str) -> Result<&Method, ContractError> {
        find_method(&self.methods, name)
    }
}

/// Where a contract is deployed on one network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(rename = "appID")]
    pub app_id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Keyed by base64 genesis hash.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkInfo>,
    pub methods: Vec<Method>,
}

impl Contract {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn get_method_by_name(&self, name: &str) -> Result<&Method, ContractError> {
        find_method(&self.methods, name)
    }

    /// Application id on the network with the given base64 genesis hash.
    pub fn app_id(&self, genesis_hash: &str) -> Option<u64> {
        self.networks.get(genesis_hash).map(|n| n.app_id)
    }
}
