//! Contract ABI: the type grammar, the value codec and method descriptions.

mod abi_type;
mod abi_value;
mod codec;
mod contract;
mod error;
mod method;
mod proptests;

pub use abi_type::{
    Type, ADDRESS_BYTE_LEN, MAX_BIT_SIZE, MAX_NESTING_DEPTH, MAX_PRECISION, MAX_TUPLE_LEN,
    MIN_BIT_SIZE, MIN_PRECISION,
};
pub use abi_value::Value;
pub use codec::{decode, encode};
pub use contract::{Contract, Interface, NetworkInfo};
pub use error::{ContractError, EncodingError, TypeError};
pub use method::{
    Arg, ArgKind, Method, ReferenceArg, Returns, TransactionArg, SELECTOR_LENGTH,
};

/// Prefix of the log entry carrying a method's return value.
pub const RETURN_PREFIX: [u8; 4] = [0x15, 0x1f, 0x7c, 0x75];
