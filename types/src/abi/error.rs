use thiserror::Error;

/// Errors raised while parsing or constructing a [`super::Type`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Bit size is not a multiple of 8 in `8..=512`.
    #[error("unsupported bit size: {0}")]
    UnsupportedBitSize(u64),
    /// Fixed-point precision is outside `1..=160`.
    #[error("unsupported precision: {0}")]
    UnsupportedPrecision(u64),
    /// A numeric literal that is not canonical decimal.
    #[error("malformed number: {0:?}")]
    MalformedNumber(String),
    /// Static array length is zero or does not fit in 16 bits.
    #[error("invalid static array length: {0}")]
    InvalidArrayLength(u64),
    #[error("tuple has {0} elements, more than the 65535 allowed")]
    TupleTooLarge(usize),
    #[error("unbalanced parentheses in {0:?}")]
    UnbalancedParentheses(String),
    #[error("empty element in {0:?}")]
    EmptyElement(String),
    #[error("unrecognized type string: {0:?}")]
    Unrecognized(String),
    #[error("invalid method signature: {0:?}")]
    InvalidSignature(String),
    #[error("type nests deeper than {0} levels")]
    TooDeep(usize),
}

/// Errors raised while encoding or decoding a [`super::Value`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The value's shape does not fit the declared type.
    #[error("cannot encode {got} as {expected}")]
    ValueMismatch { expected: String, got: &'static str },
    /// Integer does not fit the declared bit width.
    #[error("value out of range for {0}")]
    OutOfRange(String),
    /// Array or tuple length differs from the declared one.
    #[error("expected {expected} elements, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("{0} has no static byte length")]
    DynamicType(String),
    /// A static type whose encoded length does not fit in `usize`.
    #[error("encoded length of {0} overflows")]
    SizeOverflow(String),
    /// A dynamic offset reached past the 16-bit limit.
    #[error("dynamic offset {0} does not fit in 16 bits")]
    OffsetOverflow(usize),
    /// A string or dynamic array longer than a 16-bit length prefix allows.
    #[error("length {0} does not fit in 16 bits")]
    LengthOverflow(usize),
    #[error("buffer too short: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("{0} unconsumed bytes after decoding")]
    TrailingBytes(usize),
    #[error("invalid offset {offset}: {reason}")]
    InvalidOffset { offset: usize, reason: &'static str },
    #[error("invalid bool byte: {0:#04x}")]
    InvalidBool(u8),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("invalid json value for {ty}: {reason}")]
    Json { ty: String, reason: String },
}

/// Errors raised while querying a contract description.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("no method named {0:?}")]
    MethodNotFound(String),
    #[error("{count} methods named {name:?}; use the full signature")]
    AmbiguousMethod { name: String, count: usize },
}
