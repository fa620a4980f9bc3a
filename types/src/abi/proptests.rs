//! Property tests for the type grammar and the codec.
//!
//! Types are generated recursively (arrays and tuples of arbitrary depth up
//! to a small bound) and values are generated to fit each generated type, so
//! every case is a valid `(Type, Value)` pair.
