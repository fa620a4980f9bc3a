//! ABI head/tail encoding.
//!
//! Tuples are laid out as a head of fixed-size parts followed by a tail
//! holding the bytes of every dynamic child. Each dynamic child leaves a
//! 2-byte big-endian offset (from the start of the tuple) in the head, and
//! runs of adjacent `bool` children share a single head byte, up to 8 per
//! byte. Arrays are encoded as tuples of identical children, with a 2-byte
//! element count in front when the length is dynamic.

use super::{
    abi_type::{Type, ADDRESS_BYTE_LEN},
    abi_value::Value,
    error::EncodingError,
};
use crate::address::Address;
use num_bigint::BigUint;

/// Size of an offset or length prefix.
const LENGTH_PREFIX: usize = 2;

const BOOL_TRUE: u8 = 0x80;
const BOOL_FALSE: u8 = 0x00;

/// Maximum number of bools packed into one head byte.
const BOOLS_PER_BYTE: usize = 8;

fn mismatch(ty: &Type, value: &Value) -> EncodingError {
    EncodingError::ValueMismatch {
        expected: ty.to_string(),
        got: value.kind(),
    }
}

fn length_prefix(len: usize) -> Result<[u8; LENGTH_PREFIX], EncodingError> {
    u16::try_from(len)
        .map(u16::to_be_bytes)
        .map_err(|_| EncodingError::LengthOverflow(len))
}

fn read_u16(bytes: &[u8], at: usize) -> Result<usize, EncodingError> {
    match bytes.get(at..at + LENGTH_PREFIX) {
        Some(raw) => Ok(u16::from_be_bytes([raw[0], raw[1]]) as usize),
        None => Err(EncodingError::Truncated {
            needed: at + LENGTH_PREFIX,
            available: bytes.len(),
        }),
    }
}

fn expect_len(bytes: &[u8], expected: usize) -> Result<(), EncodingError> {
    match bytes.len().cmp(&expected) {
        std::cmp::Ordering::Less => Err(EncodingError::Truncated {
            needed: expected,
            available: bytes.len(),
        }),
        std::cmp::Ordering::Greater => Err(EncodingError::TrailingBytes(bytes.len() - expected)),
        std::cmp::Ordering::Equal => Ok(()),
    }
}

/// Length of the run of `bool` types at the start of `types`, capped at one byte.
fn packed_bool_run(types: &[&Type]) -> usize {
    types
        .iter()
        .take(BOOLS_PER_BYTE)
        .take_while(|t| ***t == Type::Bool)
        .count()
}

/// Encode `value` as `ty`.
pub fn encode(ty: &Type, value: &Value) -> Result<Vec<u8>, EncodingError> {
    match (ty, value) {
        (Type::Uint(bits) | Type::Ufixed { bits, .. }, Value::Uint(n)) => {
            encode_uint(ty, *bits, n)
        }
        (Type::Byte, Value::Byte(b)) => Ok(vec![*b]),
        (Type::Bool, Value::Bool(b)) => Ok(vec![if *b { BOOL_TRUE } else { BOOL_FALSE }]),
        (Type::Address, Value::Address(address)) => Ok(address.as_bytes().to_vec()),
        (Type::String, Value::String(s)) => {
            let mut out = length_prefix(s.len())?.to_vec();
            out.extend_from_slice(s.as_bytes());
            Ok(out)
        }
        (Type::StaticArray(elem, len), Value::Array(items)) => {
            if items.len() != *len as usize {
                return Err(EncodingError::LengthMismatch {
                    expected: *len as usize,
                    got: items.len(),
                });
            }
            encode_tuple(&vec![elem.as_ref(); items.len()], items)
        }
        (Type::DynamicArray(elem), Value::Array(items)) => {
            let mut out = length_prefix(items.len())?.to_vec();
            out.extend(encode_tuple(&vec![elem.as_ref(); items.len()], items)?);
            Ok(out)
        }
        (Type::Tuple(children), Value::Tuple(items)) => {
            if items.len() != children.len() {
                return Err(EncodingError::LengthMismatch {
                    expected: children.len(),
                    got: items.len(),
                });
            }
            encode_tuple(&children.iter().collect::<Vec<_>>(), items)
        }
        _ => Err(mismatch(ty, value)),
    }
}

fn encode_uint(ty: &Type, bits: u16, n: &BigUint) -> Result<Vec<u8>, EncodingError> {
    if n.bits() > bits as u64 {
        return Err(EncodingError::OutOfRange(ty.to_string()));
    }
    let width = bits as usize / 8;
    let raw = n.to_bytes_be();
    // `to_bytes_be` yields a single zero byte for zero.
    let raw = if raw.len() > width { &raw[raw.len() - width..] } else { &raw[..] };
    let mut out = vec![0u8; width - raw.len()];
    out.extend_from_slice(raw);
    Ok(out)
}

fn encode_tuple(types: &[&Type], values: &[Value]) -> Result<Vec<u8>, EncodingError> {
    let mut heads: Vec<Vec<u8>> = Vec::with_capacity(types.len());
    let mut tails: Vec<Vec<u8>> = Vec::new();
    // Head positions still holding an offset placeholder.
    let mut placeholders: Vec<usize> = Vec::new();

    let mut i = 0;
    while i < types.len() {
        let ty = types[i];
        if ty.is_dynamic() {
            placeholders.push(heads.len());
            heads.push(vec![0; LENGTH_PREFIX]);
            tails.push(encode(ty, &values[i])?);
            i += 1;
        } else if *ty == Type::Bool {
            let run = packed_bool_run(&types[i..]);
            let mut packed = 0u8;
            for (bit, value) in values[i..i + run].iter().enumerate() {
                match value {
                    Value::Bool(true) => packed |= BOOL_TRUE >> bit,
                    Value::Bool(false) => {}
                    other => return Err(mismatch(ty, other)),
                }
            }
            heads.push(vec![packed]);
            i += run;
        } else {
            heads.push(encode(ty, &values[i])?);
            i += 1;
        }
    }

    let head_len: usize = heads.iter().map(Vec::len).sum();
    let mut tail_len = 0;
    for (slot, tail) in placeholders.into_iter().zip(&tails) {
        let offset = head_len + tail_len;
        let encoded =
            u16::try_from(offset).map_err(|_| EncodingError::OffsetOverflow(offset))?;
        heads[slot] = encoded.to_be_bytes().to_vec();
        tail_len += tail.len();
    }

    let mut out = heads.concat();
    out.extend(tails.concat());
    Ok(out)
}

/// Decode `bytes` as `ty`. The whole buffer must be consumed.
///
/// Only the canonical layout [`encode`] produces is accepted: the first
/// dynamic offset must point just past the head and later offsets must
/// strictly increase. Layouts with padding between head and tail fail with
/// [`EncodingError::InvalidOffset`] even where other decoders read them.
pub fn decode(ty: &Type, bytes: &[u8]) -> Result<Value, EncodingError> {
    match ty {
        Type::Uint(bits) | Type::Ufixed { bits, .. } => {
            expect_len(bytes, *bits as usize / 8)?;
            Ok(Value::Uint(BigUint::from_bytes_be(bytes)))
        }
        Type::Byte => {
            expect_len(bytes, 1)?;
            Ok(Value::Byte(bytes[0]))
        }
        Type::Bool => {
            expect_len(bytes, 1)?;
            match bytes[0] {
                BOOL_TRUE => Ok(Value::Bool(true)),
                BOOL_FALSE => Ok(Value::Bool(false)),
                other => Err(EncodingError::InvalidBool(other)),
            }
        }
        Type::Address => {
            expect_len(bytes, ADDRESS_BYTE_LEN)?;
            let mut raw = [0u8; ADDRESS_BYTE_LEN];
            raw.copy_from_slice(bytes);
            Ok(Value::Address(Address::new(raw)))
        }
        Type::String => {
            let len = read_u16(bytes, 0)?;
            let body = &bytes[LENGTH_PREFIX..];
            expect_len(body, len)?;
            String::from_utf8(body.to_vec())
                .map(Value::String)
                .map_err(|_| EncodingError::InvalidUtf8)
        }
        Type::StaticArray(elem, len) => {
            decode_tuple(&vec![elem.as_ref(); *len as usize], bytes).map(Value::Array)
        }
        Type::DynamicArray(elem) => {
            let len = read_u16(bytes, 0)?;
            decode_tuple(&vec![elem.as_ref(); len], &bytes[LENGTH_PREFIX..]).map(Value::Array)
        }
        Type::Tuple(children) => {
            decode_tuple(&children.iter().collect::<Vec<_>>(), bytes).map(Value::Tuple)
        }
    }
}

fn decode_tuple(types: &[&Type], bytes: &[u8]) -> Result<Vec<Value>, EncodingError> {
    let mut values: Vec<Option<Value>> = vec![None; types.len()];
    // (child index, offset) for every dynamic child, in order.
    let mut dynamic: Vec<(usize, usize)> = Vec::new();
    let mut cursor = 0;

    let mut i = 0;
    while i < types.len() {
        let ty = types[i];
        if ty.is_dynamic() {
            dynamic.push((i, read_u16(bytes, cursor)?));
            cursor += LENGTH_PREFIX;
            i += 1;
        } else if *ty == Type::Bool {
            let run = packed_bool_run(&types[i..]);
            let packed = *bytes.get(cursor).ok_or(EncodingError::Truncated {
                needed: cursor + 1,
                available: bytes.len(),
            })?;
            // Only the top `run` bits are read; unused low bits are ignored,
            // unlike a standalone bool byte.
            for bit in 0..run {
                values[i + bit] = Some(Value::Bool(packed & (BOOL_TRUE >> bit) != 0));
            }
            cursor += 1;
            i += run;
        } else {
            let end = cursor + ty.byte_len()?;
            let chunk = bytes.get(cursor..end).ok_or(EncodingError::Truncated {
                needed: end,
                available: bytes.len(),
            })?;
            values[i] = Some(decode(ty, chunk)?);
            cursor = end;
            i += 1;
        }
    }

    match dynamic.first() {
        None if cursor != bytes.len() => {
            return Err(EncodingError::TrailingBytes(bytes.len() - cursor));
        }
        Some(&(_, first)) if first != cursor => {
            return Err(EncodingError::InvalidOffset {
                offset: first,
                reason: "first dynamic offset must follow the head",
            });
        }
        _ => {}
    }

    for (k, &(index, start)) in dynamic.iter().enumerate() {
        let end = match dynamic.get(k + 1) {
            Some(&(_, next)) if next <= start => {
                return Err(EncodingError::InvalidOffset {
                    offset: next,
                    reason: "offsets must be strictly increasing",
                });
            }
            Some(&(_, next)) => next,
            None => bytes.len(),
        };
        let chunk = bytes.get(start..end).ok_or(EncodingError::InvalidOffset {
            offset: start,
            reason: "offset past end of buffer",
        })?;
        values[index] = Some(decode(types[index], chunk)?);
    }

    Ok(values.into_iter().flatten().collect())
}

impl Type {
    /// Encode `value` as this type.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodingError> {
        encode(self, value)
    }

    /// Decode `bytes` as this type.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, EncodingError> {
        decode(self, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(s: &str) -> Type {
        s.parse().unwrap()
    }

    fn bools(values: &[bool]) -> Value {
        Value::Array(values.iter().copied().map(Value::Bool).collect())
    }

    fn roundtrip(t: &Type, value: &Value, expected: &str) {
        let encoded = encode(t, value).unwrap();
        assert_eq!(hex::encode(&encoded), expected, "encoding {t}");
        assert_eq!(&decode(t, &encoded).unwrap(), value, "decoding {t}");
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    #[test]
    fn test_uint_widths() {
        roundtrip(&ty("uint8"), &Value::from(0u64), "00");
        roundtrip(&ty("uint16"), &Value::from(3u64), "0003");
        roundtrip(&ty("uint64"), &Value::from(u64::MAX), "ffffffffffffffff");
        let max_512 = (BigUint::from(1u8) << 512usize) - BigUint::from(1u8);
        roundtrip(&ty("uint512"), &Value::Uint(max_512), &"ff".repeat(64));
    }

    #[test]
    fn test_uint_out_of_range() {
        assert_eq!(
            encode(&ty("uint8"), &Value::from(256u64)),
            Err(EncodingError::OutOfRange("uint8".to_string()))
        );
        let too_big = BigUint::from(1u8) << 512usize;
        assert!(encode(&ty("uint512"), &Value::Uint(too_big)).is_err());
    }

    #[test]
    fn test_ufixed_is_plain_numerator() {
        roundtrip(&ty("ufixed16x2"), &Value::from(12345u64), "3039");
    }

    #[test]
    fn test_bool_bytes() {
        roundtrip(&ty("bool"), &Value::Bool(true), "80");
        roundtrip(&ty("bool"), &Value::Bool(false), "00");
        assert_eq!(decode(&ty("bool"), &[0x01]), Err(EncodingError::InvalidBool(0x01)));
        assert!(decode(&ty("bool"), &[0x80, 0x00]).is_err());
    }

    #[test]
    fn test_strings() {
        roundtrip(&ty("string"), &Value::from(""), "0000");
        roundtrip(
            &ty("string"),
            &Value::from("What’s new"),
            "000c57686174e2809973206e6577",
        );
        roundtrip(&ty("string"), &Value::from("😅🔨"), "0008f09f9885f09f94a8");
    }

    #[test]
    fn test_string_length_must_match_buffer() {
        assert!(decode(&ty("string"), &[0x00, 0x02, b'a']).is_err());
        assert!(decode(&ty("string"), &[0x00, 0x01, b'a', b'b']).is_err());
        assert!(decode(&ty("string"), &[0x00]).is_err());
        assert_eq!(
            decode(&ty("string"), &[0x00, 0x01, 0xff]),
            Err(EncodingError::InvalidUtf8)
        );
    }

    #[test]
    fn test_address() {
        let address = Address::new([7u8; 32]);
        roundtrip(&ty("address"), &Value::Address(address), &"07".repeat(32));
    }

    #[test]
    fn test_value_mismatch() {
        assert_eq!(
            encode(&ty("uint8"), &Value::Bool(true)),
            Err(EncodingError::ValueMismatch {
                expected: "uint8".to_string(),
                got: "bool"
            })
        );
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    #[test]
    fn test_bool_arrays_pack_bits() {
        let values = [true, false, false, true, false, false, true, false, true];
        roundtrip(&ty("bool[9]"), &bools(&values), "9280");
        roundtrip(&ty("bool[]"), &bools(&values), "00099280");
        roundtrip(&ty("bool[]"), &bools(&[]), "0000");
    }

    #[test]
    fn test_static_array_length_checked() {
        assert_eq!(
            encode(&ty("uint8[2]"), &Value::Array(vec![Value::from(1u64)])),
            Err(EncodingError::LengthMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn test_dynamic_array_of_strings() {
        let value = Value::Array(vec![Value::from("a"), Value::from("bc")]);
        // count, two offsets, then the strings
        roundtrip(&ty("string[]"), &value, "00020004000700016100026263");
    }

    #[test]
    fn test_byte_array() {
        roundtrip(&ty("byte[]"), &Value::bytes(&[1, 2, 3]), "0003010203");
        roundtrip(&ty("byte[2]"), &Value::bytes(&[0xaa, 0xbb]), "aabb");
    }

    // ========================================================================
    // Tuples
    // ========================================================================

    #[test]
    fn test_empty_tuple() {
        roundtrip(&ty("()"), &Value::Tuple(vec![]), "");
    }

    #[test]
    fn test_tuple_golden_vectors() {
        roundtrip(
            &ty("(bool[3])"),
            &Value::Tuple(vec![bools(&[true, true, false])]),
            "c0",
        );
        roundtrip(
            &ty("(bool[])"),
            &Value::Tuple(vec![bools(&[true, true, false])]),
            "00020003c0",
        );
        roundtrip(
            &ty("(bool[2],bool[])"),
            &Value::Tuple(vec![bools(&[true, true]), bools(&[true, true])]),
            "c000030002c0",
        );
        roundtrip(
            &ty("(bool[],bool[])"),
            &Value::Tuple(vec![bools(&[]), bools(&[])]),
            "0004000600000000",
        );
    }

    #[test]
    fn test_mixed_string_bool_tuple() {
        let value = Value::Tuple(vec![
            Value::from("AB"),
            Value::Bool(true),
            Value::Bool(false),
            Value::Bool(true),
            Value::Bool(false),
            Value::from("DE"),
        ]);
        roundtrip(
            &ty("(string,bool,bool,bool,bool,string)"),
            &value,
            "0005a000090002414200024445",
        );
    }

    #[test]
    fn test_long_bool_runs_span_bytes() {
        let mut children = vec![Value::Bool(true); 10];
        children.push(Value::from(1u64));
        let t = ty("(bool,bool,bool,bool,bool,bool,bool,bool,bool,bool,uint8)");
        roundtrip(&t, &Value::Tuple(children), "ffc001");
    }

    #[test]
    fn test_offset_overflow() {
        let big = "x".repeat(u16::MAX as usize - 2);
        let value = Value::Tuple(vec![Value::from(big.as_str()), Value::from("y")]);
        assert!(matches!(
            encode(&ty("(string,string)"), &value),
            Err(EncodingError::OffsetOverflow(_))
        ));
    }

    #[test]
    fn test_string_length_overflow() {
        let big = "x".repeat(u16::MAX as usize + 1);
        assert_eq!(
            encode(&ty("string"), &Value::from(big.as_str())),
            Err(EncodingError::LengthOverflow(u16::MAX as usize + 1))
        );
    }

    #[test]
    fn test_decode_rejects_bad_offsets() {
        let t = ty("(string,string)");
        // first offset does not point at the end of the head
        assert!(matches!(
            decode(&t, &hex::decode("0005000600000000").unwrap()),
            Err(EncodingError::InvalidOffset { .. })
        ));
        // offsets out of order
        assert!(matches!(
            decode(&t, &hex::decode("0004000400000000").unwrap()),
            Err(EncodingError::InvalidOffset { .. })
        ));
        // second offset past the buffer
        assert!(decode(&t, &hex::decode("000400ff00000000").unwrap()).is_err());
    }

    #[test]
    fn test_packed_bools_ignore_unused_bits() {
        assert_eq!(
            decode(&ty("(bool)"), &[0x01]),
            Ok(Value::Tuple(vec![Value::Bool(false)]))
        );
        assert_eq!(
            decode(&ty("(bool,bool,uint8)"), &[0xbf, 0x07]),
            Ok(Value::Tuple(vec![
                Value::Bool(true),
                Value::Bool(false),
                Value::from(7u64),
            ]))
        );
        assert_eq!(decode(&ty("bool[3]"), &[0xe1]), Ok(bools(&[true, true, true])));
        assert_eq!(decode(&ty("bool"), &[0x01]), Err(EncodingError::InvalidBool(0x01)));
    }

    #[test]
    fn test_decode_rejects_trailing_and_truncated() {
        assert_eq!(
            decode(&ty("(uint8,bool)"), &[0x01, 0x80, 0x00]),
            Err(EncodingError::TrailingBytes(1))
        );
        assert!(matches!(
            decode(&ty("(uint16,bool)"), &[0x01]),
            Err(EncodingError::Truncated { .. })
        ));
        assert!(matches!(
            decode(&ty("(bool,string)"), &[0x80, 0x00]),
            Err(EncodingError::Truncated { .. })
        ));
    }
}
