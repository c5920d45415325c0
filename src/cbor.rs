//! CBOR plumbing shared by the whole crate.
//!
//! Wraps [ciborium] encode/decode behind a small API with typed errors, and
//! adds the accessors the ISO 18013-5 structures need: label-based map
//! lookup, index-based array lookup, and embedded-CBOR byte strings (plain
//! or wrapped in tag 24, the "encoded CBOR data item" tag).

use std::fmt;
use std::io::Cursor;

use ciborium::Value;
use coset::{cbor, CoseError, EndOfFile};
use serde::de;
use thiserror::Error;

/// Tag number for an encoded CBOR data item (RFC 8949 §3.4.5.1).
pub const TAG_ENCODED_CBOR: u64 = 24;

#[derive(Debug, Error)]
pub enum CborError {
    /// CBOR decoding failure.
    #[error("CBOR decoding failure: {0}")]
    DecodeFailed(cbor::de::Error<EndOfFile>),
    /// Duplicate map key detected.
    #[error("duplicate map key")]
    DuplicateMapKey,
    /// CBOR encoding failure.
    #[error("CBOR encoding failure")]
    EncodeFailed,
    /// CBOR input had extra data.
    #[error("extraneous data")]
    ExtraneousData,
    /// Integer value on the wire is outside the range of integers representable in this crate.
    #[error("integer value out of range")]
    OutOfRangeIntegerValue,
    /// Unexpected CBOR item encountered (got, want).
    #[error("unexpected item: {0}, want {1}")]
    UnexpectedItem(&'static str, &'static str),
    /// Unrecognized value in IANA-controlled range (with no private range).
    #[error("unregistered IANA value")]
    UnregisteredIanaValue,
    /// Unrecognized value in neither IANA-controlled range nor private range.
    #[error("unregistered non-private IANA value")]
    UnregisteredIanaNonPrivateValue,
    /// Map lookup failed: no entry under the requested label.
    #[error("no field with label {0}")]
    FieldNotFound(Label),
    /// Array lookup failed: index past the end.
    #[error("index {0} outside of bounds of array of length {1}")]
    IndexOutOfBounds(usize, usize),
    /// Lookup attempted on an item that is neither a map nor an array.
    #[error("item is not a map or an array")]
    NotAMapOrAnArray,
    /// Expected a byte string.
    #[error("item is not a byte string")]
    NotAByteString,
    /// A byte string whose contents do not themselves decode as CBOR.
    #[error("byte string contents are not valid CBOR")]
    InvalidEmbeddedCbor,
}

impl From<CoseError> for CborError {
    fn from(e: CoseError) -> Self {
        match e {
            CoseError::DecodeFailed(e) => CborError::DecodeFailed(e),
            CoseError::DuplicateMapKey => CborError::DuplicateMapKey,
            CoseError::EncodeFailed => CborError::EncodeFailed,
            CoseError::ExtraneousData => CborError::ExtraneousData,
            CoseError::OutOfRangeIntegerValue => CborError::OutOfRangeIntegerValue,
            CoseError::UnexpectedItem(s, s2) => CborError::UnexpectedItem(s, s2),
            CoseError::UnregisteredIanaValue => CborError::UnregisteredIanaValue,
            CoseError::UnregisteredIanaNonPrivateValue => CborError::UnregisteredIanaNonPrivateValue,
        }
    }
}

/// A CBOR map key: ISO 18013-5 uses integer labels for engagement structures
/// and text labels for the request/response model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Int(i128),
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(i) => write!(f, "{i}"),
            Label::Text(t) => write!(f, "'{t}'"),
        }
    }
}

impl From<i128> for Label {
    fn from(i: i128) -> Label {
        Label::Int(i)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Label {
        Label::Text(s.to_string())
    }
}

impl Label {
    fn matches(&self, key: &Value) -> bool {
        match (self, key) {
            (Label::Int(i), Value::Integer(n)) => i128::from(*n) == *i,
            (Label::Text(t), Value::Text(s)) => t == s,
            _ => false,
        }
    }
}

pub fn to_vec<T>(value: &T) -> Result<Vec<u8>, CborError>
where
    T: serde::Serialize,
{
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(CoseError::from)
        .map_err(CborError::from)?;
    Ok(buf)
}

pub fn from_slice<T>(slice: &[u8]) -> Result<T, CborError>
where
    T: de::DeserializeOwned,
{
    ciborium::from_reader(Cursor::new(&slice))
        .map_err(|e| CoseError::DecodeFailed(ciborium::de::Error::Semantic(None, e.to_string())))
        .map_err(CborError::from)
}

/// Convert a `ciborium::Value` into a type `T`.
#[allow(clippy::needless_pass_by_value)]
pub fn from_value<T>(value: Value) -> Result<T, CborError>
where
    T: de::DeserializeOwned,
{
    let buf = to_vec(&value)?;
    from_slice(buf.as_slice())
}

pub fn into_value<S>(v: S) -> Result<Value, CborError>
where
    S: serde::Serialize,
{
    let bytes = to_vec(&v)?;
    from_slice(&bytes)
}

/// Borrows the contents of a byte-string item after checking that those
/// bytes themselves decode as a single CBOR item.
///
/// "Not a byte string" and "contents are not CBOR" are reported as distinct
/// errors so callers can tell a structural mismatch from corrupt payload.
pub fn valid_cbor_bytestring(value: &Value) -> Result<&[u8], CborError> {
    let bytes = value.as_bytes().ok_or(CborError::NotAByteString)?;
    let _: Value = from_slice(bytes).map_err(|_| CborError::InvalidEmbeddedCbor)?;
    Ok(bytes)
}

/// Re-encodes a value as a CBOR byte string over its own encoding.
///
/// Used wherever a nested structure is hashed or signed over its encoded
/// bytes rather than its logical value.
pub fn to_cbor_bytestring<T>(value: &T) -> Result<Value, CborError>
where
    T: serde::Serialize,
{
    Ok(Value::Bytes(to_vec(value)?))
}

/// As [to_cbor_bytestring], wrapped in tag 24.
pub fn to_tagged_cbor_bytestring<T>(value: &T) -> Result<Value, CborError>
where
    T: serde::Serialize,
{
    Ok(Value::Tag(
        TAG_ENCODED_CBOR,
        Box::new(Value::Bytes(to_vec(value)?)),
    ))
}

/// Looks up a map entry by label.
///
/// An absent label is [CborError::FieldNotFound]; a non-map item is
/// [CborError::NotAMapOrAnArray]. Callers rely on the distinction to treat
/// missing optional fields differently from malformed input.
pub fn get_by_label<'a, L: Into<Label>>(value: &'a Value, label: L) -> Result<&'a Value, CborError> {
    let map = value.as_map().ok_or(CborError::NotAMapOrAnArray)?;
    let label = label.into();
    map.iter()
        .find(|(k, _)| label.matches(k))
        .map(|(_, v)| v)
        .ok_or(CborError::FieldNotFound(label))
}

/// Looks up an array element by index, distinguishing out-of-bounds from a
/// non-array item.
pub fn get_by_index(value: &Value, index: usize) -> Result<&Value, CborError> {
    let array = value.as_array().ok_or(CborError::NotAMapOrAnArray)?;
    array
        .get(index)
        .ok_or(CborError::IndexOutOfBounds(index, array.len()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn int_map() -> Value {
        Value::Map(vec![
            (Value::Integer(0.into()), Value::Text("1.0".to_string())),
            (Value::Integer(10.into()), Value::Bytes(vec![1, 2, 3])),
        ])
    }

    #[test]
    fn label_lookup() {
        let map = int_map();
        assert_eq!(
            get_by_label(&map, 0).unwrap(),
            &Value::Text("1.0".to_string())
        );
        assert!(matches!(
            get_by_label(&map, 1),
            Err(CborError::FieldNotFound(Label::Int(1)))
        ));
        assert!(matches!(
            get_by_label(&Value::Integer(1.into()), 0),
            Err(CborError::NotAMapOrAnArray)
        ));
    }

    #[test]
    fn index_lookup() {
        let array = Value::Array(vec![Value::Bool(true), Value::Bool(false)]);
        assert_eq!(get_by_index(&array, 1).unwrap(), &Value::Bool(false));
        assert!(matches!(
            get_by_index(&array, 2),
            Err(CborError::IndexOutOfBounds(2, 2))
        ));
        assert!(matches!(
            get_by_index(&int_map(), 0),
            Err(CborError::NotAMapOrAnArray)
        ));
    }

    #[test]
    fn embedded_bytestring() {
        let inner = to_vec(&Value::Text("hello".to_string())).unwrap();
        let valid = Value::Bytes(inner);
        assert!(valid_cbor_bytestring(&valid).is_ok());

        // 0x5f alone is an unterminated indefinite-length byte string.
        let corrupt = Value::Bytes(vec![0x5f]);
        assert!(matches!(
            valid_cbor_bytestring(&corrupt),
            Err(CborError::InvalidEmbeddedCbor)
        ));
        assert!(matches!(
            valid_cbor_bytestring(&Value::Text("no".to_string())),
            Err(CborError::NotAByteString)
        ));
    }

    #[test]
    fn tagged_bytestring_roundtrip() {
        let original = Value::Array(vec![Value::Integer(1.into())]);
        let tagged = to_tagged_cbor_bytestring(&original).unwrap();
        let Value::Tag(tag, inner) = tagged else {
            panic!("expected a tagged item");
        };
        assert_eq!(tag, TAG_ENCODED_CBOR);
        let bytes = valid_cbor_bytestring(&inner).unwrap();
        let decoded: Value = from_slice(bytes).unwrap();
        assert_eq!(original, decoded);
    }
}
