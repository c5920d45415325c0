//! Support for embedded
//! [CBOR Data Items](https://www.ietf.org/rfc/rfc8949.html#name-encoded-cbor-data-item),
//! also known as a tagged data item with tag number 24.

use ciborium::Value;
use coset::{AsCborValue, CborSerializable, CoseError};

use crate::cbor::{self, CborError, TAG_ENCODED_CBOR};

/// A wrapper for a struct that is to be encoded as a CBOR tagged item, with tag number 24.
///
/// If this struct is created through deserializing CBOR, then the original byte representation is
/// preserved for future serializing. Digest verification depends on this: re-encoding a decoded
/// value is not guaranteed to reproduce the bytes the issuer hashed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag24<T> {
    inner: T,
    pub inner_bytes: Vec<u8>,
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Expected a CBOR byte string, received: '{0:?}'")]
    InvalidTag24(Box<Value>),
    #[error("Expected a CBOR tagged data item with tag number 24, received: '{0:?}'")]
    NotATag24(Value),
    #[error("Unable to encode value as CBOR: {0}")]
    UnableToEncode(CoseError),
    #[error("Unable to decode bytes to inner type: {0}")]
    UnableToDecode(CoseError),
}

impl<T> Tag24<T> {
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: CborSerializable> Tag24<T> {
    pub fn new(inner: T) -> Result<Tag24<T>> {
        let inner_bytes = inner.to_vec().map_err(Error::UnableToEncode)?;
        let inner = T::from_slice(&inner_bytes).map_err(Error::UnableToDecode)?;
        Ok(Self { inner, inner_bytes })
    }

    pub fn from_bytes(inner_bytes: Vec<u8>) -> coset::Result<Tag24<T>> {
        let inner = T::from_slice(&inner_bytes)?;
        Ok(Self { inner, inner_bytes })
    }
}

impl<T> Tag24<T> {
    /// The full tag-24 encoding, i.e. the bytes that go on the wire or into a
    /// hash when the surrounding structure embeds this item.
    pub fn to_tagged_vec(&self) -> Result<Vec<u8>, CborError> {
        cbor::to_vec(&Value::Tag(
            TAG_ENCODED_CBOR,
            Box::new(Value::Bytes(self.inner_bytes.clone())),
        ))
    }
}

impl<T: CborSerializable> TryFrom<Value> for Tag24<T> {
    type Error = Error;

    fn try_from(v: Value) -> Result<Tag24<T>> {
        match v {
            Value::Tag(TAG_ENCODED_CBOR, inner_value) => match inner_value.as_ref() {
                Value::Bytes(inner_bytes) => {
                    let inner = T::from_slice(inner_bytes).map_err(Error::UnableToDecode)?;
                    Ok(Tag24 {
                        inner,
                        inner_bytes: inner_bytes.to_vec(),
                    })
                }
                _ => Err(Error::InvalidTag24(inner_value)),
            },
            _ => Err(Error::NotATag24(v)),
        }
    }
}

impl<T> From<Tag24<T>> for Value {
    fn from(Tag24 { inner_bytes, .. }: Tag24<T>) -> Value {
        Value::Tag(TAG_ENCODED_CBOR, Box::new(Value::Bytes(inner_bytes)))
    }
}

impl<T> AsRef<T> for Tag24<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

impl<T: CborSerializable> CborSerializable for Tag24<T> {}
impl<T: CborSerializable> AsCborValue for Tag24<T> {
    fn from_cbor_value(value: Value) -> coset::Result<Self> {
        if let Value::Tag(TAG_ENCODED_CBOR, inner_value) = value {
            if let Value::Bytes(inner_bytes) = *inner_value {
                let inner: T = CborSerializable::from_slice(&inner_bytes)?;
                Ok(Tag24 {
                    inner,
                    inner_bytes,
                })
            } else {
                Err(CoseError::DecodeFailed(ciborium::de::Error::Semantic(
                    None,
                    "invalid inner bytes".to_string(),
                )))
            }
        } else {
            Err(CoseError::DecodeFailed(ciborium::de::Error::Semantic(
                None,
                "not tag 24".to_string(),
            )))
        }
    }

    fn to_cbor_value(self) -> coset::Result<Value> {
        Ok(Value::Tag(
            TAG_ENCODED_CBOR,
            Box::new(Value::Bytes(self.inner_bytes)),
        ))
    }
}

#[cfg(test)]
mod test {
    use coset::CborSerializable;

    use super::Tag24;
    use crate::definitions::ItemsRequest;

    #[test]
    // A Tag24 preserves the bytes it was decoded from, even if re-encoding the
    // inner value would produce a different map ordering.
    fn cbor_roundtrip() {
        const HEX: &str = "D8185868A267646F6354797065756F72672E69736F2E31383031332E352E312E6D444C6A6E616D65537061636573A1716F72672E69736F2E31383031332E352E31A36B66616D696C795F6E616D65F46A676976656E5F6E616D65F46F646F63756D656E745F6E756D626572F4";
        let bytes = hex::decode(HEX).unwrap();
        let parsed = Tag24::<ItemsRequest>::from_slice(&bytes).unwrap();
        let roundtripped = parsed.to_vec().unwrap();
        assert_eq!(bytes, roundtripped)
    }
}
