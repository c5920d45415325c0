//! An implementation of RFC-8152 [COSE_Key](https://datatracker.ietf.org/doc/html/rfc8152#section-13)
//! restricted to the P-256 EC2 keys used by cipher suite 1 of ISO/IEC 18013-5:2021.

use ciborium::Value;
use coset::{AsCborValue, CborSerializable};
use elliptic_curve::sec1::ToEncodedPoint;
use p256::EncodedPoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    EC2 { crv: EC2Curve, x: Vec<u8>, y: EC2Y },
}

/// The sign bit or value of the y-coordinate for the EC point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EC2Y {
    Value(Vec<u8>),
    SignBit(bool),
}

/// The RFC-8152 identifier of the curve, for EC2 key type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EC2Curve {
    P256,
}

/// Errors that can occur when deserialising a COSE_Key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("COSE_Key of kty 'EC2' missing y coordinate")]
    EC2MissingY,
    #[error("Expected to parse a CBOR map, received: '{0:?}'")]
    NotAMap(Value),
    #[error("This implementation of COSE_Key only supports the P-256 elliptic curve")]
    UnsupportedCurve,
    #[error("This implementation of COSE_Key only supports EC2 keys")]
    UnsupportedKeyType,
    #[error("Could not reconstruct coordinates from the provided COSE_Key")]
    InvalidCoseKey,
}

impl CborSerializable for CoseKey {}
impl AsCborValue for CoseKey {
    fn from_cbor_value(value: Value) -> coset::Result<Self> {
        value.try_into().map_err(|e: Error| {
            coset::CoseError::DecodeFailed(ciborium::de::Error::Semantic(None, e.to_string()))
        })
    }

    fn to_cbor_value(self) -> coset::Result<Value> {
        Ok(self.into())
    }
}

impl From<CoseKey> for Value {
    fn from(key: CoseKey) -> Value {
        let CoseKey::EC2 { crv: _, x, y } = key;
        Value::Map(vec![
            // kty: 1, EC2: 2
            (Value::Integer(1.into()), Value::Integer(2.into())),
            // crv: -1, P-256: 1
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            // x: -2
            (Value::Integer((-2).into()), Value::Bytes(x)),
            // y: -3
            (
                Value::Integer((-3).into()),
                match y {
                    EC2Y::Value(v) => Value::Bytes(v),
                    EC2Y::SignBit(b) => Value::Bool(b),
                },
            ),
        ])
    }
}

impl TryFrom<Value> for CoseKey {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Error> {
        let Value::Map(map) = v else {
            return Err(Error::NotAMap(v));
        };
        let mut kty = None;
        let mut crv = None;
        let mut x = None;
        let mut y = None;
        for (k, value) in map {
            let Value::Integer(label) = k else { continue };
            match i128::from(label) {
                1 => kty = Some(value),
                -1 => crv = Some(value),
                -2 => x = Some(value),
                -3 => y = Some(value),
                other => tracing::warn!(label = %other, "ignoring unrecognized COSE_Key label"),
            }
        }
        match kty {
            Some(Value::Integer(i)) if i128::from(i) == 2 => (),
            _ => return Err(Error::UnsupportedKeyType),
        }
        match crv {
            Some(Value::Integer(i)) if i128::from(i) == 1 => (),
            _ => return Err(Error::UnsupportedCurve),
        }
        let Some(Value::Bytes(x)) = x else {
            return Err(Error::InvalidCoseKey);
        };
        let y = match y {
            Some(Value::Bytes(bytes)) => EC2Y::Value(bytes),
            Some(Value::Bool(bit)) => EC2Y::SignBit(bit),
            Some(_) => return Err(Error::InvalidCoseKey),
            None => return Err(Error::EC2MissingY),
        };
        Ok(CoseKey::EC2 {
            crv: EC2Curve::P256,
            x,
            y,
        })
    }
}

impl TryFrom<CoseKey> for EncodedPoint {
    type Error = Error;

    fn try_from(value: CoseKey) -> Result<EncodedPoint, Error> {
        let CoseKey::EC2 { crv: _, x, y } = value;
        match y {
            EC2Y::Value(y) => {
                if x.len() != 32 || y.len() != 32 {
                    return Err(Error::InvalidCoseKey);
                }
                Ok(EncodedPoint::from_affine_coordinates(
                    x.as_slice().into(),
                    y.as_slice().into(),
                    false,
                ))
            }
            EC2Y::SignBit(sign) => {
                let mut bytes = x;
                bytes.insert(0, if sign { 3 } else { 2 });
                EncodedPoint::from_bytes(bytes).map_err(|_| Error::InvalidCoseKey)
            }
        }
    }
}

impl From<&p256::PublicKey> for CoseKey {
    fn from(key: &p256::PublicKey) -> CoseKey {
        let point = key.to_encoded_point(false);
        // An uncompressed SEC1 point always carries both coordinates.
        let x = point.x().map(|x| x.to_vec()).unwrap_or_default();
        let y = point.y().map(|y| y.to_vec()).unwrap_or_default();
        CoseKey::EC2 {
            crv: EC2Curve::P256,
            x,
            y: EC2Y::Value(y),
        }
    }
}
