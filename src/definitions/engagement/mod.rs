//! Engagement structures for the QR-initiated proximity flow.
//!
//! The reader publishes a [ReaderEngagement] as a QR code containing an
//! `mdoc://` uri; the holder answers over BLE with a [DeviceEngagement].
//! Both are tag-24 wrapped on the wire, and the exact engagement bytes feed
//! the session transcript, so decoding always preserves them.

use ciborium::Value;
use coset::{AsCborValue, CborSerializable, CoseError};
use uuid::Uuid;

use crate::cbor::{self, CborError};
use crate::definitions::cose_key::CoseKey;
use crate::definitions::helpers::{NonEmptyVec, Tag24};

mod error;
pub use error::Error;

/// Cipher suite 1: P-256 ECDH with HKDF-SHA-256 and AES-GCM.
pub const CIPHER_SUITE_IDENTIFIER: u64 = 1;

const ENGAGEMENT_VERSION: &str = "1.0";

/// A validated `mdoc://` engagement uri.
///
/// Holds the decoded CBOR payload bytes, unparsed, so the exact bytes the
/// reader published stay available for the session transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementUri {
    bytes: Vec<u8>,
}

impl EngagementUri {
    pub const SCHEME: &'static str = "mdoc://";

    pub fn from_string(uri: &str) -> Result<EngagementUri, Error> {
        let encoded = uri.strip_prefix(Self::SCHEME).ok_or(Error::InvalidScheme)?;
        let bytes = base64::decode_config(encoded, base64::URL_SAFE_NO_PAD)?;
        let _: Value = cbor::from_slice(&bytes).map_err(|_| Error::InvalidCbor)?;
        Ok(EngagementUri { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// The Security structure: cipher suite identifier and the sender's ephemeral
/// key as tagged EDeviceKeyBytes/EReaderKeyBytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Security(pub u64, pub Tag24<CoseKey>);

impl Security {
    pub fn key_bytes(&self) -> &Tag24<CoseKey> {
        &self.1
    }
}

impl TryFrom<&Value> for Security {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Security, Error> {
        let cipher_suite = cbor::get_by_index(value, 0)
            .ok()
            .and_then(Value::as_integer)
            .and_then(|i| u64::try_from(i128::from(i)).ok())
            .ok_or(Error::Malformed)?;
        if cipher_suite != CIPHER_SUITE_IDENTIFIER {
            return Err(Error::UnsupportedCipherSuite);
        }
        let key = cbor::get_by_index(value, 1).map_err(|_| Error::Malformed)?;
        let key = Tag24::try_from(key.clone()).map_err(|_| Error::Malformed)?;
        Ok(Security(cipher_suite, key))
    }
}

impl From<Security> for Value {
    fn from(security: Security) -> Value {
        Value::Array(vec![
            Value::Integer(security.0.into()),
            security.1.into(),
        ])
    }
}

/// A BLE service uuid carried as a 16-byte CBOR byte string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BleUuid(Uuid);

impl BleUuid {
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for BleUuid {
    fn from(uuid: Uuid) -> BleUuid {
        BleUuid(uuid)
    }
}

impl TryFrom<&Value> for BleUuid {
    type Error = Error;

    fn try_from(value: &Value) -> Result<BleUuid, Error> {
        let bytes: [u8; 16] = value
            .as_bytes()
            .and_then(|b| b.as_slice().try_into().ok())
            .ok_or(Error::Malformed)?;
        Ok(BleUuid(Uuid::from_bytes(bytes)))
    }
}

impl From<BleUuid> for Value {
    fn from(uuid: BleUuid) -> Value {
        Value::Bytes(uuid.0.as_bytes().to_vec())
    }
}

/// BleOptions from ISO 18013-5 table 12: supported modes under labels 0 and
/// 1, optional service uuids under labels 10 and 11.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleRetrievalOptions {
    pub peripheral_server_mode_supported: bool,
    pub central_client_mode_supported: bool,
    pub server2client_uuid: Option<BleUuid>,
    pub client2server_uuid: Option<BleUuid>,
}

impl TryFrom<&Value> for BleRetrievalOptions {
    type Error = Error;

    fn try_from(value: &Value) -> Result<BleRetrievalOptions, Error> {
        let mode = |label: i128| {
            cbor::get_by_label(value, label)
                .ok()
                .and_then(Value::as_bool)
                .ok_or(Error::Malformed)
        };
        let options = BleRetrievalOptions {
            peripheral_server_mode_supported: mode(0)?,
            central_client_mode_supported: mode(1)?,
            server2client_uuid: optional_uuid(value, 10)?,
            client2server_uuid: optional_uuid(value, 11)?,
        };
        if options.server2client_uuid.is_none() && options.client2server_uuid.is_none() {
            return Err(Error::NoServiceUuidFound);
        }
        Ok(options)
    }
}

fn optional_uuid(value: &Value, label: i128) -> Result<Option<BleUuid>, Error> {
    match cbor::get_by_label(value, label) {
        Ok(v) => BleUuid::try_from(v).map(Some),
        Err(CborError::FieldNotFound(_)) => Ok(None),
        Err(_) => Err(Error::Malformed),
    }
}

impl From<BleRetrievalOptions> for Value {
    fn from(options: BleRetrievalOptions) -> Value {
        let mut map = vec![
            (
                Value::Integer(0.into()),
                Value::Bool(options.peripheral_server_mode_supported),
            ),
            (
                Value::Integer(1.into()),
                Value::Bool(options.central_client_mode_supported),
            ),
        ];
        if let Some(uuid) = options.server2client_uuid {
            map.push((Value::Integer(10.into()), uuid.into()));
        }
        if let Some(uuid) = options.client2server_uuid {
            map.push((Value::Integer(11.into()), uuid.into()));
        }
        Value::Map(map)
    }
}

/// A DeviceRetrievalMethod. Only BLE (type 2, version 1) is actionable;
/// entries for other transports are skipped at the engagement level, and a
/// reader offering none this crate can act on is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRetrievalMethod {
    pub transport_type: u64,
    pub version: u64,
    pub ble_options: BleRetrievalOptions,
}

impl DeviceRetrievalMethod {
    pub const BLE: u64 = 2;
    pub const VERSION: u64 = 1;
}

impl TryFrom<&Value> for DeviceRetrievalMethod {
    type Error = Error;

    fn try_from(value: &Value) -> Result<DeviceRetrievalMethod, Error> {
        let uint = |index: usize| {
            cbor::get_by_index(value, index)
                .ok()
                .and_then(Value::as_integer)
                .and_then(|i| u64::try_from(i128::from(i)).ok())
                .ok_or(Error::Malformed)
        };
        // transport type first: a foreign transport's entry may be shaped
        // arbitrarily beyond index 0 and must still be skippable
        let transport_type = uint(0)?;
        if transport_type != Self::BLE {
            return Err(Error::UnsupportedRetrievalMethod);
        }
        let version = uint(1)?;
        if version != Self::VERSION {
            return Err(Error::UnsupportedRetrievalMethod);
        }
        let options = cbor::get_by_index(value, 2).map_err(|_| Error::Malformed)?;
        Ok(DeviceRetrievalMethod {
            transport_type,
            version,
            ble_options: BleRetrievalOptions::try_from(options)?,
        })
    }
}

impl From<DeviceRetrievalMethod> for Value {
    fn from(method: DeviceRetrievalMethod) -> Value {
        Value::Array(vec![
            Value::Integer(method.transport_type.into()),
            Value::Integer(method.version.into()),
            method.ble_options.into(),
        ])
    }
}

/// The engagement a reader publishes to start a session, scanned by the
/// holder as a QR code.
// TODO: OriginInfos (engagement version 1.1) for increased security.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderEngagement {
    pub version: String,
    pub security: Security,
    pub device_retrieval_methods: NonEmptyVec<DeviceRetrievalMethod>,
}

impl ReaderEngagement {
    /// Parses and validates the engagement carried by an `mdoc://` uri.
    ///
    /// The returned [Tag24] preserves the uri's payload bytes exactly: those
    /// bytes go into the session transcript, and a re-encoding of the parsed
    /// structure is not guaranteed to reproduce them.
    pub fn from_engagement_uri(uri: &EngagementUri) -> Result<Tag24<ReaderEngagement>, Error> {
        let value: Value = cbor::from_slice(uri.as_bytes()).map_err(|_| Error::InvalidCbor)?;
        let _ = ReaderEngagement::try_from(&value)?;
        Tag24::from_bytes(uri.as_bytes().to_vec()).map_err(|_| Error::Malformed)
    }

    /// The service uuid of the first BLE method the wallet can act on as a
    /// GATT client, i.e. one advertising central client mode together with a
    /// server-to-client uuid.
    pub fn service_uuid(&self) -> Result<Uuid, Error> {
        let method = self
            .device_retrieval_methods
            .iter()
            .find(|m| m.ble_options.central_client_mode_supported)
            .ok_or(Error::NoCentralClientMode)?;
        method
            .ble_options
            .server2client_uuid
            .map(|uuid| uuid.uuid())
            .ok_or(Error::MissingServerToClientUuid)
    }
}

impl TryFrom<&Value> for ReaderEngagement {
    type Error = Error;

    fn try_from(value: &Value) -> Result<ReaderEngagement, Error> {
        let version = cbor::get_by_label(value, 0)
            .ok()
            .and_then(Value::as_text)
            .ok_or(Error::Malformed)?;
        if version != ENGAGEMENT_VERSION {
            return Err(Error::UnsupportedVersion);
        }
        let security = cbor::get_by_label(value, 1).map_err(|_| Error::Malformed)?;
        let security = Security::try_from(security)?;
        let entries = cbor::get_by_label(value, 2)
            .ok()
            .and_then(Value::as_array)
            .ok_or(Error::Malformed)?;
        if entries.is_empty() {
            return Err(Error::Malformed);
        }
        let mut methods = Vec::with_capacity(entries.len());
        for entry in entries {
            match DeviceRetrievalMethod::try_from(entry) {
                Ok(method) => methods.push(method),
                Err(Error::UnsupportedRetrievalMethod) => {
                    tracing::warn!("skipping retrieval method for an unsupported transport");
                }
                Err(e) => return Err(e),
            }
        }
        let device_retrieval_methods =
            NonEmptyVec::try_from(methods).map_err(|_| Error::UnsupportedRetrievalMethod)?;
        Ok(ReaderEngagement {
            version: version.to_string(),
            security,
            device_retrieval_methods,
        })
    }
}

impl From<ReaderEngagement> for Value {
    fn from(engagement: ReaderEngagement) -> Value {
        Value::Map(vec![
            (Value::Integer(0.into()), Value::Text(engagement.version)),
            (Value::Integer(1.into()), engagement.security.into()),
            (
                Value::Integer(2.into()),
                Value::Array(
                    engagement
                        .device_retrieval_methods
                        .into_inner()
                        .into_iter()
                        .map(Value::from)
                        .collect(),
                ),
            ),
        ])
    }
}

impl CborSerializable for ReaderEngagement {}
impl AsCborValue for ReaderEngagement {
    fn from_cbor_value(value: Value) -> coset::Result<Self> {
        ReaderEngagement::try_from(&value).map_err(|e| {
            CoseError::DecodeFailed(ciborium::de::Error::Semantic(None, e.to_string()))
        })
    }

    fn to_cbor_value(self) -> coset::Result<Value> {
        Ok(self.into())
    }
}

/// The engagement the holder sends back over BLE: version and the holder's
/// ephemeral key. No retrieval methods, the transport is already established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEngagement {
    pub version: String,
    pub security: Security,
}

impl DeviceEngagement {
    pub fn new(e_device_key_bytes: Tag24<CoseKey>) -> DeviceEngagement {
        DeviceEngagement {
            version: ENGAGEMENT_VERSION.to_string(),
            security: Security(CIPHER_SUITE_IDENTIFIER, e_device_key_bytes),
        }
    }
}

impl TryFrom<&Value> for DeviceEngagement {
    type Error = Error;

    fn try_from(value: &Value) -> Result<DeviceEngagement, Error> {
        let version = cbor::get_by_label(value, 0)
            .ok()
            .and_then(Value::as_text)
            .ok_or(Error::Malformed)?;
        if version != ENGAGEMENT_VERSION {
            return Err(Error::UnsupportedVersion);
        }
        let security = cbor::get_by_label(value, 1).map_err(|_| Error::Malformed)?;
        let security = Security::try_from(security)?;
        Ok(DeviceEngagement {
            version: version.to_string(),
            security,
        })
    }
}

impl From<DeviceEngagement> for Value {
    fn from(engagement: DeviceEngagement) -> Value {
        Value::Map(vec![
            (Value::Integer(0.into()), Value::Text(engagement.version)),
            (Value::Integer(1.into()), engagement.security.into()),
        ])
    }
}

impl CborSerializable for DeviceEngagement {}
impl AsCborValue for DeviceEngagement {
    fn from_cbor_value(value: Value) -> coset::Result<Self> {
        DeviceEngagement::try_from(&value).map_err(|e| {
            CoseError::DecodeFailed(ciborium::de::Error::Semantic(None, e.to_string()))
        })
    }

    fn to_cbor_value(self) -> coset::Result<Value> {
        Ok(self.into())
    }
}

impl Tag24<DeviceEngagement> {
    /// The uri form of the device engagement. Note the scheme has no slashes
    /// here, matching the form readers expect on the answering side.
    pub fn to_qr_code_value(&self) -> String {
        let encoded = base64::encode_config(&self.inner_bytes, base64::URL_SAFE_NO_PAD);
        format!("mdoc:{encoded}")
    }
}
