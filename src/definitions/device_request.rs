//! The reader's query: which claims it wants, per document type and
//! namespace, and whether it intends to retain each one.
//!
//! Map ordering from the wire is preserved end to end. Items requests are
//! tag-24 wrapped, so their exact bytes survive a decode/encode cycle even if
//! a re-encoding would order keys differently.

use ciborium::Value;
use coset::{AsCborValue, CborSerializable, CoseError};

use crate::cbor::{self, CborError};
use crate::definitions::helpers::{tag24, NonEmptyVec, Tag24};
use crate::definitions::types::{self, DocType, ElementIdentifier, NameSpace};

pub type ItemsRequestBytes = Tag24<ItemsRequest>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported DeviceRequest version, only {} is accepted", DeviceRequest::VERSION)]
    UnsupportedVersion,
    #[error("device request is malformed")]
    Malformed,
    #[error(transparent)]
    Identifier(#[from] types::Error),
    #[error(transparent)]
    Tag24(#[from] tag24::Error),
    #[error(transparent)]
    Cbor(#[from] CborError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    pub version: String,
    pub doc_requests: NonEmptyVec<DocRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocRequest {
    pub items_request: ItemsRequestBytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemsRequest {
    pub doc_type: DocType,
    /// Namespace to requested elements, in wire order.
    pub namespaces: Vec<(NameSpace, Vec<DataElement>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataElement {
    pub element_identifier: ElementIdentifier,
    pub intent_to_retain: bool,
}

/// The reader's request, decrypted, kept together with the ciphertext it
/// came from so re-encryption round trips stay checkable.
#[derive(Debug, Clone)]
pub struct EncryptedDeviceRequest {
    pub request: DeviceRequest,
    pub encrypted_bytes: Vec<u8>,
}

impl DeviceRequest {
    pub const VERSION: &'static str = "1.0";

    pub fn from_cbor(bytes: &[u8]) -> Result<DeviceRequest, Error> {
        let value: Value = cbor::from_slice(bytes)?;
        Self::try_from(&value)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, CborError> {
        cbor::to_vec(&Value::from(self.clone()))
    }
}

impl TryFrom<&Value> for DeviceRequest {
    type Error = Error;

    fn try_from(value: &Value) -> Result<DeviceRequest, Error> {
        let version = cbor::get_by_label(value, "version")
            .ok()
            .and_then(Value::as_text)
            .ok_or(Error::Malformed)?;
        if version != Self::VERSION {
            return Err(Error::UnsupportedVersion);
        }
        let doc_requests = cbor::get_by_label(value, "docRequests")
            .ok()
            .and_then(Value::as_array)
            .ok_or(Error::Malformed)?
            .iter()
            .map(DocRequest::try_from)
            .collect::<Result<Vec<DocRequest>, Error>>()?;
        let doc_requests = NonEmptyVec::try_from(doc_requests).map_err(|_| Error::Malformed)?;
        Ok(DeviceRequest {
            version: version.to_string(),
            doc_requests,
        })
    }
}

impl From<DeviceRequest> for Value {
    fn from(request: DeviceRequest) -> Value {
        Value::Map(vec![
            (
                Value::Text("version".to_string()),
                Value::Text(request.version),
            ),
            (
                Value::Text("docRequests".to_string()),
                Value::Array(
                    request
                        .doc_requests
                        .into_inner()
                        .into_iter()
                        .map(Value::from)
                        .collect(),
                ),
            ),
        ])
    }
}

impl TryFrom<&Value> for DocRequest {
    type Error = Error;

    fn try_from(value: &Value) -> Result<DocRequest, Error> {
        let items_request = cbor::get_by_label(value, "itemsRequest")
            .map_err(|_| Error::Malformed)?
            .clone();
        let items_request = Tag24::try_from(items_request).map_err(|_| Error::Malformed)?;
        Ok(DocRequest { items_request })
    }
}

impl From<DocRequest> for Value {
    fn from(request: DocRequest) -> Value {
        Value::Map(vec![(
            Value::Text("itemsRequest".to_string()),
            request.items_request.into(),
        )])
    }
}

impl CborSerializable for ItemsRequest {}
impl AsCborValue for ItemsRequest {
    fn from_cbor_value(value: Value) -> coset::Result<Self> {
        let doc_type = cbor::get_by_label(&value, "docType")
            .ok()
            .and_then(Value::as_text)
            .and_then(|s| DocType::new(s).ok())
            .ok_or_else(|| decode_failed("missing or invalid docType"))?;
        let namespaces = cbor::get_by_label(&value, "nameSpaces")
            .ok()
            .and_then(Value::as_map)
            .ok_or_else(|| decode_failed("missing or invalid nameSpaces"))?
            .iter()
            .map(|(namespace, elements)| {
                let namespace = namespace
                    .as_text()
                    .and_then(|s| NameSpace::new(s).ok())
                    .ok_or_else(|| decode_failed("invalid namespace"))?;
                let elements = elements
                    .as_map()
                    .ok_or_else(|| decode_failed("invalid element map"))?
                    .iter()
                    .map(|(identifier, intent)| {
                        let element_identifier = identifier
                            .as_text()
                            .and_then(|s| ElementIdentifier::new(s).ok())
                            .ok_or_else(|| decode_failed("invalid element identifier"))?;
                        let intent_to_retain = intent
                            .as_bool()
                            .ok_or_else(|| decode_failed("intentToRetain is not a bool"))?;
                        Ok(DataElement {
                            element_identifier,
                            intent_to_retain,
                        })
                    })
                    .collect::<coset::Result<Vec<DataElement>>>()?;
                Ok((namespace, elements))
            })
            .collect::<coset::Result<Vec<(NameSpace, Vec<DataElement>)>>>()?;
        Ok(ItemsRequest {
            doc_type,
            namespaces,
        })
    }

    fn to_cbor_value(self) -> coset::Result<Value> {
        Ok(Value::Map(vec![
            (
                Value::Text("docType".to_string()),
                Value::Text(self.doc_type.to_string()),
            ),
            (
                Value::Text("nameSpaces".to_string()),
                Value::Map(
                    self.namespaces
                        .into_iter()
                        .map(|(namespace, elements)| {
                            (
                                Value::Text(namespace.to_string()),
                                Value::Map(
                                    elements
                                        .into_iter()
                                        .map(|element| {
                                            (
                                                Value::Text(
                                                    element.element_identifier.to_string(),
                                                ),
                                                Value::Bool(element.intent_to_retain),
                                            )
                                        })
                                        .collect(),
                                ),
                            )
                        })
                        .collect(),
                ),
            ),
        ]))
    }
}

fn decode_failed(message: &str) -> CoseError {
    CoseError::DecodeFailed(ciborium::de::Error::Semantic(None, message.to_string()))
}

/// A canned request for the EU PID doc type. A convenient literal fixture,
/// not part of the protocol contract.
pub fn create_pid_device_request() -> Result<DeviceRequest, Error> {
    const PID_DOC_TYPE: &str = "eu.europa.ec.eudi.pid.1";
    let elements = ["family_name", "given_name", "birth_date"]
        .into_iter()
        .map(|identifier| {
            Ok(DataElement {
                element_identifier: ElementIdentifier::new(identifier)?,
                intent_to_retain: false,
            })
        })
        .collect::<Result<Vec<DataElement>, types::Error>>()?;
    let items_request = ItemsRequest {
        doc_type: DocType::new(PID_DOC_TYPE)?,
        namespaces: vec![(NameSpace::new(PID_DOC_TYPE)?, elements)],
    };
    Ok(DeviceRequest {
        version: DeviceRequest::VERSION.to_string(),
        doc_requests: NonEmptyVec::new(DocRequest {
            items_request: Tag24::new(items_request)?,
        }),
    })
}
