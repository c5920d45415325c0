//! Issuer-signed namespaces and items.
//!
//! An [IssuerSignedItem] arrives as a tag-24 byte string. Those exact bytes
//! are the input to the MSO digest check, so they are kept verbatim alongside
//! the decoded fields; re-encoding is never used for digest purposes. The
//! digest verification itself lives with the signature-checking component,
//! not here.

use ciborium::Value;
use coset::{AsCborValue, CoseSign1};

use crate::cbor::{self, CborError, TAG_ENCODED_CBOR};
use crate::definitions::device_request::ItemsRequest;
use crate::definitions::element::Element;
use crate::definitions::helpers::validation::{lift, zip, zip4, Validated};
use crate::definitions::helpers::NonEmptyVec;
use crate::definitions::types::{DigestId, ElementIdentifier, NameSpace, Random};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("issuer signed item is not a tag 24 wrapped byte string of CBOR")]
    NotTag24,
    #[error("issuer signed item bytes do not decode to a CBOR map")]
    NotAMap,
    #[error("digestID is missing or malformed")]
    InvalidDigestId,
    #[error("random is missing or malformed")]
    InvalidRandom,
    #[error("elementIdentifier is missing or malformed")]
    InvalidElementIdentifier,
    #[error("elementValue is missing or malformed")]
    InvalidElementValue,
    #[error("nameSpaces is missing or malformed")]
    InvalidNameSpaces,
    #[error("issuerAuth is missing or malformed")]
    InvalidIssuerAuth,
}

/// One issuer-signed claim, with its wire bytes preserved.
///
/// Immutable once decoded; selective disclosure only ever reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuerSignedItem {
    bytes: Vec<u8>,
    pub digest_id: DigestId,
    pub random: Random,
    pub element_identifier: ElementIdentifier,
    pub element_value: Element,
}

impl IssuerSignedItem {
    /// Decodes one tag-24 item. The four field validations run independently
    /// and all failures are reported together.
    pub fn from_cbor(value: &Value) -> Validated<IssuerSignedItem, Error> {
        let Value::Tag(TAG_ENCODED_CBOR, inner) = value else {
            return Err(vec![Error::NotTag24]);
        };
        let bytes = cbor::valid_cbor_bytestring(inner).map_err(|_| vec![Error::NotTag24])?;
        let item: Value = cbor::from_slice(bytes).map_err(|_| vec![Error::NotTag24])?;
        if !item.is_map() {
            return Err(vec![Error::NotAMap]);
        }

        let digest_id = lift(
            cbor::get_by_label(&item, "digestID")
                .ok()
                .and_then(Value::as_integer)
                .ok_or(Error::InvalidDigestId)
                .and_then(|i| {
                    DigestId::try_from(i128::from(i)).map_err(|_| Error::InvalidDigestId)
                }),
        );
        let random = lift(
            cbor::get_by_label(&item, "random")
                .ok()
                .and_then(Value::as_bytes)
                .ok_or(Error::InvalidRandom)
                .and_then(|b| Random::new(b.clone()).map_err(|_| Error::InvalidRandom)),
        );
        let element_identifier = lift(
            cbor::get_by_label(&item, "elementIdentifier")
                .ok()
                .and_then(Value::as_text)
                .ok_or(Error::InvalidElementIdentifier)
                .and_then(|s| {
                    ElementIdentifier::new(s).map_err(|_| Error::InvalidElementIdentifier)
                }),
        );
        let element_value = lift(
            cbor::get_by_label(&item, "elementValue")
                .map_err(|_| Error::InvalidElementValue)
                .and_then(|v| Element::from_cbor(v).map_err(|_| Error::InvalidElementValue)),
        );

        let (digest_id, random, element_identifier, element_value) =
            zip4(digest_id, random, element_identifier, element_value)?;

        Ok(IssuerSignedItem {
            bytes: bytes.to_vec(),
            digest_id,
            random,
            element_identifier,
            element_value,
        })
    }

    /// The bytes the issuer hashed over, exactly as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_cbor(&self) -> Value {
        Value::Tag(TAG_ENCODED_CBOR, Box::new(Value::Bytes(self.bytes.clone())))
    }
}

/// Namespace to issuer-signed items, in issuer declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuerNameSpaces(Vec<(NameSpace, NonEmptyVec<IssuerSignedItem>)>);

impl IssuerNameSpaces {
    pub fn from_cbor(value: &Value) -> Validated<IssuerNameSpaces, Error> {
        let Some(map) = value.as_map() else {
            return Err(vec![Error::InvalidNameSpaces]);
        };
        let mut namespaces = Vec::with_capacity(map.len());
        let mut errors = Vec::new();
        for (key, items) in map {
            let namespace = key
                .as_text()
                .ok_or(Error::InvalidNameSpaces)
                .and_then(|s| NameSpace::new(s).map_err(|_| Error::InvalidNameSpaces));
            let namespace = match namespace {
                Ok(ns) => ns,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            let Some(entries) = items.as_array() else {
                errors.push(Error::InvalidNameSpaces);
                continue;
            };
            let mut decoded = Vec::with_capacity(entries.len());
            for entry in entries {
                match IssuerSignedItem::from_cbor(entry) {
                    Ok(item) => decoded.push(item),
                    Err(item_errors) => errors.extend(item_errors),
                }
            }
            match NonEmptyVec::try_from(decoded) {
                Ok(items) => namespaces.push((namespace, items)),
                Err(_) => errors.push(Error::InvalidNameSpaces),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        if namespaces.is_empty() {
            return Err(vec![Error::InvalidNameSpaces]);
        }
        Ok(IssuerNameSpaces(namespaces))
    }

    pub fn to_cbor(&self) -> Value {
        Value::Map(
            self.0
                .iter()
                .map(|(ns, items)| {
                    (
                        Value::Text(ns.to_string()),
                        Value::Array(items.iter().map(IssuerSignedItem::to_cbor).collect()),
                    )
                })
                .collect(),
        )
    }

    pub fn get(&self, namespace: &NameSpace) -> Option<&[IssuerSignedItem]> {
        self.0
            .iter()
            .find(|(ns, _)| ns == namespace)
            .map(|(_, items)| items.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NameSpace, &[IssuerSignedItem])> {
        self.0.iter().map(|(ns, items)| (ns, items.as_ref()))
    }
}

/// The issuer-signed part of an mdoc: namespaces plus the COSE-signed MSO,
/// which is round-tripped opaquely.
#[derive(Debug, Clone)]
pub struct IssuerSigned {
    pub namespaces: IssuerNameSpaces,
    pub issuer_auth: CoseSign1,
}

impl IssuerSigned {
    pub fn from_cbor(value: &Value) -> Validated<IssuerSigned, Error> {
        let namespaces = cbor::get_by_label(value, "nameSpaces")
            .map_err(|_| vec![Error::InvalidNameSpaces])
            .and_then(IssuerNameSpaces::from_cbor);
        let issuer_auth = lift(
            cbor::get_by_label(value, "issuerAuth")
                .map_err(|_| Error::InvalidIssuerAuth)
                .and_then(|v| {
                    CoseSign1::from_cbor_value(v.clone()).map_err(|_| Error::InvalidIssuerAuth)
                }),
        );
        let (namespaces, issuer_auth) = zip(namespaces, issuer_auth)?;
        Ok(IssuerSigned {
            namespaces,
            issuer_auth,
        })
    }

    pub fn to_cbor(&self) -> Result<Value, CborError> {
        let issuer_auth = self.issuer_auth.clone().to_cbor_value()?;
        Ok(Value::Map(vec![
            (
                Value::Text("nameSpaces".to_string()),
                self.namespaces.to_cbor(),
            ),
            (Value::Text("issuerAuth".to_string()), issuer_auth),
        ]))
    }

    /// Selective disclosure: picks the issuer-signed items matching the
    /// requested (namespace, element) pairs. Items keep their original bytes
    /// so the reader's digest check still passes. Returns [None] when nothing
    /// matches.
    pub fn select(&self, request: &ItemsRequest) -> Option<IssuerNameSpaces> {
        let mut selected = Vec::new();
        for (namespace, elements) in &request.namespaces {
            let Some(items) = self.namespaces.get(namespace) else {
                continue;
            };
            let matched: Vec<IssuerSignedItem> = elements
                .iter()
                .filter_map(|element| {
                    items
                        .iter()
                        .find(|item| item.element_identifier == element.element_identifier)
                        .cloned()
                })
                .collect();
            if let Ok(matched) = NonEmptyVec::try_from(matched) {
                selected.push((namespace.clone(), matched));
            }
        }
        if selected.is_empty() {
            None
        } else {
            Some(IssuerNameSpaces(selected))
        }
    }
}
