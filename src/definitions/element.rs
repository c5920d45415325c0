//! The mdoc value tree.
//!
//! Element values carried by an issuer-signed item form an arbitrary CBOR
//! tree. Decoding dispatches purely on the CBOR major type: arrays become
//! [Element::Array], maps become [Element::Map], everything else is a
//! stringified leaf. No schema is consulted and no depth limit is imposed;
//! callers handling untrusted, pathologically nested documents must bound
//! depth themselves.

use std::collections::BTreeMap;

use ciborium::Value;

use crate::cbor;
use crate::definitions::types::{self, ElementIdentifier};

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// A leaf: text, or any CBOR primitive in stringified form.
    Value(String),
    /// An ordered list of elements.
    Array(Vec<Element>),
    /// A mapping from element identifier to element; insertion order is not
    /// significant.
    Map(BTreeMap<ElementIdentifier, Element>),
}

impl Element {
    pub fn from_cbor(value: &Value) -> Result<Element, types::Error> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(Element::from_cbor)
                .collect::<Result<_, _>>()
                .map(Element::Array),
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| {
                    let key = ElementIdentifier::new(leaf(k))?;
                    Ok((key, Element::from_cbor(v)?))
                })
                .collect::<Result<_, _>>()
                .map(Element::Map),
            Value::Tag(_, inner) => Element::from_cbor(inner),
            other => Ok(Element::Value(leaf(other))),
        }
    }

    /// A generic JSON projection for display. Lossy: CBOR-specific types
    /// (byte strings, tags) survive only in stringified form, which is
    /// acceptable because display output is non-authoritative.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Element::Value(s) => serde_json::Value::String(s.clone()),
            Element::Array(items) => {
                serde_json::Value::Array(items.iter().map(Element::to_json).collect())
            }
            Element::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn leaf(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Integer(i) => i128::from(*i).to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bytes(b) => base64::encode(b),
        Value::Null => "null".to_string(),
        Value::Tag(_, inner) => leaf(inner),
        // composite map keys and any future kinds: the base64 of their CBOR
        // encoding, which is stable across releases
        other => cbor::to_vec(other).map(base64::encode).unwrap_or_default(),
    }
}
