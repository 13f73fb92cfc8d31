//! Canonical encoding of documents.
//!
//! Documents are encoded into a self-describing CBOR tree (`ciborium::value::Value`)
//! with named map fields, so untyped payloads round-trip without a schema.
//! Before the tree is written out, every map is put in canonical order:
//! entries sorted by the encoded bytes of their keys. Two documents with the
//! same content therefore always produce identical bytes, which is what
//! dirty tracking compares.

use ciborium::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CoreError, Result};

/// Encode a document into its canonical tree.
///
/// Fails with [`CoreError::NotAMap`] if the document does not encode to a map.
pub fn encode_document<T: Serialize + ?Sized>(doc: &T) -> Result<Value> {
    let value =
        Value::serialized(doc).map_err(|e| CoreError::Serialization(e.to_string()))?;
    if !value.is_map() {
        return Err(CoreError::NotAMap(kind_name(&value)));
    }
    canonicalize(value)
}

/// Decode a document from its tree.
pub fn decode_document<T: DeserializeOwned>(value: &Value) -> Result<T> {
    value
        .deserialized()
        .map_err(|e| CoreError::Deserialization(e.to_string()))
}

/// Write a tree to CBOR bytes.
pub fn to_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| CoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Read a tree from CBOR bytes.
pub fn from_bytes(bytes: &[u8]) -> Result<Value> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
}

/// Encode a document straight to canonical bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(doc: &T) -> Result<Vec<u8>> {
    to_bytes(&encode_document(doc)?)
}

/// Recursively sort every map in the tree by encoded key bytes.
pub fn canonicalize(value: Value) -> Result<Value> {
    match value {
        Value::Map(entries) => {
            let mut keyed = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let key_bytes = to_bytes(&k)?;
                keyed.push((key_bytes, canonicalize(k)?, canonicalize(v)?));
            }
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(Value::Map(keyed.into_iter().map(|(_, k, v)| (k, v)).collect()))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(canonicalize)
                .collect::<Result<Vec<_>>>()?,
        )),
        Value::Tag(tag, inner) => Ok(Value::Tag(tag, Box::new(canonicalize(*inner)?))),
        other => Ok(other),
    }
}

/// Short name of a tree node's kind, for error messages.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Integer(_) => "integer",
        Value::Bytes(_) => "bytes",
        Value::Float(_) => "float",
        Value::Text(_) => "text",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Tag(_, _) => "tag",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        _ => "unknown",
    }
}
