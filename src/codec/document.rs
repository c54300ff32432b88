//! Document - an ordered sequence of (field name, value) pairs, and its
//! wire encoding (spec §4.1).
//!
//! Wire format: `total-length:i32 ‖ element* ‖ 0x00`. Each element is
//! `tag:u8 ‖ name (NUL-terminated UTF-8) ‖ typed payload`. `total-length`
//! counts itself and the trailing sentinel. Type tags match the BSON
//! convention the wider example pack uses, even though this codec does not
//! depend on the `bson` crate - see DESIGN.md.

use super::decimal::Decimal128;
use super::object_id::ObjectId;
use super::value::Value;
use crate::common::{Error, Result};

mod tag {
    pub const DOUBLE: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const DOCUMENT: u8 = 0x03;
    pub const ARRAY: u8 = 0x04;
    pub const BINARY: u8 = 0x05;
    pub const OBJECT_ID: u8 = 0x07;
    pub const BOOLEAN: u8 = 0x08;
    pub const DATETIME: u8 = 0x09;
    pub const NULL: u8 = 0x0A;
    pub const INT32: u8 = 0x10;
    pub const INT64: u8 = 0x12;
    pub const DECIMAL128: u8 = 0x13;
    pub const MAX_KEY: u8 = 0x7F;
    pub const MIN_KEY: u8 = 0xFF;
}

/// An ordered, field-name-unique sequence of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Set a field, replacing any existing value under the same name while
    /// preserving its original position (append if new).
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Encoded size in bytes, computed without encoding (spec §4.1: "size
    /// is computable without encoding; additive over elements").
    pub fn encoded_size(&self) -> usize {
        let mut size = 4 + 1; // total-length prefix + sentinel
        for (name, value) in &self.fields {
            size += 1; // tag
            size += name.len() + 1; // NUL-terminated name
            size += value_encoded_size(value);
        }
        size
    }

    /// Encode this document to its wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let total_len = self.encoded_size();
        let mut out = Vec::with_capacity(total_len);
        out.extend_from_slice(&(total_len as i32).to_le_bytes());
        for (name, value) in &self.fields {
            encode_element(&mut out, name, value)?;
        }
        out.push(0x00);
        debug_assert_eq!(out.len(), total_len);
        Ok(out)
    }

    /// Decode a document from its wire form. Fails with `Malformed` on any
    /// structural inconsistency (spec §4.1).
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(Error::malformed("document shorter than minimum frame"));
        }

        let total_len = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if total_len < 5 || total_len as usize > data.len() {
            return Err(Error::malformed(format!(
                "invalid document length prefix: {total_len}"
            )));
        }
        let total_len = total_len as usize;
        if data[total_len - 1] != 0x00 {
            return Err(Error::malformed("missing document sentinel byte"));
        }

        let mut pos = 4;
        let end = total_len - 1;
        let mut fields = Vec::new();
        while pos < end {
            let tag = data[pos];
            pos += 1;

            let name_start = pos;
            while pos < end && data[pos] != 0 {
                pos += 1;
            }
            if pos >= end {
                return Err(Error::malformed("unterminated element name"));
            }
            let name = std::str::from_utf8(&data[name_start..pos])
                .map_err(|_| Error::malformed("element name is not valid UTF-8"))?
                .to_string();
            pos += 1; // skip NUL

            let (value, consumed) = decode_value(tag, &data[pos..end])?;
            pos += consumed;
            fields.push((name, value));
        }

        if pos != end {
            return Err(Error::malformed("trailing bytes before sentinel"));
        }

        Ok(Self { fields })
    }
}

impl PartialOrd for Document {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.fields.partial_cmp(&other.fields)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn value_encoded_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::MinKey | Value::MaxKey => 0,
        Value::Boolean(_) => 1,
        Value::Int32(_) => 4,
        Value::Int64(_) | Value::DateTime(_) => 8,
        Value::Double(_) => 8,
        Value::Decimal128(_) => 16,
        Value::ObjectId(_) => 12,
        Value::String(s) => 4 + s.len() + 1,
        Value::Binary(_, bytes) => 4 + 1 + bytes.len(),
        Value::Array(items) => array_as_document_size(items),
        Value::Document(doc) => doc.encoded_size(),
    }
}

fn array_as_document_size(items: &[Value]) -> usize {
    let mut size = 4 + 1;
    for (i, item) in items.iter().enumerate() {
        let name = i.to_string();
        size += 1 + name.len() + 1 + value_encoded_size(item);
    }
    size
}

fn encode_element(out: &mut Vec<u8>, name: &str, value: &Value) -> Result<()> {
    out.push(tag_of(value));
    out.extend_from_slice(name.as_bytes());
    out.push(0x00);
    encode_value(out, value)
}

fn tag_of(value: &Value) -> u8 {
    match value {
        Value::Null => tag::NULL,
        Value::Boolean(_) => tag::BOOLEAN,
        Value::Int32(_) => tag::INT32,
        Value::Int64(_) => tag::INT64,
        Value::Double(_) => tag::DOUBLE,
        Value::Decimal128(_) => tag::DECIMAL128,
        Value::String(_) => tag::STRING,
        Value::DateTime(_) => tag::DATETIME,
        Value::ObjectId(_) => tag::OBJECT_ID,
        Value::Binary(_, _) => tag::BINARY,
        Value::Array(_) => tag::ARRAY,
        Value::Document(_) => tag::DOCUMENT,
        Value::MinKey => tag::MIN_KEY,
        Value::MaxKey => tag::MAX_KEY,
    }
}

fn encode_value(out: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Null | Value::MinKey | Value::MaxKey => {}
        Value::Boolean(b) => out.push(*b as u8),
        Value::Int32(n) => out.extend_from_slice(&n.to_le_bytes()),
        Value::Int64(n) => out.extend_from_slice(&n.to_le_bytes()),
        Value::DateTime(millis) => out.extend_from_slice(&millis.to_le_bytes()),
        Value::Double(d) => out.extend_from_slice(&d.to_le_bytes()),
        Value::Decimal128(d) => out.extend_from_slice(&d.to_bytes()),
        Value::ObjectId(id) => out.extend_from_slice(id.as_bytes()),
        Value::String(s) => {
            out.extend_from_slice(&((s.len() + 1) as i32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
            out.push(0x00);
        }
        Value::Binary(subtype, bytes) => {
            out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            out.push(*subtype);
            out.extend_from_slice(bytes);
        }
        Value::Array(items) => {
            let doc: Document = items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect();
            out.extend_from_slice(&doc.encode()?);
        }
        Value::Document(doc) => {
            out.extend_from_slice(&doc.encode()?);
        }
    }
    Ok(())
}

/// Returns the decoded value and the number of bytes consumed from `rest`.
fn decode_value(tag: u8, rest: &[u8]) -> Result<(Value, usize)> {
    let need = |n: usize| -> Result<()> {
        if rest.len() < n {
            Err(Error::malformed("truncated element payload"))
        } else {
            Ok(())
        }
    };

    match tag {
        tag::NULL => Ok((Value::Null, 0)),
        tag::MIN_KEY => Ok((Value::MinKey, 0)),
        tag::MAX_KEY => Ok((Value::MaxKey, 0)),
        tag::BOOLEAN => {
            need(1)?;
            Ok((Value::Boolean(rest[0] != 0), 1))
        }
        tag::INT32 => {
            need(4)?;
            let n = i32::from_le_bytes(rest[..4].try_into().unwrap());
            Ok((Value::Int32(n), 4))
        }
        tag::INT64 => {
            need(8)?;
            let n = i64::from_le_bytes(rest[..8].try_into().unwrap());
            Ok((Value::Int64(n), 8))
        }
        tag::DATETIME => {
            need(8)?;
            let n = i64::from_le_bytes(rest[..8].try_into().unwrap());
            Ok((Value::DateTime(n), 8))
        }
        tag::DOUBLE => {
            need(8)?;
            let n = f64::from_le_bytes(rest[..8].try_into().unwrap());
            Ok((Value::Double(n), 8))
        }
        tag::DECIMAL128 => {
            need(16)?;
            let bytes: [u8; 16] = rest[..16].try_into().unwrap();
            Ok((Value::Decimal128(Decimal128::from_bytes(&bytes)), 16))
        }
        tag::OBJECT_ID => {
            need(12)?;
            let bytes: [u8; 12] = rest[..12].try_into().unwrap();
            Ok((Value::ObjectId(ObjectId::from_bytes(bytes)), 12))
        }
        tag::STRING => {
            need(4)?;
            let len = i32::from_le_bytes(rest[..4].try_into().unwrap());
            if len < 1 {
                return Err(Error::malformed("negative or zero string length"));
            }
            let len = len as usize;
            need(4 + len)?;
            if rest[4 + len - 1] != 0x00 {
                return Err(Error::malformed("string missing NUL terminator"));
            }
            let s = std::str::from_utf8(&rest[4..4 + len - 1])
                .map_err(|_| Error::malformed("string is not valid UTF-8"))?
                .to_string();
            Ok((Value::String(s), 4 + len))
        }
        tag::BINARY => {
            need(5)?;
            let len = i32::from_le_bytes(rest[..4].try_into().unwrap());
            if len < 0 {
                return Err(Error::malformed("negative binary length"));
            }
            let len = len as usize;
            need(5 + len)?;
            let subtype = rest[4];
            let bytes = rest[5..5 + len].to_vec();
            Ok((Value::Binary(subtype, bytes), 5 + len))
        }
        tag::DOCUMENT => {
            need(4)?;
            let len = i32::from_le_bytes(rest[..4].try_into().unwrap());
            if len < 5 {
                return Err(Error::malformed("invalid nested document length"));
            }
            let len = len as usize;
            need(len)?;
            let doc = Document::decode(&rest[..len])?;
            Ok((Value::Document(doc), len))
        }
        tag::ARRAY => {
            need(4)?;
            let len = i32::from_le_bytes(rest[..4].try_into().unwrap());
            if len < 5 {
                return Err(Error::malformed("invalid array length"));
            }
            let len = len as usize;
            need(len)?;
            let doc = Document::decode(&rest[..len])?;
            let items = doc.fields.into_iter().map(|(_, v)| v).collect();
            Ok((Value::Array(items), len))
        }
        other => Err(Error::malformed(format!("unknown type tag {other:#04x}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.set("_id", Value::Int32(1));
        doc.set("name", "Alice");
        doc.set("active", true);
        doc.set("score", 12.5);
        doc.set(
            "tags",
            Value::Array(vec![Value::from("a"), Value::from("b")]),
        );
        let mut nested = Document::new();
        nested.set("city", "NYC");
        doc.set("address", Value::Document(nested));
        doc.set("nothing", Value::Null);
        doc
    }

    #[test]
    fn test_roundtrip() {
        let doc = sample();
        let encoded = doc.encode().unwrap();
        let decoded = Document::decode(&encoded).unwrap();
        assert_eq!(doc, decoded);
    }

    #[test]
    fn test_size_matches_encoded_length() {
        let doc = sample();
        let encoded = doc.encode().unwrap();
        assert_eq!(doc.encoded_size(), encoded.len());
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut doc = Document::new();
        doc.set("a", 1i32);
        doc.set("b", 2i32);
        doc.set("a", 99i32);
        assert_eq!(doc.get("a"), Some(&Value::Int32(99)));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_decode_bad_sentinel_is_malformed() {
        let mut encoded = sample().encode().unwrap();
        let last = encoded.len() - 1;
        encoded[last] = 0xFF;
        assert!(matches!(Document::decode(&encoded), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_decode_unknown_tag_is_malformed() {
        let mut doc = Document::new();
        doc.set("x", Value::Int32(1));
        let mut encoded = doc.encode().unwrap();
        encoded[4] = 0x99; // overwrite the tag byte of field "x"
        assert!(matches!(Document::decode(&encoded), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_decode_truncated_is_malformed() {
        let encoded = sample().encode().unwrap();
        let truncated = &encoded[..encoded.len() - 5];
        assert!(Document::decode(truncated).is_err());
    }

    #[test]
    fn test_empty_document_roundtrip() {
        let doc = Document::new();
        let encoded = doc.encode().unwrap();
        assert_eq!(encoded.len(), 5);
        assert_eq!(Document::decode(&encoded).unwrap(), doc);
    }
}
