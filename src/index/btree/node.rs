//! B-tree node layout within an [`PageType::Index`] page's payload
//! (spec §4.7).
//!
//! A leaf node holds sorted `(key, locator)` pairs and chains to its right
//! sibling via the page header's `next_page_id` (and left via
//! `prev_page_id`), enabling ordered range scans without re-descending the
//! tree. An internal node holds `n` separator keys and `n + 1` child page
//! ids, `children[i]` holding keys `< keys[i]` and `children[i+1]` holding
//! keys `>= keys[i]`.
//!
//! Payload layout (after the generic 29-byte [`PageHeader`]):
//! ```text
//! is_leaf: u8 (0 or 1)
//! count:   u16  (number of keys)
//! -- leaf --
//! repeated `count` times: key_len:u32 ‖ key_bytes ‖ locator:u32
//! -- internal --
//! repeated `count` times: key_len:u32 ‖ key_bytes
//! repeated `count + 1` times: child_page_id:u32
//! ```

use crate::codec::Document;
use crate::common::{Error, PageId, Result};

const OFFSET_IS_LEAF: usize = 0;
const OFFSET_COUNT: usize = 1;
const OFFSET_ENTRIES: usize = 3;

/// A decoded B-tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum BTreeNode {
    Leaf { entries: Vec<(Document, PageId)> },
    Internal { keys: Vec<Document>, children: Vec<PageId> },
}

impl BTreeNode {
    pub fn new_leaf() -> Self {
        Self::Leaf { entries: Vec::new() }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Leaf { entries } => entries.len(),
            Self::Internal { keys, .. } => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded size this node would occupy, for capacity checks before a
    /// page is actually written.
    pub fn encoded_size(&self) -> usize {
        let mut total = OFFSET_ENTRIES;
        match self {
            Self::Leaf { entries } => {
                for (key, _) in entries {
                    total += 4 + key.encoded_size() + 4;
                }
            }
            Self::Internal { keys, children } => {
                for key in keys {
                    total += 4 + key.encoded_size();
                }
                total += 4 * children.len();
            }
        }
        total
    }

    pub fn write_to(&self, payload: &mut [u8]) -> Result<()> {
        let encoded = self.encode()?;
        if encoded.len() > payload.len() {
            return Err(Error::DocumentTooLarge {
                size: encoded.len(),
                capacity: payload.len(),
            });
        }
        payload[..encoded.len()].copy_from_slice(&encoded);
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_size());
        match self {
            Self::Leaf { entries } => {
                out.push(1);
                out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
                for (key, locator) in entries {
                    let key_bytes = key.encode()?;
                    out.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
                    out.extend_from_slice(&key_bytes);
                    out.extend_from_slice(&locator.0.to_le_bytes());
                }
            }
            Self::Internal { keys, children } => {
                out.push(0);
                out.extend_from_slice(&(keys.len() as u16).to_le_bytes());
                for key in keys {
                    let key_bytes = key.encode()?;
                    out.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
                    out.extend_from_slice(&key_bytes);
                }
                for child in children {
                    out.extend_from_slice(&child.0.to_le_bytes());
                }
            }
        }
        Ok(out)
    }

    pub fn read_from(payload: &[u8]) -> Result<Self> {
        if payload.len() < OFFSET_ENTRIES {
            return Err(Error::corrupt("index node payload shorter than header"));
        }
        let is_leaf = payload[OFFSET_IS_LEAF] != 0;
        let count = u16::from_le_bytes(payload[OFFSET_COUNT..OFFSET_COUNT + 2].try_into().unwrap()) as usize;

        let mut pos = OFFSET_ENTRIES;
        let read_key = |payload: &[u8], pos: &mut usize| -> Result<Document> {
            if *pos + 4 > payload.len() {
                return Err(Error::corrupt("truncated index key length"));
            }
            let key_len = u32::from_le_bytes(payload[*pos..*pos + 4].try_into().unwrap()) as usize;
            *pos += 4;
            if *pos + key_len > payload.len() {
                return Err(Error::corrupt("truncated index key bytes"));
            }
            let key = Document::decode(&payload[*pos..*pos + key_len])?;
            *pos += key_len;
            Ok(key)
        };

        if is_leaf {
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let key = read_key(payload, &mut pos)?;
                if pos + 4 > payload.len() {
                    return Err(Error::corrupt("truncated index locator"));
                }
                let locator = PageId::new(u32::from_le_bytes(payload[pos..pos + 4].try_into().unwrap()));
                pos += 4;
                entries.push((key, locator));
            }
            Ok(Self::Leaf { entries })
        } else {
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(read_key(payload, &mut pos)?);
            }
            let mut children = Vec::with_capacity(count + 1);
            for _ in 0..count + 1 {
                if pos + 4 > payload.len() {
                    return Err(Error::corrupt("truncated index child pointer"));
                }
                children.push(PageId::new(u32::from_le_bytes(payload[pos..pos + 4].try_into().unwrap())));
                pos += 4;
            }
            Ok(Self::Internal { keys, children })
        }
    }
}

/// Build a composite index key from field values, encoded as a `Document`
/// with positional field names so `Document`'s lexicographic `PartialOrd`
/// orders composite keys the same way `Value`'s ordering orders scalars
/// (spec §4.7: keys compare field-by-field, left to right).
pub fn make_key(values: &[crate::codec::Value]) -> Document {
    let mut doc = Document::new();
    for (i, v) in values.iter().enumerate() {
        doc.set(i.to_string(), v.clone());
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;

    #[test]
    fn test_leaf_roundtrip() {
        let node = BTreeNode::Leaf {
            entries: vec![
                (make_key(&[Value::Int32(1)]), PageId::new(10)),
                (make_key(&[Value::Int32(2)]), PageId::new(20)),
            ],
        };
        let mut buf = vec![0u8; 4096];
        node.write_to(&mut buf).unwrap();
        let decoded = BTreeNode::read_from(&buf).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_internal_roundtrip() {
        let node = BTreeNode::Internal {
            keys: vec![make_key(&[Value::Int32(5)])],
            children: vec![PageId::new(1), PageId::new(2)],
        };
        let mut buf = vec![0u8; 4096];
        node.write_to(&mut buf).unwrap();
        let decoded = BTreeNode::read_from(&buf).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_make_key_ordering_matches_value_ordering() {
        let a = make_key(&[Value::Int32(1), Value::String("b".into())]);
        let b = make_key(&[Value::Int32(1), Value::String("c".into())]);
        assert!(a < b);
    }

    #[test]
    fn test_too_large_node_is_document_too_large() {
        let node = BTreeNode::Leaf {
            entries: vec![(make_key(&[Value::String("x".repeat(1000))]), PageId::new(1))],
        };
        let mut buf = vec![0u8; 32];
        assert!(matches!(node.write_to(&mut buf), Err(Error::DocumentTooLarge { .. })));
    }
}
