//! Secondary indexes over collection documents (spec §4.7).

pub mod btree;

pub use btree::{make_key, BTreeCursor, BTreeIndex, IndexDefinition};
