//! The document value model and its wire codec (spec §3, §4.1).
//!
//! - [`Value`] - every type a document field can hold, with the type-ranked
//!   total order the B-tree index keys on.
//! - [`Document`] - ordered field/value pairs and their length-prefixed
//!   encoding, used both on disk and in the journal.
//! - [`ObjectId`] / [`Decimal128`] - the two value types with enough
//!   internal structure to warrant their own module.

mod decimal;
mod document;
mod object_id;
mod value;

pub use decimal::Decimal128;
pub use document::Document;
pub use object_id::ObjectId;
pub use value::Value;
