//! Id generation collaborators (spec §4.8, §9 "global mutable id
//! sequences").
//!
//! Each collection owns a counter, persisted in its [`crate::catalog::CollectionEntry`].
//! A generator reads and increments that counter; it never keeps its own
//! process-wide state (the one exception being [`ObjectIdGenerator`],
//! whose per-process nonce lives in [`crate::codec::ObjectId`] itself).

use crate::catalog::IdKind;
use crate::codec::{ObjectId, Value};

/// Produces a fresh `_id` value for a document that lacks one. Implementations
/// must be injectable (spec §4.8) so a collection can be declared with any
/// of the five id kinds.
pub trait IdGenerator: Send + Sync {
    /// The id kind this generator produces; must match the owning
    /// collection's declared `id_kind`.
    fn kind(&self) -> IdKind;

    /// Produce the next id. `counter` is the collection's persisted
    /// sequence value; implementations that need a sequence increment it
    /// in place, others (`ObjectId`, `Guid`) ignore it.
    fn generate(&self, counter: &mut i64) -> Value;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectIdGenerator;

impl IdGenerator for ObjectIdGenerator {
    fn kind(&self) -> IdKind {
        IdKind::ObjectId
    }

    fn generate(&self, _counter: &mut i64) -> Value {
        Value::ObjectId(ObjectId::new())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GuidGenerator;

impl IdGenerator for GuidGenerator {
    fn kind(&self) -> IdKind {
        IdKind::Guid
    }

    fn generate(&self, _counter: &mut i64) -> Value {
        let uuid = uuid::Uuid::new_v4();
        Value::Binary(4, uuid.as_bytes().to_vec())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Int32Generator;

impl IdGenerator for Int32Generator {
    fn kind(&self) -> IdKind {
        IdKind::Int32
    }

    fn generate(&self, counter: &mut i64) -> Value {
        *counter += 1;
        Value::Int32(*counter as i32)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Int64Generator;

impl IdGenerator for Int64Generator {
    fn kind(&self) -> IdKind {
        IdKind::Int64
    }

    fn generate(&self, counter: &mut i64) -> Value {
        *counter += 1;
        Value::Int64(*counter)
    }
}

/// Generates `"{prefix}{n}"` strings, e.g. `"doc-1"`, `"doc-2"`.
#[derive(Debug, Clone)]
pub struct StringGenerator {
    pub prefix: String,
}

impl IdGenerator for StringGenerator {
    fn kind(&self) -> IdKind {
        IdKind::String
    }

    fn generate(&self, counter: &mut i64) -> Value {
        *counter += 1;
        Value::String(format!("{}{}", self.prefix, counter))
    }
}

/// Construct the default generator for an id kind.
pub fn default_generator(kind: IdKind) -> Box<dyn IdGenerator> {
    match kind {
        IdKind::ObjectId => Box::new(ObjectIdGenerator),
        IdKind::Guid => Box::new(GuidGenerator),
        IdKind::Int32 => Box::new(Int32Generator),
        IdKind::Int64 => Box::new(Int64Generator),
        IdKind::String => Box::new(StringGenerator { prefix: String::new() }),
    }
}
