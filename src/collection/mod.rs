//! Per-collection CRUD service (spec §4.8).

pub mod idgen;
mod service;

pub use idgen::{default_generator, IdGenerator};
pub use service::{CollectionService, InsertManyResult, UpsertOutcome};
