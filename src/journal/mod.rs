//! Write-ahead journal - crash-atomic commits (spec §4.5).
//!
//! The sidecar journal records page before/after images and transaction
//! boundaries so that a crash between `begin` and a fully-flushed `commit`
//! leaves the main file either entirely pre-transaction or entirely
//! post-transaction on the next open (spec §8, "transactional atomicity").

mod manager;
mod record;

pub use manager::{plan_recovery, JournalManager, RecoveryPlan};
pub use record::{JournalRecord, RecordKind};
