//! Transaction manager: lifecycle, concurrency, and journaling of
//! transactions (spec §4.6).
//!
//! Deliberately decoupled from collection/index internals: rollback needs
//! to invert an operation log against live data, but this module has no
//! knowledge of collections or indexes. Callers supply an `invert` closure
//! at rollback time; the engine is what wires that closure to
//! `CollectionService`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::common::{Error, PageId, Result};
use crate::journal::{JournalManager, JournalRecord};

use super::transaction::{Operation, Transaction, TransactionState};

/// Owns every currently-active transaction and coordinates journaling of
/// their lifecycle events.
pub struct TransactionManager {
    active: RwLock<HashMap<Uuid, Mutex<Transaction>>>,
    max_transactions: usize,
    timeout_ms: u64,
    max_transaction_size: usize,
    journal: Option<Arc<JournalManager>>,
}

impl TransactionManager {
    pub fn new(
        max_transactions: usize,
        timeout_ms: u64,
        max_transaction_size: usize,
        journal: Option<Arc<JournalManager>>,
    ) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            max_transactions,
            timeout_ms,
            max_transaction_size,
            journal,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Begin a new transaction, returning its id.
    pub fn begin(&self, now: u64) -> Result<Uuid> {
        let mut active = self.active.write();
        if active.len() >= self.max_transactions {
            return Err(Error::TooManyTransactions(self.max_transactions));
        }
        let id = Uuid::new_v4();
        if let Some(journal) = &self.journal {
            journal.append(&JournalRecord::TxnBegin { txn_id: id, start_ts: now })?;
        }
        active.insert(id, Mutex::new(Transaction::new(id, now)));
        Ok(id)
    }

    fn with_transaction<R>(&self, id: Uuid, f: impl FnOnce(&mut Transaction) -> Result<R>) -> Result<R> {
        let active = self.active.read();
        let txn = active
            .get(&id)
            .ok_or_else(|| Error::not_found(format!("transaction {id}")))?;
        f(&mut txn.lock())
    }

    /// Append an operation to a transaction's log. Logs (but does not
    /// reject) operations past the soft `max_transaction_size` cap.
    pub fn append_operation(&self, id: Uuid, op: Operation) -> Result<()> {
        self.with_transaction(id, |txn| {
            if txn.op_count() >= self.max_transaction_size {
                warn!(
                    txn_id = %id,
                    op_count = txn.op_count(),
                    "transaction operation log exceeds soft cap"
                );
            }
            txn.append_operation(op)
        })
    }

    pub fn create_savepoint(&self, id: Uuid, name: impl Into<String>, now: u64) -> Result<u64> {
        let name = name.into();
        let (savepoint_id, op_index) = self.with_transaction(id, |txn| {
            let savepoint_id = txn.create_savepoint(name.clone(), now)?;
            Ok((savepoint_id, txn.op_count() as u64))
        })?;
        if let Some(journal) = &self.journal {
            journal.append(&JournalRecord::Savepoint {
                txn_id: id,
                savepoint_id,
                op_index,
            })?;
        }
        Ok(savepoint_id)
    }

    /// Log a page's before/after image as part of `id`'s write set (spec
    /// §4.5: "append PagePreimage/PagePostimage for each dirty page touched
    /// by the transaction"). No-op when journaling is disabled. On a clean
    /// commit the postimage lets a replay redo the write; if the process
    /// dies before `commit`, the preimage lets recovery undo it.
    pub fn log_page_write(&self, id: Uuid, page_id: PageId, before: &[u8], after: &[u8]) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.append(&JournalRecord::PagePreimage {
                txn_id: id,
                page_id,
                before_bytes: before.to_vec(),
            })?;
            journal.append(&JournalRecord::PagePostimage {
                txn_id: id,
                page_id,
                after_bytes: after.to_vec(),
            })?;
        }
        Ok(())
    }

    pub fn release_savepoint(&self, id: Uuid, savepoint_id: u64) -> Result<()> {
        self.with_transaction(id, |txn| txn.release_savepoint(savepoint_id))
    }

    /// Undo every operation recorded since `savepoint_id`, in reverse
    /// order, via the caller-supplied inversion closure.
    pub fn rollback_to_savepoint(
        &self,
        id: Uuid,
        savepoint_id: u64,
        mut invert: impl FnMut(&Operation) -> Result<()>,
    ) -> Result<()> {
        let removed = self.with_transaction(id, |txn| txn.rollback_to_savepoint(savepoint_id))?;
        for op in removed.iter().rev() {
            invert(op)?;
        }
        Ok(())
    }

    /// Commit a transaction: journal the commit record (durability per the
    /// caller's write concern is handled by the engine via `journal.sync`),
    /// transition to `Committed`, and drop it from the active set.
    pub fn commit(&self, id: Uuid, now: u64) -> Result<()> {
        self.with_transaction(id, |txn| {
            txn.require_active()?;
            txn.set_state(TransactionState::Committing);
            Ok(())
        })?;

        if let Some(journal) = &self.journal {
            journal.append(&JournalRecord::TxnCommit { txn_id: id, commit_ts: now })?;
        }

        self.with_transaction(id, |txn| {
            txn.set_state(TransactionState::Committed);
            Ok(())
        })?;
        self.active.write().remove(&id);
        Ok(())
    }

    /// Roll back a transaction: invert its entire operation log in reverse
    /// order, journal the abort, and drop it from the active set.
    pub fn rollback(&self, id: Uuid, mut invert: impl FnMut(&Operation) -> Result<()>) -> Result<()> {
        let operations = self.with_transaction(id, |txn| {
            txn.set_state(TransactionState::RollingBack);
            Ok(txn.take_operations())
        })?;

        for op in operations.iter().rev() {
            invert(op)?;
        }

        if let Some(journal) = &self.journal {
            journal.append(&JournalRecord::TxnAbort { txn_id: id })?;
        }

        self.with_transaction(id, |txn| {
            txn.set_state(TransactionState::RolledBack);
            Ok(())
        })?;
        self.active.write().remove(&id);
        Ok(())
    }

    /// Roll back a transaction only if it is still `Active`; otherwise a
    /// no-op. Used by the engine when a connection is dropped mid-use.
    pub fn dispose(&self, id: Uuid, invert: impl FnMut(&Operation) -> Result<()>) -> Result<()> {
        let is_active = match self.with_transaction(id, |txn| Ok(txn.state())) {
            Ok(state) => state == TransactionState::Active,
            Err(_) => return Ok(()),
        };
        if is_active {
            self.rollback(id, invert)?;
        }
        Ok(())
    }

    /// Mark transactions idle past `timeout_ms` as `Failed`, returning
    /// their ids so the caller can roll each back.
    pub fn sweep_timeouts(&self, now: u64) -> Vec<Uuid> {
        let active = self.active.read();
        let mut timed_out = Vec::new();
        for (id, txn) in active.iter() {
            let mut txn = txn.lock();
            if txn.state() == TransactionState::Active && now.saturating_sub(txn.start_time()) > self.timeout_ms {
                warn!(txn_id = %id, "transaction exceeded timeout, marking failed");
                txn.set_state(TransactionState::Failed);
                timed_out.push(*id);
            }
        }
        timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Document, Value};
    use tempfile::tempdir;

    fn doc(id: i32) -> Document {
        let mut d = Document::new();
        d.set("_id", id);
        d
    }

    #[test]
    fn test_begin_and_commit() {
        let tm = TransactionManager::new(4, 1000, 100, None);
        let id = tm.begin(0).unwrap();
        assert_eq!(tm.active_count(), 1);
        tm.commit(id, 1).unwrap();
        assert_eq!(tm.active_count(), 0);
    }

    #[test]
    fn test_too_many_transactions() {
        let tm = TransactionManager::new(1, 1000, 100, None);
        let _id = tm.begin(0).unwrap();
        assert!(matches!(tm.begin(0), Err(Error::TooManyTransactions(1))));
    }

    #[test]
    fn test_rollback_inverts_operations_in_reverse() {
        let tm = TransactionManager::new(4, 1000, 100, None);
        let id = tm.begin(0).unwrap();
        tm.append_operation(id, Operation::insert("c", Value::Int32(1), doc(1))).unwrap();
        tm.append_operation(id, Operation::insert("c", Value::Int32(2), doc(2))).unwrap();

        let mut seen = Vec::new();
        tm.rollback(id, |op| {
            seen.push(op.document_id.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![Some(Value::Int32(2)), Some(Value::Int32(1))]);
        assert_eq!(tm.active_count(), 0);
    }

    #[test]
    fn test_rollback_to_savepoint_inverts_only_tail() {
        let tm = TransactionManager::new(4, 1000, 100, None);
        let id = tm.begin(0).unwrap();
        tm.append_operation(id, Operation::insert("c", Value::Int32(1), doc(1))).unwrap();
        let sp = tm.create_savepoint(id, "sp", 0).unwrap();
        tm.append_operation(id, Operation::insert("c", Value::Int32(2), doc(2))).unwrap();

        let mut seen = Vec::new();
        tm.rollback_to_savepoint(id, sp, |op| {
            seen.push(op.document_id.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![Some(Value::Int32(2))]);
        assert_eq!(tm.active_count(), 1);
    }

    #[test]
    fn test_sweep_timeouts_marks_failed() {
        let tm = TransactionManager::new(4, 10, 100, None);
        let id = tm.begin(0).unwrap();
        let timed_out = tm.sweep_timeouts(100);
        assert_eq!(timed_out, vec![id]);
    }

    #[test]
    fn test_dispose_noop_on_committed() {
        let tm = TransactionManager::new(4, 1000, 100, None);
        let id = tm.begin(0).unwrap();
        tm.commit(id, 1).unwrap();
        assert!(tm.dispose(id, |_| Ok(())).is_ok());
    }

    #[test]
    fn test_savepoint_journal_record_carries_real_op_index() {
        let dir = tempdir().unwrap();
        let jm = Arc::new(JournalManager::create(dir.path().join("test.jnl")).unwrap());
        let tm = TransactionManager::new(4, 1000, 100, Some(jm.clone()));
        let id = tm.begin(0).unwrap();
        tm.append_operation(id, Operation::insert("c", Value::Int32(1), doc(1))).unwrap();
        tm.append_operation(id, Operation::insert("c", Value::Int32(2), doc(2))).unwrap();
        tm.create_savepoint(id, "sp", 0).unwrap();

        let records = jm.read_all().unwrap();
        let sp_record = records
            .iter()
            .find(|(r, _)| matches!(r, JournalRecord::Savepoint { .. }))
            .unwrap();
        assert!(matches!(&sp_record.0, JournalRecord::Savepoint { op_index: 2, .. }));
    }

    #[test]
    fn test_log_page_write_appends_preimage_and_postimage() {
        let dir = tempdir().unwrap();
        let jm = Arc::new(JournalManager::create(dir.path().join("test.jnl")).unwrap());
        let tm = TransactionManager::new(4, 1000, 100, Some(jm.clone()));
        let id = tm.begin(0).unwrap();

        tm.log_page_write(id, PageId::new(7), &[0, 0, 0, 0], &[1, 2, 3, 4]).unwrap();

        let records = jm.read_all().unwrap();
        // [0] TxnBegin, [1] PagePreimage, [2] PagePostimage
        assert_eq!(records.len(), 3);
        assert!(matches!(
            &records[1].0,
            JournalRecord::PagePreimage { page_id, before_bytes, .. }
                if *page_id == PageId::new(7) && before_bytes == &vec![0, 0, 0, 0]
        ));
        assert!(matches!(
            &records[2].0,
            JournalRecord::PagePostimage { page_id, after_bytes, .. }
                if *page_id == PageId::new(7) && after_bytes == &vec![1, 2, 3, 4]
        ));
    }

    #[test]
    fn test_commit_appends_checkpoint_when_journaled() {
        let dir = tempdir().unwrap();
        let jm = Arc::new(JournalManager::create(dir.path().join("test.jnl")).unwrap());
        let tm = TransactionManager::new(4, 1000, 100, Some(jm.clone()));
        let id = tm.begin(0).unwrap();
        tm.commit(id, 1).unwrap();

        // TransactionManager::commit itself never appends a Checkpoint -
        // that's the engine's job once the main file is actually flushed
        // (see `Database::commit`). Confirm the plain commit path is still
        // just TxnCommit.
        let records = jm.read_all().unwrap();
        assert!(matches!(records.last().unwrap().0, JournalRecord::TxnCommit { .. }));
    }
}
