//! Journal manager - the sidecar write-ahead log file (spec §4.5).
//!
//! Appends are serialized behind a single mutex, matching the teacher's
//! `DiskManager` in spirit (single-writer file, caller serializes access)
//! but journaled appends are inherently single-stream so the lock lives
//! here rather than one level up.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::common::{Error, PageId, Result};

use super::record::JournalRecord;

/// Pages to redo (apply the after-image) or undo (restore the before-image)
/// during recovery, computed purely from the decoded record stream. The
/// caller (the engine) applies these against the buffer pool - this module
/// has no dependency on storage internals.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecoveryPlan {
    pub redo: Vec<(PageId, Vec<u8>)>,
    pub undo: Vec<(PageId, Vec<u8>)>,
}

struct TxnState {
    committed: bool,
    commit_lsn: u64,
    preimages: Vec<(PageId, Vec<u8>)>,
    postimages: Vec<(PageId, Vec<u8>)>,
}

impl Default for TxnState {
    fn default() -> Self {
        Self {
            committed: false,
            commit_lsn: 0,
            preimages: Vec::new(),
            postimages: Vec::new(),
        }
    }
}

/// Compute the recovery plan from a decoded record stream (spec §4.5):
/// redo committed transactions whose effects are not yet covered by a
/// checkpoint; undo transactions that began but never committed or
/// aborted (i.e. the process died mid-transaction).
pub fn plan_recovery(records: &[(JournalRecord, u64)]) -> RecoveryPlan {
    let mut txns: HashMap<Uuid, TxnState> = HashMap::new();
    let mut last_checkpoint_lsn: u64 = 0;

    for (record, lsn) in records {
        match record {
            JournalRecord::TxnBegin { txn_id, .. } => {
                txns.entry(*txn_id).or_default();
            }
            JournalRecord::PagePreimage { txn_id, page_id, before_bytes } => {
                txns.entry(*txn_id).or_default().preimages.push((*page_id, before_bytes.clone()));
            }
            JournalRecord::PagePostimage { txn_id, page_id, after_bytes } => {
                txns.entry(*txn_id).or_default().postimages.push((*page_id, after_bytes.clone()));
            }
            JournalRecord::TxnCommit { txn_id, .. } => {
                let entry = txns.entry(*txn_id).or_default();
                entry.committed = true;
                entry.commit_lsn = *lsn;
            }
            JournalRecord::TxnAbort { txn_id } => {
                // Already unwound live by the transaction manager; nothing
                // left to redo or undo for it.
                txns.remove(txn_id);
            }
            JournalRecord::Checkpoint { applied_lsn } => {
                last_checkpoint_lsn = last_checkpoint_lsn.max(*applied_lsn);
            }
            JournalRecord::Savepoint { .. } => {}
        }
    }

    let mut plan = RecoveryPlan::default();
    for state in txns.into_values() {
        if state.committed {
            if state.commit_lsn > last_checkpoint_lsn {
                plan.redo.extend(state.postimages);
            }
        } else {
            let mut preimages = state.preimages;
            preimages.reverse();
            plan.undo.extend(preimages);
        }
    }
    plan
}

/// The sidecar journal file.
pub struct JournalManager {
    file: Mutex<File>,
    path: PathBuf,
    next_lsn: AtomicU64,
}

impl JournalManager {
    /// Create a fresh, empty journal file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.as_ref().to_path_buf(),
            next_lsn: AtomicU64::new(1),
        })
    }

    /// Open an existing journal file, scanning it to resume LSN assignment
    /// after the highest LSN found.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let records = read_all_records(&mut file)?;
        let max_lsn = records.iter().map(|(_, lsn)| *lsn).max().unwrap_or(0);
        Ok(Self {
            file: Mutex::new(file),
            path: path.as_ref().to_path_buf(),
            next_lsn: AtomicU64::new(max_lsn + 1),
        })
    }

    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The most recently assigned LSN (0 if nothing has been appended yet).
    /// Used to stamp a [`JournalRecord::Checkpoint`] with the watermark up
    /// to which the main file is known durable.
    pub fn last_lsn(&self) -> u64 {
        self.next_lsn.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Append a record, assigning it the next LSN. Returns the assigned LSN.
    /// Does not fsync; call [`JournalManager::sync`] per the configured
    /// durability level (spec §4.5).
    pub fn append(&self, record: &JournalRecord) -> Result<u64> {
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        let encoded = record.encode(lsn);
        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(&encoded)?;
        Ok(lsn)
    }

    /// Force the journal's contents to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    /// Decode every record currently in the journal, in file order.
    pub fn read_all(&self) -> Result<Vec<(JournalRecord, u64)>> {
        let mut file = self.file.lock();
        read_all_records(&mut file)
    }

    /// Discard the journal's contents. Called once recovery has applied
    /// everything through the last checkpoint (spec §4.5: "truncate
    /// journal to the last checkpoint once recovery completes" - Sundial's
    /// checkpoints always cover the entire journal written so far, so a
    /// full truncation is equivalent).
    pub fn truncate(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        Ok(())
    }
}

fn read_all_records(file: &mut File) -> Result<Vec<(JournalRecord, u64)>> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let mut records = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        if buf.len() - pos < 29 {
            // Trailing torn write from an unfsynced append; stop here
            // rather than treat it as corruption (spec §4.5 recovery is
            // forward-scanning and tolerant of a partial final record).
            break;
        }
        match JournalRecord::decode(&buf[pos..]) {
            Ok((record, lsn, consumed)) => {
                records.push((record, lsn));
                pos += consumed;
            }
            Err(Error::Corrupt(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_read_all() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.jnl");
        let jm = JournalManager::create(&path).unwrap();

        let txn_id = Uuid::new_v4();
        let lsn1 = jm.append(&JournalRecord::TxnBegin { txn_id, start_ts: 1 }).unwrap();
        let lsn2 = jm.append(&JournalRecord::TxnCommit { txn_id, commit_ts: 2 }).unwrap();
        assert_eq!(lsn2, lsn1 + 1);

        let records = jm.read_all().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_reopen_resumes_lsn() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.jnl");
        let txn_id = Uuid::new_v4();

        {
            let jm = JournalManager::create(&path).unwrap();
            jm.append(&JournalRecord::TxnBegin { txn_id, start_ts: 1 }).unwrap();
        }
        {
            let jm = JournalManager::open(&path).unwrap();
            let lsn = jm.append(&JournalRecord::TxnCommit { txn_id, commit_ts: 2 }).unwrap();
            assert_eq!(lsn, 2);
        }
    }

    #[test]
    fn test_truncate_empties_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.jnl");
        let jm = JournalManager::create(&path).unwrap();
        jm.append(&JournalRecord::Checkpoint { applied_lsn: 1 }).unwrap();
        jm.truncate().unwrap();
        assert!(jm.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_plan_recovery_redoes_uncovered_commit() {
        let txn_id = Uuid::new_v4();
        let records = vec![
            (JournalRecord::TxnBegin { txn_id, start_ts: 1 }, 1),
            (
                JournalRecord::PagePostimage { txn_id, page_id: PageId::new(5), after_bytes: vec![9] },
                2,
            ),
            (JournalRecord::TxnCommit { txn_id, commit_ts: 3 }, 3),
        ];

        let plan = plan_recovery(&records);
        assert_eq!(plan.redo, vec![(PageId::new(5), vec![9])]);
        assert!(plan.undo.is_empty());
    }

    #[test]
    fn test_plan_recovery_skips_checkpointed_commit() {
        let txn_id = Uuid::new_v4();
        let records = vec![
            (JournalRecord::TxnBegin { txn_id, start_ts: 1 }, 1),
            (
                JournalRecord::PagePostimage { txn_id, page_id: PageId::new(5), after_bytes: vec![9] },
                2,
            ),
            (JournalRecord::TxnCommit { txn_id, commit_ts: 3 }, 3),
            (JournalRecord::Checkpoint { applied_lsn: 3 }, 4),
        ];

        let plan = plan_recovery(&records);
        assert!(plan.redo.is_empty());
    }

    #[test]
    fn test_plan_recovery_undoes_incomplete_transaction() {
        let txn_id = Uuid::new_v4();
        let records = vec![
            (JournalRecord::TxnBegin { txn_id, start_ts: 1 }, 1),
            (
                JournalRecord::PagePreimage { txn_id, page_id: PageId::new(2), before_bytes: vec![1] },
                2,
            ),
            (
                JournalRecord::PagePreimage { txn_id, page_id: PageId::new(3), before_bytes: vec![2] },
                3,
            ),
        ];

        let plan = plan_recovery(&records);
        assert!(plan.redo.is_empty());
        assert_eq!(
            plan.undo,
            vec![(PageId::new(3), vec![2]), (PageId::new(2), vec![1])]
        );
    }

    #[test]
    fn test_plan_recovery_ignores_aborted_transaction() {
        let txn_id = Uuid::new_v4();
        let records = vec![
            (JournalRecord::TxnBegin { txn_id, start_ts: 1 }, 1),
            (
                JournalRecord::PagePreimage { txn_id, page_id: PageId::new(2), before_bytes: vec![1] },
                2,
            ),
            (JournalRecord::TxnAbort { txn_id }, 3),
        ];

        let plan = plan_recovery(&records);
        assert!(plan.redo.is_empty());
        assert!(plan.undo.is_empty());
    }
}
