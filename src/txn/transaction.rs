//! Transaction state machine and operation log (spec §3, §4.6).

use std::fmt;

use uuid::Uuid;

use crate::codec::{Document, Value};
use crate::common::{Error, Result};

/// A transaction's lifecycle state. Operations may only be appended while
/// `Active`; commit and rollback are terminal (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
    Failed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "Active",
            Self::Committing => "Committing",
            Self::Committed => "Committed",
            Self::RollingBack => "RollingBack",
            Self::RolledBack => "RolledBack",
            Self::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

/// A mutation kind recorded in a transaction's operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    CreateIndex,
    DropIndex,
}

/// One entry in a transaction's operation log. Replaying these in reverse,
/// inverted, is how rollback and rollback-to-savepoint undo a transaction's
/// effects (spec §4.6).
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub collection: String,
    pub document_id: Option<Value>,
    pub before_image: Option<Document>,
    pub after_image: Option<Document>,
    /// For `CreateIndex`/`DropIndex`, the index name.
    pub index_name: Option<String>,
}

impl Operation {
    pub fn insert(collection: impl Into<String>, document_id: Value, after: Document) -> Self {
        Self {
            kind: OperationKind::Insert,
            collection: collection.into(),
            document_id: Some(document_id),
            before_image: None,
            after_image: Some(after),
            index_name: None,
        }
    }

    pub fn update(collection: impl Into<String>, document_id: Value, before: Document, after: Document) -> Self {
        Self {
            kind: OperationKind::Update,
            collection: collection.into(),
            document_id: Some(document_id),
            before_image: Some(before),
            after_image: Some(after),
            index_name: None,
        }
    }

    pub fn delete(collection: impl Into<String>, document_id: Value, before: Document) -> Self {
        Self {
            kind: OperationKind::Delete,
            collection: collection.into(),
            document_id: Some(document_id),
            before_image: Some(before),
            after_image: None,
            index_name: None,
        }
    }
}

/// A named mark in a transaction's operation log (spec §3).
#[derive(Debug, Clone)]
pub struct Savepoint {
    pub id: u64,
    pub name: String,
    pub created_at: u64,
    pub(crate) op_log_len: usize,
}

/// A single transaction: identity, state, operation log, and savepoint
/// stack.
pub struct Transaction {
    id: Uuid,
    state: TransactionState,
    operations: Vec<Operation>,
    savepoints: Vec<Savepoint>,
    start_time: u64,
    next_savepoint_id: u64,
}

impl Transaction {
    pub(crate) fn new(id: Uuid, start_time: u64) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            operations: Vec::new(),
            savepoints: Vec::new(),
            start_time,
            next_savepoint_id: 1,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn op_count(&self) -> usize {
        self.operations.len()
    }

    pub(crate) fn require_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::TransactionInvalidState {
                id: self.id.to_string(),
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn append_operation(&mut self, op: Operation) -> Result<()> {
        self.require_active()?;
        self.operations.push(op);
        Ok(())
    }

    pub(crate) fn create_savepoint(&mut self, name: impl Into<String>, now: u64) -> Result<u64> {
        self.require_active()?;
        let id = self.next_savepoint_id;
        self.next_savepoint_id += 1;
        self.savepoints.push(Savepoint {
            id,
            name: name.into(),
            created_at: now,
            op_log_len: self.operations.len(),
        });
        Ok(id)
    }

    /// Truncate the operation log back to the savepoint's mark, returning
    /// the removed operations in original (not yet reversed) order. Any
    /// savepoint created after this one is discarded along with it.
    pub(crate) fn rollback_to_savepoint(&mut self, savepoint_id: u64) -> Result<Vec<Operation>> {
        self.require_active()?;
        let idx = self
            .savepoints
            .iter()
            .position(|sp| sp.id == savepoint_id)
            .ok_or_else(|| Error::not_found(format!("savepoint {savepoint_id}")))?;
        let cut = self.savepoints[idx].op_log_len;
        let removed = self.operations.split_off(cut);
        self.savepoints.truncate(idx + 1);
        Ok(removed)
    }

    pub(crate) fn release_savepoint(&mut self, savepoint_id: u64) -> Result<()> {
        self.require_active()?;
        let idx = self
            .savepoints
            .iter()
            .position(|sp| sp.id == savepoint_id)
            .ok_or_else(|| Error::not_found(format!("savepoint {savepoint_id}")))?;
        self.savepoints.remove(idx);
        Ok(())
    }

    pub(crate) fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    pub(crate) fn take_operations(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.operations)
    }
}
