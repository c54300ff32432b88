//! Transaction management: ACID transactions with savepoints (spec §4.6).

mod manager;
mod transaction;

pub use manager::TransactionManager;
pub use transaction::{Operation, OperationKind, Savepoint, Transaction, TransactionState};
