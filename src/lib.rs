//! Sundial - an embedded, single-file document database.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                             Sundial                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                 Database facade (engine)                 │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │   Collections (collection/)  +  Indexes (index/)         │   │
//! │  │        CollectionService  +  B-tree secondary indexes     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │   Transactions (txn/)  +  Write-ahead journal (journal/) │   │
//! │  │        TransactionManager + savepoints + JournalManager   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Catalog (catalog) + document codec (codec)     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Buffer Pool (buffer/)                          │   │
//! │  │      BufferPoolManager + Frame + Statistics + replacer     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │     DiskManager + Page + PageHeader + HeaderPage          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config constants)
//! - [`config`] - Host-facing `DatabaseOptions` / `WriteConcern`
//! - [`buffer`] - Buffer pool management and eviction policies
//! - [`storage`] - Disk I/O, page formats, and the page/free-list manager
//! - [`codec`] - The `Value`/`Document` document model and its wire format
//! - [`catalog`] - The collection and index registry
//! - [`index`] - B-tree secondary indexes
//! - [`journal`] - Write-ahead journal and crash recovery planning
//! - [`txn`] - Transaction manager, savepoints, and the operation log
//! - [`predicate`] - Query predicates over documents
//! - [`adapter`] - Typed entity mapping for host structs
//! - [`collection`] - Per-collection CRUD service
//! - [`engine`] - The `Database` facade tying every layer together
//!
//! # Quick Start
//! ```no_run
//! use sundial::engine::Database;
//! use sundial::config::DatabaseOptions;
//! use sundial::catalog::IdKind;
//! use sundial::codec::Document;
//!
//! let db = Database::create("my_database.sdb", DatabaseOptions::default()).unwrap();
//! db.create_collection("users", IdKind::Int64).unwrap();
//! let users = db.get_collection("users").unwrap();
//!
//! let mut doc = Document::new();
//! doc.set("name", "Ada");
//! users.insert(None, doc, 0).unwrap();
//! ```

pub mod adapter;
pub mod buffer;
pub mod catalog;
pub mod codec;
pub mod collection;
pub mod common;
pub mod config;
pub mod engine;
pub mod index;
pub mod journal;
pub mod predicate;
pub mod storage;
pub mod txn;

pub use common::{Error, FrameId, PageId, Result};
pub use config::{DatabaseOptions, WriteConcern};
pub use engine::Database;

pub use buffer::{BufferPoolManager, BufferPoolStats, Frame, StatsSnapshot};
pub use codec::{Document, Value};
pub use storage::page::{Page, PageHeader, PageType};
pub use storage::DiskManager;
