//! The top-level database facade (spec §4.9, §6 "Host API surface").
//!
//! `Database` owns every collaborator - the page store, the catalog, the
//! transaction manager, and (if enabled) the journal - and is the only
//! type a host program needs to import.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::buffer::BufferPoolManager;
use crate::catalog::{CatalogStore, IdKind};
use crate::collection::CollectionService;
use crate::common::{Error, PageId, Result};
use crate::config::{DatabaseOptions, WriteConcern};
use crate::journal::{plan_recovery, JournalManager, JournalRecord};
use crate::storage::page::{HeaderPage, HEADER_LAYOUT_SIZE};
use crate::storage::{DiskManager, PageManager};
use crate::txn::TransactionManager;

/// A point-in-time snapshot of the engine's health, for the host's own
/// observability (spec §4.9).
#[derive(Debug, Clone)]
pub struct Statistics {
    pub buffer_pool: crate::buffer::StatsSnapshot,
    pub active_transactions: usize,
    pub collection_counts: HashMap<String, usize>,
}

/// The embedded database. One `Database` per open file.
pub struct Database {
    page_manager: Arc<PageManager>,
    catalog: Arc<CatalogStore>,
    txn_manager: Arc<TransactionManager>,
    journal: Option<Arc<JournalManager>>,
    options: DatabaseOptions,
    collections: RwLock<HashMap<String, Arc<CollectionService>>>,
}

impl Database {
    /// Create a brand-new database file.
    pub fn create(path: impl AsRef<Path>, options: DatabaseOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let now = now_ticks();

        let dm = DiskManager::create(path, options.page_size)?;
        let bpm = BufferPoolManager::new(options.cache_size, dm);
        let page_manager = Arc::new(PageManager::new(bpm));

        let db_name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("sundial");
        let header = HeaderPage::new(options.page_size, db_name, options.enable_journaling, now);
        page_manager.init_header(&header)?;

        let catalog = Arc::new(CatalogStore::create(page_manager.clone(), now)?);
        write_header(&page_manager, |h| h.catalog_page = catalog.page_id())?;

        let journal = if options.enable_journaling {
            Some(Arc::new(JournalManager::create(journal_path_for(path))?))
        } else {
            None
        };

        let txn_manager = Arc::new(TransactionManager::new(
            options.max_transactions,
            options.transaction_timeout_ms,
            options.max_transaction_size,
            journal.clone(),
        ));

        info!(path = %path.display(), page_size = options.page_size, "created database");

        Ok(Self {
            page_manager,
            catalog,
            txn_manager,
            journal,
            options,
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Open an existing database file, replaying the journal first
    /// (spec §4.5, §8 "crash recovery").
    pub fn open(path: impl AsRef<Path>, mut options: DatabaseOptions) -> Result<Self> {
        let path = path.as_ref();
        options.page_size = peek_page_size(path)?;
        options.validate()?;

        let dm = DiskManager::open(path, options.page_size)?;
        let bpm = BufferPoolManager::new(options.cache_size, dm);
        let page_manager = Arc::new(PageManager::new(bpm));
        let header = page_manager.read_header()?;

        let journal_path = journal_path_for(path);
        let journal = if header.journaling_enabled && journal_path.exists() {
            Some(Arc::new(JournalManager::open(&journal_path)?))
        } else {
            None
        };

        if let Some(journal) = &journal {
            let records = journal.read_all()?;
            let plan = plan_recovery(&records);
            let touched = !plan.redo.is_empty() || !plan.undo.is_empty();
            if touched {
                warn!(
                    redo = plan.redo.len(),
                    undo = plan.undo.len(),
                    "replaying journal on open"
                );
            }
            for (page_id, bytes) in plan.redo.into_iter().chain(plan.undo) {
                let mut guard = page_manager.buffer_pool().fetch_page_write(page_id)?;
                guard.as_mut_slice().copy_from_slice(&bytes);
            }
            if touched {
                page_manager.buffer_pool().flush_all_pages()?;
            }
            journal.truncate()?;
        }

        let catalog = Arc::new(CatalogStore::open(page_manager.clone(), header.catalog_page)?);
        let txn_manager = Arc::new(TransactionManager::new(
            options.max_transactions,
            options.transaction_timeout_ms,
            options.max_transaction_size,
            journal.clone(),
        ));

        let mut collections = HashMap::new();
        for entry in &catalog.snapshot().collections {
            let svc = CollectionService::open(
                &entry.name,
                page_manager.clone(),
                catalog.clone(),
                txn_manager.clone(),
                options.read_only,
            )?;
            collections.insert(entry.name.clone(), Arc::new(svc));
        }

        info!(path = %path.display(), collections = collections.len(), "opened database");

        Ok(Self {
            page_manager,
            catalog,
            txn_manager,
            journal,
            options,
            collections: RwLock::new(collections),
        })
    }

    /// Flush every dirty page and fsync the journal. Safe to call at any
    /// time; also the last step a host should take before process exit.
    pub fn flush(&self) -> Result<()> {
        self.page_manager.buffer_pool().flush_all_pages()?;
        if let Some(journal) = &self.journal {
            self.checkpoint(journal)?;
            journal.sync()?;
        }
        Ok(())
    }

    /// Append a `Checkpoint` record marking that everything journaled
    /// through the current LSN has just been applied to the main file
    /// (spec §4.5). Recovery skips redoing any commit at or before this
    /// watermark.
    fn checkpoint(&self, journal: &JournalManager) -> Result<()> {
        let applied_lsn = journal.last_lsn();
        journal.append(&JournalRecord::Checkpoint { applied_lsn })?;
        Ok(())
    }

    /// Flush and drop the journal's replayed contents. Does not force-abort
    /// transactions still open on this handle - callers are expected to
    /// resolve their own transactions before closing.
    pub fn close(&self) -> Result<()> {
        self.flush()
    }

    pub fn begin_transaction(&self) -> Result<Uuid> {
        self.txn_manager.begin(now_ticks())
    }

    /// Commit a transaction. Durability follows `DatabaseOptions::write_concern`:
    /// `Synced` flushes every dirty page to the main file before the commit
    /// record is journaled and fsynced; `Journaled` only fsyncs the journal;
    /// `None` does neither (spec §4.5).
    pub fn commit(&self, txn: Uuid) -> Result<()> {
        let now = now_ticks();
        let synced = matches!(self.options.write_concern, WriteConcern::Synced);
        if synced {
            self.page_manager.buffer_pool().flush_all_pages()?;
        }
        self.txn_manager.commit(txn, now)?;
        if !matches!(self.options.write_concern, WriteConcern::None) {
            if let Some(journal) = &self.journal {
                if synced {
                    // Every dirty page just reached the main file, so the
                    // checkpoint watermark can cover this commit (and every
                    // other one already flushed) - recovery won't redo it.
                    self.checkpoint(journal)?;
                }
                journal.sync()?;
            }
        }
        Ok(())
    }

    pub fn rollback(&self, txn: Uuid) -> Result<()> {
        let now = now_ticks();
        let collections = self.collections.read();
        self.txn_manager.rollback(txn, |op| match collections.get(&op.collection) {
            Some(svc) => svc.apply_inverse(op, now),
            None => Ok(()),
        })
    }

    pub fn create_savepoint(&self, txn: Uuid, name: impl Into<String>) -> Result<u64> {
        self.txn_manager.create_savepoint(txn, name, now_ticks())
    }

    pub fn release_savepoint(&self, txn: Uuid, savepoint_id: u64) -> Result<()> {
        self.txn_manager.release_savepoint(txn, savepoint_id)
    }

    pub fn rollback_to_savepoint(&self, txn: Uuid, savepoint_id: u64) -> Result<()> {
        let now = now_ticks();
        let collections = self.collections.read();
        self.txn_manager.rollback_to_savepoint(txn, savepoint_id, |op| match collections.get(&op.collection) {
            Some(svc) => svc.apply_inverse(op, now),
            None => Ok(()),
        })
    }

    pub fn create_collection(&self, name: &str, id_kind: IdKind) -> Result<Arc<CollectionService>> {
        if self.options.read_only {
            return Err(Error::ReadOnly);
        }
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(Error::invalid_argument(format!("collection {name:?} already exists")));
        }
        let svc = Arc::new(CollectionService::create(
            name,
            id_kind,
            self.page_manager.clone(),
            self.catalog.clone(),
            self.txn_manager.clone(),
            self.options.read_only,
            now_ticks(),
        )?);
        collections.insert(name.to_string(), svc.clone());
        Ok(svc)
    }

    pub fn get_collection(&self, name: &str) -> Option<Arc<CollectionService>> {
        self.collections.read().get(name).cloned()
    }

    /// Drop a collection: every document (and so every secondary index
    /// entry) is removed, then the catalog entry itself. The collection's
    /// own index-root pages are not reclaimed - same simplification as
    /// `CollectionService::drop_index`; see DESIGN.md.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        if self.options.read_only {
            return Err(Error::ReadOnly);
        }
        let svc = {
            let mut collections = self.collections.write();
            collections.remove(name).ok_or_else(|| Error::not_found(format!("collection {name:?}")))?
        };
        let now = now_ticks();
        svc.delete_all(None, now)?;
        self.catalog.mutate(now, |cat| cat.remove_collection(name).map(|_| ()))?;
        Ok(())
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    pub fn statistics(&self) -> Result<Statistics> {
        let buffer_pool = self.page_manager.buffer_pool().stats().snapshot();
        let active_transactions = self.txn_manager.active_count();
        let mut collection_counts = HashMap::new();
        for (name, svc) in self.collections.read().iter() {
            collection_counts.insert(name.clone(), svc.count()?);
        }
        Ok(Statistics { buffer_pool, active_transactions, collection_counts })
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }
}

fn now_ticks() -> u64 {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    (duration.as_nanos() / 100) as u64
}

fn journal_path_for(db_path: &Path) -> PathBuf {
    let mut path = db_path.to_path_buf();
    let new_ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.journal"),
        None => "journal".to_string(),
    };
    path.set_extension(new_ext);
    path
}

/// Read just the header layout off disk, before we know the real page size
/// (the header's own `page_size` field is always within the first
/// [`HEADER_LAYOUT_SIZE`] bytes regardless of how big a page actually is).
fn peek_page_size(path: &Path) -> Result<u32> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; HEADER_LAYOUT_SIZE];
    file.read_exact(&mut buf)?;
    Ok(HeaderPage::from_bytes(&buf)?.page_size)
}

fn write_header(page_manager: &PageManager, f: impl FnOnce(&mut HeaderPage)) -> Result<()> {
    let mut guard = page_manager.buffer_pool().fetch_page_write(PageId::new(0))?;
    let mut header = HeaderPage::from_bytes(guard.as_slice())?;
    f(&mut header);
    header.write_to(guard.as_mut_slice());
    Ok(())
}
