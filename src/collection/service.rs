//! Per-collection CRUD service (spec §4.8).
//!
//! One [`CollectionService`] per collection: it owns the collection's
//! unique primary index on `_id`, every secondary index declared on it,
//! and its chain of [`PageType::Data`] pages (one document per page,
//! linked via the generic [`PageHeader`](crate::storage::page::PageHeader)
//! `prev_page_id`/`next_page_id` fields, the same mechanism the free list
//! and the B-tree's leaf chain use).

use std::collections::HashMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::catalog::{CatalogStore, CollectionEntry, IdKind, IndexEntry};
use crate::codec::{Document, Value};
use crate::common::{Error, PageId, Result};
use crate::index::{make_key, BTreeIndex, IndexDefinition};
use crate::predicate::Predicate;
use crate::storage::page::PageType;
use crate::storage::PageManager;
use crate::txn::{Operation, TransactionManager};

use super::idgen::{default_generator, IdGenerator};

/// Outcome of [`CollectionService::insert_many`]: how many documents made
/// it in, and the index/error of every one that didn't (spec §4.8:
/// "on per-doc failure, the overall result reports the number inserted").
#[derive(Debug)]
pub struct InsertManyResult {
    pub inserted: usize,
    pub errors: Vec<(usize, Error)>,
}

/// Which path [`CollectionService::upsert`] took.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted(Value),
    Updated(Value),
}

pub struct CollectionService {
    name: String,
    page_manager: Arc<PageManager>,
    catalog: Arc<CatalogStore>,
    /// Unique index on `_id`. Not tracked in the catalog's `indexes` list -
    /// every collection has exactly one, referenced by `primary_index_root`.
    primary: Mutex<BTreeIndex>,
    secondary: RwLock<HashMap<String, Mutex<BTreeIndex>>>,
    id_generator: Box<dyn IdGenerator>,
    /// Serializes mutating operations on this collection (spec §4.6: "at
    /// most one mutating operation per collection may be in flight per
    /// transaction"). Reads (`find*`) don't take it.
    op_lock: Mutex<()>,
    txn_manager: Arc<TransactionManager>,
    /// Mirrors `DatabaseOptions::read_only` (spec §6: "rejects all
    /// mutating operations when set"). Every mutator checks this first.
    read_only: bool,
}

impl CollectionService {
    /// Create a brand-new collection: a fresh primary index and a catalog
    /// entry with an empty data chain.
    pub fn create(
        name: impl Into<String>,
        id_kind: IdKind,
        page_manager: Arc<PageManager>,
        catalog: Arc<CatalogStore>,
        txn_manager: Arc<TransactionManager>,
        read_only: bool,
        now_ticks: u64,
    ) -> Result<Self> {
        let name = name.into();
        let primary = BTreeIndex::create(page_manager.clone(), true, now_ticks)?;
        let root = primary.root_page_id();
        catalog.mutate(now_ticks, |cat| {
            cat.add_collection(CollectionEntry {
                name: name.clone(),
                data_head: PageId::INVALID,
                data_tail: PageId::INVALID,
                primary_index_root: root,
                id_counter: 0,
                id_kind,
            })
        })?;

        Ok(Self {
            name,
            page_manager,
            catalog,
            primary: Mutex::new(primary),
            secondary: RwLock::new(HashMap::new()),
            id_generator: default_generator(id_kind),
            op_lock: Mutex::new(()),
            txn_manager,
            read_only,
        })
    }

    /// Re-open a collection already registered in the catalog, along with
    /// every secondary index declared on it.
    pub fn open(
        name: &str,
        page_manager: Arc<PageManager>,
        catalog: Arc<CatalogStore>,
        txn_manager: Arc<TransactionManager>,
        read_only: bool,
    ) -> Result<Self> {
        let snapshot = catalog.snapshot();
        let entry = snapshot
            .collection(name)
            .ok_or_else(|| Error::not_found(format!("collection {name:?}")))?;
        let primary = BTreeIndex::open(page_manager.clone(), entry.primary_index_root, true);

        let mut secondary = HashMap::new();
        for idx_entry in snapshot.indexes_for(name) {
            secondary.insert(
                idx_entry.name.clone(),
                Mutex::new(BTreeIndex::open(page_manager.clone(), idx_entry.root, idx_entry.unique)),
            );
        }

        Ok(Self {
            name: name.to_string(),
            page_manager,
            catalog,
            primary: Mutex::new(primary),
            secondary: RwLock::new(secondary),
            id_generator: default_generator(entry.id_kind),
            op_lock: Mutex::new(()),
            txn_manager,
            read_only,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reject the call with `Error::ReadOnly` if this collection's database
    /// was opened with `DatabaseOptions::read_only` (spec §6, §7). Every
    /// mutator calls this first.
    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Log a data page's before/after image against `txn`'s write-ahead
    /// record, if this call is running inside an explicit transaction.
    /// Autocommit calls (`txn: None`) write straight through without
    /// journaling, matching the fact that they never get a `TxnBegin`
    /// either.
    fn log_page_write(&self, txn: Option<Uuid>, page_id: PageId, before: &[u8], after: &[u8]) -> Result<()> {
        if let Some(txn_id) = txn {
            self.txn_manager.log_page_write(txn_id, page_id, before, after)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Index administration
    // ---------------------------------------------------------------

    /// Declare a new secondary index and backfill it from every existing
    /// document in the collection.
    pub fn create_index(
        &self,
        name: &str,
        fields: Vec<String>,
        unique: bool,
        sparse: bool,
        now_ticks: u64,
    ) -> Result<()> {
        self.check_writable()?;
        let mut index = BTreeIndex::create(self.page_manager.clone(), unique, now_ticks)?;
        let root = index.root_page_id();

        for (locator, doc) in self.scan_chain()? {
            if let Some(key) = compute_index_key(&doc, &fields, sparse) {
                index.insert(key, locator, now_ticks)?;
            }
        }

        self.catalog.mutate(now_ticks, |cat| {
            cat.add_index(IndexEntry {
                name: name.to_string(),
                collection: self.name.clone(),
                fields,
                unique,
                sparse,
                root,
            })
        })?;
        self.secondary.write().insert(name.to_string(), Mutex::new(index));
        Ok(())
    }

    pub fn drop_index(&self, name: &str, now_ticks: u64) -> Result<()> {
        self.check_writable()?;
        self.catalog.mutate(now_ticks, |cat| cat.remove_index(name).map(|_| ()))?;
        self.secondary.write().remove(name);
        Ok(())
    }

    // ---------------------------------------------------------------
    // CRUD
    // ---------------------------------------------------------------

    /// Insert a document, assigning `_id` if absent or null. Fails with
    /// `DocumentTooLarge` if the encoding exceeds the page payload.
    pub fn insert(&self, txn: Option<Uuid>, mut doc: Document, now_ticks: u64) -> Result<Value> {
        self.check_writable()?;
        let _guard = self.op_lock.lock();

        let needs_id = matches!(doc.get("_id"), None | Some(Value::Null));
        let id = if needs_id {
            let id = self.catalog.mutate(now_ticks, |cat| {
                let entry = cat
                    .collection_mut(&self.name)
                    .ok_or_else(|| Error::not_found(format!("collection {:?}", self.name)))?;
                let mut counter = entry.id_counter;
                let id = self.id_generator.generate(&mut counter);
                entry.id_counter = counter;
                Ok(id)
            })?;
            doc.set("_id", id.clone());
            id
        } else {
            doc.get("_id").cloned().unwrap()
        };
        doc.set("_collection", self.name.as_str());

        let encoded = doc.encode()?;
        let mut guard = self.page_manager.new_page(PageType::Data, now_ticks)?;
        let page_id = guard.page_id();
        if encoded.len() > guard.payload_capacity() {
            let capacity = guard.payload_capacity();
            drop(guard);
            self.page_manager.free_page(page_id, now_ticks)?;
            return Err(Error::DocumentTooLarge { size: encoded.len(), capacity });
        }
        let before_bytes = guard.as_slice().to_vec();
        guard.payload_mut()[..encoded.len()].copy_from_slice(&encoded);
        let mut header = guard.header();
        header.item_count = 1;
        header.free_bytes = (guard.payload_capacity() - encoded.len()) as u16;
        guard.set_header(&header);
        guard.update_checksum();
        let after_bytes = guard.as_slice().to_vec();
        drop(guard);
        self.log_page_write(txn, page_id, &before_bytes, &after_bytes)?;

        self.append_to_chain(page_id, now_ticks)?;

        let primary_key = make_key(std::slice::from_ref(&id));
        if let Err(e) = self.primary.lock().insert(primary_key.clone(), page_id, now_ticks) {
            let _ = self.remove_from_chain(page_id, now_ticks);
            let _ = self.page_manager.free_page(page_id, now_ticks);
            return Err(e);
        }

        let mut applied: Vec<(String, Document)> = Vec::new();
        for entry in self.secondary_entries() {
            let Some(key) = compute_index_key(&doc, &entry.fields, entry.sparse) else {
                continue;
            };
            let result = self.with_secondary(&entry.name, |idx| idx.insert(key.clone(), page_id, now_ticks));
            match result {
                Ok(()) => applied.push((entry.name, key)),
                Err(e) => {
                    for (name, key) in applied.iter().rev() {
                        let _ = self.with_secondary(name, |idx| idx.delete(key, page_id));
                    }
                    let _ = self.primary.lock().delete(&primary_key, page_id);
                    let _ = self.remove_from_chain(page_id, now_ticks);
                    let _ = self.page_manager.free_page(page_id, now_ticks);
                    return Err(e);
                }
            }
        }

        if let Some(txn_id) = txn {
            self.txn_manager
                .append_operation(txn_id, Operation::insert(self.name.clone(), id.clone(), doc))?;
        }
        Ok(id)
    }

    /// Insert every document, tolerating per-document failures (spec
    /// §4.8). Does not wrap the batch in a transaction itself.
    pub fn insert_many(&self, txn: Option<Uuid>, docs: Vec<Document>, now_ticks: u64) -> InsertManyResult {
        let mut inserted = 0;
        let mut errors = Vec::new();
        for (i, doc) in docs.into_iter().enumerate() {
            match self.insert(txn, doc, now_ticks) {
                Ok(_) => inserted += 1,
                Err(e) => errors.push((i, e)),
            }
        }
        InsertManyResult { inserted, errors }
    }

    pub fn find_by_id(&self, id: &Value) -> Result<Option<Document>> {
        let key = make_key(std::slice::from_ref(id));
        match self.primary.lock().find_exact(&key)? {
            Some(locator) => Ok(Some(self.read_document(locator)?)),
            None => Ok(None),
        }
    }

    pub fn find_all(&self) -> Result<Vec<Document>> {
        Ok(self.scan_chain()?.into_iter().map(|(_, doc)| doc).collect())
    }

    /// Full or index-accelerated scan filtered by `predicate` (spec §4.8:
    /// "may be upgraded to index scan when the predicate parser exposes
    /// an indexable key range").
    pub fn find(&self, predicate: &Predicate) -> Result<Vec<Document>> {
        let primary_def = IndexDefinition::new("_id", self.name.clone(), vec!["_id".to_string()], true);
        if let Some((low, high)) = predicate.as_index_range(&primary_def) {
            let locators = self.scan_range(&mut self.primary.lock(), &low, &high)?;
            return self.materialize_matching(locators, predicate);
        }

        for entry in self.secondary_entries() {
            let def = IndexDefinition::new(entry.name.clone(), entry.collection.clone(), entry.fields.clone(), entry.unique);
            if let Some((low, high)) = predicate.as_index_range(&def) {
                let locators = self.with_secondary(&entry.name, |idx| self.scan_range(idx, &low, &high))?;
                return self.materialize_matching(locators, predicate);
            }
        }

        Ok(self.find_all()?.into_iter().filter(|d| predicate.eval(d)).collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.find_all()?.len())
    }

    pub fn exists(&self, id: &Value) -> Result<bool> {
        Ok(self.find_by_id(id)?.is_some())
    }

    /// Update a document identified by its `_id`. Overwrites the existing
    /// data page in place if the new encoding fits, otherwise frees it and
    /// allocates a new one (spec §4.8, §8 scenario 6).
    pub fn update(&self, txn: Option<Uuid>, mut doc: Document, now_ticks: u64) -> Result<()> {
        self.check_writable()?;
        let _guard = self.op_lock.lock();

        let id = doc
            .get("_id")
            .cloned()
            .ok_or_else(|| Error::invalid_argument("update requires _id"))?;
        let primary_key = make_key(std::slice::from_ref(&id));
        let old_locator = self
            .primary
            .lock()
            .find_exact(&primary_key)?
            .ok_or_else(|| Error::not_found(format!("document {id:?}")))?;

        let before = self.read_document(old_locator)?;
        doc.set("_collection", self.name.as_str());
        let encoded = doc.encode()?;

        let capacity = self.page_manager.buffer_pool().fetch_page_read(old_locator)?.payload_capacity();

        let new_locator = if encoded.len() <= capacity {
            let mut guard = self.page_manager.buffer_pool().fetch_page_write(old_locator)?;
            let before_bytes = guard.as_slice().to_vec();
            guard.payload_mut().fill(0);
            guard.payload_mut()[..encoded.len()].copy_from_slice(&encoded);
            let mut header = guard.header();
            header.free_bytes = (guard.payload_capacity() - encoded.len()) as u16;
            guard.set_header(&header);
            guard.update_checksum();
            let after_bytes = guard.as_slice().to_vec();
            drop(guard);
            self.log_page_write(txn, old_locator, &before_bytes, &after_bytes)?;
            old_locator
        } else {
            let mut guard = self.page_manager.new_page(PageType::Data, now_ticks)?;
            let new_id = guard.page_id();
            if encoded.len() > guard.payload_capacity() {
                let cap = guard.payload_capacity();
                drop(guard);
                self.page_manager.free_page(new_id, now_ticks)?;
                return Err(Error::DocumentTooLarge { size: encoded.len(), capacity: cap });
            }
            let new_before_bytes = guard.as_slice().to_vec();
            guard.payload_mut()[..encoded.len()].copy_from_slice(&encoded);
            let mut header = guard.header();
            header.item_count = 1;
            header.free_bytes = (guard.payload_capacity() - encoded.len()) as u16;
            guard.set_header(&header);
            guard.update_checksum();
            let new_after_bytes = guard.as_slice().to_vec();
            drop(guard);
            self.log_page_write(txn, new_id, &new_before_bytes, &new_after_bytes)?;

            let old_before_bytes = self.page_manager.buffer_pool().fetch_page_read(old_locator)?.as_slice().to_vec();
            self.replace_in_chain(old_locator, new_id, now_ticks)?;
            self.page_manager.free_page(old_locator, now_ticks)?;
            let old_after_bytes = self.page_manager.buffer_pool().fetch_page_read(old_locator)?.as_slice().to_vec();
            self.log_page_write(txn, old_locator, &old_before_bytes, &old_after_bytes)?;
            new_id
        };

        if new_locator != old_locator {
            self.primary.lock().update_locator(&primary_key, old_locator, new_locator)?;
        }

        for entry in self.secondary_entries() {
            let before_key = compute_index_key(&before, &entry.fields, entry.sparse);
            let after_key = compute_index_key(&doc, &entry.fields, entry.sparse);
            self.with_secondary(&entry.name, |idx| {
                match (before_key, after_key) {
                    (Some(bk), Some(ak)) if bk == ak => {
                        if new_locator != old_locator {
                            idx.update_locator(&bk, old_locator, new_locator)?;
                        }
                    }
                    (Some(bk), Some(ak)) => {
                        idx.delete(&bk, old_locator)?;
                        idx.insert(ak, new_locator, now_ticks)?;
                    }
                    (Some(bk), None) => idx.delete(&bk, old_locator)?,
                    (None, Some(ak)) => idx.insert(ak, new_locator, now_ticks)?,
                    (None, None) => {}
                }
                Ok(())
            })?;
        }

        if let Some(txn_id) = txn {
            self.txn_manager
                .append_operation(txn_id, Operation::update(self.name.clone(), id, before, doc))?;
        }
        Ok(())
    }

    pub fn delete(&self, txn: Option<Uuid>, id: &Value, now_ticks: u64) -> Result<()> {
        self.check_writable()?;
        let _guard = self.op_lock.lock();

        let primary_key = make_key(std::slice::from_ref(id));
        let locator = self
            .primary
            .lock()
            .find_exact(&primary_key)?
            .ok_or_else(|| Error::not_found(format!("document {id:?}")))?;
        let doc = self.read_document(locator)?;
        let before_bytes = self.page_manager.buffer_pool().fetch_page_read(locator)?.as_slice().to_vec();

        for entry in self.secondary_entries() {
            if let Some(key) = compute_index_key(&doc, &entry.fields, entry.sparse) {
                self.with_secondary(&entry.name, |idx| idx.delete(&key, locator))?;
            }
        }
        self.primary.lock().delete(&primary_key, locator)?;
        self.remove_from_chain(locator, now_ticks)?;
        self.page_manager.free_page(locator, now_ticks)?;
        let after_bytes = self.page_manager.buffer_pool().fetch_page_read(locator)?.as_slice().to_vec();
        self.log_page_write(txn, locator, &before_bytes, &after_bytes)?;

        if let Some(txn_id) = txn {
            self.txn_manager
                .append_operation(txn_id, Operation::delete(self.name.clone(), id.clone(), doc))?;
        }
        Ok(())
    }

    pub fn upsert(&self, txn: Option<Uuid>, doc: Document, now_ticks: u64) -> Result<UpsertOutcome> {
        if let Some(id) = doc.get("_id").cloned() {
            if !id.is_nullish() && self.exists(&id)? {
                self.update(txn, doc, now_ticks)?;
                return Ok(UpsertOutcome::Updated(id));
            }
        }
        let id = self.insert(txn, doc, now_ticks)?;
        Ok(UpsertOutcome::Inserted(id))
    }

    pub fn delete_many(&self, txn: Option<Uuid>, predicate: &Predicate, now_ticks: u64) -> Result<usize> {
        self.check_writable()?;
        let mut n = 0;
        for doc in self.find(predicate)? {
            if let Some(id) = doc.get("_id").cloned() {
                self.delete(txn, &id, now_ticks)?;
                n += 1;
            }
        }
        Ok(n)
    }

    pub fn delete_all(&self, txn: Option<Uuid>, now_ticks: u64) -> Result<usize> {
        self.check_writable()?;
        let mut n = 0;
        for doc in self.find_all()? {
            if let Some(id) = doc.get("_id").cloned() {
                self.delete(txn, &id, now_ticks)?;
                n += 1;
            }
        }
        Ok(n)
    }

    /// Invert a logged [`Operation`] against live state. Used by the
    /// engine's rollback closure; reuses the public CRUD paths (an insert
    /// is undone by a delete, a delete by a re-insert, an update by
    /// restoring the before-image) rather than a bespoke undo path, and
    /// passes `txn: None` so the inversion itself isn't re-logged.
    pub(crate) fn apply_inverse(&self, op: &Operation, now_ticks: u64) -> Result<()> {
        use crate::txn::OperationKind;
        match op.kind {
            OperationKind::Insert => {
                let id = op
                    .document_id
                    .clone()
                    .ok_or_else(|| Error::corrupt("insert operation missing document id"))?;
                self.delete(None, &id, now_ticks)
            }
            OperationKind::Delete => {
                let before = op
                    .before_image
                    .clone()
                    .ok_or_else(|| Error::corrupt("delete operation missing before image"))?;
                self.insert(None, before, now_ticks).map(|_| ())
            }
            OperationKind::Update => {
                let before = op
                    .before_image
                    .clone()
                    .ok_or_else(|| Error::corrupt("update operation missing before image"))?;
                self.update(None, before, now_ticks)
            }
            OperationKind::CreateIndex | OperationKind::DropIndex => Ok(()),
        }
    }

    // ---------------------------------------------------------------
    // Internal helpers
    // ---------------------------------------------------------------

    fn secondary_entries(&self) -> Vec<IndexEntry> {
        self.catalog.snapshot().indexes_for(&self.name).cloned().collect()
    }

    fn with_secondary<R>(&self, name: &str, f: impl FnOnce(&mut BTreeIndex) -> Result<R>) -> Result<R> {
        let map = self.secondary.read();
        let idx = map
            .get(name)
            .ok_or_else(|| Error::not_found(format!("index {name:?}")))?;
        f(&mut idx.lock())
    }

    fn read_document(&self, locator: PageId) -> Result<Document> {
        let guard = self.page_manager.buffer_pool().fetch_page_read(locator)?;
        Document::decode(guard.payload())
    }

    fn scan_chain(&self) -> Result<Vec<(PageId, Document)>> {
        let entry = self
            .catalog
            .snapshot()
            .collection(&self.name)
            .ok_or_else(|| Error::not_found(format!("collection {:?}", self.name)))?
            .clone();
        let mut out = Vec::new();
        let mut current = entry.data_head;
        while current.is_valid() {
            let guard = self.page_manager.buffer_pool().fetch_page_read(current)?;
            out.push((current, Document::decode(guard.payload())?));
            current = guard.header().next_page_id;
        }
        Ok(out)
    }

    fn scan_range(&self, index: &mut BTreeIndex, low: &Bound<Document>, high: &Bound<Document>) -> Result<Vec<PageId>> {
        let start = match low {
            Bound::Included(k) | Bound::Excluded(k) => k.clone(),
            Bound::Unbounded => Document::new(),
        };
        let mut cursor = index.scan_from(&start)?;
        let mut out = Vec::new();
        while let Some((key, locator)) = cursor.next()? {
            if let Bound::Excluded(k) = low {
                if &key == k {
                    continue;
                }
            }
            match high {
                Bound::Included(k) if &key > k => break,
                Bound::Excluded(k) if &key >= k => break,
                _ => {}
            }
            out.push(locator);
        }
        Ok(out)
    }

    fn materialize_matching(&self, locators: Vec<PageId>, predicate: &Predicate) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        for locator in locators {
            let doc = self.read_document(locator)?;
            if predicate.eval(&doc) {
                out.push(doc);
            }
        }
        Ok(out)
    }

    fn append_to_chain(&self, page_id: PageId, now_ticks: u64) -> Result<()> {
        self.catalog.mutate(now_ticks, |cat| {
            let entry = cat
                .collection_mut(&self.name)
                .ok_or_else(|| Error::not_found(format!("collection {:?}", self.name)))?;
            if entry.data_tail.is_valid() {
                let tail = entry.data_tail;
                let mut tail_guard = self.page_manager.buffer_pool().fetch_page_write(tail)?;
                let mut h = tail_guard.header();
                h.next_page_id = page_id;
                tail_guard.set_header(&h);
                tail_guard.update_checksum();
                drop(tail_guard);

                let mut new_guard = self.page_manager.buffer_pool().fetch_page_write(page_id)?;
                let mut h = new_guard.header();
                h.prev_page_id = tail;
                new_guard.set_header(&h);
                new_guard.update_checksum();
            } else {
                entry.data_head = page_id;
            }
            entry.data_tail = page_id;
            Ok(())
        })
    }

    fn remove_from_chain(&self, page_id: PageId, now_ticks: u64) -> Result<()> {
        let (prev, next) = {
            let guard = self.page_manager.buffer_pool().fetch_page_read(page_id)?;
            let h = guard.header();
            (h.prev_page_id, h.next_page_id)
        };
        if prev.is_valid() {
            let mut guard = self.page_manager.buffer_pool().fetch_page_write(prev)?;
            let mut h = guard.header();
            h.next_page_id = next;
            guard.set_header(&h);
            guard.update_checksum();
        }
        if next.is_valid() {
            let mut guard = self.page_manager.buffer_pool().fetch_page_write(next)?;
            let mut h = guard.header();
            h.prev_page_id = prev;
            guard.set_header(&h);
            guard.update_checksum();
        }
        self.catalog.mutate(now_ticks, |cat| {
            let entry = cat
                .collection_mut(&self.name)
                .ok_or_else(|| Error::not_found(format!("collection {:?}", self.name)))?;
            if entry.data_head == page_id {
                entry.data_head = next;
            }
            if entry.data_tail == page_id {
                entry.data_tail = prev;
            }
            Ok(())
        })
    }

    fn replace_in_chain(&self, old: PageId, new: PageId, now_ticks: u64) -> Result<()> {
        let (prev, next) = {
            let guard = self.page_manager.buffer_pool().fetch_page_read(old)?;
            let h = guard.header();
            (h.prev_page_id, h.next_page_id)
        };
        {
            let mut guard = self.page_manager.buffer_pool().fetch_page_write(new)?;
            let mut h = guard.header();
            h.prev_page_id = prev;
            h.next_page_id = next;
            guard.set_header(&h);
            guard.update_checksum();
        }
        if prev.is_valid() {
            let mut guard = self.page_manager.buffer_pool().fetch_page_write(prev)?;
            let mut h = guard.header();
            h.next_page_id = new;
            guard.set_header(&h);
            guard.update_checksum();
        }
        if next.is_valid() {
            let mut guard = self.page_manager.buffer_pool().fetch_page_write(next)?;
            let mut h = guard.header();
            h.prev_page_id = new;
            guard.set_header(&h);
            guard.update_checksum();
        }
        self.catalog.mutate(now_ticks, |cat| {
            let entry = cat
                .collection_mut(&self.name)
                .ok_or_else(|| Error::not_found(format!("collection {:?}", self.name)))?;
            if entry.data_head == old {
                entry.data_head = new;
            }
            if entry.data_tail == old {
                entry.data_tail = new;
            }
            Ok(())
        })
    }
}

/// Build an index key from a document, honoring sparseness: a sparse
/// index omits documents missing (or null on) any indexed field; a
/// non-sparse index substitutes `Null` for an absent field (spec §4.7).
fn compute_index_key(doc: &Document, fields: &[String], sparse: bool) -> Option<Document> {
    let mut values = Vec::with_capacity(fields.len());
    for field in fields {
        match doc.get(field) {
            Some(v) if !v.is_nullish() => values.push(v.clone()),
            Some(_) | None if sparse => return None,
            Some(v) => values.push(v.clone()),
            None => values.push(Value::Null),
        }
    }
    Some(make_key(&values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::storage::page::HeaderPage;
    use crate::storage::DiskManager;
    use tempfile::tempdir;

    fn make_service(id_kind: IdKind) -> (CollectionService, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("test.db"), 4096).unwrap();
        let bpm = BufferPoolManager::new(64, dm);
        let pm = Arc::new(PageManager::new(bpm));
        pm.init_header(&HeaderPage::new(4096, "test", true, 0)).unwrap();
        let catalog = Arc::new(CatalogStore::create(pm.clone(), 0).unwrap());
        let txm = Arc::new(TransactionManager::new(16, 60_000, 1000, None));
        let service = CollectionService::create("users", id_kind, pm, catalog, txm, false, 0).unwrap();
        (service, dir)
    }

    fn doc_with(id: i64, name: &str) -> Document {
        let mut d = Document::new();
        d.set("_id", id);
        d.set("name", name);
        d
    }

    #[test]
    fn test_insert_and_find_by_id() {
        let (svc, _dir) = make_service(IdKind::Int64);
        let mut d = Document::new();
        d.set("_id", Value::String("u1".into()));
        d.set("name", "Alice");
        d.set("age", 30i32);
        svc.insert(None, d, 1).unwrap();

        let found = svc.find_by_id(&Value::String("u1".into())).unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::from("Alice")));
        assert_eq!(svc.count().unwrap(), 1);
    }

    #[test]
    fn test_unique_index_rejection() {
        let (svc, _dir) = make_service(IdKind::Int64);
        svc.create_index("by_email", vec!["email".into()], true, false, 1).unwrap();

        let mut a = Document::new();
        a.set("_id", 1i64);
        a.set("email", "a@x");
        svc.insert(None, a, 2).unwrap();

        let mut b = Document::new();
        b.set("_id", 2i64);
        b.set("email", "a@x");
        let result = svc.insert(None, b, 3);
        assert!(matches!(result, Err(Error::DuplicateKey { .. })));
        assert_eq!(svc.count().unwrap(), 1);
    }

    #[test]
    fn test_update_grows_document() {
        let (svc, _dir) = make_service(IdKind::Int64);
        let mut small = Document::new();
        small.set("_id", 1i64);
        small.set("body", "short");
        svc.insert(None, small, 1).unwrap();

        let mut large = Document::new();
        large.set("_id", 1i64);
        large.set("body", "x".repeat(4000));
        svc.update(None, large, 2).unwrap();

        let found = svc.find_by_id(&Value::Int64(1)).unwrap().unwrap();
        assert_eq!(found.get("body").and_then(Value::as_str).unwrap().len(), 4000);
    }

    #[test]
    fn test_delete_removes_document_and_index_entry() {
        let (svc, _dir) = make_service(IdKind::Int64);
        svc.insert(None, doc_with(1, "Alice"), 1).unwrap();
        svc.delete(None, &Value::Int64(1), 2).unwrap();
        assert_eq!(svc.count().unwrap(), 0);
        assert!(svc.find_by_id(&Value::Int64(1)).unwrap().is_none());
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let (svc, _dir) = make_service(IdKind::Int64);
        let outcome = svc.upsert(None, doc_with(1, "Alice"), 1).unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted(Value::Int64(1)));

        let outcome = svc.upsert(None, doc_with(1, "Alicia"), 2).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated(Value::Int64(1)));
        assert_eq!(svc.count().unwrap(), 1);
    }

    #[test]
    fn test_find_with_predicate_uses_secondary_index() {
        let (svc, _dir) = make_service(IdKind::Int64);
        svc.create_index("by_age", vec!["age".into()], false, false, 1).unwrap();
        for i in 0..5 {
            let mut d = Document::new();
            d.set("_id", i as i64);
            d.set("age", i);
            svc.insert(None, d, 2).unwrap();
        }
        let found = svc.find(&Predicate::eq("age", 3i32)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("_id"), Some(&Value::Int64(3)));
    }

    #[test]
    fn test_delete_all() {
        let (svc, _dir) = make_service(IdKind::Int64);
        for i in 0..3 {
            svc.insert(None, doc_with(i, "x"), 1).unwrap();
        }
        assert_eq!(svc.delete_all(None, 2).unwrap(), 3);
        assert_eq!(svc.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_many_reports_partial_failures() {
        let (svc, _dir) = make_service(IdKind::Int64);
        let docs = vec![doc_with(1, "a"), doc_with(1, "dup"), doc_with(2, "b")];
        let result = svc.insert_many(None, docs, 1);
        assert_eq!(result.inserted, 2);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_read_only_rejects_every_mutator() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("test.db"), 4096).unwrap();
        let bpm = BufferPoolManager::new(64, dm);
        let pm = Arc::new(PageManager::new(bpm));
        pm.init_header(&HeaderPage::new(4096, "test", true, 0)).unwrap();
        let catalog = Arc::new(CatalogStore::create(pm.clone(), 0).unwrap());
        let txm = Arc::new(TransactionManager::new(16, 60_000, 1000, None));
        CollectionService::create("users", IdKind::Int64, pm.clone(), catalog.clone(), txm.clone(), false, 0).unwrap();

        let svc = CollectionService::open("users", pm, catalog, txm, true).unwrap();

        assert!(matches!(svc.insert(None, doc_with(1, "a"), 1), Err(Error::ReadOnly)));
        assert!(matches!(svc.update(None, doc_with(1, "a"), 1), Err(Error::ReadOnly)));
        assert!(matches!(svc.delete(None, &Value::Int64(1), 1), Err(Error::ReadOnly)));
        assert!(matches!(svc.upsert(None, doc_with(1, "a"), 1), Err(Error::ReadOnly)));
        assert!(matches!(svc.delete_many(None, &Predicate::eq("_id", 1i64), 1), Err(Error::ReadOnly)));
        assert!(matches!(svc.delete_all(None, 1), Err(Error::ReadOnly)));
        assert!(matches!(
            svc.create_index("by_name", vec!["name".into()], false, false, 1),
            Err(Error::ReadOnly)
        ));
        assert_eq!(svc.count().unwrap(), 0);
    }
}
