//! Collection/index catalog (spec §6: "Page 2 is the catalog ... encoded
//! as a document").
//!
//! Sundial keeps collection definitions and index definitions in a single
//! [`Catalog`] document stored in one [`PageType::Catalog`] page, rather
//! than the two separate pages ("catalog" and "index-root registry") the
//! external-interfaces table describes — both are small metadata blobs
//! and splitting them buys nothing here. See DESIGN.md.

use crate::codec::{Document, Value};
use crate::common::{Error, PageId, Result};
use crate::storage::page::PageType;
use crate::storage::PageManager;

use parking_lot::RwLock;

/// The type a collection's `_id` field is generated as (spec §4.8,
/// §9 "id generation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    ObjectId,
    Guid,
    Int32,
    Int64,
    String,
}

impl IdKind {
    fn as_str(self) -> &'static str {
        match self {
            IdKind::ObjectId => "object_id",
            IdKind::Guid => "guid",
            IdKind::Int32 => "int32",
            IdKind::Int64 => "int64",
            IdKind::String => "string",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "object_id" => Ok(IdKind::ObjectId),
            "guid" => Ok(IdKind::Guid),
            "int32" => Ok(IdKind::Int32),
            "int64" => Ok(IdKind::Int64),
            "string" => Ok(IdKind::String),
            other => Err(Error::corrupt(format!("unknown id_kind {other:?} in catalog"))),
        }
    }
}

/// A registered collection: where its document chain starts/ends, its
/// primary index, and its id-generation state.
#[derive(Debug, Clone)]
pub struct CollectionEntry {
    pub name: String,
    pub data_head: PageId,
    pub data_tail: PageId,
    pub primary_index_root: PageId,
    pub id_counter: i64,
    pub id_kind: IdKind,
}

/// A registered secondary (or primary) index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub name: String,
    pub collection: String,
    pub fields: Vec<String>,
    pub unique: bool,
    /// Sparse indexes skip documents missing (or null on) any indexed
    /// field (spec §4.7).
    pub sparse: bool,
    pub root: PageId,
}

/// The decoded contents of the catalog page: every collection and index
/// definition in the database.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub collections: Vec<CollectionEntry>,
    pub indexes: Vec<IndexEntry>,
}

fn page_id_to_value(id: PageId) -> Value {
    Value::Int64(id.0 as i64)
}

fn value_to_page_id(value: &Value) -> Result<PageId> {
    value
        .as_i64()
        .map(|n| PageId::new(n as u32))
        .ok_or_else(|| Error::corrupt("expected an integer page id in catalog"))
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionEntry> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut CollectionEntry> {
        self.collections.iter_mut().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexEntry> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn indexes_for(&self, collection: &str) -> impl Iterator<Item = &IndexEntry> {
        self.indexes.iter().filter(move |i| i.collection == collection)
    }

    pub fn add_collection(&mut self, entry: CollectionEntry) -> Result<()> {
        if self.collection(&entry.name).is_some() {
            return Err(Error::invalid_argument(format!(
                "collection {:?} already exists",
                entry.name
            )));
        }
        self.collections.push(entry);
        Ok(())
    }

    pub fn remove_collection(&mut self, name: &str) -> Result<CollectionEntry> {
        let pos = self
            .collections
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::not_found(format!("collection {name:?}")))?;
        self.indexes.retain(|i| i.collection != name);
        Ok(self.collections.remove(pos))
    }

    pub fn add_index(&mut self, entry: IndexEntry) -> Result<()> {
        if self.index(&entry.name).is_some() {
            return Err(Error::invalid_argument(format!(
                "index {:?} already exists",
                entry.name
            )));
        }
        self.indexes.push(entry);
        Ok(())
    }

    pub fn remove_index(&mut self, name: &str) -> Result<IndexEntry> {
        let pos = self
            .indexes
            .iter()
            .position(|i| i.name == name)
            .ok_or_else(|| Error::not_found(format!("index {name:?}")))?;
        Ok(self.indexes.remove(pos))
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        let collections: Vec<Value> = self
            .collections
            .iter()
            .map(|c| {
                let mut d = Document::new();
                d.set("name", c.name.as_str());
                d.set("data_head", page_id_to_value(c.data_head));
                d.set("data_tail", page_id_to_value(c.data_tail));
                d.set("primary_index_root", page_id_to_value(c.primary_index_root));
                d.set("id_counter", c.id_counter);
                d.set("id_kind", c.id_kind.as_str());
                Value::Document(d)
            })
            .collect();
        doc.set("collections", Value::Array(collections));

        let indexes: Vec<Value> = self
            .indexes
            .iter()
            .map(|i| {
                let mut d = Document::new();
                d.set("name", i.name.as_str());
                d.set("collection", i.collection.as_str());
                d.set(
                    "fields",
                    Value::Array(i.fields.iter().map(|f| Value::from(f.as_str())).collect()),
                );
                d.set("unique", i.unique);
                d.set("sparse", i.sparse);
                d.set("root", page_id_to_value(i.root));
                Value::Document(d)
            })
            .collect();
        doc.set("indexes", Value::Array(indexes));
        doc
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        let mut catalog = Catalog::new();

        let collections = doc
            .get("collections")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::corrupt("catalog missing collections array"))?;
        for entry in collections {
            let d = entry
                .as_document()
                .ok_or_else(|| Error::corrupt("catalog collection entry is not a document"))?;
            let name = d
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::corrupt("catalog collection missing name"))?
                .to_string();
            let id_kind = d
                .get("id_kind")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::corrupt("catalog collection missing id_kind"))?;
            catalog.collections.push(CollectionEntry {
                name,
                data_head: value_to_page_id(d.get("data_head").unwrap_or(&Value::Null))?,
                data_tail: value_to_page_id(d.get("data_tail").unwrap_or(&Value::Null))?,
                primary_index_root: value_to_page_id(
                    d.get("primary_index_root").unwrap_or(&Value::Null),
                )?,
                id_counter: d.get("id_counter").and_then(Value::as_i64).unwrap_or(0),
                id_kind: IdKind::parse(id_kind)?,
            });
        }

        let indexes = doc
            .get("indexes")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::corrupt("catalog missing indexes array"))?;
        for entry in indexes {
            let d = entry
                .as_document()
                .ok_or_else(|| Error::corrupt("catalog index entry is not a document"))?;
            let name = d
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::corrupt("catalog index missing name"))?
                .to_string();
            let collection = d
                .get("collection")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::corrupt("catalog index missing collection"))?
                .to_string();
            let fields = d
                .get("fields")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::corrupt("catalog index missing fields"))?
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| Error::corrupt("catalog index field name is not a string"))?;
            let unique = matches!(d.get("unique"), Some(Value::Boolean(true)));
            let sparse = matches!(d.get("sparse"), Some(Value::Boolean(true)));
            catalog.indexes.push(IndexEntry {
                name,
                collection,
                fields,
                unique,
                sparse,
                root: value_to_page_id(d.get("root").unwrap_or(&Value::Null))?,
            });
        }

        Ok(catalog)
    }
}

/// Persists a [`Catalog`] to its dedicated page and caches the decoded
/// form in memory behind a lock, so readers don't re-decode on every call.
///
/// Catalog mutations (create/drop collection, add/drop index) take the
/// engine-wide exclusive lock spec §5 calls for; this type's `mutate` is
/// that lock.
pub struct CatalogStore {
    page_manager: std::sync::Arc<PageManager>,
    page_id: PageId,
    catalog: RwLock<Catalog>,
}

impl CatalogStore {
    /// Create a fresh, empty catalog and allocate its page.
    pub fn create(page_manager: std::sync::Arc<PageManager>, now_ticks: u64) -> Result<Self> {
        let catalog = Catalog::new();
        let mut guard = page_manager.new_page(PageType::Catalog, now_ticks)?;
        let encoded = catalog.to_document().encode()?;
        if encoded.len() > guard.payload_capacity() {
            return Err(Error::corrupt("empty catalog does not fit in one page"));
        }
        guard.payload_mut()[..encoded.len()].copy_from_slice(&encoded);
        let mut header = guard.header();
        header.item_count = 1;
        header.free_bytes = (guard.payload_capacity() - encoded.len()) as u16;
        guard.set_header(&header);
        guard.update_checksum();
        let page_id = guard.page_id();
        drop(guard);

        Ok(Self {
            page_manager,
            page_id,
            catalog: RwLock::new(catalog),
        })
    }

    /// Load the catalog from an existing page.
    pub fn open(page_manager: std::sync::Arc<PageManager>, page_id: PageId) -> Result<Self> {
        let guard = page_manager.buffer_pool().fetch_page_read(page_id)?;
        let doc = Document::decode(guard.payload())?;
        let catalog = Catalog::from_document(&doc)?;
        drop(guard);
        Ok(Self {
            page_manager,
            page_id,
            catalog: RwLock::new(catalog),
        })
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// A cloned snapshot of the current catalog, for callers that only
    /// need to read.
    pub fn snapshot(&self) -> Catalog {
        self.catalog.read().clone()
    }

    /// Apply `f` to the catalog and persist the result. `f` runs under
    /// the catalog's write lock, so catalog mutations are serialized
    /// engine-wide.
    pub fn mutate<R>(&self, now_ticks: u64, f: impl FnOnce(&mut Catalog) -> Result<R>) -> Result<R> {
        let mut catalog = self.catalog.write();
        let result = f(&mut catalog)?;
        self.persist(&catalog, now_ticks)?;
        Ok(result)
    }

    fn persist(&self, catalog: &Catalog, _now_ticks: u64) -> Result<()> {
        let encoded = catalog.to_document().encode()?;
        let mut guard = self.page_manager.buffer_pool().fetch_page_write(self.page_id)?;
        if encoded.len() > guard.payload_capacity() {
            return Err(Error::DocumentTooLarge {
                size: encoded.len(),
                capacity: guard.payload_capacity(),
            });
        }
        guard.payload_mut().fill(0);
        guard.payload_mut()[..encoded.len()].copy_from_slice(&encoded);
        let mut header = guard.header();
        header.free_bytes = (guard.payload_capacity() - encoded.len()) as u16;
        guard.set_header(&header);
        guard.update_checksum();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::storage::page::HeaderPage;
    use crate::storage::DiskManager;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn make_store() -> (CatalogStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("test.db"), 4096).unwrap();
        let bpm = BufferPoolManager::new(16, dm);
        let pm = Arc::new(PageManager::new(bpm));
        pm.init_header(&HeaderPage::new(4096, "test", true, 0)).unwrap();
        let store = CatalogStore::create(pm, 0).unwrap();
        (store, dir)
    }

    #[test]
    fn test_roundtrip_through_document() {
        let mut catalog = Catalog::new();
        catalog
            .add_collection(CollectionEntry {
                name: "users".into(),
                data_head: PageId::new(5),
                data_tail: PageId::new(9),
                primary_index_root: PageId::new(2),
                id_counter: 3,
                id_kind: IdKind::Int64,
            })
            .unwrap();
        catalog
            .add_index(IndexEntry {
                name: "users_by_email".into(),
                collection: "users".into(),
                fields: vec!["email".into()],
                unique: true,
                sparse: false,
                root: PageId::new(11),
            })
            .unwrap();

        let doc = catalog.to_document();
        let decoded = Catalog::from_document(&doc).unwrap();
        assert_eq!(decoded.collections.len(), 1);
        assert_eq!(decoded.collection("users").unwrap().id_counter, 3);
        assert_eq!(decoded.index("users_by_email").unwrap().fields, vec!["email"]);
    }

    #[test]
    fn test_create_then_reopen() {
        let (store, _dir) = make_store();
        store
            .mutate(1, |c| {
                c.add_collection(CollectionEntry {
                    name: "widgets".into(),
                    data_head: PageId::INVALID,
                    data_tail: PageId::INVALID,
                    primary_index_root: PageId::new(2),
                    id_counter: 0,
                    id_kind: IdKind::ObjectId,
                })
            })
            .unwrap();

        let reopened = CatalogStore::open(store.page_manager.clone(), store.page_id()).unwrap();
        assert!(reopened.snapshot().collection("widgets").is_some());
    }

    #[test]
    fn test_duplicate_collection_rejected() {
        let mut catalog = Catalog::new();
        let entry = CollectionEntry {
            name: "a".into(),
            data_head: PageId::INVALID,
            data_tail: PageId::INVALID,
            primary_index_root: PageId::INVALID,
            id_counter: 0,
            id_kind: IdKind::Int64,
        };
        catalog.add_collection(entry.clone()).unwrap();
        assert!(catalog.add_collection(entry).is_err());
    }
}
