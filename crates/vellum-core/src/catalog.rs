//! In-memory catalog
//!
//! The live state of a session: every collection with its documents
//! keyed by `_id`. The catalog is rebuilt from the journal on open and
//! mutated exclusively through [`Catalog::apply`], so the committed
//! state, a transaction overlay and journal replay all share one code
//! path. Cloning the catalog is what makes transactions copy-on-write.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::document::{Collation, Document, Value, ID_FIELD};
use crate::errors::{Result, VellumError};
use crate::storage::codec;
use crate::storage::record::Record;

/// Longest accepted collection name.
pub const MAX_COLLECTION_NAME: usize = 120;

/// Primary-key value normalized under the store collation.
///
/// Strings are case-folded at construction when the collation asks for
/// it, so the map ordering itself can stay a plain structural compare.
/// Int and Double compare numerically, which makes `_id: 2` and
/// `_id: 2.0` the same key.
#[derive(Clone, Debug)]
pub struct IndexKey(Value);

impl IndexKey {
    pub fn new(id: &Value, collation: Collation) -> Result<IndexKey> {
        match id {
            Value::Null | Value::Array(_) | Value::Document(_) => {
                Err(VellumError::InvalidId(id.type_name().to_string()))
            }
            Value::String(s) => Ok(IndexKey(Value::String(collation.fold(s).into_owned()))),
            other => Ok(IndexKey(other.clone())),
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_with(&other.0, Collation::Binary)
    }
}

/// Statistics captured by ANALYZE. Held in memory until the next run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CollectionStats {
    pub documents: u64,
    pub total_bytes: u64,
    pub analyzed_at: DateTime<Utc>,
}

impl CollectionStats {
    pub fn avg_bytes(&self) -> u64 {
        if self.documents == 0 {
            0
        } else {
            self.total_bytes / self.documents
        }
    }
}

/// One collection: documents in primary-key order plus the auto-id
/// high-water mark.
#[derive(Clone, Debug, Default)]
pub struct Collection {
    docs: BTreeMap<IndexKey, Document>,
    next_id: i64,
    stats: Option<CollectionStats>,
}

impl Collection {
    fn new() -> Self {
        Collection { docs: BTreeMap::new(), next_id: 1, stats: None }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Documents in primary-key order.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub fn get(&self, key: &IndexKey) -> Option<&Document> {
        self.docs.get(key)
    }

    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    pub fn stats(&self) -> Option<&CollectionStats> {
        self.stats.as_ref()
    }

    /// Walk every document and measure its encoded size.
    pub fn compute_stats(&self) -> Result<CollectionStats> {
        let mut counter = ByteCounter(0);
        for doc in self.docs.values() {
            codec::write_document(&mut counter, doc)?;
        }
        Ok(CollectionStats {
            documents: self.docs.len() as u64,
            total_bytes: counter.0,
            analyzed_at: Utc::now(),
        })
    }

    fn advance_next_id(&mut self, id: &Value) {
        if let Value::Int(n) = id {
            if *n >= self.next_id {
                self.next_id = n.saturating_add(1);
            }
        }
    }
}

struct ByteCounter(u64);

impl Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// All collections of one store.
#[derive(Clone, Debug)]
pub struct Catalog {
    collation: Collation,
    collections: BTreeMap<String, Collection>,
}

impl Catalog {
    pub fn new(collation: Collation) -> Self {
        Catalog { collation, collections: BTreeMap::new() }
    }

    pub fn collation(&self) -> Collation {
        self.collation
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.collections.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Collection)> {
        self.collections.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Collection lookup that reports the missing name.
    pub fn require(&self, name: &str) -> Result<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| VellumError::UnknownCollection(name.to_string()))
    }

    /// Assign or validate the `_id` of an incoming document.
    ///
    /// A missing or null `_id` receives the next auto-increment
    /// integer for the target collection; an explicit `_id` must be a
    /// scalar. The catalog itself is not modified.
    pub fn finalize_document(&self, collection: &str, mut doc: Document) -> Result<Document> {
        match doc.id() {
            None | Some(Value::Null) => {
                let next = self
                    .collections
                    .get(collection)
                    .map(|c| c.next_id)
                    .unwrap_or(1);
                doc.insert(ID_FIELD, Value::Int(next));
            }
            Some(id) => {
                IndexKey::new(id, self.collation)?;
            }
        }
        Ok(doc)
    }

    /// Apply one journal record.
    ///
    /// This is the only mutation path: replay on open, auto-committed
    /// statements and transaction overlays all go through it. Creating
    /// over an existing collection is a no-op and deleting an absent
    /// document is tolerated, so re-applying a prefix of the journal
    /// converges instead of erroring.
    pub fn apply(&mut self, record: &Record) -> Result<()> {
        match record {
            Record::CreateCollection { name } => {
                validate_collection_name(name)?;
                self.collections.entry(name.clone()).or_insert_with(Collection::new);
            }
            Record::DropCollection { name } => {
                if self.collections.remove(name).is_none() {
                    return Err(VellumError::UnknownCollection(name.clone()));
                }
            }
            Record::RenameCollection { from, to } => {
                validate_collection_name(to)?;
                if self.collections.contains_key(to) {
                    return Err(VellumError::CollectionExists(to.clone()));
                }
                let collection = self
                    .collections
                    .remove(from)
                    .ok_or_else(|| VellumError::UnknownCollection(from.clone()))?;
                self.collections.insert(to.clone(), collection);
            }
            Record::Insert { collection, document } => {
                validate_collection_name(collection)?;
                let id = document
                    .id()
                    .ok_or_else(|| VellumError::InvalidId("missing".to_string()))?;
                let key = IndexKey::new(id, self.collation)?;
                let entry = self
                    .collections
                    .entry(collection.clone())
                    .or_insert_with(Collection::new);
                if entry.docs.contains_key(&key) {
                    return Err(VellumError::DuplicateKey(id.to_string(), collection.clone()));
                }
                entry.advance_next_id(id);
                entry.docs.insert(key, document.clone());
            }
            Record::Delete { collection, id } => {
                if let Some(entry) = self.collections.get_mut(collection) {
                    let key = IndexKey::new(id, self.collation)?;
                    entry.docs.remove(&key);
                }
            }
            Record::Update { collection, document } => {
                let id = document
                    .id()
                    .ok_or_else(|| VellumError::InvalidId("missing".to_string()))?;
                let key = IndexKey::new(id, self.collation)?;
                let entry = self
                    .collections
                    .get_mut(collection)
                    .ok_or_else(|| VellumError::UnknownCollection(collection.clone()))?;
                entry.advance_next_id(id);
                entry.docs.insert(key, document.clone());
            }
        }
        Ok(())
    }

    /// Copy of this catalog with every primary key re-normalized under
    /// a different collation. Fails when two existing keys collapse
    /// into one, e.g. `"Ada"` and `"ada"` under nocase.
    pub fn with_collation(&self, collation: Collation) -> Result<Catalog> {
        let mut out = Catalog::new(collation);
        for (name, collection) in &self.collections {
            let mut rekeyed = Collection::new();
            rekeyed.next_id = collection.next_id;
            for doc in collection.docs.values() {
                let id = doc
                    .id()
                    .ok_or_else(|| VellumError::InvalidId("missing".to_string()))?;
                let key = IndexKey::new(id, collation)?;
                if rekeyed.docs.insert(key, doc.clone()).is_some() {
                    return Err(VellumError::DuplicateKey(id.to_string(), name.clone()));
                }
            }
            out.collections.insert(name.clone(), rekeyed);
        }
        Ok(out)
    }

    pub fn set_stats(&mut self, name: &str, stats: CollectionStats) -> Result<()> {
        let collection = self
            .collections
            .get_mut(name)
            .ok_or_else(|| VellumError::UnknownCollection(name.to_string()))?;
        collection.stats = Some(stats);
        Ok(())
    }

    /// Total number of documents across all collections.
    pub fn document_count(&self) -> u64 {
        self.collections.values().map(|c| c.len() as u64).sum()
    }
}

/// A collection name starts with a letter or underscore and continues
/// with letters, digits or underscores, matching what the query
/// language can reference. Names starting with `$` are reserved for
/// virtual collections.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid || name.len() > MAX_COLLECTION_NAME {
        return Err(VellumError::InvalidCollectionName(name.to_string()));
    }
    Ok(())
}
