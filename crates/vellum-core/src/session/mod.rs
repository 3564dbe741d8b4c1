//! Database session
//!
//! A [`Session`] owns one open store: the parsed header, the replayed
//! catalog and the backing byte source. Writes accumulate in memory
//! and reach the file on [`Session::checkpoint`]; an explicit
//! transaction stages writes against a copy-on-write overlay that a
//! rollback simply drops. [`Session::rebuild`] rewrites the whole file
//! compacted, optionally under a different collation.

use std::fs::OpenOptions;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::catalog::{validate_collection_name, Catalog, CollectionStats};
use crate::document::{json, Collation, Document};
use crate::errors::{Result, VellumError};
use crate::query::exec::{self, ResultCursor};
use crate::query::parse;
use crate::storage::file::StoreFile;
use crate::storage::record::{read_record, write_record, Record};
use crate::storage::{Header, HEADER_LEN};

pub mod tabs;

/// Options for [`Session::rebuild`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildOptions {
    /// Re-key the store under this collation.
    pub collation: Option<Collation>,
}

/// Snapshot of session state, the row behind `SELECT $ FROM $database`.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub user_version: u32,
    pub collation: Collation,
    pub collections: u64,
    pub documents: u64,
    pub pending_records: u64,
    pub in_transaction: bool,
    pub opened_at: DateTime<Utc>,
    /// Bytes of the store file holding flushed state.
    pub store_len: u64,
}

struct Transaction {
    overlay: Catalog,
    staged: Vec<Record>,
}

/// An open store.
pub struct Session<S: StoreFile> {
    source: S,
    header: Header,
    header_dirty: bool,
    /// Length of the valid, flushed prefix of the file.
    flushed_len: u64,
    committed: Catalog,
    /// Committed records not yet written to the file.
    pending: Vec<Record>,
    txn: Option<Transaction>,
    opened_at: DateTime<Utc>,
}

/// Session over an in-memory byte buffer.
pub type MemorySession = Session<Cursor<Vec<u8>>>;

impl Session<std::fs::File> {
    /// Open (or create) a store file on disk.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Self::open(file)
    }
}

impl MemorySession {
    /// Fresh, empty in-memory store.
    pub fn open_memory() -> Result<Self> {
        Self::open(Cursor::new(Vec::new()))
    }

    /// Open an in-memory store over existing bytes.
    pub fn open_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::open(Cursor::new(bytes))
    }

    /// Checkpoint and hand back the raw store bytes.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.checkpoint()?;
        Ok(self.source.into_inner())
    }
}

impl<S: StoreFile> Session<S> {
    /// Open a session over a byte source.
    ///
    /// An empty source becomes a fresh store. Anything non-empty must
    /// be a valid store: bad magic, a damaged header, or a torn or
    /// corrupt journal record all fail here with a format error.
    pub fn open(mut source: S) -> Result<Self> {
        let len = source.len()?;
        if len == 0 {
            return Self::create(source);
        }

        source.seek(SeekFrom::Start(0))?;
        let mut header_buf = [0u8; HEADER_LEN];
        source.read_exact(&mut header_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                VellumError::format("store is shorter than its header")
            } else {
                VellumError::Io(e)
            }
        })?;
        let header = Header::decode(&header_buf)?;

        let mut catalog = Catalog::new(header.collation);
        let mut replayed = 0u64;
        while let Some(record) = read_record(&mut source)? {
            catalog
                .apply(&record)
                .map_err(|e| VellumError::format(format!("journal replay failed: {e}")))?;
            replayed += 1;
        }
        debug!(
            records = replayed,
            collections = catalog.len(),
            "store opened"
        );

        Ok(Session {
            source,
            header,
            header_dirty: false,
            flushed_len: len,
            committed: catalog,
            pending: Vec::new(),
            txn: None,
            opened_at: Utc::now(),
        })
    }

    fn create(mut source: S) -> Result<Self> {
        let header = Header::new(Collation::default());
        source.seek(SeekFrom::Start(0))?;
        source.write_all(&header.encode())?;
        source.flush()?;
        info!(collation = %header.collation, "created new store");
        Ok(Session {
            source,
            header,
            header_dirty: false,
            flushed_len: HEADER_LEN as u64,
            committed: Catalog::new(header.collation),
            pending: Vec::new(),
            txn: None,
            opened_at: Utc::now(),
        })
    }

    /// Parse and run one statement.
    pub fn execute(&mut self, sql: &str) -> Result<ResultCursor<'_>> {
        let params = Document::new();
        self.execute_with(sql, &params)
    }

    /// Parse and run one statement with `@name` parameters bound from
    /// the given document.
    pub fn execute_with(&mut self, sql: &str, params: &Document) -> Result<ResultCursor<'_>> {
        let statement = parse(sql)?;
        debug!(write = statement.is_write(), "executing statement");
        exec::execute(self, statement, params)
    }

    /// Catalog the next read will see: the transaction overlay when
    /// one is active, the committed state otherwise.
    pub fn catalog(&self) -> &Catalog {
        match &self.txn {
            Some(txn) => &txn.overlay,
            None => &self.committed,
        }
    }

    pub fn collation(&self) -> Collation {
        self.header.collation
    }

    pub fn user_version(&self) -> u32 {
        self.header.user_version
    }

    pub fn set_user_version(&mut self, version: u32) {
        if version != self.header.user_version {
            self.header.user_version = version;
            self.header_dirty = true;
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// Committed records waiting for the next checkpoint.
    pub fn pending_records(&self) -> usize {
        self.pending.len()
    }

    /// Whether closing now would lose anything.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.pending.is_empty() || self.header_dirty || self.txn.is_some()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.catalog().names().cloned().collect()
    }

    pub fn info(&self) -> SessionInfo {
        let catalog = self.catalog();
        SessionInfo {
            user_version: self.header.user_version,
            collation: self.header.collation,
            collections: catalog.len() as u64,
            documents: catalog.document_count(),
            pending_records: self.pending.len() as u64,
            in_transaction: self.txn.is_some(),
            opened_at: self.opened_at,
            store_len: self.flushed_len,
        }
    }

    /// Route one record to the overlay or the committed state.
    pub(crate) fn apply_write(&mut self, record: Record) -> Result<()> {
        match &mut self.txn {
            Some(txn) => {
                txn.overlay.apply(&record)?;
                txn.staged.push(record);
            }
            None => {
                self.committed.apply(&record)?;
                self.pending.push(record);
            }
        }
        Ok(())
    }

    pub(crate) fn commit_records(&mut self, records: Vec<Record>) -> Result<()> {
        for record in records {
            self.apply_write(record)?;
        }
        Ok(())
    }

    /// Start an explicit transaction. Everything until COMMIT goes to
    /// a copy-on-write overlay of the catalog.
    pub fn begin(&mut self) -> Result<()> {
        if self.txn.is_some() {
            return Err(VellumError::TransactionActive);
        }
        self.txn = Some(Transaction {
            overlay: self.committed.clone(),
            staged: Vec::new(),
        });
        debug!("transaction started");
        Ok(())
    }

    /// Promote the overlay to the committed state.
    pub fn commit(&mut self) -> Result<()> {
        let txn = self.txn.take().ok_or(VellumError::NoTransaction)?;
        debug!(records = txn.staged.len(), "transaction committed");
        self.committed = txn.overlay;
        self.pending.extend(txn.staged);
        Ok(())
    }

    /// Drop the overlay and everything staged in it.
    pub fn rollback(&mut self) -> Result<()> {
        let txn = self.txn.take().ok_or(VellumError::NoTransaction)?;
        debug!(discarded = txn.staged.len(), "transaction rolled back");
        Ok(())
    }

    /// Flush committed state to the file: append pending records and
    /// rewrite the header if it changed. Returns the bytes written.
    ///
    /// Inside a transaction this flushes only what was committed
    /// before BEGIN; staged records stay in memory.
    pub fn checkpoint(&mut self) -> Result<u64> {
        let mut written = 0u64;
        if self.header_dirty {
            self.source.seek(SeekFrom::Start(0))?;
            self.source.write_all(&self.header.encode())?;
            self.header_dirty = false;
            written += HEADER_LEN as u64;
        }
        let records = self.pending.len();
        if records > 0 {
            self.source.seek(SeekFrom::Start(self.flushed_len))?;
            let mut appended = 0u64;
            for record in &self.pending {
                appended += write_record(&mut self.source, record)?;
            }
            self.flushed_len += appended;
            written += appended;
            self.pending.clear();
        }
        if written > 0 {
            self.source.flush()?;
            self.source.sync()?;
        }
        debug!(bytes = written, records, "checkpoint complete");
        Ok(written)
    }

    /// Rewrite the store compacted: one create record per collection,
    /// one insert per live document. Dead journal entries from
    /// updates, deletes and drops disappear. Returns the signed byte
    /// delta (positive means the file shrank).
    ///
    /// With a collation change the whole catalog is re-keyed first;
    /// two keys that collide under the new collation abort the rebuild
    /// before anything is written.
    pub fn rebuild(&mut self, options: RebuildOptions) -> Result<i64> {
        if self.txn.is_some() {
            return Err(VellumError::TransactionActive);
        }
        let old_len = self.source.len()?;

        let rebuilt = match options.collation {
            Some(collation) if collation != self.committed.collation() => {
                self.committed.with_collation(collation)?
            }
            _ => self.committed.clone(),
        };
        let mut header = self.header;
        header.collation = rebuilt.collation();

        self.source.seek(SeekFrom::Start(0))?;
        self.source.write_all(&header.encode())?;
        let mut len = HEADER_LEN as u64;
        for (name, collection) in rebuilt.iter() {
            len += write_record(
                &mut self.source,
                &Record::CreateCollection { name: name.clone() },
            )?;
            for document in collection.iter() {
                len += write_record(
                    &mut self.source,
                    &Record::Insert { collection: name.clone(), document: document.clone() },
                )?;
            }
        }
        self.source.truncate(len)?;
        self.source.flush()?;
        self.source.sync()?;

        self.header = header;
        self.header_dirty = false;
        self.committed = rebuilt;
        self.pending.clear();
        self.flushed_len = len;
        info!(old_bytes = old_len, new_bytes = len, "store rebuilt");
        Ok(old_len as i64 - len as i64)
    }

    /// Recompute and store statistics for one collection.
    pub fn analyze(&mut self, name: &str) -> Result<CollectionStats> {
        let stats = self.catalog().require(name)?.compute_stats()?;
        match &mut self.txn {
            Some(txn) => txn.overlay.set_stats(name, stats)?,
            None => self.committed.set_stats(name, stats)?,
        }
        debug!(collection = name, documents = stats.documents, "analyzed");
        Ok(stats)
    }

    /// Render a whole collection as a pretty JSON array.
    pub fn export_collection(&self, name: &str) -> Result<Vec<u8>> {
        let collection = self.catalog().require(name)?;
        let docs: Vec<Document> = collection.iter().cloned().collect();
        Ok(json::documents_to_json_pretty(&docs)?.into_bytes())
    }

    /// Insert documents parsed from JSON bytes (UTF-8 or UTF-16 with a
    /// BOM). The collection is created if missing. Returns the number
    /// of documents imported; a bad document anywhere imports nothing.
    pub fn import_collection(&mut self, name: &str, bytes: &[u8]) -> Result<u64> {
        validate_collection_name(name)?;
        let docs = json::parse_documents(bytes)?;

        let mut trial = self.catalog().clone();
        let mut records = Vec::with_capacity(docs.len() + 1);
        if !trial.contains(name) {
            let record = Record::CreateCollection { name: name.to_string() };
            trial.apply(&record)?;
            records.push(record);
        }
        let mut count = 0u64;
        for doc in docs {
            let doc = trial.finalize_document(name, doc)?;
            let record = Record::Insert { collection: name.to_string(), document: doc };
            trial.apply(&record)?;
            records.push(record);
            count += 1;
        }
        self.commit_records(records)?;
        info!(collection = name, documents = count, "imported");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Value;

    fn seeded() -> MemorySession {
        let mut session = MemorySession::open_memory().unwrap();
        session
            .execute(
                "INSERT INTO people VALUES \
                 {name: 'Ada', age: 36}, {name: 'Grace', age: 45}, {name: 'Linus', age: 28}",
            )
            .unwrap();
        session
    }

    fn names(session: &mut MemorySession, sql: &str) -> Vec<String> {
        let docs = session.execute(sql).unwrap().collect_documents(100).unwrap();
        docs.iter()
            .filter_map(|d| d.get("name").and_then(|v| v.as_str().map(String::from)))
            .collect()
    }

    fn scalar(session: &mut MemorySession, sql: &str) -> Value {
        session.execute(sql).unwrap().try_next().unwrap().unwrap()
    }

    #[test]
    fn test_fresh_store_round_trips_through_bytes() {
        let session = MemorySession::open_memory().unwrap();
        let bytes = session.into_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);

        let reopened = MemorySession::open_bytes(bytes).unwrap();
        assert_eq!(reopened.collation(), Collation::Binary);
        assert!(reopened.catalog().is_empty());
    }

    #[test]
    fn test_garbage_bytes_fail_to_open() {
        assert!(matches!(
            MemorySession::open_bytes(b"definitely not a store".to_vec()),
            Err(VellumError::Format(_))
        ));
        // Valid header, torn record
        let mut bytes = seeded().into_bytes().unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            MemorySession::open_bytes(bytes),
            Err(VellumError::Format(_))
        ));
    }

    #[test]
    fn test_corrupt_record_body_fails_to_open() {
        let mut bytes = seeded().into_bytes().unwrap();
        let mid = HEADER_LEN + 20;
        bytes[mid] ^= 0xFF;
        assert!(matches!(
            MemorySession::open_bytes(bytes),
            Err(VellumError::Format(_))
        ));
    }

    #[test]
    fn test_insert_select_where_order_limit() {
        let mut session = seeded();
        assert_eq!(
            names(&mut session, "SELECT $ FROM people WHERE age > 30 ORDER BY age DESC"),
            vec!["Grace", "Ada"]
        );
        assert_eq!(
            names(&mut session, "SELECT $ FROM people ORDER BY age ASC LIMIT 2 OFFSET 1"),
            vec!["Ada", "Grace"]
        );

        assert_eq!(scalar(&mut session, "SELECT COUNT(*) FROM people"), Value::Int(3));
    }

    #[test]
    fn test_changes_survive_checkpoint_and_reopen() {
        let mut session = seeded();
        session.execute("UPDATE people SET age = 37 WHERE name = 'Ada'").unwrap();
        session.execute("DELETE FROM people WHERE name = 'Linus'").unwrap();
        assert!(session.has_unsaved_changes());
        session.checkpoint().unwrap();
        assert!(!session.has_unsaved_changes());

        let mut reopened = MemorySession::open_bytes(session.into_bytes().unwrap()).unwrap();
        assert_eq!(names(&mut reopened, "SELECT $ FROM people"), vec!["Ada", "Grace"]);
        let docs = reopened
            .execute("SELECT $ FROM people WHERE name = 'Ada'")
            .unwrap()
            .collect_documents(10)
            .unwrap();
        assert_eq!(docs[0].get("age"), Some(&Value::Int(37)));
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let mut session = seeded();

        session.execute("BEGIN").unwrap();
        session.execute("INSERT INTO people VALUES {name: 'Margaret'}").unwrap();
        // Visible inside the transaction
        assert_eq!(names(&mut session, "SELECT $ FROM people").len(), 4);
        session.execute("ROLLBACK").unwrap();
        assert_eq!(names(&mut session, "SELECT $ FROM people").len(), 3);

        session.execute("BEGIN TRANSACTION").unwrap();
        session.execute("INSERT INTO people VALUES {name: 'Margaret'}").unwrap();
        session.execute("COMMIT").unwrap();
        assert_eq!(names(&mut session, "SELECT $ FROM people").len(), 4);
    }

    #[test]
    fn test_transaction_misuse_is_an_error() {
        let mut session = seeded();
        assert!(matches!(session.commit(), Err(VellumError::NoTransaction)));
        assert!(matches!(session.rollback(), Err(VellumError::NoTransaction)));
        session.begin().unwrap();
        assert!(matches!(session.begin(), Err(VellumError::TransactionActive)));
        session.rollback().unwrap();
    }

    #[test]
    fn test_checkpoint_inside_transaction_flushes_committed_only() {
        let mut session = seeded();
        session.execute("BEGIN").unwrap();
        session.execute("INSERT INTO people VALUES {name: 'Staged'}").unwrap();
        session.checkpoint().unwrap();
        session.execute("ROLLBACK").unwrap();

        let mut reopened = MemorySession::open_bytes(session.into_bytes().unwrap()).unwrap();
        let all = names(&mut reopened, "SELECT $ FROM people");
        assert_eq!(all.len(), 3);
        assert!(!all.contains(&"Staged".to_string()));
    }

    #[test]
    fn test_rebuild_compacts_dead_entries() {
        let mut session = seeded();
        session.execute("UPDATE people SET age = 99").unwrap();
        session.execute("DELETE FROM people WHERE name != 'Ada'").unwrap();
        session.checkpoint().unwrap();

        let before = session.info().store_len;
        let delta = session.rebuild(RebuildOptions::default()).unwrap();
        assert!(delta > 0, "expected the file to shrink, delta was {delta}");
        assert_eq!(session.info().store_len, before - delta as u64);

        let mut reopened = MemorySession::open_bytes(session.into_bytes().unwrap()).unwrap();
        assert_eq!(names(&mut reopened, "SELECT $ FROM people"), vec!["Ada"]);
    }

    #[test]
    fn test_rebuild_changes_collation() {
        let mut session = seeded();
        assert_eq!(names(&mut session, "SELECT $ FROM people WHERE name = 'ada'").len(), 0);

        session.rebuild(RebuildOptions { collation: Some(Collation::NoCase) }).unwrap();
        assert_eq!(session.collation(), Collation::NoCase);
        assert_eq!(names(&mut session, "SELECT $ FROM people WHERE name = 'ada'").len(), 1);

        // The new collation is in the header
        let reopened = MemorySession::open_bytes(session.into_bytes().unwrap()).unwrap();
        assert_eq!(reopened.collation(), Collation::NoCase);
    }

    #[test]
    fn test_rebuild_collation_collision_aborts() {
        let mut session = MemorySession::open_memory().unwrap();
        session
            .execute("INSERT INTO c VALUES {_id: 'Ada'}, {_id: 'ada'}")
            .unwrap();
        let err = session
            .rebuild(RebuildOptions { collation: Some(Collation::NoCase) })
            .unwrap_err();
        assert!(matches!(err, VellumError::DuplicateKey(_, _)));
        // Nothing was lost
        assert_eq!(session.catalog().get("c").unwrap().len(), 2);
        assert_eq!(session.collation(), Collation::Binary);
    }

    #[test]
    fn test_rebuild_refused_inside_transaction() {
        let mut session = seeded();
        session.begin().unwrap();
        assert!(matches!(
            session.rebuild(RebuildOptions::default()),
            Err(VellumError::TransactionActive)
        ));
    }

    #[test]
    fn test_user_version_pragma_persists() {
        let mut session = seeded();
        assert_eq!(scalar(&mut session, "PRAGMA USER_VERSION"), Value::Int(0));

        session.execute("PRAGMA USER_VERSION = 7").unwrap();
        assert!(session.has_unsaved_changes());
        session.checkpoint().unwrap();

        let mut reopened = MemorySession::open_bytes(session.into_bytes().unwrap()).unwrap();
        assert_eq!(scalar(&mut reopened, "PRAGMA user_version"), Value::Int(7));
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut session = seeded();
        let bytes = session.export_collection("people").unwrap();

        let mut other = MemorySession::open_memory().unwrap();
        let imported = other.import_collection("people", &bytes).unwrap();
        assert_eq!(imported, 3);
        assert_eq!(names(&mut other, "SELECT $ FROM people ORDER BY name").len(), 3);

        assert!(session.export_collection("missing").is_err());
    }

    #[test]
    fn test_import_atomicity_on_bad_payload() {
        let mut session = MemorySession::open_memory().unwrap();
        let err = session.import_collection("c", br#"[{"a": 1}, 42]"#).unwrap_err();
        assert!(matches!(err, VellumError::Format(_)));
        assert!(!session.catalog().contains("c"));
    }

    #[test]
    fn test_virtual_collections() {
        let mut session = seeded();
        let docs = session
            .execute("SELECT $ FROM $database")
            .unwrap()
            .collect_documents(10)
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("collections"), Some(&Value::Int(1)));
        assert_eq!(docs[0].get("documents"), Some(&Value::Int(3)));

        let docs = session
            .execute("SELECT $ FROM $cols")
            .unwrap()
            .collect_documents(10)
            .unwrap();
        assert_eq!(docs[0].get("name"), Some(&Value::String("people".into())));

        let docs = session
            .execute("SELECT $ FROM $indexes WHERE collection = 'people'")
            .unwrap()
            .collect_documents(10)
            .unwrap();
        assert_eq!(docs[0].get("unique"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_select_into_collection() {
        let mut session = seeded();
        assert_eq!(
            scalar(&mut session, "SELECT $ INTO adults FROM people WHERE age >= 30"),
            Value::Int(2)
        );
        assert_eq!(session.catalog().get("adults").unwrap().len(), 2);

        // Target must not already exist
        assert!(matches!(
            session.execute("SELECT $ INTO adults FROM people"),
            Err(VellumError::CollectionExists(_))
        ));
    }

    #[test]
    fn test_analyze_populates_stats() {
        let mut session = seeded();
        let stats = session.analyze("people").unwrap();
        assert_eq!(stats.documents, 3);
        assert!(session.catalog().get("people").unwrap().stats().is_some());
        assert!(session.analyze("missing").is_err());
    }

    #[test]
    fn test_rename_and_drop_via_sql() {
        let mut session = seeded();
        session.execute("RENAME COLLECTION people TO humans").unwrap();
        assert_eq!(session.collection_names(), vec!["humans"]);
        session.execute("DROP COLLECTION humans").unwrap();
        assert!(session.catalog().is_empty());
        assert!(matches!(
            session.execute("DROP COLLECTION humans"),
            Err(VellumError::UnknownCollection(_))
        ));
    }

    #[test]
    fn test_duplicate_insert_batch_is_atomic() {
        let mut session = MemorySession::open_memory().unwrap();
        let err = session
            .execute("INSERT INTO c VALUES {_id: 1}, {_id: 2}, {_id: 1}")
            .unwrap_err();
        assert!(matches!(err, VellumError::DuplicateKey(_, _)));
        // The whole batch was rejected, including the collection create
        assert!(!session.catalog().contains("c"));
    }
}
