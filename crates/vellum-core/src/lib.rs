pub mod catalog;
pub mod document;
pub mod errors;
pub mod query;
pub mod session;
pub mod storage;

// Re-export the types a studio front end works with
pub use catalog::{Catalog, Collection, CollectionStats};
pub use document::{Collation, Document, Value};
pub use errors::{Result, VellumError};
pub use query::{ResultCursor, Statement};
pub use session::tabs::{QueryTab, TabSet, DEFAULT_MAX_RESULTS};
pub use session::{MemorySession, RebuildOptions, Session, SessionInfo};

// Re-export the store abstraction for callers generic over the backing file
pub use storage::file::StoreFile;
