//! Query language
//!
//! A small SQL dialect over documents: SELECT with paths and
//! expressions, the write statements, and the maintenance verbs
//! (ANALYZE, REBUILD, CHECKPOINT, PRAGMA). [`parse`] produces a
//! [`Statement`]; the session hands it to the executor.

pub mod ast;
pub mod eval;
pub mod exec;
pub mod lex;
pub mod parse;

pub use ast::Statement;
pub use exec::ResultCursor;
pub use parse::parse;
