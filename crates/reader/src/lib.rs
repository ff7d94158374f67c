//! Unified read path over the hot row-store and the cold columnar store.
//!
//! Both stores are attached under schema aliases of one federation engine so
//! a single query can UNION them, tag each row with its source and
//! deduplicate by primary key with hot winning. Pagination is cursor-based
//! and stable over a frozen dataset.

mod cursor;
mod reader;

pub use self::{
    cursor::{Cursor, CursorError},
    reader::{AccountBalance, OperationRecord, Page, ReaderError, UnifiedReader},
};
