pub mod config;
pub mod cursor;
pub mod error;
pub mod stats;
pub mod statement;
pub mod store;
pub mod table;

pub use config::{CursorConfig, TableConfig};
pub use cursor::{Cursor, CursorState, Exact, TableCursor};
pub use error::{CursorError, Result};
pub use stats::{Stat, StatCursor, StatEntry, Stats};
pub use store::MemStore;
pub use table::{Database, Table};

/// A stored record; raw key bytes and raw value bytes
pub type Record = (Vec<u8>, Vec<u8>);

/// Where the record returned by [seek_nearest](OrderedStore::seek_nearest) sits relative to the
/// search key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    Smaller,
    Larger,
}

/// Sorted mapping from byte keys to byte values that cursors navigate.
///
/// Every call runs against a consistent snapshot of the store taken at call time. A call either
/// completes or fails with [StoreFailure](CursorError::StoreFailure); it never observes a half
/// applied mutation.
pub trait OrderedStore: Send + Sync {
    /// Returns the record with the smallest key
    fn seek_first(&self) -> Result<Option<Record>>;

    /// Returns the record with the largest key
    fn seek_last(&self) -> Result<Option<Record>>;

    /// Returns the value stored under exactly `key`
    fn seek_exact(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Returns the record matching `key`, or its nearest neighbour.
    ///
    /// An exact match always wins. Otherwise the smallest key above `key` is preferred and the
    /// largest key below it is returned only when nothing larger exists. `None` means the store
    /// is empty.
    fn seek_nearest(&self, key: &[u8]) -> Result<Option<(Record, Relation)>>;

    /// Returns the first record with a key strictly greater than `key`
    fn successor(&self, key: &[u8]) -> Result<Option<Record>>;

    /// Returns the last record with a key strictly less than `key`
    fn predecessor(&self, key: &[u8]) -> Result<Option<Record>>;

    /// Stores a record, returning the value it replaced
    fn put(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Removes a record, returning false when the key was absent
    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// Stores a record only when `key` is absent; returns false if it already existed.
    fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<bool>;

    /// Overwrites the value of an existing record; returns false if `key` is absent.
    fn replace(&self, key: &[u8], value: &[u8]) -> Result<bool>;

    /// Allocates the next record number and stores `value` under it.
    ///
    /// Record numbers are big-endian `u64` keys starting at 1. Allocation never hands out the
    /// same number twice for the life of the store, even when the highest record is removed.
    fn append(&self, value: &[u8]) -> Result<u64>;

    /// Number of records currently stored
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
