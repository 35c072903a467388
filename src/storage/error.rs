/// Errors returned by cursor, codec and store operations.
///
/// Every kind is distinguishable so callers can branch on the outcome before reading any staged
/// data. [NotFound](CursorError::NotFound) is an ordinary outcome of a search or traversal, not a
/// fault; see [is_not_found](CursorError::is_not_found).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// The searched, traversed or removed record does not exist
    #[error("not found")]
    NotFound,

    /// Insert without overwrite hit an existing key
    #[error("duplicate key")]
    DuplicateKey,

    /// The operation requires a cursor state the cursor is not in
    #[error("invalid cursor state; {0}")]
    InvalidState(String),

    /// The cursor was used after close
    #[error("cursor is closed")]
    ClosedCursor,

    /// A codec could not encode or decode a field sequence
    #[error("format error; {0}")]
    Format(String),

    /// The operation is not available on this cursor type
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Opaque failure surfaced from the ordered store
    #[error("store failure; {0}")]
    StoreFailure(String),

    /// The named table has not been created
    #[error("no such table `{0}`")]
    NoSuchTable(String),

    /// A table with the same name already exists
    #[error("table `{0}` already exists")]
    TableExists(String),

    /// Malformed URI or configuration string
    #[error("invalid configuration; {0}")]
    Config(String),
}

impl CursorError {
    /// Returns true when the error only reports a missing record
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub(crate) fn format(desc: impl Into<String>) -> Self {
        Self::Format(desc.into())
    }

    pub(crate) fn config(desc: impl Into<String>) -> Self {
        Self::Config(desc.into())
    }

    pub(crate) fn invalid_state(desc: impl Into<String>) -> Self {
        Self::InvalidState(desc.into())
    }
}

pub type Result<T> = std::result::Result<T, CursorError>;
