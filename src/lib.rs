mod codec;
mod repl;
mod storage;

pub use codec::{display_fields, Codec, Field, FieldFormat};
pub use repl::*;
pub use storage::{
    Cursor, CursorConfig, CursorError, CursorState, Database, Exact, MemStore, OrderedStore,
    Record, Relation, Result, Stat, StatCursor, StatEntry, Stats, Table, TableConfig, TableCursor,
};

macro_rules! calculate_offsets {
    ($start:ident, $size:ident) => {{
        let start = $start;
        let end = start + $size;
        (start, end)
    }};
}

pub(crate) use calculate_offsets;
