use std::{cmp::Ordering, fmt::Display, sync::Arc};

use log::{debug, warn};

use super::{
    config::CursorConfig,
    stats::{Stat, StatCursor, Stats},
    table::{Table, TablePin},
    CursorError, Record, Relation, Result,
};
use crate::codec::{Codec, Field, FieldFormat};

/// Position state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Initial state, and the state after reset, remove or close
    Unpositioned,
    /// On a record; the staged key and value hold a copy of it
    Positioned,
    /// A traversal or search ran out of records; nothing is staged
    Exhausted,
}

/// End of the key space a traversal ran off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum End {
    Low,
    High,
}

/// Outcome of a successful [search_near](TableCursor::search_near)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exact {
    /// The search key itself was found
    Equal,
    /// The returned key sorts before the search key
    Smaller,
    /// The returned key sorts after the search key
    Larger,
}

impl From<Relation> for Exact {
    fn from(value: Relation) -> Self {
        match value {
            Relation::Equal => Self::Equal,
            Relation::Smaller => Self::Smaller,
            Relation::Larger => Self::Larger,
        }
    }
}

impl Display for Exact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::Equal => "equal",
            Self::Smaller => "smaller",
            Self::Larger => "larger",
        };

        write!(f, "{}", msg)
    }
}

// Encoded bytes plus the fields they decode to
#[derive(Debug, Clone)]
struct Staged {
    raw: Vec<u8>,
    fields: Vec<Field>,
}

impl Staged {
    fn encode(codec: &Codec, fields: &[Field]) -> Result<Self> {
        let raw = codec.encode(fields)?;
        // Decoding again normalizes fields the codec truncates or pads
        let fields = codec.decode(&raw)?;
        Ok(Self { raw, fields })
    }
}

/// Cursor over one table.
///
/// Staged keys and values are copies: once the cursor lands on a record, later writes through
/// other cursors do not change what [get_key](TableCursor::get_key) and
/// [get_value](TableCursor::get_value) return until the cursor moves again.
///
/// A cursor is not meant to be shared between threads; every operation takes `&mut self`.
pub struct TableCursor<'a> {
    uri: String,
    pin: Option<TablePin<'a>>,
    key_codec: Codec,
    // Codec of the values this cursor exposes; the projected view when a projection is set
    value_codec: Codec,
    projection: Option<Vec<usize>>,
    config: CursorConfig,
    state: CursorState,
    // Raw key of the record the cursor last landed on
    position: Option<Vec<u8>>,
    key: Option<Staged>,
    // The staged key was allocated by an insert rather than set by the caller
    key_allocated: bool,
    value: Option<Staged>,
    // Set when a traversal ran off an end; None after a search miss
    exhausted_at: Option<End>,
}

impl<'a> TableCursor<'a> {
    pub(crate) fn new(
        uri: &str,
        pin: TablePin<'a>,
        projection: Option<(Vec<usize>, Codec)>,
        config: CursorConfig,
    ) -> Self {
        let table = pin.table();
        let key_codec = table.key_codec().clone();
        let (projection, value_codec) = match projection {
            Some((indices, codec)) => (Some(indices), codec),
            None => (None, table.value_codec().clone()),
        };

        Self {
            uri: uri.to_string(),
            pin: Some(pin),
            key_codec,
            value_codec,
            projection,
            config,
            state: CursorState::Unpositioned,
            position: None,
            key: None,
            key_allocated: false,
            value: None,
            exhausted_at: None,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn config(&self) -> CursorConfig {
        self.config
    }

    pub fn is_closed(&self) -> bool {
        self.pin.is_none()
    }

    pub fn key_format(&self) -> String {
        self.key_codec.format_string()
    }

    pub fn value_format(&self) -> String {
        self.value_codec.format_string()
    }

    fn pin(&self) -> Result<&TablePin<'a>> {
        self.pin.as_ref().ok_or(CursorError::ClosedCursor)
    }

    fn table(&self) -> Result<Arc<Table>> {
        Ok(Arc::clone(self.pin()?.table()))
    }

    fn stats(&self) -> Result<&'a Stats> {
        Ok(self.pin()?.stats())
    }

    fn clear(&mut self) {
        self.position = None;
        self.key = None;
        self.key_allocated = false;
        self.value = None;
        self.exhausted_at = None;
    }

    fn exhaust(&mut self, end: Option<End>) -> Result<()> {
        debug!("cursor on `{}` exhausted at {end:?}", self.uri);
        self.clear();
        self.exhausted_at = end;
        self.state = CursorState::Exhausted;
        Err(CursorError::NotFound)
    }

    /// Decodes a stored value into the view this cursor exposes
    fn view_value(&self, table: &Table, stored: &[u8]) -> Result<Staged> {
        match &self.projection {
            None => Ok(Staged {
                fields: table.value_codec().decode(stored)?,
                raw: stored.to_vec(),
            }),
            Some(indices) => {
                let full = table.value_codec().decode(stored)?;
                let fields = indices
                    .iter()
                    .map(|i| {
                        full.get(*i).cloned().ok_or_else(|| {
                            CursorError::format(format!("projected column {i} missing"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Staged::encode(&self.value_codec, &fields)
            }
        }
    }

    /// Builds the full stored value for a write.
    ///
    /// Through a projection, unprojected columns keep the values of the existing record, or
    /// their zero value when there is none.
    fn stored_value(&self, table: &Table, key: Option<&[u8]>, staged: &Staged) -> Result<Vec<u8>> {
        let Some(indices) = &self.projection else {
            return Ok(staged.raw.clone());
        };

        let existing = match key {
            Some(key) => table.store().seek_exact(key)?,
            None => None,
        };
        let mut full = match existing {
            Some(bytes) => table.value_codec().decode(&bytes)?,
            None => table
                .value_codec()
                .formats()
                .iter()
                .map(FieldFormat::default_field)
                .collect(),
        };

        for (i, field) in indices.iter().zip(&staged.fields) {
            let slot = full
                .get_mut(*i)
                .ok_or_else(|| CursorError::format(format!("projected column {i} missing")))?;
            *slot = field.clone();
        }
        table.value_codec().encode(&full)
    }

    /// Moves onto `record`; nothing changes if the record fails to decode
    fn land(&mut self, table: &Table, (raw_key, stored): Record) -> Result<()> {
        let key_fields = self.key_codec.decode(&raw_key)?;
        let value = self.view_value(table, &stored)?;

        self.position = Some(raw_key.clone());
        self.key = Some(Staged {
            raw: raw_key,
            fields: key_fields,
        });
        self.key_allocated = false;
        self.value = Some(value);
        self.exhausted_at = None;
        self.state = CursorState::Positioned;
        Ok(())
    }

    fn key_bytes(&self) -> Result<&[u8]> {
        self.key
            .as_ref()
            .map(|k| k.raw.as_slice())
            .ok_or_else(|| CursorError::invalid_state("key not set"))
    }

    fn staged_key(&self) -> Result<Vec<u8>> {
        self.key_bytes().map(<[u8]>::to_vec)
    }

    fn check_writable(&self, op: &'static str) -> Result<()> {
        self.pin()?;
        if self.config.readonly {
            Err(CursorError::Unsupported(op))
        } else {
            Ok(())
        }
    }

    /// Moves to the next record; from [Unpositioned](CursorState::Unpositioned) to the first.
    ///
    /// Running off the high end returns [NotFound](CursorError::NotFound) and leaves the cursor
    /// [Exhausted](CursorState::Exhausted); further calls keep failing until a reset or a
    /// [prev](TableCursor::prev), which restarts from the last record. After a low end run-off
    /// or a search miss, next starts again from the first record.
    pub fn next(&mut self) -> Result<()> {
        let table = self.table()?;
        self.stats()?.incr(Stat::CursorNext);

        let found = match (self.state, &self.position, self.exhausted_at) {
            (CursorState::Positioned, Some(pos), _) => table.store().successor(pos)?,
            (CursorState::Exhausted, _, Some(End::High)) => None,
            _ => table.store().seek_first()?,
        };

        match found {
            Some(record) => self.land(&table, record),
            None => self.exhaust(Some(End::High)),
        }
    }

    /// Moves to the previous record; the mirror image of [next](TableCursor::next).
    pub fn prev(&mut self) -> Result<()> {
        let table = self.table()?;
        self.stats()?.incr(Stat::CursorPrev);

        let found = match (self.state, &self.position, self.exhausted_at) {
            (CursorState::Positioned, Some(pos), _) => table.store().predecessor(pos)?,
            (CursorState::Exhausted, _, Some(End::Low)) => None,
            _ => table.store().seek_last()?,
        };

        match found {
            Some(record) => self.land(&table, record),
            None => self.exhaust(Some(End::Low)),
        }
    }

    pub fn reset(&mut self) -> Result<()> {
        self.stats()?.incr(Stat::CursorReset);
        self.clear();
        self.state = CursorState::Unpositioned;
        Ok(())
    }

    /// Stages a key for the next search, insert, update or remove.
    ///
    /// The position is not changed: next and prev continue from the record the cursor is on.
    pub fn set_key(&mut self, fields: &[Field]) -> Result<()> {
        self.pin()?;
        self.key = Some(Staged::encode(&self.key_codec, fields)?);
        self.key_allocated = false;
        Ok(())
    }

    /// Stages a value for the next insert or update
    pub fn set_value(&mut self, fields: &[Field]) -> Result<()> {
        self.pin()?;
        self.value = Some(Staged::encode(&self.value_codec, fields)?);
        Ok(())
    }

    /// Key of the current record
    pub fn get_key(&self) -> Result<Vec<Field>> {
        self.pin()?;
        match (&self.state, &self.key) {
            (CursorState::Positioned, Some(key)) => Ok(key.fields.clone()),
            _ => Err(CursorError::invalid_state("cursor is not positioned")),
        }
    }

    /// Value of the current record, in projection order if the cursor has one
    pub fn get_value(&self) -> Result<Vec<Field>> {
        self.pin()?;
        match (&self.state, &self.value) {
            (CursorState::Positioned, Some(value)) => Ok(value.fields.clone()),
            _ => Err(CursorError::invalid_state("cursor is not positioned")),
        }
    }

    /// Positions on the staged key.
    ///
    /// A miss clears the staged key and value, leaves the cursor
    /// [Exhausted](CursorState::Exhausted) and returns [NotFound](CursorError::NotFound).
    pub fn search(&mut self) -> Result<()> {
        let table = self.table()?;
        self.stats()?.incr(Stat::CursorSearch);
        let key = self.staged_key()?;

        match table.store().seek_exact(&key)? {
            Some(stored) => {
                let value = self.view_value(&table, &stored)?;
                self.position = Some(key);
                self.value = Some(value);
                self.state = CursorState::Positioned;
                Ok(())
            }
            None => self.exhaust(None),
        }
    }

    /// Positions on the staged key or its nearest neighbour.
    ///
    /// The staged key is replaced by the key actually found, so callers should read it back
    /// unless the result is [Equal](Exact::Equal). An empty table returns
    /// [NotFound](CursorError::NotFound).
    pub fn search_near(&mut self) -> Result<Exact> {
        let table = self.table()?;
        self.stats()?.incr(Stat::CursorSearchNear);
        let key = self.staged_key()?;

        match table.store().seek_nearest(&key)? {
            Some((record, relation)) => {
                self.land(&table, record)?;
                Ok(relation.into())
            }
            None => self.exhaust(None).map(|_| Exact::Equal),
        }
    }

    /// Inserts the staged key and value.
    ///
    /// Record number tables allocate a fresh key when `append` is configured or the caller has
    /// not staged a key, and the staged key is overwritten with it. A key left staged by an
    /// earlier allocation does not count, so repeated inserts keep allocating.
    ///
    /// Otherwise an existing key fails with [DuplicateKey](CursorError::DuplicateKey) unless
    /// `overwrite` is configured.
    pub fn insert(&mut self) -> Result<()> {
        self.check_writable("insert")?;
        let table = self.table()?;
        self.stats()?.incr(Stat::CursorInsert);

        let value = self
            .value
            .clone()
            .ok_or_else(|| CursorError::invalid_state("value not set"))?;

        let allocate = self.config.append || self.key.is_none() || self.key_allocated;
        let (key, allocated) = if self.key_codec.is_record_number() && allocate {
            let stored = self.stored_value(&table, None, &value)?;
            let recno = table.store().append(&stored)?;
            debug!("cursor on `{}` appended record {recno}", self.uri);
            (Staged::encode(&self.key_codec, &[Field::UInt(recno)])?, true)
        } else {
            let key = self
                .key
                .clone()
                .ok_or_else(|| CursorError::invalid_state("key not set"))?;
            let stored = self.stored_value(&table, Some(&key.raw), &value)?;

            if self.config.overwrite {
                table.store().put(&key.raw, &stored)?;
            } else if !table.store().insert_new(&key.raw, &stored)? {
                return Err(CursorError::DuplicateKey);
            }
            (key, false)
        };

        self.position = Some(key.raw.clone());
        self.key = Some(key);
        self.key_allocated = allocated;
        self.value = Some(value);
        self.state = CursorState::Positioned;
        Ok(())
    }

    /// Replaces the value of the positioned record with the staged value.
    ///
    /// Fails with [NotFound](CursorError::NotFound) when the record was removed since the
    /// cursor landed on it; the cursor state is left as it was.
    pub fn update(&mut self) -> Result<()> {
        self.check_writable("update")?;
        let table = self.table()?;
        self.stats()?.incr(Stat::CursorUpdate);

        if self.state != CursorState::Positioned {
            return Err(CursorError::invalid_state(
                "update requires a positioned cursor",
            ));
        }
        let key = self.staged_key()?;
        let value = self
            .value
            .as_ref()
            .ok_or_else(|| CursorError::invalid_state("value not set"))?;

        let stored = self.stored_value(&table, Some(&key), value)?;
        if !table.store().replace(&key, &stored)? {
            return Err(CursorError::NotFound);
        }

        self.position = Some(key);
        Ok(())
    }

    /// Removes the record under the staged key.
    ///
    /// On success the cursor is [Unpositioned](CursorState::Unpositioned) with nothing staged,
    /// so the next [next](TableCursor::next) starts again from the first record.
    pub fn remove(&mut self) -> Result<()> {
        self.check_writable("remove")?;
        let table = self.table()?;
        self.stats()?.incr(Stat::CursorRemove);
        let key = self.staged_key()?;

        if !table.store().delete(&key)? {
            return Err(CursorError::NotFound);
        }

        debug!("cursor on `{}` removed a record", self.uri);
        self.clear();
        self.state = CursorState::Unpositioned;
        Ok(())
    }

    /// Orders this cursor's staged key against `other`'s.
    ///
    /// Both cursors must be open on the same table, through any projection, and both must have
    /// a key staged or landed on.
    pub fn compare(&self, other: &TableCursor<'_>) -> Result<Ordering> {
        let (mine, theirs) = (self.pin()?.table(), other.pin()?.table());
        if !Arc::ptr_eq(mine, theirs) {
            return Err(CursorError::config(format!(
                "cannot compare cursors on `{}` and `{}`",
                self.uri, other.uri
            )));
        }

        // Key encodings preserve order, so raw bytes compare like the keys
        Ok(self.key_bytes()?.cmp(other.key_bytes()?))
    }

    pub fn equals(&self, other: &TableCursor<'_>) -> Result<bool> {
        Ok(self.compare(other)? == Ordering::Equal)
    }

    /// Resets the cursor and changes its `overwrite` or `append` behaviour.
    ///
    /// Options not named in `config` keep their current value. `readonly` is fixed at open.
    pub fn reconfigure(&mut self, config: &str) -> Result<()> {
        self.pin()?;
        let mut updated = self.config;
        updated.apply(config)?;
        if updated.readonly != self.config.readonly {
            return Err(CursorError::config("`readonly` cannot be reconfigured"));
        }

        self.reset()?;
        self.config = updated;
        debug!("reconfigured cursor on `{}`: {updated:?}", self.uri);
        Ok(())
    }

    /// Releases the table pin; closing an already closed cursor does nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(pin) = self.pin.take() {
            debug!("closing cursor on `{}`", self.uri);
            self.clear();
            self.state = CursorState::Unpositioned;
            drop(pin);
        }
        Ok(())
    }
}

impl Drop for TableCursor<'_> {
    fn drop(&mut self) {
        if self.pin.is_some() {
            warn!("cursor on `{}` dropped without close", self.uri);
        }
    }
}

/// A cursor returned by [Database::open_cursor](super::Database::open_cursor).
///
/// Table and statistics cursors share navigation; statistics cursors reject every operation that
/// stages or writes data with [Unsupported](CursorError::Unsupported).
pub enum Cursor<'a> {
    Table(TableCursor<'a>),
    Statistics(StatCursor),
}

fn unsupported<T>(cursor: &StatCursor, op: &'static str) -> Result<T> {
    if cursor.is_closed() {
        Err(CursorError::ClosedCursor)
    } else {
        Err(CursorError::Unsupported(op))
    }
}

impl<'a> Cursor<'a> {
    pub fn uri(&self) -> &str {
        match self {
            Self::Table(c) => c.uri(),
            Self::Statistics(_) => "statistics:",
        }
    }

    pub fn state(&self) -> CursorState {
        match self {
            Self::Table(c) => c.state(),
            Self::Statistics(c) => c.state(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Table(c) => c.is_closed(),
            Self::Statistics(c) => c.is_closed(),
        }
    }

    pub fn key_format(&self) -> String {
        match self {
            Self::Table(c) => c.key_format(),
            Self::Statistics(_) => "I".to_string(),
        }
    }

    pub fn value_format(&self) -> String {
        match self {
            Self::Table(c) => c.value_format(),
            Self::Statistics(_) => "SSQ".to_string(),
        }
    }

    /// Parses whitespace separated text with this cursor's key codec and stages it
    pub fn set_key_text(&mut self, text: &str) -> Result<()> {
        match self {
            Self::Table(c) => {
                let fields = c.key_codec.parse_text(text)?;
                c.set_key(&fields)
            }
            Self::Statistics(c) => unsupported(c, "set_key"),
        }
    }

    /// Parses whitespace separated text with this cursor's value codec and stages it
    pub fn set_value_text(&mut self, text: &str) -> Result<()> {
        match self {
            Self::Table(c) => {
                let fields = c.value_codec.parse_text(text)?;
                c.set_value(&fields)
            }
            Self::Statistics(c) => unsupported(c, "set_value"),
        }
    }

    pub fn next(&mut self) -> Result<()> {
        match self {
            Self::Table(c) => c.next(),
            Self::Statistics(c) => c.next(),
        }
    }

    pub fn prev(&mut self) -> Result<()> {
        match self {
            Self::Table(c) => c.prev(),
            Self::Statistics(c) => c.prev(),
        }
    }

    pub fn reset(&mut self) -> Result<()> {
        match self {
            Self::Table(c) => c.reset(),
            Self::Statistics(c) => c.reset(),
        }
    }

    pub fn set_key(&mut self, fields: &[Field]) -> Result<()> {
        match self {
            Self::Table(c) => c.set_key(fields),
            Self::Statistics(c) => unsupported(c, "set_key"),
        }
    }

    pub fn set_value(&mut self, fields: &[Field]) -> Result<()> {
        match self {
            Self::Table(c) => c.set_value(fields),
            Self::Statistics(c) => unsupported(c, "set_value"),
        }
    }

    pub fn get_key(&self) -> Result<Vec<Field>> {
        match self {
            Self::Table(c) => c.get_key(),
            Self::Statistics(c) => c.get_key(),
        }
    }

    pub fn get_value(&self) -> Result<Vec<Field>> {
        match self {
            Self::Table(c) => c.get_value(),
            Self::Statistics(c) => c.get_value(),
        }
    }

    pub fn search(&mut self) -> Result<()> {
        match self {
            Self::Table(c) => c.search(),
            Self::Statistics(c) => unsupported(c, "search"),
        }
    }

    pub fn search_near(&mut self) -> Result<Exact> {
        match self {
            Self::Table(c) => c.search_near(),
            Self::Statistics(c) => unsupported(c, "search_near"),
        }
    }

    pub fn insert(&mut self) -> Result<()> {
        match self {
            Self::Table(c) => c.insert(),
            Self::Statistics(c) => unsupported(c, "insert"),
        }
    }

    pub fn update(&mut self) -> Result<()> {
        match self {
            Self::Table(c) => c.update(),
            Self::Statistics(c) => unsupported(c, "update"),
        }
    }

    pub fn remove(&mut self) -> Result<()> {
        match self {
            Self::Table(c) => c.remove(),
            Self::Statistics(c) => unsupported(c, "remove"),
        }
    }

    pub fn compare(&self, other: &Cursor<'_>) -> Result<Ordering> {
        match (self, other) {
            (Self::Table(a), Cursor::Table(b)) => a.compare(b),
            (Self::Statistics(c), _) | (_, Cursor::Statistics(c)) => unsupported(c, "compare"),
        }
    }

    pub fn equals(&self, other: &Cursor<'_>) -> Result<bool> {
        Ok(self.compare(other)? == Ordering::Equal)
    }

    pub fn reconfigure(&mut self, config: &str) -> Result<()> {
        match self {
            Self::Table(c) => c.reconfigure(config),
            Self::Statistics(c) => unsupported(c, "reconfigure"),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            Self::Table(c) => c.close(),
            Self::Statistics(c) => {
                c.close();
                Ok(())
            }
        }
    }
}
