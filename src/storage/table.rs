use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use log::{debug, info};

use super::{
    config::{CursorConfig, TableConfig},
    cursor::{Cursor, TableCursor},
    stats::{Stat, StatCursor, StatEntry, Stats},
    store::MemStore,
    CursorError, OrderedStore, Result,
};
use crate::codec::Codec;

/// A named table: its resolved codecs, column names and the store holding its records.
pub struct Table {
    name: String,
    key_codec: Codec,
    value_codec: Codec,
    columns: Vec<String>,
    store: Box<dyn OrderedStore>,
    open_cursors: AtomicUsize,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("key_format", &self.key_codec.format_string())
            .field("value_format", &self.value_codec.format_string())
            .field("columns", &self.columns)
            .finish()
    }
}

impl Table {
    /// Creates a table backed by a fresh [MemStore]
    pub fn new(name: &str, config: &TableConfig) -> Result<Self> {
        Self::with_store(name, config, Box::new(MemStore::new()))
    }

    /// Creates a table on top of an already open store
    pub fn with_store(
        name: &str,
        config: &TableConfig,
        store: Box<dyn OrderedStore>,
    ) -> Result<Self> {
        let key_codec = Codec::key(&config.key_format)?;
        let value_codec = Codec::value(&config.value_format)?;

        if !config.columns.is_empty() {
            let expected = key_codec.num_fields() + value_codec.num_fields();
            if config.columns.len() != expected {
                return Err(CursorError::config(format!(
                    "table `{name}` has {expected} fields but {} column names",
                    config.columns.len()
                )));
            }
            for (i, col) in config.columns.iter().enumerate() {
                if config.columns[..i].contains(col) {
                    return Err(CursorError::config(format!("duplicate column `{col}`")));
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            key_codec,
            value_codec,
            columns: config.columns.clone(),
            store,
            open_cursors: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_codec(&self) -> &Codec {
        &self.key_codec
    }

    pub fn value_codec(&self) -> &Codec {
        &self.value_codec
    }

    pub fn store(&self) -> &dyn OrderedStore {
        self.store.as_ref()
    }

    /// Names of the value columns, empty when the table was created without `columns`
    pub fn value_columns(&self) -> &[String] {
        if self.columns.is_empty() {
            &[]
        } else {
            &self.columns[self.key_codec.num_fields()..]
        }
    }

    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::Acquire)
    }

    /// Resolves a column projection to value field indices and the codec of the projected view.
    pub fn projection(&self, names: &[String]) -> Result<(Vec<usize>, Codec)> {
        let value_columns = self.value_columns();
        if value_columns.is_empty() {
            return Err(CursorError::config(format!(
                "table `{}` has no named columns to project",
                self.name
            )));
        }
        if names.is_empty() {
            return Err(CursorError::config("empty projection"));
        }

        let formats = self.value_codec.formats();
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let idx = value_columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| {
                    CursorError::config(format!(
                        "`{name}` is not a value column of table `{}`",
                        self.name
                    ))
                })?;
            if indices.contains(&idx) {
                return Err(CursorError::config(format!(
                    "column `{name}` projected twice"
                )));
            }
            indices.push(idx);
        }

        let projected = indices.iter().map(|i| formats[*i]).collect();
        Ok((indices, Codec::from_formats(projected)))
    }
}

/// Keeps a table alive and counted as in use while a cursor is open.
///
/// Dropping the pin is the only way a cursor gives up its table, so the release happens on
/// close, on error paths and when the cursor itself is dropped.
pub struct TablePin<'a> {
    table: Arc<Table>,
    stats: &'a Stats,
}

impl<'a> TablePin<'a> {
    pub(crate) fn new(table: Arc<Table>, stats: &'a Stats) -> Self {
        table.open_cursors.fetch_add(1, Ordering::AcqRel);
        stats.incr(Stat::CursorOpen);
        Self { table, stats }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn stats(&self) -> &'a Stats {
        self.stats
    }
}

impl Drop for TablePin<'_> {
    fn drop(&mut self) {
        self.table.open_cursors.fetch_sub(1, Ordering::AcqRel);
        self.stats.decr(Stat::CursorOpen);
        self.stats.incr(Stat::CursorClose);
        debug!("released pin on table `{}`", self.table.name);
    }
}

/// A cursor target parsed from a URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uri {
    /// `table:<name>` or `table:<name>(col,...)`
    Table {
        name: String,
        projection: Option<Vec<String>>,
    },
    /// `statistics:`
    Statistics,
}

impl Uri {
    pub fn parse(uri: &str) -> Result<Self> {
        if uri == "statistics:" {
            return Ok(Self::Statistics);
        }

        let rest = uri
            .strip_prefix("table:")
            .ok_or_else(|| CursorError::config(format!("unsupported uri `{uri}`")))?;

        let (name, projection) = match rest.find('(') {
            Some(open) => {
                let cols = rest[open + 1..].strip_suffix(')').ok_or_else(|| {
                    CursorError::config(format!("unclosed projection in `{uri}`"))
                })?;
                let cols = cols
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect();
                (&rest[..open], Some(cols))
            }
            None => (rest, None),
        };

        if name.is_empty() || name.contains([')', ',', ' ']) {
            return Err(CursorError::config(format!("invalid table name in `{uri}`")));
        }

        Ok(Self::Table {
            name: name.to_string(),
            projection,
        })
    }
}

/// Catalog of tables plus the engine counters; the entry point for opening cursors.
#[derive(Debug, Default)]
pub struct Database {
    tables: RwLock<HashMap<String, Arc<Table>>>,
    stats: Stats,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `table:<name>` with a `key_format=..,value_format=..,columns=(..)` config
    pub fn create(&self, uri: &str, config: &str) -> Result<()> {
        let name = match Uri::parse(uri)? {
            Uri::Table {
                name,
                projection: None,
            } => name,
            _ => return Err(CursorError::config(format!("cannot create `{uri}`"))),
        };
        let table = Table::new(&name, &TableConfig::parse(config)?)?;
        self.attach(table)
    }

    /// Registers a table built by the caller, for example one over a custom store
    pub fn attach(&self, table: Table) -> Result<()> {
        let mut tables = self.tables_mut()?;
        if tables.contains_key(table.name()) {
            return Err(CursorError::TableExists(table.name().to_string()));
        }

        info!("created table `{}`; {table:?}", table.name());
        tables.insert(table.name().to_string(), Arc::new(table));
        self.stats.incr(Stat::TableCreate);
        Ok(())
    }

    /// Drops a table; fails while cursors are open on it
    pub fn drop_table(&self, uri: &str) -> Result<()> {
        let name = match Uri::parse(uri)? {
            Uri::Table {
                name,
                projection: None,
            } => name,
            _ => return Err(CursorError::config(format!("cannot drop `{uri}`"))),
        };

        let mut tables = self.tables_mut()?;
        let table = tables
            .get(&name)
            .ok_or_else(|| CursorError::NoSuchTable(name.clone()))?;
        if table.open_cursors() > 0 {
            return Err(CursorError::invalid_state(format!(
                "table `{name}` has {} open cursors",
                table.open_cursors()
            )));
        }

        tables.remove(&name);
        self.stats.incr(Stat::TableDrop);
        info!("dropped table `{name}`");
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .map_err(|e| CursorError::StoreFailure(format!("catalog lock poisoned; {e}")))?
            .get(name)
            .cloned()
            .ok_or_else(|| CursorError::NoSuchTable(name.to_string()))
    }

    /// Names of all tables in ascending order
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .map_err(|e| CursorError::StoreFailure(format!("catalog lock poisoned; {e}")))?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Opens a cursor on `table:<name>`, `table:<name>(cols)` or `statistics:`.
    ///
    /// `config` takes `overwrite`, `append` and `readonly`; pass `""` for defaults.
    pub fn open_cursor(&self, uri: &str, config: &str) -> Result<Cursor<'_>> {
        let config = CursorConfig::parse(config)?;

        let cursor = match Uri::parse(uri)? {
            Uri::Statistics => Cursor::Statistics(StatCursor::new(self.statistics()?)),
            Uri::Table { name, projection } => {
                let table = self.table(&name)?;
                let projection = match projection {
                    Some(cols) => Some(table.projection(&cols)?),
                    None => None,
                };
                let pin = TablePin::new(table, &self.stats);
                Cursor::Table(TableCursor::new(uri, pin, projection, config))
            }
        };

        self.stats.incr(Stat::CursorCreate);
        debug!("opened cursor on `{uri}`");
        Ok(cursor)
    }

    /// Captures the current counters, refreshing the gauges first
    pub fn statistics(&self) -> Result<Vec<StatEntry>> {
        let tables = self
            .tables
            .read()
            .map_err(|e| CursorError::StoreFailure(format!("catalog lock poisoned; {e}")))?;

        let mut records = 0;
        for table in tables.values() {
            records += table.store().len()?;
        }
        self.stats.set(Stat::TableCount, tables.len() as u64);
        self.stats.set(Stat::RecordCount, records as u64);

        Ok(self.stats.snapshot())
    }

    fn tables_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Table>>>> {
        self.tables
            .write()
            .map_err(|e| CursorError::StoreFailure(format!("catalog lock poisoned; {e}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_uris() {
        assert_eq!(Uri::parse("statistics:").unwrap(), Uri::Statistics);
        assert_eq!(
            Uri::parse("table:map").unwrap(),
            Uri::Table {
                name: "map".into(),
                projection: None
            }
        );
        assert_eq!(
            Uri::parse("table:world(country, population)").unwrap(),
            Uri::Table {
                name: "world".into(),
                projection: Some(vec!["country".into(), "population".into()])
            }
        );
        assert!(Uri::parse("file:map.ae").is_err());
        assert!(Uri::parse("table:").is_err());
        assert!(Uri::parse("table:world(country").is_err());
    }

    #[test]
    fn column_count_must_match() {
        let cfg = TableConfig::parse("key_format=r,value_format=5sii,columns=(id,country)")
            .unwrap();
        assert!(Table::new("world", &cfg).is_err());

        let cfg = TableConfig::parse("key_format=S,value_format=SS,columns=(k,a,a)").unwrap();
        assert!(Table::new("dup", &cfg).is_err());
    }

    #[test]
    fn projections() {
        let cfg = TableConfig::parse(
            "key_format=r,value_format=5sii,columns=(id,country,population,area)",
        )
        .unwrap();
        let table = Table::new("world", &cfg).unwrap();
        assert_eq!(table.value_columns(), ["country", "population", "area"]);

        let (indices, codec) = table
            .projection(&["population".into(), "country".into()])
            .unwrap();
        assert_eq!(indices, vec![1, 0]);
        assert_eq!(codec.format_string(), "i5s");

        assert!(table.projection(&["id".into()]).is_err());
        assert!(table.projection(&["area".into(), "area".into()]).is_err());
    }

    #[test]
    fn catalog() {
        let db = Database::new();
        db.create("table:b", "key_format=S,value_format=S").unwrap();
        db.create("table:a", "").unwrap();
        assert_eq!(
            db.create("table:a", ""),
            Err(CursorError::TableExists("a".into()))
        );
        assert_eq!(db.table_names().unwrap(), vec!["a", "b"]);

        assert!(matches!(
            db.open_cursor("table:missing", ""),
            Err(CursorError::NoSuchTable(_))
        ));

        db.drop_table("table:a").unwrap();
        assert_eq!(
            db.drop_table("table:a"),
            Err(CursorError::NoSuchTable("a".into()))
        );
    }

    #[test]
    fn open_cursors_block_drop() {
        let db = Database::new();
        db.create("table:map", "key_format=S,value_format=S").unwrap();

        let mut cursor = db.open_cursor("table:map", "").unwrap();
        assert_eq!(db.table("map").unwrap().open_cursors(), 1);
        assert!(matches!(
            db.drop_table("table:map"),
            Err(CursorError::InvalidState(_))
        ));

        cursor.close().unwrap();
        assert_eq!(db.table("map").unwrap().open_cursors(), 0);
        db.drop_table("table:map").unwrap();
    }

    #[test]
    fn dropped_cursor_releases_pin() {
        let db = Database::new();
        db.create("table:map", "").unwrap();
        {
            let _cursor = db.open_cursor("table:map", "").unwrap();
            assert_eq!(db.stats().get(Stat::CursorOpen), 1);
        }
        assert_eq!(db.stats().get(Stat::CursorOpen), 0);
        assert_eq!(db.stats().get(Stat::CursorClose), 1);
        assert_eq!(db.table("map").unwrap().open_cursors(), 0);
    }

    #[test]
    fn oversized_format_counts_are_rejected() {
        let db = Database::new();
        assert!(matches!(
            db.create("table:big", "key_format=99999999999Q"),
            Err(CursorError::Config(_))
        ));
        assert!(matches!(
            db.create("table:wide", "value_format=70000s"),
            Err(CursorError::Config(_))
        ));
        assert!(db.table_names().unwrap().is_empty());
    }
}
