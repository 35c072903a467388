use log::debug;

use crate::codec::display_fields;
use crate::storage::{statement::Statement, Cursor, CursorError, Database, Result};

/// One REPL session: the database and the cursor statements run against.
pub struct Session<'db> {
    db: &'db Database,
    cursor: Option<Cursor<'db>>,
}

impl<'db> Session<'db> {
    pub fn new(db: &'db Database) -> Self {
        Self { db, cursor: None }
    }

    pub fn database(&self) -> &'db Database {
        self.db
    }

    pub fn cursor(&self) -> Option<&Cursor<'db>> {
        self.cursor.as_ref()
    }

    fn cursor_mut(&mut self) -> Result<&mut Cursor<'db>> {
        self.cursor
            .as_mut()
            .ok_or_else(|| CursorError::invalid_state("no open cursor"))
    }

    /// Runs a statement and returns the lines it prints.
    pub fn execute(&mut self, statement: Statement) -> Result<Vec<String>> {
        debug!("executing {statement:?}");

        let mut out = Vec::new();
        match statement {
            Statement::Create { uri, config } => self.db.create(&uri, &config)?,
            Statement::Drop { uri } => self.db.drop_table(&uri)?,
            Statement::Open { uri, config } => {
                self.close()?;
                let cursor = self.db.open_cursor(&uri, &config)?;
                out.push(format!(
                    "opened {} ({} => {})",
                    cursor.uri(),
                    cursor.key_format(),
                    cursor.value_format()
                ));
                self.cursor = Some(cursor);
            }
            Statement::Close => {
                if self.cursor.is_none() {
                    return Err(CursorError::invalid_state("no open cursor"));
                }
                self.close()?;
            }
            Statement::Key(text) => self.cursor_mut()?.set_key_text(&text)?,
            Statement::Value(text) => self.cursor_mut()?.set_value_text(&text)?,
            Statement::Next => {
                self.cursor_mut()?.next()?;
                out.push(self.current()?);
            }
            Statement::Prev => {
                self.cursor_mut()?.prev()?;
                out.push(self.current()?);
            }
            Statement::Reset => self.cursor_mut()?.reset()?,
            Statement::Search => {
                self.cursor_mut()?.search()?;
                out.push(self.current()?);
            }
            Statement::Near => {
                let exact = self.cursor_mut()?.search_near()?;
                out.push(format!("{exact} {}", self.current()?));
            }
            Statement::Insert => {
                self.cursor_mut()?.insert()?;
                out.push(self.current()?);
            }
            Statement::Update => {
                self.cursor_mut()?.update()?;
                out.push(self.current()?);
            }
            Statement::Remove => self.cursor_mut()?.remove()?,
            Statement::Scan => out = self.scan(false)?,
            Statement::ReverseScan => out = self.scan(true)?,
        }

        Ok(out)
    }

    /// Closes the session cursor, if any
    pub fn close(&mut self) -> Result<()> {
        match self.cursor.take() {
            Some(mut cursor) => cursor.close(),
            None => Ok(()),
        }
    }

    fn current(&self) -> Result<String> {
        let cursor = self
            .cursor
            .as_ref()
            .ok_or_else(|| CursorError::invalid_state("no open cursor"))?;
        Ok(format!(
            "{} => {}",
            display_fields(&cursor.get_key()?),
            display_fields(&cursor.get_value()?)
        ))
    }

    fn scan(&mut self, reverse: bool) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        self.cursor_mut()?.reset()?;

        loop {
            let cursor = self.cursor_mut()?;
            let step = if reverse { cursor.prev() } else { cursor.next() };
            match step {
                Ok(()) => lines.push(self.current()?),
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e),
            }
        }

        self.cursor_mut()?.reset()?;
        Ok(lines)
    }
}
