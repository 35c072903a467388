use super::session::Session;
use crate::storage::Result;

/// Commands that are not part of the database DSL.
///
/// These commands mostly control what the REPL session does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    /// Close the current REPL session
    Exit,
    /// Lists the tables in the database
    Tables,
    /// Prints the key and value formats of the open cursor
    Formats,
}

impl MetaCommand {
    pub fn execute(&self, session: &Session) -> Result<Vec<String>> {
        match self {
            // The REPL loop stops on exit before executing anything
            Self::Exit => Ok(Vec::new()),
            Self::Tables => session.database().table_names(),
            Self::Formats => match session.cursor() {
                Some(cursor) => Ok(vec![
                    format!("uri: {}", cursor.uri()),
                    format!("key_format: {}", cursor.key_format()),
                    format!("value_format: {}", cursor.value_format()),
                ]),
                None => Ok(vec!["no open cursor".to_string()]),
            },
        }
    }
}

impl TryInto<MetaCommand> for &str {
    type Error = String;

    fn try_into(self) -> std::result::Result<MetaCommand, Self::Error> {
        match self {
            ".exit" => Ok(MetaCommand::Exit),
            ".tables" => Ok(MetaCommand::Tables),
            ".formats" => Ok(MetaCommand::Formats),
            _ => Err(format!("unknown command `{self}`.")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn parses_meta_commands() {
        let cmd: std::result::Result<MetaCommand, _> = ".tables".try_into();
        assert_eq!(cmd, Ok(MetaCommand::Tables));
        let cmd: std::result::Result<MetaCommand, _> = ".schema".try_into();
        assert!(cmd.is_err());
    }

    #[test]
    fn lists_tables_and_formats() {
        let db = Database::new();
        db.create("table:b", "").unwrap();
        db.create("table:a", "key_format=r,value_format=Si").unwrap();
        let mut session = Session::new(&db);

        assert_eq!(MetaCommand::Tables.execute(&session).unwrap(), vec!["a", "b"]);
        assert_eq!(
            MetaCommand::Formats.execute(&session).unwrap(),
            vec!["no open cursor"]
        );

        session
            .execute(crate::storage::statement::Statement::Open {
                uri: "table:a".into(),
                config: String::new(),
            })
            .unwrap();
        assert_eq!(
            MetaCommand::Formats.execute(&session).unwrap(),
            vec!["uri: table:a", "key_format: r", "value_format: Si"]
        );
        session.close().unwrap();
    }
}
