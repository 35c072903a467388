/// Database commands/statements, one per REPL line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `create <uri> [config]`
    Create { uri: String, config: String },
    /// `drop <uri>`
    Drop { uri: String },
    /// `open <uri> [config]`; replaces the session cursor
    Open { uri: String, config: String },
    Close,
    /// `key <fields..>`, parsed with the cursor's key format
    Key(String),
    /// `value <fields..>`, parsed with the cursor's value format
    Value(String),
    Next,
    Prev,
    Reset,
    Search,
    Near,
    Insert,
    Update,
    Remove,
    /// Prints every record in key order, leaving the cursor reset
    Scan,
    /// Prints every record in reverse key order, leaving the cursor reset
    ReverseScan,
}

impl TryInto<Statement> for &str {
    type Error = String;

    fn try_into(self) -> Result<Statement, Self::Error> {
        let input = self.trim();
        let (command, args) = match input.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args.trim()),
            None => (input, ""),
        };

        let no_args = |stmt: Statement| {
            if args.is_empty() {
                Ok(stmt)
            } else {
                Err(format!("`{command}` takes no arguments"))
            }
        };
        let uri_and_config = || match args.split_once(char::is_whitespace) {
            Some((uri, config)) => Ok((uri.to_string(), config.trim().to_string())),
            None if !args.is_empty() => Ok((args.to_string(), String::new())),
            None => Err(format!("`{command}` expects a uri")),
        };

        match command {
            "create" => {
                let (uri, config) = uri_and_config()?;
                Ok(Statement::Create { uri, config })
            }
            "drop" => {
                let (uri, config) = uri_and_config()?;
                if !config.is_empty() {
                    return Err(format!("unexpected `{config}` after uri"));
                }
                Ok(Statement::Drop { uri })
            }
            "open" => {
                let (uri, config) = uri_and_config()?;
                Ok(Statement::Open { uri, config })
            }
            "key" => Ok(Statement::Key(args.to_string())),
            "value" => Ok(Statement::Value(args.to_string())),
            "close" => no_args(Statement::Close),
            "next" => no_args(Statement::Next),
            "prev" => no_args(Statement::Prev),
            "reset" => no_args(Statement::Reset),
            "search" => no_args(Statement::Search),
            "near" => no_args(Statement::Near),
            "insert" => no_args(Statement::Insert),
            "update" => no_args(Statement::Update),
            "remove" => no_args(Statement::Remove),
            "scan" => no_args(Statement::Scan),
            "rscan" => no_args(Statement::ReverseScan),
            _ => Err(format!("unknown statement `{input}`.")),
        }
    }
}
