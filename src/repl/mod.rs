pub mod commands;
pub mod session;

pub use commands::MetaCommand;
pub use session::Session;

use crate::storage::{statement::Statement, Database};
use log::{debug, info};
use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::PathBuf,
};

/// Starts a database REPL session, reading commands from `file` or stdin
pub fn start_repl(name: String, file: Option<PathBuf>) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match file {
        Some(path) => {
            info!("reading commands from {}", path.display());
            run(&name, BufReader::new(File::open(path)?), &mut out)
        }
        None => run(&name, std::io::stdin().lock(), &mut out),
    }
}

/// Runs commands from `input` until `.exit` or end of input, writing results to `out`.
pub fn run<R: BufRead, W: Write>(name: &str, mut input: R, out: &mut W) -> std::io::Result<()> {
    let db = Database::new();
    let mut session = Session::new(&db);

    loop {
        write!(out, "{name} > ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let result = if line.starts_with('.') {
            let command: Result<MetaCommand, _> = line.try_into();
            match command {
                Ok(MetaCommand::Exit) => break,
                Ok(command) => command.execute(&session),
                Err(e) => {
                    writeln!(out, "error: {e}")?;
                    continue;
                }
            }
        } else {
            let statement: Result<Statement, _> = line.try_into();
            match statement {
                Ok(statement) => session.execute(statement),
                Err(e) => {
                    writeln!(out, "error: {e}")?;
                    continue;
                }
            }
        };

        match result {
            Ok(lines) => {
                for l in lines {
                    writeln!(out, "{l}")?;
                }
            }
            Err(e) if e.is_not_found() => writeln!(out, "{e}")?,
            Err(e) => writeln!(out, "error: {e}")?,
        }
        out.flush()?;
    }

    if let Err(e) = session.close() {
        writeln!(out, "error: {e}")?;
    }
    debug!("repl session `{name}` finished");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn run_script(script: &str) -> String {
        let mut out = Vec::new();
        run("db", script.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn stops_at_exit() {
        let out = run_script(".tables\n.exit\ncreate table:late\n.tables\n");
        assert_eq!(out, "db > db > ");
    }

    #[test]
    fn reports_errors_and_continues() {
        let out = run_script("open table:missing\nbogus\n.schema\ncreate table:t\n.tables\n");
        assert!(out.contains("error: no such table `missing`"));
        assert!(out.contains("error: unknown statement `bogus`."));
        assert!(out.contains("error: unknown command `.schema`."));
        assert!(out.ends_with("db > t\ndb > \n"));
    }

    #[test]
    fn misses_print_not_found() {
        let out = run_script("create table:t key_format=S,value_format=S\nopen table:t\nnext\n");
        assert!(out.contains("db > not found\n"));
    }
}
