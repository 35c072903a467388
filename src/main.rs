use std::path::PathBuf;

use clap::Parser;
use log::error;
use table_cursor::start_repl;

#[derive(Parser)]
#[command(version, about,long_about = None)]
struct Cli {
    /// Optional name shown in the prompt
    name: Option<String>,

    /// Optionally, reads commands from a file instead of stdin
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let name = cli.name.unwrap_or("db".into());

    if let Err(e) = start_repl(name, cli.file) {
        error!("repl failed: {e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
