//! Thin demonstration CLI: translates a single SQL statement (or a batch)
//! against a named database and prints the resulting invocation as JSON.
//! Performs no network I/O — wiring the invocation to an actual MongoDB
//! driver is the job of the enclosing REPL (spec §1/§6), not this binary.

use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use sqlmongo_translate::{TranslateOptions, translate, translate_many};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlmongo-translate", about = "Translate SQL into a MongoDB invocation")]
struct Cli {
    /// Target database name, threaded through to the Invocation.
    database: String,

    /// SQL statement to translate. Reads from stdin when omitted.
    #[arg(short = 'e', long = "execute")]
    sql: Option<String>,

    /// Treat the input as `;`-delimited statements and emit a JSON array.
    #[arg(long)]
    batch: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let sql = match cli.sql {
        Some(sql) => sql,
        None => {
            let mut buf = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buf) {
                eprintln!("ERROR usage: failed to read SQL from stdin: {e}");
                return ExitCode::from(3);
            }
            buf
        }
    };

    let options = TranslateOptions::default();

    if cli.batch {
        match translate_many(&sql, &cli.database, &options) {
            Ok(invocations) => {
                let docs: Vec<_> = invocations.iter().map(|i| i.to_document()).collect();
                println!("{}", serde_json::to_string_pretty(&docs).unwrap());
                ExitCode::SUCCESS
            }
            Err(e) => {
                match &e.hint {
                    Some(hint) => eprintln!("ERROR {} ({hint})", e.kind),
                    None => eprintln!("ERROR {}", e.kind),
                }
                ExitCode::from(1)
            }
        }
    } else {
        match translate(&sql, &cli.database, &options) {
            Ok(invocation) => {
                println!("{}", serde_json::to_string_pretty(&invocation.to_document()).unwrap());
                ExitCode::SUCCESS
            }
            Err(e) => {
                match &e.hint {
                    Some(hint) => eprintln!("ERROR {} ({hint})", e.kind),
                    None => eprintln!("ERROR {}", e.kind),
                }
                ExitCode::from(1)
            }
        }
    }
}
