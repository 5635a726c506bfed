//! QLE - CLI Client
//!
//! Interactive session against a local catalog. SQL may span several lines
//! and runs once a line ends with `;`. Dot commands run immediately.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qle::config::{Config, DatabaseLocation};
use qle::session::{Reply, Session};
use qle::Lineage;

#[derive(Debug, Parser)]
#[command(name = "qle-cli", version, about = "Run SQL with query lineage tracking")]
struct Args {
    /// JSON config file
    #[arg(long, env = "QLE_CONFIG")]
    config: Option<PathBuf>,

    /// Database location: a file path, sqlite://<path> or :memory:
    #[arg(long)]
    database: Option<DatabaseLocation>,

    /// Records listed by `.history` when no count is given
    #[arg(long)]
    history_limit: Option<usize>,

    /// Rows shown by `.preview` when no count is given
    #[arg(long)]
    preview_limit: Option<usize>,

    /// Run one statement or command and exit
    #[arg(short, long)]
    command: Option<String>,
}

/// Print welcome banner
fn print_banner(config: &Config) {
    println!(
        r#"
  ___  _     _____
 / _ \| |   | ____|
| | | | |   |  _|
| |_| | |___| |___
 \__\_\_____|_____|

 Query lineage for ad hoc SQL ({})
 Type '.help' for help, '.quit' to exit
"#,
        config.database
    );
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::new(),
    }
    .apply_env()?;
    if let Some(database) = &args.database {
        config = config.database(database.clone());
    }
    if let Some(limit) = args.history_limit {
        config = config.history_limit(limit);
    }
    if let Some(limit) = args.preview_limit {
        config = config.preview_limit(limit);
    }
    Ok(config)
}

/// Main REPL loop
fn run_repl(session: &mut Session) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "qle> " } else { "...> " };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if buffer.is_empty() && trimmed.starts_with('.') {
            let _ = rl.add_history_entry(trimmed);
            let reply = session.handle(trimmed);
            print!("{}", reply.text());
            if let Reply::Quit(_) = reply {
                return Ok(());
            }
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);

        if trimmed.ends_with(';') {
            let sql = std::mem::take(&mut buffer);
            let _ = rl.add_history_entry(sql.as_str());
            print!("{}", session.handle(&sql).text());
        }
    }

    println!("\nGoodbye!");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let lineage = Arc::new(Lineage::open(config.clone())?);
    let mut session = Session::new(lineage);

    if let Some(command) = &args.command {
        print!("{}", session.handle(command).text());
        return Ok(());
    }

    print_banner(&config);
    run_repl(&mut session)
}
