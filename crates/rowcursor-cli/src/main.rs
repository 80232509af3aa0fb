use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rowcursor_client::{
    ColumnRef, Fixture, MemoryDriver, ResultCursor, Session, SessionConfig, Value,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rowcursor")]
#[command(version)]
#[command(about = "rowcursor - run a query through a driver and walk the result rows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectArgs {
    /// Fixture (JSON) the in-memory driver serves results from
    #[arg(long)]
    fixture: PathBuf,
    /// Session configuration file (YAML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Driver connection string, without UID/PWD
    #[arg(long, env = "ROWCURSOR_CONNECTION_STRING")]
    connection_string: Option<String>,
    /// User name
    #[arg(short, long, env = "ROWCURSOR_USER")]
    user: Option<String>,
    /// Password
    #[arg(short, long, env = "ROWCURSOR_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a query and print its rows
    Query {
        #[command(flatten)]
        connect: ConnectArgs,
        /// Query text
        #[arg(short, long)]
        execute: String,
        /// Print only this column (index or name), one value per row
        #[arg(short, long)]
        column: Option<String>,
        /// Print rows as JSON objects
        #[arg(long, conflicts_with = "column")]
        json: bool,
    },
    /// Execute a query and describe its result columns
    Columns {
        #[command(flatten)]
        connect: ConnectArgs,
        /// Query text
        #[arg(short, long)]
        execute: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rowcursor=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            connect,
            execute,
            column,
            json,
        } => {
            let session = open_session(&connect)?;
            let mut rows = session
                .execute(&execute)
                .context("Failed to execute query")?;

            match column {
                Some(column) => print_column(&mut rows, parse_column(&column))?,
                None if json => print_json(&mut rows)?,
                None => print_table(&mut rows)?,
            }
        }
        Commands::Columns { connect, execute } => {
            let session = open_session(&connect)?;
            let rows = session
                .execute(&execute)
                .context("Failed to execute query")?;

            for (index, column) in rows.columns().iter().enumerate() {
                println!(
                    "{}\t{}\t{:?}\t{}\t{:?}",
                    index, column.name, column.data_type, column.size, column.nullability
                );
            }
        }
    }

    Ok(())
}

fn open_session(args: &ConnectArgs) -> Result<Session> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(connection_string) = &args.connection_string {
        config.connection_string = connection_string.clone();
    }
    if let Some(user) = &args.user {
        config.user = user.clone();
    }
    if let Some(password) = &args.password {
        config.password = password.clone();
    }
    if config.connection_string.trim().is_empty() {
        bail!("A connection string is required (--connection-string or --config)");
    }

    let fixture = Fixture::from_file(&args.fixture)
        .with_context(|| format!("Failed to load fixture {}", args.fixture.display()))?;
    debug!("Loaded {} canned queries", fixture.queries.len());

    let driver = Arc::new(MemoryDriver::from_fixture(fixture));
    Session::connect_with(driver, &config).context("Failed to connect")
}

fn parse_column(column: &str) -> ColumnRef {
    match column.parse::<usize>() {
        Ok(index) => ColumnRef::Index(index),
        Err(_) => ColumnRef::Name(column.to_string()),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => s.clone(),
    }
}

fn print_column(rows: &mut ResultCursor<'_>, column: ColumnRef) -> Result<()> {
    while rows.next()? {
        let value = rows.get_value(column.clone())?;
        println!("{}", format_value(&value));
    }
    Ok(())
}

fn print_table(rows: &mut ResultCursor<'_>) -> Result<()> {
    println!("{}", rows.column_names().join("\t"));
    let mut count = 0;
    while rows.next()? {
        let row = rows.current_row()?;
        let line: Vec<String> = row.values().iter().map(format_value).collect();
        println!("{}", line.join("\t"));
        count += 1;
    }
    println!("({} rows)", count);
    Ok(())
}

fn print_json(rows: &mut ResultCursor<'_>) -> Result<()> {
    while rows.next()? {
        let row = rows.current_row()?;
        let object: serde_json::Map<String, serde_json::Value> = row
            .columns()
            .iter()
            .zip(row.values())
            .map(|(name, value)| -> Result<(String, serde_json::Value)> {
                Ok((name.clone(), serde_json::to_value(value)?))
            })
            .collect::<Result<_>>()?;
        println!("{}", serde_json::Value::Object(object));
    }
    Ok(())
}
