//! snowdoc: store JSON documents in a snowflake of tables and get them back.
//!
//! # Usage
//!
//! ```bash
//! # Load JSON-lines into a fact table
//! snowdoc --database-url sqlite://facts.db --fact fact insert docs.jsonl
//!
//! # Extract everything, in batches of the configured field
//! snowdoc --config snowdoc.toml extract
//!
//! # Show the query used for three facts
//! snowdoc --fact fact plan --field id --ids 10,11,12
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde_json::Value;
use snowdoc::prelude::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snowdoc")]
#[command(version = "0.1.0")]
#[command(about = "Nested documents in, nested documents out, tables in between", long_about = None)]
#[command(after_help = "EXAMPLES:
    snowdoc --fact fact insert docs.jsonl
    snowdoc --config snowdoc.toml extract --output out.jsonl
    snowdoc --fact fact extract --field id --ids 10,11,12
    snowdoc --fact fact plan")]
struct Cli {
    /// Configuration file (default: $CONFIG_DIR/snowdoc/snowdoc.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, env = "SNOWDOC_DATABASE_URL")]
    database_url: Option<String>,

    /// Fact table
    #[arg(short, long)]
    fact: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert JSON-lines documents (stdin when no file is given)
    Insert {
        file: Option<PathBuf>,
        /// Create the fact table from scratch first
        #[arg(long)]
        replace: bool,
    },
    /// Extract documents as JSON-lines
    Extract {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Output file (default: configured destination, else stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Values per batch
        #[arg(long)]
        batch: Option<usize>,
        /// Include identity, parent and order columns
        #[arg(long)]
        show_foreign_keys: Option<bool>,
    },
    /// Print the query an extraction runs
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Drop a fact table and all its nested tables
    Drop,
    /// List the columns of a fact table
    Columns,
}

#[derive(clap::Args)]
struct SelectionArgs {
    /// Field used for --ids and batching
    #[arg(long)]
    field: Option<String>,
    /// Extract only facts whose field holds one of these values
    #[arg(long, value_delimiter = ',')]
    ids: Vec<String>,
}

impl SelectionArgs {
    fn selection(&self, config: &Config) -> Option<Selection> {
        if self.ids.is_empty() {
            return None;
        }
        let field = self
            .field
            .clone()
            .or_else(|| config.extract.field.clone())
            .unwrap_or_else(|| "__id__".to_string());
        let values = self
            .ids
            .iter()
            .map(|v| serde_json::from_str(v).unwrap_or_else(|_| Value::String(v.clone())))
            .collect();
        Some(Selection::ids(field, values))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(fact) = &cli.fact {
        config.snowflake.fact_table = fact.clone();
    }
    if cli.verbose {
        eprintln!("{} {}", "Connecting to:".dimmed(), config.database.url);
    }

    let container = Container::connect(&config.database.url, config.database.max_connections).await?;
    let fact = config.fact_table()?.to_string();

    match cli.command {
        Commands::Insert { file, replace } => {
            let facts = if replace {
                container.create_or_replace_table(&fact).await?
            } else {
                container.get_or_create_table(&fact).await?
            };
            let docs = read_documents(file)?;
            let ids = facts.insert_with(&docs, &config.snowflake.null_values).await?;
            eprintln!("{} Inserted {} documents into {}", "✓".green(), ids.len(), fact.cyan());
        }
        Commands::Extract {
            selection,
            output,
            batch,
            show_foreign_keys,
        } => {
            if let Some(batch) = batch {
                config.extract.batch = batch;
            }
            if let Some(field) = &selection.field {
                config.extract.field = Some(field.clone());
            }
            let mut options = config.snowflake.options.clone();
            if let Some(show) = show_foreign_keys {
                options.show_foreign_keys = show;
            }

            let destination = output.or(config.destination.clone());
            let mut out: Box<dyn Write> = match &destination {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
                )),
                None => Box::new(BufWriter::new(io::stdout())),
            };

            let mut write_error: Option<io::Error> = None;
            let sink = |doc: Value| {
                if write_error.is_none() {
                    if let Err(e) = writeln!(out, "{}", doc) {
                        write_error = Some(e);
                    }
                }
            };

            let extractor = Extractor::new(container, &fact, options).with_batches(config.extract.clone());
            let count = match selection.selection(&config) {
                Some(selection) => extractor.extract(&selection, sink).await?,
                None => extractor.extract_batches(sink).await?,
            };
            if let Some(e) = write_error {
                return Err(e.into());
            }
            out.flush()?;
            eprintln!("{} Extracted {} documents from {}", "✓".green(), count, fact.cyan());
        }
        Commands::Plan { selection } => {
            let selection = selection.selection(&config).unwrap_or(Selection::All);
            let plan = container
                .planner()
                .with_options(config.snowflake.options.clone())
                .plan(&fact, &selection)?;
            println!("{}", "Levels:".green().bold());
            for level in &plan.levels {
                println!(
                    "  {} {} ({} leaves)",
                    level.alias.dimmed(),
                    level.key.cyan(),
                    level.leaves.len()
                );
            }
            println!();
            println!("{}", "Generated SQL:".green().bold());
            println!("{}", plan.sql.white());
        }
        Commands::Drop => {
            container.remove_facts(&fact).await?;
            eprintln!("{} Dropped {}", "✓".green(), fact.cyan());
        }
        Commands::Columns => {
            let snowflake = container
                .snowflake(&fact)
                .ok_or_else(|| SnowError::UnknownTable(fact.clone()))?;
            print_columns(snowflake.columns());
        }
    }
    Ok(())
}

fn read_documents(file: Option<PathBuf>) -> Result<Vec<Value>> {
    let reader: Box<dyn BufRead> = match &file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut docs = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Value = serde_json::from_str(&line)
            .with_context(|| format!("line {} is not JSON", number + 1))?;
        docs.push(doc);
    }
    Ok(docs)
}

fn print_columns(columns: &[Column]) {
    if columns.is_empty() {
        println!("{}", "(no columns)".dimmed());
        return;
    }

    let headers = ["name", "es_column", "es_index", "type", "multi"];
    let rows: Vec<[String; 5]> = columns
        .iter()
        .map(|c| {
            [
                c.name.clone(),
                c.es_column.clone(),
                c.es_index.clone(),
                c.json_type.to_string(),
                c.multi.to_string(),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let header: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:width$}", h, width = *w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());
    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());
    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:width$}", c, width = *w))
            .collect();
        println!("{}", cells.join(" │ "));
    }
    println!();
    println!("{} column(s)", rows.len().to_string().cyan());
}
