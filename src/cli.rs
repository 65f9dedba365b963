//! Command-line surface: run the HTTP service, enrich a local file, or print
//! the effective configuration.
use crate::config::{load_config, render_config, validate_config, ConfigOverrides};
use crate::enrich::{append_cell_log, enrich, CellLogEntry};
use crate::lm::build_model;
use crate::service::serve;
use crate::sheet::{encode_table, parse_table, updated_file_name, SheetFormat};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "inventory-enrich",
    version,
    about = "Fill missing ICT risk, control and dependency cells in asset inventories",
    after_help = "Commands:\n  serve                      Run the HTTP service (POST /analyze-inventory)\n  enrich --input <file>      Enrich a local .xlsx/.csv file\n  config                     Print the effective configuration\n\nExamples:\n  inventory-enrich serve --bind 127.0.0.1:8000\n  inventory-enrich enrich --input register.xlsx --row-limit 5\n  inventory-enrich enrich --input assets.csv --lm 'llm -m gpt-4o-mini' --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Serve(ServeArgs),
    Enrich(EnrichArgs),
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Run the HTTP service")]
pub struct ServeArgs {
    /// JSON config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,
}

#[derive(Parser, Debug)]
#[command(about = "Enrich a local spreadsheet")]
pub struct EnrichArgs {
    /// Spreadsheet to enrich (.xlsx, .xls, .ods, .csv)
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Output path (defaults to <stem>_updated.<ext> next to the input)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Maximum rows to process
    #[arg(long, value_name = "N")]
    pub row_limit: Option<usize>,

    /// Local LM command reading the prompt on stdin (overrides the configured model)
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// JSON config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit a machine-readable JSON summary including the per-cell log
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Print the effective configuration (secrets omitted)")]
pub struct ConfigArgs {
    /// JSON config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

pub fn run(args: RootArgs) -> Result<()> {
    match args.command {
        Command::Serve(args) => run_serve(args),
        Command::Enrich(args) => run_enrich(args),
        Command::Config(args) => run_config(args),
    }
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        bind: args.bind,
        ..ConfigOverrides::default()
    };
    let config = load_config(args.config.as_deref(), &overrides)?;
    validate_config(&config)?;

    let runtime = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    runtime.block_on(serve(config))
}

#[derive(Debug, Serialize)]
struct EnrichSummary<'a> {
    input: &'a Path,
    output: &'a Path,
    rows: usize,
    queries_issued: usize,
    filled: usize,
    kept: usize,
    failed: usize,
    elapsed_ms: u64,
    cells: &'a [CellLogEntry],
}

fn run_enrich(args: EnrichArgs) -> Result<()> {
    let start = Instant::now();
    let overrides = ConfigOverrides {
        row_limit: args.row_limit,
        lm_command: args.lm.clone(),
        ..ConfigOverrides::default()
    };
    let config = load_config(args.config.as_deref(), &overrides)?;
    validate_config(&config)?;

    let name = args
        .input
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("input path has no file name: {}", args.input.display()))?;
    let format = SheetFormat::from_name(name)?;
    let bytes =
        fs::read(&args.input).with_context(|| format!("read {}", args.input.display()))?;
    let table = parse_table(name, &bytes)?;
    let model = build_model(&config.model)?;

    let result = enrich(table, &config.targets, model.as_ref(), config.row_limit);

    let output = args
        .out
        .clone()
        .unwrap_or_else(|| args.input.with_file_name(updated_file_name(name, format)));
    let encoded = encode_table(format, &result.table)?;
    fs::write(&output, encoded).with_context(|| format!("write {}", output.display()))?;

    if let Some(path) = &config.cell_log {
        let source = args.input.display().to_string();
        if let Err(err) = append_cell_log(path, &source, &result.log) {
            tracing::warn!(path = %path.display(), error = %err, "failed to append cell log");
        }
    }

    let summary = EnrichSummary {
        input: &args.input,
        output: &output,
        rows: result.table.row_count(),
        queries_issued: result.queries_issued,
        filled: result.filled(),
        kept: result.kept(),
        failed: result.failed(),
        elapsed_ms: start.elapsed().as_millis() as u64,
        cells: &result.log,
    };
    if args.json {
        let text = serde_json::to_string_pretty(&summary).context("serialize summary")?;
        println!("{text}");
    } else {
        println!("wrote {}", output.display());
        println!(
            "rows: {}  queries: {}  filled: {}  kept: {}  failed: {}",
            summary.rows, summary.queries_issued, summary.filled, summary.kept, summary.failed
        );
    }
    Ok(())
}

fn run_config(args: ConfigArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), &ConfigOverrides::default())?;
    println!("{}", render_config(&config)?);
    if let Err(err) = validate_config(&config) {
        tracing::warn!(error = %err, "configuration is not usable as-is");
    }
    Ok(())
}
