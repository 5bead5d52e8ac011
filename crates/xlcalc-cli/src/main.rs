//! xlcalc CLI - parse, render and evaluate Excel formulas

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xlcalc::prelude::*;
use xlcalc::Token;

#[derive(Parser)]
#[command(name = "xlcalc")]
#[command(author, version, about = "Excel formula parser and calculator")]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the postfix token array of a formula
    Parse {
        formula: String,

        /// JSON workbook fixture that defines sheets, names and tables
        #[arg(short, long)]
        workbook: Option<PathBuf>,

        /// Sheet the formula lives on
        #[arg(short, long)]
        sheet: Option<String>,
    },

    /// Parse a formula and print it back in canonical form
    Render {
        formula: String,

        #[arg(short, long)]
        workbook: Option<PathBuf>,

        #[arg(short, long)]
        sheet: Option<String>,
    },

    /// Evaluate a formula, optionally against a workbook
    #[command(alias = "evaluate")]
    Eval {
        formula: String,

        #[arg(short, long)]
        workbook: Option<PathBuf>,

        #[arg(short, long)]
        sheet: Option<String>,
    },

    /// Calculate every formula of a workbook and print the values as JSON
    Calc {
        /// JSON workbook fixture
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recalculate every formula, not just stale ones
        #[arg(long)]
        full: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Parse {
            formula,
            workbook,
            sheet,
        } => {
            let (book, sheet) = open_context(workbook.as_deref(), sheet.as_deref())?;
            print_tokens(&book, sheet, &formula)
        }
        Commands::Render {
            formula,
            workbook,
            sheet,
        } => {
            let (book, sheet) = open_context(workbook.as_deref(), sheet.as_deref())?;
            let parsed = book
                .parse_formula(sheet, &formula)
                .with_context(|| format!("Failed to parse '{}'", formula))?;
            println!("={}", book.render_formula(sheet, &parsed));
            Ok(())
        }
        Commands::Eval {
            formula,
            workbook,
            sheet,
        } => {
            let (mut book, sheet) = open_context(workbook.as_deref(), sheet.as_deref())?;
            let value = book
                .evaluate(sheet, &formula)
                .with_context(|| format!("Failed to evaluate '{}'", formula))?;
            println!("{}", value);
            Ok(())
        }
        Commands::Calc {
            input,
            output,
            full,
        } => calculate(&input, output.as_deref(), full),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_workbook(path: &Path) -> Result<Workbook> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    Workbook::from_json(&text).with_context(|| format!("Failed to load '{}'", path.display()))
}

/// Workbook and sheet index a formula is interpreted in
fn open_context(path: Option<&Path>, sheet: Option<&str>) -> Result<(Workbook, usize)> {
    let book = match path {
        Some(path) => open_workbook(path)?,
        None => Workbook::new(),
    };
    let index = match sheet {
        Some(name) => match book.sheet_index(name) {
            Some(index) => index,
            None => bail!("Sheet '{}' not found", name),
        },
        None => 0,
    };
    if index >= book.sheet_count() {
        bail!("Workbook has no sheets");
    }
    Ok((book, index))
}

fn print_tokens(book: &Workbook, sheet: usize, formula: &str) -> Result<()> {
    let parsed = book
        .parse_formula(sheet, formula)
        .with_context(|| format!("Failed to parse '{}'", formula))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (i, token) in parsed.tokens().iter().enumerate() {
        writeln!(out, "{:>3}  {}", i, describe(token))?;
    }
    Ok(())
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("Number {}", n),
        Token::Text(s) => format!("Text {:?}", s.as_str()),
        Token::Bool(b) => format!("Bool {}", b),
        Token::Error(e) => format!("Error {}", e.as_str()),
        Token::Function { name, argc, .. } => format!("Function {}/{}", name.as_str(), argc),
        other => format!("{:?}", other),
    }
}

fn calculate(input: &Path, output: Option<&Path>, full: bool) -> Result<()> {
    let mut workbook = open_workbook(input)?;

    let stats = workbook
        .calculate_with_options(&CalculationOptions {
            force_full_calculation: full,
            ..Default::default()
        })
        .context("Failed to calculate formulas")?;
    eprintln!(
        "Calculated {} of {} formulas ({} errors, {} circular)",
        stats.cells_calculated, stats.formula_count, stats.errors, stats.circular_references
    );

    let json = serde_json::to_string_pretty(&workbook.values_json())?;
    if let Some(path) = output {
        std::fs::write(path, json.as_bytes())
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
        eprintln!("Wrote values to '{}'", path.display());
    } else {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", json)?;
    }
    Ok(())
}
