//! flagsheet CLI - writes tool request flags into inspection workbooks

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flagsheet::{
    associate, parse_measure_list, Engine, ExcelComChannel, FlagConfig, GenerationOutcome,
    LockRetry, MarkOutcome, PersistenceReport, RecalcOutcome, RepairOutcome,
};
use flagsheet_excel_com::ExcelBridgeConfig;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flagsheet")]
#[command(
    author,
    version,
    about = "Write tool request flags into inspection workbooks"
)]
struct Cli {
    /// Show debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// Configuration file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Input workbook (xlsx, xlsm)
    #[arg(short, long)]
    input: PathBuf,
}

#[derive(Args)]
struct BridgeArgs {
    /// Do not recalculate the saved file in Excel
    #[arg(long)]
    no_recalc: bool,

    /// Path to excel-com-bridge.exe (default: EXCEL_COM_BRIDGE_EXE or next to this binary)
    #[arg(long, value_name = "PATH")]
    bridge_exe: Option<PathBuf>,

    /// Program used to run the bridge outside Windows (default: WINE or "wine")
    #[arg(long, value_name = "PATH")]
    wine: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write tool labels, header counts and request formulas
    Generate {
        #[command(flatten)]
        inputs: Inputs,

        /// Output workbook (may be the input)
        #[arg(short, long)]
        output: PathBuf,

        /// Measures to mark not required afterwards, e.g. "1,5 9"
        #[arg(long, value_name = "LIST")]
        not_required: Option<String>,

        #[command(flatten)]
        bridge: BridgeArgs,
    },

    /// Mark measures as not required
    Mark {
        #[command(flatten)]
        inputs: Inputs,

        /// Output workbook (may be the input)
        #[arg(short, long)]
        output: PathBuf,

        /// Measures to mark, e.g. "1,5 9"
        #[arg(short, long, value_name = "LIST")]
        measures: String,

        #[command(flatten)]
        bridge: BridgeArgs,
    },

    /// Show the resolved measure rows and tool anchors without writing
    Preview {
        #[command(flatten)]
        inputs: Inputs,

        #[command(flatten)]
        bridge: BridgeArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Generate {
            inputs,
            output,
            not_required,
            bridge,
        } => generate(&inputs, &output, not_required.as_deref(), &bridge),
        Commands::Mark {
            inputs,
            output,
            measures,
            bridge,
        } => mark(&inputs, &output, &measures, &bridge),
        Commands::Preview { inputs, bridge } => preview(&inputs, &bridge),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

/// Asks on stdin whether to retry a save blocked by another process
struct PromptRetry;

impl LockRetry for PromptRetry {
    fn should_retry(&mut self, path: &Path, error: &io::Error, _attempt: u32) -> bool {
        eprint!(
            "'{}' is locked ({}). Close it and retry? [y/N] ",
            path.display(),
            error
        );
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn engine(bridge: &BridgeArgs) -> Engine {
    let engine = Engine::new().with_lock_retry(PromptRetry);
    if bridge.no_recalc {
        tracing::debug!("recalculation disabled");
        return engine;
    }
    let mut config = ExcelBridgeConfig::from_env();
    if let Some(exe) = &bridge.bridge_exe {
        config.bridge_exe_path = Some(exe.clone());
    }
    if let Some(wine) = &bridge.wine {
        config.launcher = Some(wine.clone());
    }
    engine.with_channel(ExcelComChannel::new(config))
}

fn load_config(path: &Path) -> Result<FlagConfig> {
    tracing::debug!(path = %path.display(), "loading config");
    FlagConfig::load(path).with_context(|| format!("Failed to load config '{}'", path.display()))
}

fn generate(
    inputs: &Inputs,
    output: &Path,
    not_required: Option<&str>,
    bridge: &BridgeArgs,
) -> Result<()> {
    let config = load_config(&inputs.config)?;
    let measures = not_required
        .map(parse_measure_list)
        .transpose()
        .context("Invalid --not-required list")?;

    let mut engine = engine(bridge);
    let outcome = engine
        .generate(&inputs.input, output, &config)
        .with_context(|| format!("Failed to generate flags for '{}'", inputs.input.display()))?;
    print_generation(&outcome);

    if let Some(measures) = measures.filter(|m| !m.is_empty()) {
        match engine.mark_not_required(
            &outcome.saved_path,
            &outcome.saved_path,
            &config,
            &measures,
            Some(&outcome.row_index),
        ) {
            Ok(marked) => print_mark(&marked),
            Err(e) => eprintln!(
                "Warning: flags were saved, but not-required marking failed: {}",
                e
            ),
        }
    }
    Ok(())
}

fn mark(inputs: &Inputs, output: &Path, measures: &str, bridge: &BridgeArgs) -> Result<()> {
    let config = load_config(&inputs.config)?;
    let measures = parse_measure_list(measures).context("Invalid --measures list")?;
    let outcome = engine(bridge)
        .mark_not_required(&inputs.input, output, &config, &measures, None)
        .with_context(|| format!("Failed to mark '{}'", inputs.input.display()))?;
    print_mark(&outcome);
    Ok(())
}

fn preview(inputs: &Inputs, bridge: &BridgeArgs) -> Result<()> {
    let config = load_config(&inputs.config)?;
    let index = engine(bridge)
        .preview(&inputs.input, &config)
        .with_context(|| format!("Failed to read '{}'", inputs.input.display()))?;

    println!("Measures ({}):", index.len());
    for (id, row) in index.iter() {
        println!("  {:>5}  row {}", id, row);
    }

    let associations = associate(
        &config.tools,
        &index,
        config.tool_start_row,
        config.tool_row_step(),
    );
    println!("Tools:");
    for anchor in &associations.anchors {
        let rows: Vec<String> = associations
            .affected
            .iter()
            .filter(|(_, anchors)| anchors.contains(&anchor.row))
            .map(|(row, _)| row.to_string())
            .collect();
        println!("  row {:>4}  {}  -> rows [{}]", anchor.row, anchor.name, rows.join(", "));
    }
    for pair in &associations.unresolved {
        println!("  not found: {}", pair);
    }
    Ok(())
}

fn print_generation(outcome: &GenerationOutcome) {
    let report = &outcome.report;
    eprintln!("Saved '{}'", outcome.saved_path.display());
    eprintln!(
        "  {} measures, {} tools, {} flagged rows, {} auto-data rows (separator '{}')",
        report.identifiers,
        report.anchors.len(),
        report.affected_rows,
        report.auto_data_rows,
        report.separator
    );
    eprintln!(
        "  {} cells written, {} unchanged, {} skipped",
        report.apply.written,
        report.apply.unchanged,
        report.apply.skipped.len()
    );
    for pair in &report.unresolved {
        eprintln!("Warning: {} not found in the sheet", pair);
    }
    print_persistence(&outcome.persistence);
}

fn print_mark(outcome: &MarkOutcome) {
    eprintln!("Saved '{}'", outcome.saved_path.display());
    eprintln!(
        "  {} measures marked not required (anchor row {}), {} cells written, {} skipped",
        outcome.matched.len(),
        outcome.anchor,
        outcome.apply.written,
        outcome.apply.skipped.len()
    );
    if !outcome.missing.is_empty() {
        eprintln!("Warning: measures not found: {:?}", outcome.missing);
    }
    print_persistence(&outcome.persistence);
}

fn print_persistence(persistence: &PersistenceReport) {
    if persistence.normalized_arrays > 0 {
        eprintln!(
            "  {} single-cell array formulas made ordinary",
            persistence.normalized_arrays
        );
    }
    match &persistence.repair {
        RepairOutcome::Repaired(report) if report.modified() => eprintln!(
            "  restored {} drawing/external-link parts",
            report.replaced.len() + report.added.len()
        ),
        RepairOutcome::Repaired(_) => {}
        RepairOutcome::Skipped { reason } => eprintln!("  package repair skipped: {}", reason),
        RepairOutcome::Failed { error } => eprintln!("Warning: package repair failed: {}", error),
    }
    match &persistence.recalc {
        RecalcOutcome::Recalculated { attempts } => {
            eprintln!("  recalculated in Excel ({} attempt(s))", attempts)
        }
        RecalcOutcome::Unavailable(reason) => {
            eprintln!("  not recalculated ({}); Excel will recalculate on open", reason)
        }
        RecalcOutcome::Failed {
            attempts,
            last_error,
        } => eprintln!(
            "Warning: recalculation failed after {} attempt(s): {}",
            attempts, last_error
        ),
    }
}
