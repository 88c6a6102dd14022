//! Error types for flagsheet

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::association::UnresolvedPair;

/// Result type alias using [`FlagError`]
pub type Result<T> = std::result::Result<T, FlagError>;

/// Errors that abort a generation or marking run
#[derive(Debug, Error)]
pub enum FlagError {
    /// The configuration cannot describe this workbook
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Nothing in the sheet matched what the configuration asked for
    #[error("{0}")]
    Resolution(#[from] ResolutionFailure),

    /// The destination is held open by another process and the caller
    /// declined to retry
    #[error("{} is locked by another process: {source}", path.display())]
    LockConflict {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XLSX error: {0}")]
    Xlsx(#[from] flagsheet_xlsx::XlsxError),

    #[error("Worksheet error: {0}")]
    Core(#[from] flagsheet_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Problems with the configuration record itself, or with how it fits the
/// workbook
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sheet name is empty")]
    EmptySheetName,

    #[error("no tools configured")]
    NoTools,

    #[error("sheet '{name}' not found; available: {}", available.join(", "))]
    SheetNotFound { name: String, available: Vec<String> },

    #[error("{field}: '{value}' is not a column")]
    InvalidColumn { field: &'static str, value: String },

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("row range {min}..={max} is empty")]
    EmptyRowRange { min: u32, max: u32 },

    #[error("flag columns {start}:{end} are reversed")]
    ReversedColumns { start: String, end: String },

    #[error("formula argument separator must be ',' or ';', got '{0}'")]
    InvalidSeparator(String),

    #[error("auto-data slot {slot} for measure {measure} is outside 1..={max}")]
    SlotOutOfRange { measure: i64, slot: u32, max: u32 },

    #[error("tool_start_row {0} leaves no row for the not-required label")]
    NoNotRequiredRow(u32),

    #[error("{tools} tool anchors from row {start} every {step} rows run past the last sheet row")]
    AnchorsOffSheet { tools: usize, start: u32, step: u32 },

    #[error("auto-data rows starting at {start} run past the last sheet row")]
    AutoDataOffSheet { start: u32 },

    #[error("measure list contains a non-integer entry: '{0}'")]
    InvalidMeasure(String),

    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A run that found nothing to write, with the numbers needed to fix the
/// configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    /// Formula synthesis produced no per-row formula
    NothingToWrite {
        /// Identifiers resolved in the identifier column
        identifiers: usize,
        tools: usize,
        affected_rows: usize,
        /// The first unresolved pairs (at most [`UNRESOLVED_SAMPLE`])
        unresolved_sample: Vec<UnresolvedPair>,
        unresolved_count: usize,
    },

    /// The identifier column held no resolvable identifier at all
    NoIdentifiers {
        column: String,
        row_min: u32,
        row_max: u32,
    },

    /// None of the requested measures exist in the sheet
    NoMatchingMeasures {
        requested: Vec<i64>,
        /// The first resolvable identifiers (at most [`AVAILABLE_SAMPLE`])
        available_sample: Vec<i64>,
        available_count: usize,
    },
}

/// Unresolved pairs listed in a [`ResolutionFailure::NothingToWrite`]
pub const UNRESOLVED_SAMPLE: usize = 10;

/// Identifiers listed in a [`ResolutionFailure::NoMatchingMeasures`]
pub const AVAILABLE_SAMPLE: usize = 20;

impl std::error::Error for ResolutionFailure {}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionFailure::NothingToWrite {
                identifiers,
                tools,
                affected_rows,
                unresolved_sample,
                unresolved_count,
            } => {
                writeln!(f, "no request formula could be written")?;
                writeln!(f, "  identifiers resolved: {identifiers}")?;
                writeln!(f, "  tools: {tools}")?;
                writeln!(f, "  affected rows: {affected_rows}")?;
                write!(
                    f,
                    "  unresolved (first {} of {unresolved_count}): ",
                    unresolved_sample.len()
                )?;
                let pairs: Vec<String> = unresolved_sample.iter().map(|p| p.to_string()).collect();
                write!(f, "[{}]", pairs.join(", "))
            }
            ResolutionFailure::NoIdentifiers {
                column,
                row_min,
                row_max,
            } => write!(
                f,
                "no measurement identifiers found in column {column}, rows {row_min}..={row_max}"
            ),
            ResolutionFailure::NoMatchingMeasures {
                requested,
                available_sample,
                available_count,
            } => {
                writeln!(f, "none of the requested measures were found")?;
                writeln!(f, "  requested: {requested:?}")?;
                write!(f, "  available: {available_sample:?}")?;
                if *available_count > available_sample.len() {
                    write!(f, " ... ({} more)", available_count - available_sample.len())?;
                }
                write!(f, " ({available_count} total)")
            }
        }
    }
}
