//! # flagsheet
//!
//! Writes tool request flags into inspection workbooks.
//!
//! An inspection sheet lists measurements down an identifier column, one
//! every few rows, and names the tools used for them in an anchor block
//! further down. Given which measures each tool covers, flagsheet writes
//! the tool names on their anchor rows and, on every measurement row a tool
//! touches, a formula that shows a request label once anything is entered
//! on one of that row's tool anchors. It can also mark measurements as not
//! required through a second anchor row.
//!
//! The edit is made on an in-memory model of the package and saved
//! atomically. Parts the model does not carry (drawings and external link
//! caches) are copied back from the source afterwards, and when Excel is
//! reachable through the COM bridge the saved file is recalculated there.
//!
//! ## Example
//!
//! ```no_run
//! use flagsheet::{Engine, FlagConfig, ToolSpec};
//!
//! let config = FlagConfig::new("工程内検査シート", vec![ToolSpec::new("Drill", [1, 5])]);
//! let mut engine = Engine::new();
//! let generated = engine.generate("in.xlsx".as_ref(), "out.xlsx".as_ref(), &config)?;
//!
//! for pair in &generated.report.unresolved {
//!     eprintln!("not in sheet: {pair}");
//! }
//!
//! engine.mark_not_required(
//!     &generated.saved_path,
//!     &generated.saved_path,
//!     &config,
//!     &[9],
//!     Some(&generated.row_index),
//! )?;
//! # Ok::<(), flagsheet::FlagError>(())
//! ```

pub mod association;
pub mod changes;
pub mod config;
pub mod error;
pub mod formula;
pub mod marker;
pub mod persist;
pub mod pipeline;
pub mod recalc;
pub mod row_index;
pub mod value;

pub use association::{associate, Associations, ToolAnchor, UnresolvedPair};
pub use changes::{apply_changes, ApplyReport, CellChange, SkipReason, SkippedWrite, WritePolicy};
pub use config::{
    parse_measure_list, AutoDataConfig, FlagConfig, MeasureKey, NotRequiredConfig, SheetLayout,
    ToolSpec,
};
pub use error::{ConfigError, FlagError, ResolutionFailure, Result};
pub use formula::{detect_separator, synthesize, ArgSeparator, Synthesis};
pub use marker::{plan_not_required, MarkerPlan};
pub use persist::{
    is_lock_error, normalize_array_formulas, save_atomic, ArrayWindow, LockRetry, NeverRetry,
    PersistOptions, RepairOutcome,
};
pub use pipeline::{Engine, GenerationOutcome, GenerationReport, MarkOutcome, PersistenceReport};
#[cfg(feature = "excel-com")]
pub use recalc::ExcelComChannel;
pub use recalc::{
    recalculate_with_retry, ChannelError, NoRecalc, RecalcChannel, RecalcOutcome, RetryPolicy,
};
pub use row_index::{RowIndex, ScanRange};
pub use value::{resolve_integer, RawValue};
