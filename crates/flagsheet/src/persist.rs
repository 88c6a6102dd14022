//! Saving an edited document without losing what the model cannot carry.
//!
//! A save runs in stages: single-cell array formulas are normalized, the
//! workbook is flagged for full recalculation, the package is written to a
//! temporary file and renamed over the destination, the drawing and
//! external-link parts captured from the source are restored, and the file
//! is recalculated in the spreadsheet application if one is available.
//! The stages are driven by [`crate::Engine`]; this module holds the pieces.

use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use flagsheet_core::{FormulaKind, Worksheet};
use flagsheet_xlsx::package::write_document_to_temp;
use flagsheet_xlsx::{RepairReport, XlsxDocument, UNMODELLED_PREFIXES};

use crate::error::{FlagError, Result};
use crate::recalc::RetryPolicy;

/// Columns (0-based) and sheet rows (1-based) where single-cell array
/// formulas are rewritten as ordinary ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayWindow {
    pub columns: RangeInclusive<u16>,
    pub rows: RangeInclusive<u32>,
}

/// Rewrite array formulas whose declared range is exactly their own cell
/// as ordinary formulas, within `window`. Returns the number rewritten.
pub fn normalize_array_formulas(sheet: &mut Worksheet, window: &ArrayWindow) -> usize {
    let mut count = 0;
    for (row, col, cell) in sheet.iter_cells_mut() {
        if !window.columns.contains(&col) || !window.rows.contains(&(row + 1)) {
            continue;
        }
        if let flagsheet_core::CellValue::Formula { kind, .. } = &mut cell.value {
            let single = matches!(
                kind,
                FormulaKind::Array { range }
                    if range.is_single_cell() && range.start.row == row && range.start.col == col
            );
            if single {
                *kind = FormulaKind::Normal;
                cell.cell_metadata = None;
                count += 1;
            }
        }
    }
    if count > 0 {
        tracing::debug!(sheet = sheet.name(), count, "normalized single-cell array formulas");
    }
    count
}

/// Decides whether to try again when the destination is locked
pub trait LockRetry {
    /// `attempt` counts from 1
    fn should_retry(&mut self, path: &Path, error: &io::Error, attempt: u32) -> bool;
}

impl<F> LockRetry for F
where
    F: FnMut(&Path, &io::Error, u32) -> bool,
{
    fn should_retry(&mut self, path: &Path, error: &io::Error, attempt: u32) -> bool {
        self(path, error, attempt)
    }
}

/// Fails on the first lock conflict
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl LockRetry for NeverRetry {
    fn should_retry(&mut self, _path: &Path, _error: &io::Error, _attempt: u32) -> bool {
        false
    }
}

/// Whether `error` means another process holds the file
pub fn is_lock_error(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(error.raw_os_error(), Some(32) | Some(33))
}

/// Run `op` until it succeeds, fails with something other than a lock
/// error, or `retry` declines
fn retry_on_lock(
    dest: &Path,
    retry: &mut dyn LockRetry,
    mut op: impl FnMut() -> io::Result<()>,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(()) => return Ok(()),
            Err(e) if is_lock_error(&e) => {
                tracing::warn!(path = %dest.display(), attempt, error = %e, "destination locked");
                if !retry.should_retry(dest, &e, attempt) {
                    return Err(FlagError::LockConflict {
                        path: dest.to_path_buf(),
                        source: e,
                    });
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write `doc` to a temporary file beside `dest` and rename it into place
pub fn save_atomic(doc: &XlsxDocument, dest: &Path, retry: &mut dyn LockRetry) -> Result<PathBuf> {
    let mut pending = Some(write_document_to_temp(doc, dest)?);
    retry_on_lock(dest, retry, || {
        let temp = pending
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "temporary file already persisted"))?;
        match temp.persist(dest) {
            Ok(_) => Ok(()),
            Err(e) => {
                pending = Some(e.file);
                Err(e.error)
            }
        }
    })?;
    tracing::debug!(path = %dest.display(), "saved");
    Ok(dest.to_path_buf())
}

/// Result of restoring the unmodelled parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    Repaired(RepairReport),
    /// Nothing to restore, or the source could not be inspected
    Skipped { reason: String },
    /// The output was left as written
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOptions {
    /// Part name prefixes restored from the source after saving
    pub fragile_prefixes: Vec<String>,
    /// Defaults to the flag columns over rows `1..=row_max`
    pub array_window: Option<ArrayWindow>,
    pub retry: RetryPolicy,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            fragile_prefixes: UNMODELLED_PREFIXES.iter().map(|p| p.to_string()).collect(),
            array_window: None,
            retry: RetryPolicy::default(),
        }
    }
}
