//! Cell writes and the policies guarding them.
//!
//! Every write the engine makes goes through [`apply_changes`], which
//! checks the target cell against the change's [`WritePolicy`]. Literal
//! content typed by a person is never replaced by a generated formula, and
//! rewriting a cell with the text it already holds counts as unchanged, so
//! running the same generation twice leaves the second run with nothing to
//! write.

use std::fmt;

use flagsheet_core::{CellAddress, CellValue, FormulaKind, Worksheet};

/// When a change may replace what a cell holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Empty or formula cells only
    Formula,
    /// Empty cells only
    HeaderFormula,
    /// Always
    Label,
    /// Empty cells, formula cells, or cells already holding the label
    MarkerLabel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub address: CellAddress,
    pub content: CellValue,
    pub policy: WritePolicy,
}

impl CellChange {
    pub fn formula(address: CellAddress, text: impl Into<String>) -> Self {
        Self {
            address,
            content: CellValue::formula(text),
            policy: WritePolicy::Formula,
        }
    }

    pub fn header(address: CellAddress, text: impl Into<String>) -> Self {
        Self {
            address,
            content: CellValue::formula(text),
            policy: WritePolicy::HeaderFormula,
        }
    }

    pub fn label(address: CellAddress, text: &str) -> Self {
        Self {
            address,
            content: CellValue::string(text),
            policy: WritePolicy::Label,
        }
    }

    pub fn marker_label(address: CellAddress, text: &str) -> Self {
        Self {
            address,
            content: CellValue::string(text),
            policy: WritePolicy::MarkerLabel,
        }
    }
}

/// Why a change was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The cell holds a literal value
    Literal,
    /// A header cell already holds something
    Occupied,
    /// The cell is the master of a shared formula with dependents
    SharedMaster,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Literal => "literal value",
            SkipReason::Occupied => "occupied",
            SkipReason::SharedMaster => "shared formula master",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedWrite {
    pub address: CellAddress,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub written: usize,
    /// Cells that already held exactly the change's content
    pub unchanged: usize,
    pub skipped: Vec<SkippedWrite>,
}

impl ApplyReport {
    pub fn merge(&mut self, other: ApplyReport) {
        self.written += other.written;
        self.unchanged += other.unchanged;
        self.skipped.extend(other.skipped);
    }
}

enum Verdict {
    Write,
    Unchanged,
    Skip(SkipReason),
}

fn is_blank(value: &CellValue) -> bool {
    match value {
        CellValue::Empty => true,
        CellValue::String(s) => s.is_empty(),
        _ => false,
    }
}

fn same_content(current: &CellValue, new: &CellValue) -> bool {
    match (current.formula_text(), new.formula_text()) {
        (Some(a), Some(b)) => a == b,
        (None, None) => current == new,
        _ => false,
    }
}

fn is_shared_master(sheet: &Worksheet, value: &CellValue) -> bool {
    match value.formula_kind() {
        Some(FormulaKind::Shared {
            index,
            range: Some(_),
        }) => sheet.shared_group_len(*index) > 1,
        _ => false,
    }
}

fn judge(sheet: &Worksheet, change: &CellChange) -> Verdict {
    let current = sheet.value_at(change.address.row, change.address.col);
    if same_content(current, &change.content) {
        return Verdict::Unchanged;
    }
    if is_shared_master(sheet, current) {
        return Verdict::Skip(SkipReason::SharedMaster);
    }
    let blank = is_blank(current);
    match change.policy {
        WritePolicy::Label => Verdict::Write,
        WritePolicy::HeaderFormula if blank => Verdict::Write,
        WritePolicy::HeaderFormula => Verdict::Skip(SkipReason::Occupied),
        WritePolicy::Formula | WritePolicy::MarkerLabel if blank || current.is_formula() => {
            Verdict::Write
        }
        WritePolicy::Formula | WritePolicy::MarkerLabel => Verdict::Skip(SkipReason::Literal),
    }
}

/// Apply `changes` to `sheet` in order, honoring each change's policy.
///
/// Written cells keep their style; formula metadata of the old content is
/// dropped.
pub fn apply_changes(
    sheet: &mut Worksheet,
    changes: &[CellChange],
) -> Result<ApplyReport, flagsheet_core::Error> {
    let mut report = ApplyReport::default();
    for change in changes {
        match judge(sheet, change) {
            Verdict::Write => {
                sheet.set_value_at(change.address.row, change.address.col, change.content.clone())?;
                report.written += 1;
            }
            Verdict::Unchanged => report.unchanged += 1,
            Verdict::Skip(reason) => {
                tracing::debug!(cell = %change.address, %reason, "write skipped");
                report.skipped.push(SkippedWrite {
                    address: change.address,
                    reason,
                });
            }
        }
    }
    Ok(report)
}
