//! Formula text generation.
//!
//! Formulas are produced as text for the spreadsheet application to
//! evaluate. Anchor references use a relative column and an absolute row
//! (`L$200`), so a formula copied sideways across the flag columns keeps
//! pointing at the same anchor row.

use std::fmt;

use flagsheet_core::{CellAddress, Worksheet};

use crate::association::Associations;
use crate::changes::CellChange;
use crate::config::SheetLayout;
use crate::row_index::RowIndex;

/// Rows sampled when detecting the argument separator
pub const SEPARATOR_SCAN_ROWS: u32 = 200;

/// Function argument separator. Locales that use a decimal comma write
/// `;` between arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSeparator {
    Comma,
    Semicolon,
}

impl ArgSeparator {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "," => Some(ArgSeparator::Comma),
            ";" => Some(ArgSeparator::Semicolon),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            ArgSeparator::Comma => ',',
            ArgSeparator::Semicolon => ';',
        }
    }
}

impl fmt::Display for ArgSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Pick the separator the sheet's existing formulas use.
///
/// Counts `,` and `;` outside string literals in every formula within the
/// first `rows` rows and returns the strictly more frequent one. `None`
/// when neither appears or they tie.
pub fn detect_separator(sheet: &Worksheet, rows: u32) -> Option<ArgSeparator> {
    let (mut commas, mut semicolons) = (0usize, 0usize);
    for (_, _, text) in sheet.formula_cells().filter(|(row, _, _)| *row < rows) {
        let mut in_string = false;
        for c in text.chars() {
            match c {
                '"' => in_string = !in_string,
                ',' if !in_string => commas += 1,
                ';' if !in_string => semicolons += 1,
                _ => {}
            }
        }
    }
    match commas.cmp(&semicolons) {
        std::cmp::Ordering::Greater => Some(ArgSeparator::Comma),
        std::cmp::Ordering::Less => Some(ArgSeparator::Semicolon),
        std::cmp::Ordering::Equal => None,
    }
}

/// Quote `text` as a formula string literal
fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Count of non-empty cells in `col` on rows congruent to `phase_row`
/// modulo `step`, between `phase_row` and `row_max`.
///
/// Sticks to SUMPRODUCT/MOD/ROW so it evaluates without dynamic arrays.
pub fn header_formula(col: &str, phase_row: u32, row_max: u32, step: u32, sep: ArgSeparator) -> String {
    let range = format!("{col}{phase_row}:{col}{row_max}");
    format!("=SUMPRODUCT(--({range}<>\"\"){sep}--(MOD(ROW({range})-{phase_row}{sep}{step})=0))")
}

/// `label` when any anchor cell in `col` is non-empty, else `otherwise`
/// (an expression) or an empty string
pub fn request_formula(
    col: &str,
    anchors: &[u32],
    label: &str,
    otherwise: Option<&str>,
    sep: ArgSeparator,
) -> String {
    let conditions: Vec<String> = anchors
        .iter()
        .map(|row| format!("{col}${row}<>\"\""))
        .collect();
    let joiner = sep.to_string();
    let otherwise = otherwise.map_or_else(|| "\"\"".to_string(), str::to_string);
    format!(
        "=IF(OR({}){sep}{}{sep}{otherwise})",
        conditions.join(&joiner),
        quoted(label)
    )
}

/// Expression mirroring `col` at `source_row`, blank when the source is
/// blank or in error. No leading `=`, so it can nest.
pub fn auto_data_expr(col: &str, source_row: u32, sep: ArgSeparator) -> String {
    let cell = format!("{col}${source_row}");
    format!("IFERROR(IF({cell}=\"\"{sep}\"\"{sep}{cell}){sep}\"\")")
}

/// `"-"` while the not-required anchor in `col` is filled
pub fn not_required_formula(col: &str, anchor_row: u32, sep: ArgSeparator) -> String {
    format!("=IF({col}${anchor_row}<>\"\"{sep}\"-\"{sep}\"\")")
}

/// Changes produced by [`synthesize`], with counts for diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesis {
    pub changes: Vec<CellChange>,
    /// Rows carrying a request formula, per column
    pub request_rows: usize,
    /// Rows carrying only an auto-data formula, per column
    pub auto_data_rows: usize,
    /// Auto-data identifiers not found in the row index
    pub unmapped_auto_data: Vec<i64>,
}

impl Synthesis {
    /// Per-row formulas generated across all flag columns, before any
    /// write policy is applied
    pub fn per_row_formulas(&self) -> usize {
        self.request_rows + self.auto_data_rows
    }
}

/// Build every change of a generation run: tool labels, the three header
/// counts per flag column, then one formula per affected or auto-data row
/// per flag column.
pub fn synthesize(
    layout: &SheetLayout,
    index: &RowIndex,
    associations: &Associations,
    sep: ArgSeparator,
) -> Synthesis {
    let mut synthesis = Synthesis::default();

    for anchor in &associations.anchors {
        synthesis.changes.push(CellChange::label(
            CellAddress::from_sheet_row(anchor.row, layout.tool_label_column),
            &anchor.name,
        ));
    }

    // Auto-data source row per target row
    let mut auto_rows = std::collections::BTreeMap::new();
    if let Some(auto) = &layout.auto_data {
        for (id, slot) in &auto.slots {
            match index.row_of(*id) {
                Some(row) => {
                    auto_rows.insert(row, auto.source_row(*slot));
                }
                None => synthesis.unmapped_auto_data.push(*id),
            }
        }
    }

    let scan = layout.scan;
    for col in layout.flag_columns.clone() {
        let letters = CellAddress::column_to_letters(col);

        for (offset, header_row) in (1..=3u32).enumerate() {
            let phase = scan.row_min + offset as u32;
            synthesis.changes.push(CellChange::header(
                CellAddress::from_sheet_row(header_row, col),
                header_formula(&letters, phase, scan.row_max, scan.step, sep),
            ));
        }

        for (row, anchors) in &associations.affected {
            let otherwise = auto_rows
                .get(row)
                .map(|source| auto_data_expr(&letters, *source, sep));
            synthesis.changes.push(CellChange::formula(
                CellAddress::from_sheet_row(*row, col),
                request_formula(&letters, anchors, &layout.request_label, otherwise.as_deref(), sep),
            ));
            synthesis.request_rows += 1;
        }

        for (row, source) in &auto_rows {
            if associations.affected.contains_key(row) {
                continue;
            }
            synthesis.changes.push(CellChange::formula(
                CellAddress::from_sheet_row(*row, col),
                format!("={}", auto_data_expr(&letters, *source, sep)),
            ));
            synthesis.auto_data_rows += 1;
        }
    }

    if !synthesis.unmapped_auto_data.is_empty() {
        tracing::warn!(
            identifiers = ?synthesis.unmapped_auto_data,
            "auto-data identifiers not found in the sheet"
        );
    }
    synthesis
}
