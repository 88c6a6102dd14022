//! Not-required marking: a label on the marker anchor row, and a `"-"`
//! formula on each listed measure's row that lights up once the anchor cell
//! of its column is filled.

use flagsheet_core::CellAddress;

use crate::changes::CellChange;
use crate::config::SheetLayout;
use crate::error::{ResolutionFailure, AVAILABLE_SAMPLE};
use crate::formula::{not_required_formula, ArgSeparator};
use crate::row_index::RowIndex;

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPlan {
    /// Anchor row referenced by every marker formula
    pub anchor: u32,
    pub changes: Vec<CellChange>,
    /// `(identifier, row)` for each measure found
    pub matched: Vec<(i64, u32)>,
    /// Requested identifiers missing from the index
    pub missing: Vec<i64>,
}

/// Plan the writes marking `measures` as not required.
///
/// Fails when the index is empty, or when measures were requested and none
/// of them is in the index.
pub fn plan_not_required(
    layout: &SheetLayout,
    index: &RowIndex,
    measures: &[i64],
    sep: ArgSeparator,
) -> Result<MarkerPlan, ResolutionFailure> {
    if index.is_empty() {
        return Err(ResolutionFailure::NoIdentifiers {
            column: CellAddress::column_to_letters(layout.id_column),
            row_min: layout.scan.row_min,
            row_max: layout.scan.row_max,
        });
    }

    let anchor = layout.not_required_row;
    let mut plan = MarkerPlan {
        anchor,
        changes: vec![CellChange::marker_label(
            CellAddress::from_sheet_row(anchor, layout.not_required_label_column),
            &layout.not_required_label,
        )],
        matched: Vec::new(),
        missing: Vec::new(),
    };

    for &id in measures {
        match index.row_of(id) {
            Some(row) if !plan.matched.contains(&(id, row)) => plan.matched.push((id, row)),
            Some(_) => {}
            None => plan.missing.push(id),
        }
    }

    if !measures.is_empty() && plan.matched.is_empty() {
        return Err(ResolutionFailure::NoMatchingMeasures {
            requested: measures.to_vec(),
            available_sample: index.identifiers().take(AVAILABLE_SAMPLE).collect(),
            available_count: index.len(),
        });
    }
    if !plan.missing.is_empty() {
        tracing::warn!(missing = ?plan.missing, "not-required measures not found in the sheet");
    }

    for &(_, row) in &plan.matched {
        for col in layout.flag_columns.clone() {
            let letters = CellAddress::column_to_letters(col);
            plan.changes.push(CellChange::formula(
                CellAddress::from_sheet_row(row, col),
                not_required_formula(&letters, anchor, sep),
            ));
        }
    }
    Ok(plan)
}
